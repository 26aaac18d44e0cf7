//! Data source capability and per-source slot state

use crate::chain::ChainId;
use crate::wallet::Account;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

/// Who and where a fetch is for
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryContext {
    pub chain: ChainId,
    pub account: Option<Account>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct FetchError(pub String);

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// When a source is refreshed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Fixed interval only; results do not depend on the wallet context
    Interval,
    /// Only when the chain or account changes
    ContextChange,
    Both,
}

impl Cadence {
    pub fn polls(&self) -> bool {
        matches!(self, Cadence::Interval | Cadence::Both)
    }

    pub fn follows_context(&self) -> bool {
        matches!(self, Cadence::ContextChange | Cadence::Both)
    }
}

/// One read-only query feeding an aggregator slot
#[async_trait]
pub trait DataSource: Send + Sync {
    type Key: Ord + Clone + Debug + Send + Sync + 'static;
    type Value: Clone + Debug + Send + Sync + 'static;

    async fn fetch(
        &self,
        ctx: &QueryContext,
    ) -> Result<BTreeMap<Self::Key, Self::Value>, FetchError>;

    fn cadence(&self) -> Cadence {
        Cadence::Both
    }
}

/// Source that never has data; used for slots the application does not wire up
pub struct EmptySource<K, V>(PhantomData<fn() -> (K, V)>);

impl<K, V> Default for EmptySource<K, V> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

#[async_trait]
impl<K, V> DataSource for EmptySource<K, V>
where
    K: Ord + Clone + Debug + Send + Sync + 'static,
    V: Clone + Debug + Send + Sync + 'static,
{
    type Key = K;
    type Value = V;

    async fn fetch(&self, _ctx: &QueryContext) -> Result<BTreeMap<K, V>, FetchError> {
        Ok(BTreeMap::new())
    }

    fn cadence(&self) -> Cadence {
        Cadence::ContextChange
    }
}

/// Published state of one source. Always replaced as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSourceState<K: Ord, V> {
    pub responses: Arc<BTreeMap<K, V>>,
    pub loading: bool,
    /// Message of the last failed fetch; cleared by the next success
    pub error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<K: Ord, V> Default for DataSourceState<K, V> {
    fn default() -> Self {
        Self {
            responses: Arc::new(BTreeMap::new()),
            loading: true,
            error: None,
            updated_at: None,
        }
    }
}

impl<K: Ord, V> DataSourceState<K, V> {
    pub fn get(&self, key: &K) -> Option<&V> {
        self.responses.get(key)
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Value for `key` that validation may rely on: present and not from a failed source
    pub fn usable(&self, key: &K) -> Option<&V> {
        if self.is_failed() {
            return None;
        }
        self.responses.get(key)
    }

    pub(crate) fn with_loading(&self) -> Self {
        Self {
            responses: self.responses.clone(),
            loading: true,
            error: self.error.clone(),
            updated_at: self.updated_at,
        }
    }

    pub(crate) fn succeeded(responses: BTreeMap<K, V>, still_loading: bool) -> Self {
        Self {
            responses: Arc::new(responses),
            loading: still_loading,
            error: None,
            updated_at: Some(Utc::now()),
        }
    }

    /// Keep the previous responses, flag the failure
    pub(crate) fn failed(&self, error: &FetchError, still_loading: bool) -> Self {
        Self {
            responses: self.responses.clone(),
            loading: still_loading,
            error: Some(error.to_string()),
            updated_at: self.updated_at,
        }
    }
}
