//! Data source aggregator
//!
//! Each source refreshes on its own. A refresh marks the slot loading, fetches,
//! then swaps the slot's whole state into a fresh `AggregatedContext`. Results
//! from a fetch older than one already applied, or started under a previous
//! wallet context, are dropped.

use super::context::AggregatedContext;
use super::source::{DataSource, DataSourceState, QueryContext};
use super::{DataSources, SourceId};
use crate::config::AggregatorConfig;
use crate::events::ClientEvent;
use crate::wallet::WalletSession;

use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Fetch ordering for one slot
#[derive(Default)]
struct SlotSeq {
    /// Last fetch started
    started: AtomicU64,
    /// Last fetch whose result was published
    applied: AtomicU64,
}

pub struct DataSourceAggregator {
    sources: DataSources,
    config: AggregatorConfig,
    context: watch::Sender<Arc<AggregatedContext>>,
    seqs: [SlotSeq; SourceId::COUNT],
    /// Bumped on every wallet context change
    epoch: AtomicU64,
    events: broadcast::Sender<ClientEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

type Slot<K, V> = fn(&mut AggregatedContext) -> &mut DataSourceState<K, V>;

impl DataSourceAggregator {
    pub fn new(
        sources: DataSources,
        config: AggregatorConfig,
        query: QueryContext,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        let (context, _) = watch::channel(Arc::new(AggregatedContext::new(query)));
        Self {
            sources,
            config,
            context,
            seqs: Default::default(),
            epoch: AtomicU64::new(0),
            events,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<AggregatedContext> {
        self.context.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<AggregatedContext>> {
        self.context.subscribe()
    }

    pub fn query(&self) -> QueryContext {
        self.context.borrow().query.clone()
    }

    /// Refresh one source. Fetch failures are recorded on its slot, never returned.
    pub async fn refresh(&self, id: SourceId) {
        let s = &self.sources;
        match id {
            SourceId::Vaults => self.refresh_slot(id, s.vaults.as_ref(), |c| &mut c.vaults).await,
            SourceId::V2Vaults => {
                self.refresh_slot(id, s.v2_vaults.as_ref(), |c| &mut c.v2_vaults).await
            }
            SourceId::AssetBalances => {
                self.refresh_slot(id, s.asset_balances.as_ref(), |c| &mut c.asset_balances)
                    .await
            }
            SourceId::LiquidityMining => {
                self.refresh_slot(id, s.liquidity_mining.as_ref(), |c| &mut c.liquidity_mining)
                    .await
            }
            SourceId::LiquidityGauge => {
                self.refresh_slot(id, s.liquidity_gauge.as_ref(), |c| &mut c.liquidity_gauge)
                    .await
            }
            SourceId::Oracle => self.refresh_slot(id, s.oracle.as_ref(), |c| &mut c.oracle).await,
            SourceId::Treasury => {
                self.refresh_slot(id, s.treasury.as_ref(), |c| &mut c.treasury).await
            }
        }
    }

    /// Refresh every source concurrently
    pub async fn refresh_all(&self) {
        join_all(SourceId::ALL.iter().map(|id| self.refresh(*id))).await;
    }

    async fn refresh_slot<K, V>(
        &self,
        id: SourceId,
        source: &dyn DataSource<Key = K, Value = V>,
        slot: Slot<K, V>,
    ) where
        K: Ord + Clone + std::fmt::Debug + Send + Sync + 'static,
        V: Clone + std::fmt::Debug + Send + Sync + 'static,
    {
        let seqs = &self.seqs[id.index()];
        // Slots that do not follow the wallet context survive a reset untouched
        let follows_context = source.cadence().follows_context();
        let mut started = (0, 0);
        let mut query = QueryContext::default();

        // Sequence and epoch are read under the publish lock so a concurrent
        // context reset cannot slip between them
        self.context.send_modify(|ctx| {
            started = (
                seqs.started.fetch_add(1, Ordering::SeqCst) + 1,
                self.epoch.load(Ordering::SeqCst),
            );
            query = ctx.query.clone();
            let ctx = Arc::make_mut(ctx);
            let state = slot(ctx);
            *state = state.with_loading();
        });
        let (seq, epoch) = started;

        let timer = Instant::now();
        let result = source.fetch(&query).await;
        let elapsed = timer.elapsed().as_secs_f64();

        let applied = self.context.send_if_modified(|ctx| {
            if (follows_context && self.epoch.load(Ordering::SeqCst) != epoch)
                || seqs.applied.load(Ordering::SeqCst) > seq
            {
                return false;
            }
            seqs.applied.store(seq, Ordering::SeqCst);
            let still_loading = seqs.started.load(Ordering::SeqCst) > seq;

            let ctx = Arc::make_mut(ctx);
            let state = slot(ctx);
            *state = match &result {
                Ok(responses) => DataSourceState::succeeded(responses.clone(), still_loading),
                Err(e) => state.failed(e, still_loading),
            };
            true
        });

        if !applied {
            debug!("Dropping stale {} result (fetch {})", id, seq);
            crate::metrics::record_fetch(id.name(), "stale", elapsed);
            return;
        }

        match result {
            Ok(responses) => {
                debug!("{} refreshed with {} entries", id, responses.len());
                crate::metrics::record_fetch(id.name(), "success", elapsed);
            }
            Err(e) => {
                warn!("{} fetch failed, keeping previous data: {}", id, e);
                crate::metrics::record_fetch(id.name(), "error", elapsed);
                let _ = self.events.send(ClientEvent::SourceFailed {
                    source_name: id.name(),
                    message: e.to_string(),
                });
            }
        }
    }

    /// Switch to a new wallet context. Context-dependent slots are emptied and
    /// marked loading in one publish, then refreshed.
    pub async fn reset(&self, query: QueryContext) {
        let follows: Vec<SourceId> = SourceId::ALL
            .iter()
            .copied()
            .filter(|id| self.cadence(*id).follows_context())
            .collect();

        let changed = self.context.send_if_modified(|ctx| {
            if ctx.query == query {
                return false;
            }
            self.epoch.fetch_add(1, Ordering::SeqCst);
            let mut next = AggregatedContext::new(query.clone());
            for id in SourceId::ALL {
                if !follows.contains(&id) {
                    next.copy_slot(&**ctx, id);
                }
            }
            *ctx = Arc::new(next);
            true
        });

        if changed {
            info!(
                "Data context changed to chain {} account {:?}",
                query.chain,
                query.account.as_ref().map(|a| a.as_str())
            );
            join_all(follows.iter().map(|id| self.refresh(*id))).await;
        }
    }

    fn cadence(&self, id: SourceId) -> super::Cadence {
        let s = &self.sources;
        match id {
            SourceId::Vaults => s.vaults.cadence(),
            SourceId::V2Vaults => s.v2_vaults.cadence(),
            SourceId::AssetBalances => s.asset_balances.cadence(),
            SourceId::LiquidityMining => s.liquidity_mining.cadence(),
            SourceId::LiquidityGauge => s.liquidity_gauge.cadence(),
            SourceId::Oracle => s.oracle.cadence(),
            SourceId::Treasury => s.treasury.cadence(),
        }
    }

    /// Start polling and following the wallet session.
    ///
    /// Every source is loaded once up front.
    pub fn start(self: &Arc<Self>, mut session: watch::Receiver<WalletSession>) {
        let mut tasks = match self.tasks.lock() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !tasks.is_empty() {
            warn!("Aggregator already started");
            return;
        }

        for id in SourceId::ALL {
            let aggregator = self.clone();
            if !self.cadence(id).polls() {
                tasks.push(tokio::spawn(async move { aggregator.refresh(id).await }));
                continue;
            }

            let period = self.config.interval_for(id.name());
            debug!("Polling {} every {:?}", id, period);
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    aggregator.refresh(id).await;
                }
            }));
        }

        let aggregator = self.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                let query = {
                    let s = session.borrow_and_update();
                    QueryContext {
                        chain: s.chain(),
                        account: s.account().cloned(),
                    }
                };
                aggregator.reset(query).await;
                if session.changed().await.is_err() {
                    break;
                }
            }
        }));
        info!("Data aggregator started with {} sources", SourceId::COUNT);
    }

    pub fn stop(&self) {
        let mut tasks = match self.tasks.lock() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        };
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

impl AggregatedContext {
    fn copy_slot(&mut self, from: &AggregatedContext, id: SourceId) {
        match id {
            SourceId::Vaults => self.vaults = from.vaults.clone(),
            SourceId::V2Vaults => self.v2_vaults = from.v2_vaults.clone(),
            SourceId::AssetBalances => self.asset_balances = from.asset_balances.clone(),
            SourceId::LiquidityMining => self.liquidity_mining = from.liquidity_mining.clone(),
            SourceId::LiquidityGauge => self.liquidity_gauge = from.liquidity_gauge.clone(),
            SourceId::Oracle => self.oracle = from.oracle.clone(),
            SourceId::Treasury => self.treasury = from.treasury.clone(),
        }
    }
}
