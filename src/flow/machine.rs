//! One action flow: Form -> Preview -> WalletAction -> Processing -> Settled

use super::action::{ActionKind, ActionParams};
use super::amount::{format_amount, parse_amount};
use crate::data::AggregatedContext;
use crate::error::{ClientError, ClientResult, ValidationError};
use crate::tx::{PendingTransaction, PendingTransactionRegistry, TxHash, TxStatus};
use crate::wallet::{TxRequest, WalletConnectionManager};

use ethers::types::U256;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowStep {
    Form,
    Preview,
    WalletAction,
    Processing { hash: TxHash },
    Settled { hash: TxHash },
}

/// What a consumer renders
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSnapshot {
    pub step: FlowStep,
    pub input: String,
    /// Parsed input, if it parses
    pub amount: Option<U256>,
    /// Current validation overlay; independent of the step
    pub validation: Option<ValidationError>,
    /// Status name of the last failed submission or settlement
    pub last_error: Option<&'static str>,
}

impl FlowSnapshot {
    fn initial() -> Self {
        Self {
            step: FlowStep::Form,
            input: String::new(),
            amount: None,
            validation: None,
            last_error: None,
        }
    }
}

pub struct TransactionActionFlow {
    id: Uuid,
    kind: ActionKind,
    params: ActionParams,
    wallet: Arc<WalletConnectionManager>,
    registry: Arc<PendingTransactionRegistry>,
    data: watch::Receiver<Arc<AggregatedContext>>,
    state: watch::Sender<FlowSnapshot>,
}

impl TransactionActionFlow {
    pub fn new(
        kind: ActionKind,
        params: ActionParams,
        wallet: Arc<WalletConnectionManager>,
        registry: Arc<PendingTransactionRegistry>,
        data: watch::Receiver<Arc<AggregatedContext>>,
    ) -> ClientResult<Self> {
        kind.check_subject(&params.subject)?;
        let (state, _) = watch::channel(FlowSnapshot::initial());
        Ok(Self {
            id: Uuid::new_v4(),
            kind,
            params,
            wallet,
            registry,
            data,
            state,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FlowSnapshot> {
        self.state.subscribe()
    }

    pub fn step(&self) -> FlowStep {
        self.state.borrow().step.clone()
    }

    /// Replace the amount input. Negative input is cleared.
    pub fn set_input(&self, input: &str) -> ClientResult<()> {
        self.require_step(&FlowStep::Form)?;
        let input = if input.trim_start().starts_with('-') { "" } else { input };
        let (amount, validation) = self.evaluate(input);

        self.state.send_modify(|s| {
            s.input = input.to_string();
            s.amount = amount;
            s.validation = validation;
        });
        Ok(())
    }

    /// Fill the input with everything available
    pub fn set_max(&self) -> ClientResult<()> {
        self.require_step(&FlowStep::Form)?;
        let ctx = self.data.borrow().clone();
        match self.kind.available(&ctx, &self.params.subject) {
            Ok(max) => self.set_input(&format_amount(max, self.params.decimals)),
            Err(e) => {
                self.state.send_modify(|s| s.validation = Some(e));
                Ok(())
            }
        }
    }

    /// Re-run validation against the latest data snapshot
    pub fn revalidate(&self) -> Option<ValidationError> {
        let input = self.state.borrow().input.clone();
        let (amount, validation) = self.evaluate(&input);
        self.state.send_modify(|s| {
            s.amount = amount;
            s.validation = validation.clone();
        });
        validation
    }

    fn evaluate(&self, input: &str) -> (Option<U256>, Option<ValidationError>) {
        if input.trim().is_empty() {
            return (None, None);
        }
        let amount = match parse_amount(input, self.params.decimals) {
            Ok(amount) => amount,
            Err(e) => return (None, Some(e)),
        };

        let ctx = self.data.borrow().clone();
        match self.kind.validate(&ctx, &self.params.subject, amount) {
            Ok(()) => (Some(amount), None),
            Err(e) => (Some(amount), Some(e)),
        }
    }

    /// Form -> Preview, if the amount is valid and positive
    pub fn preview(&self) -> ClientResult<()> {
        self.require_step(&FlowStep::Form)?;
        if let Some(e) = self.revalidate() {
            return Err(e.into());
        }
        if self.state.borrow().amount.is_none() {
            return Err(ValidationError::ZeroAmount.into());
        }

        self.transition(&FlowStep::Form, FlowStep::Preview)
    }

    /// Preview -> Form, input kept
    pub fn back(&self) -> ClientResult<()> {
        self.transition(&FlowStep::Preview, FlowStep::Form)
    }

    /// Preview -> WalletAction -> Processing.
    ///
    /// A rejection or provider error returns to Preview with the input kept.
    /// Data that changed since the preview sends the flow back to Form.
    pub async fn confirm(self: &Arc<Self>) -> ClientResult<TxHash> {
        self.require_step(&FlowStep::Preview)?;

        if let Some(e) = self.revalidate() {
            info!("Flow {} input no longer valid: {}", self.id, e);
            self.transition(&FlowStep::Preview, FlowStep::Form)?;
            return Err(e.into());
        }
        let amount = self.state.borrow().amount.unwrap_or_default();

        let session = self.wallet.session();
        let Some(account) = session.account().cloned() else {
            self.state.send_modify(|s| {
                s.last_error = Some(ClientError::NoWalletConnected.kind());
            });
            return Err(ClientError::NoWalletConnected);
        };

        self.transition(&FlowStep::Preview, FlowStep::WalletAction)?;
        let request = TxRequest {
            kind: self.kind.transaction_kind(),
            chain: session.chain(),
            from: account.clone(),
            subject: self.params.subject.clone(),
            amount,
        };

        let hash = match self.wallet.sign_and_send(&request).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!("Flow {} submission failed: {}", self.id, e);
                self.state.send_if_modified(|s| {
                    if s.step != FlowStep::WalletAction {
                        return false;
                    }
                    s.step = FlowStep::Preview;
                    s.last_error = Some(e.kind());
                    true
                });
                return Err(e);
            }
        };

        let tx = PendingTransaction::new(
            hash.clone(),
            request.kind,
            amount,
            request.subject,
            account,
            request.chain,
        );
        if let Err(e) = self.registry.add(tx).await {
            warn!("Failed to register {}: {}", hash, e);
        }
        crate::metrics::record_flow_submitted(self.kind);
        info!("Flow {} submitted {} as {}", self.id, self.kind, hash);

        // The registry owns the hash from here on, whatever the flow did meanwhile
        let moved = self.state.send_if_modified(|s| {
            if s.step != FlowStep::WalletAction {
                return false;
            }
            s.step = FlowStep::Processing { hash: hash.clone() };
            s.last_error = None;
            true
        });
        if moved {
            self.track(hash.clone());
        } else {
            warn!("Flow {} left the wallet step before {} was returned", self.id, hash);
        }
        Ok(hash)
    }

    /// Follow the registry until `hash` settles
    fn track(self: &Arc<Self>, hash: TxHash) {
        let flow = self.clone();
        tokio::spawn(async move {
            let status = match flow.registry.wait_for_terminal(&hash).await {
                Ok(status) => status,
                Err(e) => {
                    warn!("Stopped tracking {}: {}", hash, e);
                    return;
                }
            };

            flow.state.send_if_modified(|s| {
                if s.step != (FlowStep::Processing { hash: hash.clone() }) {
                    return false;
                }
                match status {
                    TxStatus::Success => s.step = FlowStep::Settled { hash: hash.clone() },
                    _ => {
                        s.step = FlowStep::Form;
                        s.last_error = Some(status.name());
                    }
                }
                true
            });
            debug!("Flow {} observed {} for {}", flow.id, status.name(), hash);
        });
    }

    /// Wait until the flow leaves Processing
    pub async fn wait_settled(&self) -> ClientResult<FlowSnapshot> {
        let mut rx = self.state.subscribe();
        let snapshot = rx
            .wait_for(|s| !matches!(s.step, FlowStep::Processing { .. }))
            .await
            .map_err(|_| ClientError::Internal("flow dropped".to_string()))?;
        Ok(snapshot.clone())
    }

    /// Dismiss the flow. WalletAction and Processing are left alone; the registry keeps tracking.
    pub fn close(&self) {
        self.state.send_if_modified(|s| {
            if matches!(s.step, FlowStep::WalletAction | FlowStep::Processing { .. }) {
                return false;
            }
            *s = FlowSnapshot::initial();
            true
        });
    }

    fn require_step(&self, step: &FlowStep) -> ClientResult<()> {
        let current = self.step();
        if &current == step {
            Ok(())
        } else {
            Err(ClientError::InvalidState(format!(
                "Flow is in {:?}, expected {:?}",
                current, step
            )))
        }
    }

    fn transition(&self, from: &FlowStep, to: FlowStep) -> ClientResult<()> {
        let mut moved = false;
        self.state.send_if_modified(|s| {
            if &s.step != from {
                return false;
            }
            s.step = to;
            moved = true;
            true
        });

        if moved {
            Ok(())
        } else {
            Err(ClientError::InvalidState(format!(
                "Flow left {:?} concurrently",
                from
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainId, ChainSessionManager, ConfirmationWatcher};
    use crate::data::{Asset, DataSourceState, V2VaultData, VaultId};
    use crate::state::MemoryStore;
    use crate::testing::{chain_configs, FakeChain, FakeWallet};
    use crate::tx::TxSubject;
    use crate::wallet::WalletProviderKind;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio::sync::broadcast;

    struct Harness {
        wallet: Arc<FakeWallet>,
        manager: Arc<WalletConnectionManager>,
        registry: Arc<PendingTransactionRegistry>,
        chain: Arc<FakeChain>,
        data: watch::Sender<Arc<AggregatedContext>>,
    }

    fn context(balance: u64) -> AggregatedContext {
        AggregatedContext {
            v2_vaults: DataSourceState::succeeded(
                BTreeMap::from([(
                    VaultId::new("T-USDC-P-ETH"),
                    V2VaultData {
                        asset: Asset::new("USDC"),
                        cap: U256::from(1_000_000),
                        ..V2VaultData::default()
                    },
                )]),
                false,
            ),
            asset_balances: DataSourceState::succeeded(
                BTreeMap::from([(Asset::new("USDC"), U256::from(balance))]),
                false,
            ),
            ..AggregatedContext::default()
        }
    }

    fn harness() -> Harness {
        let (events, _) = broadcast::channel(64);
        let wallet = Arc::new(FakeWallet::new());
        let store = Arc::new(MemoryStore::new());
        let chains = Arc::new(ChainSessionManager::from_chains(
            chain_configs(),
            ChainId::Network(1),
            wallet.clone(),
            events.clone(),
        ));
        let manager = Arc::new(WalletConnectionManager::new(
            wallet.clone(),
            chains,
            store.clone(),
            events.clone(),
            Duration::from_secs(1),
        ));
        let chain = Arc::new(FakeChain::at_block(100));
        let registry = Arc::new(PendingTransactionRegistry::new(store, events));
        registry.register_chain(
            ConfirmationWatcher::new(ChainId::Network(1), 2, chain.clone()).with_limits(
                Duration::from_millis(5),
                50,
                Duration::from_secs(5),
            ),
        );
        let (data, _) = watch::channel(Arc::new(context(100)));

        Harness {
            wallet,
            manager,
            registry,
            chain,
            data,
        }
    }

    fn deposit_flow(h: &Harness) -> Arc<TransactionActionFlow> {
        Arc::new(
            TransactionActionFlow::new(
                ActionKind::Deposit,
                ActionParams {
                    subject: TxSubject::Vault {
                        vault: VaultId::new("T-USDC-P-ETH"),
                    },
                    decimals: 0,
                },
                h.manager.clone(),
                h.registry.clone(),
                h.data.subscribe(),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_insufficient_balance_blocks_preview() {
        let h = harness();
        let flow = deposit_flow(&h);

        flow.set_input("150").unwrap();
        assert!(matches!(
            flow.snapshot().validation,
            Some(ValidationError::InsufficientBalance { .. })
        ));
        // Typing is never blocked
        flow.set_input("1500").unwrap();
        assert_eq!(flow.snapshot().input, "1500");

        let err = flow.preview().unwrap_err();
        assert_eq!(err.kind(), "insufficient_balance");
        assert_eq!(flow.step(), FlowStep::Form);
    }

    #[tokio::test]
    async fn test_balance_drop_after_preview_returns_to_form() {
        let h = harness();
        h.manager.connect(WalletProviderKind::Metamask).await.unwrap();
        let flow = deposit_flow(&h);
        flow.set_input("80").unwrap();
        flow.preview().unwrap();

        h.data.send_replace(Arc::new(context(50)));
        let err = flow.confirm().await.unwrap_err();
        assert_eq!(err.kind(), "insufficient_balance");
        assert_eq!(flow.step(), FlowStep::Form);
        assert_eq!(h.wallet.sent().len(), 0);
    }

    #[tokio::test]
    async fn test_wallet_rejection_returns_to_preview() {
        let h = harness();
        h.manager.connect(WalletProviderKind::Metamask).await.unwrap();
        h.wallet.fail_next_send(ClientError::UserRejected);
        let flow = deposit_flow(&h);
        flow.set_input("50").unwrap();
        flow.preview().unwrap();

        let err = flow.confirm().await.unwrap_err();
        assert!(matches!(err, ClientError::UserRejected));
        let snapshot = flow.snapshot();
        assert_eq!(snapshot.step, FlowStep::Preview);
        assert_eq!(snapshot.input, "50");
        assert_eq!(snapshot.last_error, Some("user_rejected"));
        assert!(h.registry.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_close_ignored_while_wallet_signs() {
        let h = harness();
        h.manager.connect(WalletProviderKind::Metamask).await.unwrap();
        let gate = h.wallet.hold_send();
        let flow = deposit_flow(&h);
        flow.set_input("50").unwrap();
        flow.preview().unwrap();

        let pending = tokio::spawn({
            let flow = flow.clone();
            async move { flow.confirm().await }
        });
        let mut rx = flow.subscribe();
        rx.wait_for(|s| s.step == FlowStep::WalletAction).await.unwrap();

        flow.close();
        let snapshot = flow.snapshot();
        assert_eq!(snapshot.step, FlowStep::WalletAction);
        assert_eq!(snapshot.input, "50");
        assert!(flow.set_input("10").is_err());

        gate.notify_one();
        let hash = pending.await.unwrap().unwrap();
        assert_eq!(flow.step(), FlowStep::Processing { hash: hash.clone() });
        assert_eq!(h.registry.get(&hash).unwrap().status, TxStatus::Pending);
    }

    #[tokio::test]
    async fn test_confirm_without_wallet_stays_in_preview() {
        let h = harness();
        let flow = deposit_flow(&h);
        flow.set_input("50").unwrap();
        flow.preview().unwrap();

        let err = flow.confirm().await.unwrap_err();
        assert!(matches!(err, ClientError::NoWalletConnected));
        assert_eq!(flow.step(), FlowStep::Preview);
    }

    #[tokio::test]
    async fn test_deposit_settles_and_close_clears_input() {
        let h = harness();
        h.manager.connect(WalletProviderKind::Metamask).await.unwrap();
        let hash = TxHash::new("0xabc");
        h.wallet.next_hash(hash.clone());
        let flow = deposit_flow(&h);

        flow.set_input("50").unwrap();
        flow.preview().unwrap();
        assert_eq!(flow.confirm().await.unwrap(), hash);
        assert_eq!(flow.step(), FlowStep::Processing { hash: hash.clone() });
        assert_eq!(h.registry.get(&hash).unwrap().status, TxStatus::Pending);
        assert_eq!(h.registry.get(&hash).unwrap().amount, U256::from(50));

        // Closing mid-processing changes nothing
        flow.close();
        assert_eq!(flow.step(), FlowStep::Processing { hash: hash.clone() });

        h.chain.mine(&hash, 101, true);
        h.chain.advance(2);
        let settled = flow.wait_settled().await.unwrap();
        assert_eq!(settled.step, FlowStep::Settled { hash: hash.clone() });
        assert_eq!(h.registry.get(&hash).unwrap().status, TxStatus::Success);

        flow.close();
        assert_eq!(flow.step(), FlowStep::Form);
        assert_eq!(flow.snapshot().input, "");
    }

    #[tokio::test]
    async fn test_revert_returns_to_form_with_error() {
        let h = harness();
        h.manager.connect(WalletProviderKind::Metamask).await.unwrap();
        let hash = TxHash::new("0xdead");
        h.wallet.next_hash(hash.clone());
        h.chain.mine(&hash, 100, false);
        let flow = deposit_flow(&h);

        flow.set_input("10").unwrap();
        flow.preview().unwrap();
        flow.confirm().await.unwrap();

        let snapshot = flow.wait_settled().await.unwrap();
        assert_eq!(snapshot.step, FlowStep::Form);
        assert_eq!(snapshot.last_error, Some("reverted"));
        assert_eq!(snapshot.input, "10");
    }

    #[tokio::test]
    async fn test_max_and_negative_input() {
        let h = harness();
        let flow = deposit_flow(&h);

        flow.set_input("-5").unwrap();
        assert_eq!(flow.snapshot().input, "");

        flow.set_max().unwrap();
        assert_eq!(flow.snapshot().input, "100");
        assert_eq!(flow.snapshot().validation, None);

        flow.preview().unwrap();
        flow.back().unwrap();
        assert_eq!(flow.step(), FlowStep::Form);
        assert_eq!(flow.snapshot().input, "100");
    }

    #[test]
    fn test_subject_checked_on_creation() {
        let h = harness();
        let result = TransactionActionFlow::new(
            ActionKind::Stake,
            ActionParams {
                subject: TxSubject::None,
                decimals: 18,
            },
            h.manager.clone(),
            h.registry.clone(),
            h.data.subscribe(),
        );
        assert!(result.is_err());
    }
}
