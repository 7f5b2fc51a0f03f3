//! Connected-wallet session: the state the UI layer reads and the actions it triggers.
//!
//! This module provides:
//! - `Session`: connect, wallet refresh, ledger sync, the three transaction actions
//! - `Scheduler`: the periodic wallet-refresh and ledger-sync tasks
//! - `StatusBoard`: the single wait message and error message
//! - `Overview`: rows for the subscription list
//!
//! All shared state is replaced as a whole (`Arc` snapshots behind one lock), so a
//! reader never observes a half-applied sync.

pub mod clock;
pub mod overview;
pub mod scheduler;
pub mod status;

pub use clock::{Clock, ManualClock, SystemClock};
pub use overview::{Overview, OverviewRow};
pub use scheduler::Scheduler;
pub use status::{Status, StatusBoard, WaitGuard};

use crate::codec::DatumKey;
use crate::config::Config;
use crate::contract::SubscriptionContract;
use crate::domain::{format_ada, Address, NetworkId, Subscription, TimeMs};
use crate::engine::{group_utxos, reconcile};
use crate::error::{BuildError, SessionError};
use crate::form::{check_can_open, FormContext, SubscriptionForm};
use crate::ledger::{LedgerClient, ScriptCompiler, Wallet, WalletState};
use crate::tx::{
    cancel_subscription, open_subscription, withdraw, BalancingFinalizer, OpenRequest, Stage,
    Submitted, TxContext, TxFinalizer,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const UNRESPONSIVE: &str = "DApp connector unresponsive, disconnected";
const ADDRESS_SWITCH: &str = "sudden base address switch, disconnected";

/// External collaborators of a session.
#[derive(Debug, Clone)]
pub struct SessionDeps {
    pub ledger: Arc<dyn LedgerClient>,
    pub wallet: Arc<dyn Wallet>,
    pub compiler: Arc<dyn ScriptCompiler>,
    pub finalizer: Arc<dyn TxFinalizer>,
    pub clock: Arc<dyn Clock>,
}

impl SessionDeps {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        wallet: Arc<dyn Wallet>,
        compiler: Arc<dyn ScriptCompiler>,
    ) -> Self {
        Self {
            ledger,
            wallet,
            compiler,
            finalizer: Arc::new(BalancingFinalizer),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_finalizer(mut self, finalizer: Arc<dyn TxFinalizer>) -> Self {
        self.finalizer = finalizer;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[derive(Debug, Clone)]
struct Views {
    wallet: Arc<WalletState>,
    snapshot: Arc<Vec<Subscription>>,
    pending: Arc<Vec<Subscription>>,
}

/// Result of one ledger sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced {
        subscriptions: usize,
        pending: usize,
        confirmed: usize,
        settled: usize,
    },
    /// Another sync was running, or a manual sync was not allowed.
    Skipped,
}

enum Action {
    Open(OpenRequest),
    Cancel(Subscription),
    Withdraw(Subscription),
}

struct SyncGuard<'a>(&'a AtomicBool);

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncGuard(flag))
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct Session {
    config: Config,
    deps: SessionDeps,
    contract: SubscriptionContract,
    base_address: Address,
    /// `None` once disconnected.
    views: RwLock<Option<Views>>,
    syncing: AtomicBool,
    status: StatusBoard,
    pending_changed: Notify,
    shutdown: CancellationToken,
}

impl Session {
    /// Check the wallet is on the configured network, load the validator and run
    /// the first ledger sync.
    pub async fn connect(config: Config, deps: SessionDeps) -> Result<Arc<Self>, SessionError> {
        let network = config.network;
        let wrong_network =
            || SessionError::Connect(format!("wallet not connected to {}", network.label()));

        if deps.wallet.network_id().await? != network.id() {
            return Err(wrong_network());
        }

        let wallet = deps.wallet.state().await?;
        let reference = wallet
            .reference_utxo()
            .ok_or_else(|| SessionError::Connect("empty wallet, can't connect".to_string()))?;
        // preview and preprod share a network id; only the ledger can tell them apart
        if !deps.ledger.has_utxo(&reference.out_ref).await? {
            return Err(wrong_network());
        }

        let contract = SubscriptionContract::load(deps.compiler.as_ref(), network).await?;
        let base_address = wallet.base_address().clone();
        info!("Connected {} on {}", base_address, network.label());

        let session = Arc::new(Self {
            config,
            deps,
            contract,
            base_address,
            views: RwLock::new(Some(Views {
                wallet: Arc::new(wallet),
                snapshot: Arc::new(Vec::new()),
                pending: Arc::new(Vec::new()),
            })),
            syncing: AtomicBool::new(false),
            status: StatusBoard::default(),
            pending_changed: Notify::new(),
            shutdown: CancellationToken::new(),
        });
        session.sync_ledger().await?;
        Ok(session)
    }

    /// Drop all derived state and stop the periodic tasks.
    pub fn disconnect(&self, reason: &str) -> SessionError {
        if self.views.write().take().is_some() {
            warn!("Session disconnected: {}", reason);
        }
        self.shutdown.cancel();
        self.status.set_error(reason);
        SessionError::Disconnected(reason.to_string())
    }

    pub fn is_connected(&self) -> bool {
        self.views.read().is_some()
    }

    /// Re-read the wallet. An unresponsive connector or a different account ends
    /// the session.
    pub async fn refresh_wallet(&self) -> Result<(), SessionError> {
        if !self.is_connected() {
            return Err(SessionError::Disconnected("wallet not connected".to_string()));
        }
        if let Err(e) = self.deps.wallet.network_id().await {
            debug!("Network id probe failed: {}", e);
            return Err(self.disconnect(UNRESPONSIVE));
        }

        let state = self.deps.wallet.state().await?;
        if state.base_address() != &self.base_address {
            return Err(self.disconnect(ADDRESS_SWITCH));
        }

        let mut views = self.views.write();
        let views = views
            .as_mut()
            .ok_or_else(|| SessionError::Disconnected("wallet not connected".to_string()))?;
        debug!("Wallet holds {} outputs", state.utxos.len());
        views.wallet = Arc::new(state);
        Ok(())
    }

    /// Fetch the script address, regroup and reconcile the pending set.
    ///
    /// A sync already in flight makes this a no-op.
    pub async fn sync_ledger(&self) -> Result<SyncOutcome, SessionError> {
        let Some(_guard) = SyncGuard::acquire(&self.syncing) else {
            debug!("Ledger sync already running, skipped");
            return Ok(SyncOutcome::Skipped);
        };

        let utxos = self.deps.ledger.utxos_at(&self.contract.address).await?;
        let snapshot = group_utxos(&utxos);

        let mut views = self.views.write();
        let views = views
            .as_mut()
            .ok_or_else(|| SessionError::Disconnected("wallet not connected".to_string()))?;
        let next = reconcile(&views.pending, &snapshot);
        let outcome = SyncOutcome::Synced {
            subscriptions: snapshot.len(),
            pending: next.pending.len(),
            confirmed: next.confirmed,
            settled: next.settled,
        };
        if next.confirmed + next.settled > 0 {
            info!(
                "Ledger sync: {} confirmed, {} settled, {} still pending",
                next.confirmed,
                next.settled,
                next.pending.len()
            );
        }
        debug!(
            "Grouped {} outputs into {} subscriptions",
            utxos.len(),
            snapshot.len()
        );
        views.snapshot = Arc::new(snapshot);
        views.pending = Arc::new(next.pending);
        Ok(outcome)
    }

    /// True when the user may trigger a sync: nothing pending and none running.
    pub fn can_sync(&self) -> bool {
        self.is_connected() && !self.syncing.load(Ordering::Acquire) && self.pending_len() == 0
    }

    pub async fn manual_sync(&self) -> Result<SyncOutcome, SessionError> {
        if !self.can_sync() {
            return Ok(SyncOutcome::Skipped);
        }
        let result = self.sync_ledger().await;
        if let Err(e) = &result {
            self.status.set_error(&e.to_string());
        }
        result
    }

    /// Blank form with defaults; refused for a wallet without Ada.
    pub fn new_form(&self) -> Result<SubscriptionForm, BuildError> {
        let wallet = self.wallet_state().ok_or(BuildError::NotConnected)?;
        if let Err(message) = check_can_open(&wallet.balance()) {
            self.status.set_error(message);
            return Err(BuildError::precondition(message));
        }
        Ok(SubscriptionForm::with_defaults(self.now()))
    }

    pub fn form_context(&self) -> Result<FormContext, BuildError> {
        let wallet = self.wallet_state().ok_or(BuildError::NotConnected)?;
        Ok(FormContext {
            network: self.config.network,
            balance_lovelace: wallet.balance().lovelace,
            now: self.now(),
        })
    }

    pub async fn open_subscription(
        &self,
        form: &SubscriptionForm,
    ) -> Result<Submitted, BuildError> {
        let request = self
            .form_context()
            .and_then(|ctx| form.to_request(&ctx).map_err(BuildError::from));
        match request {
            Ok(request) => self.execute(Action::Open(request)).await,
            Err(e) => {
                self.report(&e);
                Err(e)
            }
        }
    }

    pub async fn cancel(&self, key: &DatumKey) -> Result<Submitted, BuildError> {
        match self.lookup(key) {
            Ok(sub) => self.execute(Action::Cancel(sub)).await,
            Err(e) => {
                self.report(&e);
                Err(e)
            }
        }
    }

    pub async fn withdraw(&self, key: &DatumKey) -> Result<Submitted, BuildError> {
        match self.lookup(key) {
            Ok(sub) => self.execute(Action::Withdraw(sub)).await,
            Err(e) => {
                self.report(&e);
                Err(e)
            }
        }
    }

    fn lookup(&self, key: &DatumKey) -> Result<Subscription, BuildError> {
        let views = self.views.read();
        let views = views.as_ref().ok_or(BuildError::NotConnected)?;
        if views.pending.iter().any(|p| p.key() == key) {
            return Err(BuildError::precondition(
                "a transaction for this subscription is still pending",
            ));
        }
        views
            .snapshot
            .iter()
            .find(|s| s.key() == key)
            .cloned()
            .ok_or_else(|| BuildError::precondition("unknown subscription"))
    }

    async fn execute(&self, action: Action) -> Result<Submitted, BuildError> {
        let result = self.run(action).await;
        match &result {
            Ok(submitted) => self.push_pending(submitted.pending.clone()),
            Err(e) => self.report(e),
        }
        result
    }

    async fn run(&self, action: Action) -> Result<Submitted, BuildError> {
        if !self.is_connected() {
            return Err(BuildError::NotConnected);
        }
        let _wait = self
            .status
            .begin(Stage::Building.message())
            .ok_or(BuildError::Busy)?;
        let settle = self.config.build_settle();
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        let on_stage = |stage: Stage| self.status.set_wait(stage.message());
        let ctx = TxContext::new(
            self.deps.ledger.as_ref(),
            self.deps.wallet.as_ref(),
            self.deps.finalizer.as_ref(),
            &self.contract,
            self.config.fee_probe_lovelace,
        )
        .with_stage_listener(&on_stage);

        match action {
            Action::Open(request) => open_subscription(&ctx, &request).await,
            Action::Cancel(sub) => cancel_subscription(&ctx, &sub).await,
            Action::Withdraw(sub) => withdraw(&ctx, &sub, self.now()).await,
        }
    }

    fn push_pending(&self, entity: Subscription) {
        {
            let mut views = self.views.write();
            let Some(views) = views.as_mut() else {
                warn!("Submitted after disconnect, pending entity dropped");
                return;
            };
            let mut next = Vec::with_capacity(views.pending.len() + 1);
            next.extend(views.pending.iter().cloned());
            next.push(entity);
            views.pending = Arc::new(next);
        }
        self.pending_changed.notify_one();
    }

    fn report(&self, error: &BuildError) {
        if matches!(error, BuildError::Busy) {
            debug!("Action refused: another action is in progress");
            return;
        }
        warn!("Action failed: {}", error);
        self.status.set_error(&error.to_string());
    }

    pub fn overview(&self) -> Option<Overview> {
        let views = self.views.read().as_ref()?.clone();
        let can_sync = self.can_sync();
        Some(Overview {
            address: self.base_address.clone(),
            balance: format!("{} ADA", format_ada(views.wallet.balance().lovelace)),
            rows: overview::rows(
                views.wallet.owner(),
                &views.pending,
                &views.snapshot,
                self.network_id(),
                self.now(),
            ),
            can_sync,
            status: self.status.snapshot(),
        })
    }

    pub fn snapshot(&self) -> Arc<Vec<Subscription>> {
        self.views
            .read()
            .as_ref()
            .map(|v| v.snapshot.clone())
            .unwrap_or_default()
    }

    pub fn pending(&self) -> Arc<Vec<Subscription>> {
        self.views
            .read()
            .as_ref()
            .map(|v| v.pending.clone())
            .unwrap_or_default()
    }

    pub fn pending_len(&self) -> usize {
        self.views.read().as_ref().map_or(0, |v| v.pending.len())
    }

    pub fn wallet_state(&self) -> Option<Arc<WalletState>> {
        self.views.read().as_ref().map(|v| v.wallet.clone())
    }

    pub fn status(&self) -> Status {
        self.status.snapshot()
    }

    pub fn status_board(&self) -> &StatusBoard {
        &self.status
    }

    pub fn contract(&self) -> &SubscriptionContract {
        &self.contract
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn base_address(&self) -> &Address {
        &self.base_address
    }

    pub fn network_id(&self) -> NetworkId {
        self.config.network.id()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn now(&self) -> TimeMs {
        self.deps.clock.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let first = SyncGuard::acquire(&flag).unwrap();
        assert!(SyncGuard::acquire(&flag).is_none());
        drop(first);
        assert!(SyncGuard::acquire(&flag).is_some());
    }
}
