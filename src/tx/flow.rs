//! The finalize, sign, verify and submit steps shared by every builder.

use super::{Tx, TxFinalizer};
use crate::contract::SubscriptionContract;
use crate::domain::{Address, Subscription, TxId, Utxo};
use crate::error::BuildError;
use crate::ledger::{LedgerClient, ProtocolParams, ServiceError, Wallet};
use tracing::info;

/// Step of a transaction flow, announced to the status board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Building,
    Signing,
    Verifying,
    Submitting,
}

impl Stage {
    pub fn message(&self) -> &'static str {
        match self {
            Stage::Building => "Building transaction...",
            Stage::Signing => "Waiting for wallet signature...",
            Stage::Verifying => "Verifying signature...",
            Stage::Submitting => "Submitting transaction...",
        }
    }
}

/// Collaborators a builder needs for one flow.
#[derive(Clone, Copy)]
pub struct TxContext<'a> {
    pub ledger: &'a dyn LedgerClient,
    pub wallet: &'a dyn Wallet,
    pub finalizer: &'a dyn TxFinalizer,
    pub contract: &'a SubscriptionContract,
    /// Lovelace gathered for fees when no other wallet input is needed.
    pub fee_probe: u64,
    pub on_stage: Option<&'a (dyn Fn(Stage) + Send + Sync)>,
}

impl<'a> TxContext<'a> {
    pub fn new(
        ledger: &'a dyn LedgerClient,
        wallet: &'a dyn Wallet,
        finalizer: &'a dyn TxFinalizer,
        contract: &'a SubscriptionContract,
        fee_probe: u64,
    ) -> Self {
        Self {
            ledger,
            wallet,
            finalizer,
            contract,
            fee_probe,
            on_stage: None,
        }
    }

    pub fn with_stage_listener(mut self, listener: &'a (dyn Fn(Stage) + Send + Sync)) -> Self {
        self.on_stage = Some(listener);
        self
    }

    pub(crate) fn stage(&self, stage: Stage) {
        if let Some(listener) = self.on_stage {
            listener(stage);
        }
    }

    /// Finalize, collect signatures, check them and submit.
    ///
    /// The pending entity is only created by the caller after this returns `Ok`.
    pub(crate) async fn sign_and_submit(
        &self,
        draft: Tx,
        params: &ProtocolParams,
        change_address: &Address,
        spare: &[Utxo],
    ) -> Result<(Tx, TxId), BuildError> {
        let mut tx = self
            .finalizer
            .finalize(draft, params, change_address, spare)?;
        info!(
            "Built tx {}: {} inputs, {} outputs, fee {}",
            tx.id(),
            tx.inputs.len(),
            tx.outputs.len(),
            tx.fee
        );

        self.stage(Stage::Signing);
        let witnesses = self.wallet.sign(&tx).await?;

        self.stage(Stage::Verifying);
        tx.add_witnesses(witnesses);
        if let Some(missing) = tx.expected_signers().into_iter().find(|s| !tx.is_signed_by(s)) {
            return Err(ServiceError::Rejected(format!("missing signature from {}", missing)).into());
        }

        self.stage(Stage::Submitting);
        let id = self.ledger.submit(&tx).await?;
        info!("Submitted tx {}", id);
        Ok((tx, id))
    }
}

impl std::fmt::Debug for TxContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxContext")
            .field("contract", &self.contract.hash())
            .field("fee_probe", &self.fee_probe)
            .finish()
    }
}

/// Outcome of a successful submission.
#[derive(Debug, Clone)]
pub struct Submitted {
    pub tx: Tx,
    pub tx_id: TxId,
    /// Entity to add to the pending set.
    pub pending: Subscription,
}
