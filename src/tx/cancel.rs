//! Cancel: the customer takes every backing output back.

use super::flow::{Stage, Submitted, TxContext};
use super::Tx;
use crate::codec::SpendRedeemer;
use crate::contract::SubscriptionContract;
use crate::domain::{Lifecycle, Subscription, TxOutput, Utxo, Value};
use crate::error::BuildError;
use crate::ledger::WalletState;
use tracing::info;

/// Unbalanced cancel transaction plus the spare wallet outputs for fees.
///
/// Each backing output is returned to the change address with its exact value,
/// one output per spent output, in the order the inputs were added.
pub fn cancel_draft(
    subscription: &Subscription,
    wallet: &WalletState,
    contract: &SubscriptionContract,
    fee_probe: u64,
) -> Result<(Tx, Vec<Utxo>), BuildError> {
    let (fee_inputs, spare) = wallet
        .pick_utxos(&Value::lovelace(fee_probe))
        .map_err(|e| BuildError::precondition(format!("not enough Ada for fees: {}", e)))?;
    let collateral = wallet
        .pick_collateral(fee_probe)
        .ok_or_else(|| BuildError::precondition("no output usable as collateral"))?;

    let mut tx = Tx::new();
    tx.add_inputs(fee_inputs);
    for utxo in subscription.outputs() {
        tx.add_script_input(utxo.clone(), SpendRedeemer::Cancel);
    }
    for utxo in subscription.outputs() {
        tx.add_output(TxOutput::new(
            wallet.change_address.clone(),
            utxo.value().clone(),
        ));
    }
    tx.add_collateral(collateral)
        .add_signer(subscription.customer())
        .attach_script(contract.validator.clone());

    Ok((tx, spare))
}

/// Build, sign and submit a cancel. Only the customer may cancel an `Active`
/// subscription; the pending entity is the same subscription marked `Closing`.
pub async fn cancel_subscription(
    ctx: &TxContext<'_>,
    subscription: &Subscription,
) -> Result<Submitted, BuildError> {
    if subscription.lifecycle() != Lifecycle::Active {
        return Err(BuildError::precondition("subscription is not active"));
    }

    ctx.stage(Stage::Building);
    let wallet = ctx.wallet.state().await?;
    if wallet.owner() != Some(subscription.customer()) {
        return Err(BuildError::precondition("only the customer can cancel"));
    }

    let params = ctx.ledger.params().await?;
    let (draft, spare) = cancel_draft(subscription, &wallet, ctx.contract, ctx.fee_probe)?;
    let (tx, tx_id) = ctx
        .sign_and_submit(draft, &params, &wallet.change_address, &spare)
        .await?;

    info!(
        "Cancelled subscription, returning {} in {} outputs",
        subscription.available(),
        subscription.outputs().len()
    );
    Ok(Submitted {
        tx,
        tx_id,
        pending: subscription.closing(),
    })
}
