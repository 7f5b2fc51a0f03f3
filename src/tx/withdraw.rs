//! Withdraw: the vendor collects one price and re-locks the remainder.

use super::flow::{Stage, Submitted, TxContext};
use super::Tx;
use crate::codec::{SpendRedeemer, SubscriptionDatum};
use crate::contract::SubscriptionContract;
use crate::domain::{Lifecycle, Slot, Subscription, TimeMs, TxOutput, Utxo, Value};
use crate::error::BuildError;
use crate::ledger::WalletState;
use tracing::info;

fn not_due(subscription: &Subscription) -> BuildError {
    BuildError::precondition(format!(
        "next withdrawal not before {}",
        subscription.next_withdrawal()
    ))
}

/// Unbalanced withdraw transaction plus the spare wallet outputs for fees.
///
/// `successor` must be `subscription.datum().successor()`. No script output is
/// produced when it has nothing left to lock.
pub fn withdraw_draft(
    subscription: &Subscription,
    successor: &SubscriptionDatum,
    wallet: &WalletState,
    contract: &SubscriptionContract,
    fee_probe: u64,
    valid_from: Slot,
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
        tx.add_script_input(utxo.clone(), SpendRedeemer::Withdraw);
    }

    if !successor.funds.is_zero() {
        tx.add_output(TxOutput::with_inline_datum(
            contract.address.clone(),
            successor.funds.clone(),
            successor.to_data(),
        ));
    }
    tx.add_output(TxOutput::new(
        wallet.change_address.clone(),
        subscription.price().clone(),
    ));

    tx.add_collateral(collateral)
        .add_signer(subscription.vendor())
        .attach_script(contract.validator.clone())
        .valid_from(valid_from);

    Ok((tx, spare))
}

/// Build, sign and submit a withdrawal at time `now`.
///
/// Funds and due-time preconditions are checked before the wallet or ledger is
/// contacted.
pub async fn withdraw(
    ctx: &TxContext<'_>,
    subscription: &Subscription,
    now: TimeMs,
) -> Result<Submitted, BuildError> {
    let successor = subscription
        .datum()
        .successor()
        .map_err(|e| BuildError::precondition(e.to_string()))?;
    if !subscription.can_withdraw(now) {
        return Err(not_due(subscription));
    }
    if subscription.lifecycle() != Lifecycle::Active {
        return Err(BuildError::precondition("subscription is not active"));
    }

    ctx.stage(Stage::Building);
    let wallet = ctx.wallet.state().await?;
    if wallet.owner() != Some(subscription.vendor()) {
        return Err(BuildError::precondition("only the vendor can withdraw"));
    }

    let params = ctx.ledger.params().await?;
    let valid_from = params.time_to_slot(now);
    // the validator sees the slot start, not `now`
    if params.slot_to_time(valid_from) < subscription.next_withdrawal() {
        return Err(not_due(subscription));
    }

    let (draft, spare) = withdraw_draft(
        subscription,
        &successor,
        &wallet,
        ctx.contract,
        ctx.fee_probe,
        valid_from,
    )?;
    let (tx, tx_id) = ctx
        .sign_and_submit(draft, &params, &wallet.change_address, &spare)
        .await?;

    info!(
        "Withdrew {}, {} remains locked",
        subscription.price(),
        successor.funds
    );
    Ok(Submitted {
        tx,
        tx_id,
        pending: subscription.closing(),
    })
}
