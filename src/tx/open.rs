//! Open: lock funds at the script address under a fresh datum.

use super::flow::{Stage, Submitted, TxContext};
use super::Tx;
use crate::codec::SubscriptionDatum;
use crate::domain::{Address, OutputRef, PubKeyHash, Subscription, TimeMs, TxOutput, Utxo, Value};
use crate::error::BuildError;
use crate::ledger::ProtocolParams;
use tracing::{debug, info};

/// Bound on re-evaluations of the minimum deposit.
const MAX_DEPOSIT_ROUNDS: usize = 4;

/// Validated parameters of a new subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub vendor: PubKeyHash,
    pub funds: Value,
    pub price: Value,
    pub interval_ms: i64,
    pub first_withdrawal: TimeMs,
}

/// Script output carrying a datum whose `funds` equals the locked value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositCorrection {
    pub output: TxOutput,
    pub datum: SubscriptionDatum,
    /// How many times `funds` had to be raised.
    pub rounds: usize,
}

/// Raise `funds` to the output's minimum deposit, re-embedding the datum each time.
///
/// The datum is the record of `funds`, so the locked value and the datum are
/// always changed together. A raise can widen the encoded amount and push the floor
/// up again, hence the loop.
pub fn correct_min_deposit(
    address: &Address,
    datum: SubscriptionDatum,
    params: &ProtocolParams,
) -> Result<DepositCorrection, BuildError> {
    let mut datum = datum;
    for rounds in 0..MAX_DEPOSIT_ROUNDS {
        let output =
            TxOutput::with_inline_datum(address.clone(), datum.funds.clone(), datum.to_data());
        let floor = params.min_lovelace(&output);
        if output.value.lovelace >= floor {
            return Ok(DepositCorrection {
                output,
                datum,
                rounds,
            });
        }
        debug!(
            "Funds {} below minimum deposit {}, raising",
            datum.funds.lovelace, floor
        );
        datum = datum.with_funds(datum.funds.with_lovelace(floor));
    }
    Err(BuildError::precondition(
        "minimum deposit correction did not converge",
    ))
}

/// Build, sign and submit an open transaction.
///
/// The customer is the wallet owner. On success the pending entity is `Opening`
/// and backed by the new script output.
pub async fn open_subscription(
    ctx: &TxContext<'_>,
    request: &OpenRequest,
) -> Result<Submitted, BuildError> {
    ctx.stage(Stage::Building);
    let wallet = ctx.wallet.state().await?;
    let customer = wallet
        .owner()
        .ok_or_else(|| BuildError::precondition("wallet address has no payment key"))?;

    let datum = SubscriptionDatum::new(
        customer,
        request.vendor,
        request.funds.clone(),
        request.price.clone(),
        request.interval_ms,
        request.first_withdrawal,
    )?;

    let params = ctx.ledger.params().await?;
    let corrected = correct_min_deposit(&ctx.contract.address, datum, &params)?;
    let (inputs, spare) = wallet
        .pick_utxos(&corrected.datum.funds)
        .map_err(|e| BuildError::precondition(format!("insufficient funds: {}", e)))?;
    debug!("Selected {} inputs, {} spare", inputs.len(), spare.len());

    let mut draft = Tx::new();
    draft.add_inputs(inputs).add_output(corrected.output.clone());

    let (tx, tx_id) = ctx
        .sign_and_submit(draft, &params, &wallet.change_address, &spare)
        .await?;

    info!(
        "Opened subscription locking {} for vendor {}",
        corrected.datum.funds, request.vendor
    );
    let created = Utxo::new(OutputRef::new(tx_id, 0), corrected.output);
    Ok(Submitted {
        tx,
        tx_id,
        pending: Subscription::opening(corrected.datum, created),
    })
}
