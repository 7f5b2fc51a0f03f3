//! The subscription validator: its source, compiled handle and spend rules.

use crate::codec::SubscriptionDatum;
use crate::domain::{Address, Network, TimeMs, ValidatorHash, Value};
use crate::ledger::{ScriptCompiler, ServiceError, SlotConfig, Validator};
use crate::tx::Tx;
use thiserror::Error;
use tracing::info;

/// Validator source handed to the script compiler.
///
/// The script address is derived from the compiled text, so this must stay
/// byte-identical to the validator already deployed; whitespace included.
pub const VALIDATOR_SOURCE: &str = r#"
spending  basic_subscription

// TODO: check staking part as well (as soon as blockfrost fully supports mangled addresses)
struct Datum {
    customer:        PubKeyHash
    vendor:          PubKeyHash
    funds:           Value
    price:           Value              
    interval:        Duration
    next_withdrawal: Time

    func customer_signed(self, tx: Tx) -> Bool {
        tx.is_signed_by(self.customer)
    }

    func vendor_signed(self, tx: Tx) -> Bool {
        tx.is_signed_by(self.vendor)
    }

    func interval_passed(self, tx: Tx) -> Bool {
        tx.now() >= self.next_withdrawal
    }

    func next_datum(self, remaining_funds: Value) -> Datum {
        Datum{
            customer:        self.customer,
            vendor:          self.vendor,
            funds:           remaining_funds,
            price:           self.price,
            interval:        self.interval,
            next_withdrawal: self.next_withdrawal + self.interval
        }
    }

    func remaining_funds_locked_correctly(self, tx: Tx, contract_hash: ValidatorHash) -> Bool {
        remaining: Value = self.funds - self.price;

        tx.value_locked_by_datum(contract_hash, self.next_datum(remaining), true) >= remaining
    }
}

func main(datum: Datum, ctx: ScriptContext) -> Bool {
    tx: Tx = ctx.tx;

    // probably no need for double satisfaction protection due to high likelihood that datum is always unique

    datum.customer_signed(tx) || (
        contract_hash: ValidatorHash = ctx.get_current_validator_hash();

        datum.vendor_signed(tx) && 
        datum.interval_passed(tx) &&
        datum.remaining_funds_locked_correctly(tx, contract_hash)
    )
}"#;

/// Why a spend of a subscription output is not allowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpendViolation {
    #[error("neither customer nor vendor signed")]
    NotAuthorized,
    #[error("withdrawal requires a validity start")]
    NoValidityStart,
    #[error("withdrawal before {0}")]
    TooEarly(TimeMs),
    #[error("not enough funds locked in subscription")]
    Underflow,
    #[error("successor locks {locked}, expected at least {expected}")]
    RemainderNotLocked { locked: Value, expected: Value },
}

/// Compiled validator plus its address on the configured network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionContract {
    pub validator: Validator,
    pub address: Address,
}

impl SubscriptionContract {
    pub async fn load(
        compiler: &dyn ScriptCompiler,
        network: Network,
    ) -> Result<Self, ServiceError> {
        let validator = compiler.compile(VALIDATOR_SOURCE).await?;
        let address = validator.address(network.id());
        info!("Subscription validator {} at {}", validator.hash, address);
        Ok(Self { validator, address })
    }

    pub fn hash(&self) -> ValidatorHash {
        self.validator.hash
    }
}

/// Off-chain rendition of the validator for one spent output.
///
/// The customer may always spend. The vendor may spend once `next_withdrawal` has
/// passed, provided the successor datum locks at least `funds - price` at `own`.
pub fn check_spend(
    datum: &SubscriptionDatum,
    tx: &Tx,
    own: ValidatorHash,
    slots: &SlotConfig,
) -> Result<(), SpendViolation> {
    if tx.required_signers.contains(&datum.customer) {
        return Ok(());
    }
    if !tx.required_signers.contains(&datum.vendor) {
        return Err(SpendViolation::NotAuthorized);
    }

    let now = tx
        .valid_from
        .map(|slot| slots.slot_to_time(slot))
        .ok_or(SpendViolation::NoValidityStart)?;
    if now < datum.next_withdrawal {
        return Err(SpendViolation::TooEarly(datum.next_withdrawal));
    }

    let next = datum.successor().map_err(|_| SpendViolation::Underflow)?;
    let expected = next.to_data();
    let locked = Value::sum(
        tx.outputs
            .iter()
            .filter(|o| o.address.validator_hash() == Some(own))
            .filter(|o| o.inline_datum() == Some(&expected))
            .map(|o| &o.value),
    );

    if !locked.covers(&next.funds) {
        return Err(SpendViolation::RemainderNotLocked {
            locked,
            expected: next.funds,
        });
    }
    Ok(())
}
