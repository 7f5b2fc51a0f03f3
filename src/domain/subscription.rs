//! Subscription entity: one datum plus the outputs currently carrying it.

use crate::codec::{DatumKey, SubscriptionDatum};
use crate::domain::{Address, NetworkId, PubKeyHash, TimeMs, Utxo, Value};
use serde::{Deserialize, Serialize};

/// Locally tracked phase of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// Submitted, not yet visible on the ledger.
    Opening,
    /// Visible on the ledger.
    Active,
    /// A cancel or withdraw spending it was submitted.
    Closing,
}

impl Lifecycle {
    /// Numeric state index shown to the UI layer.
    pub fn index(&self) -> u8 {
        match self {
            Lifecycle::Opening => 0,
            Lifecycle::Active => 1,
            Lifecycle::Closing => 2,
        }
    }
}

/// Immutable value; lifecycle transitions produce a new `Subscription`.
///
/// Equality is datum equality: two entities are the same subscription iff their
/// canonical datum encodings are identical, regardless of lifecycle or outputs.
#[derive(Debug, Clone)]
pub struct Subscription {
    datum: SubscriptionDatum,
    key: DatumKey,
    outputs: Vec<Utxo>,
    lifecycle: Lifecycle,
}

impl Subscription {
    fn new(datum: SubscriptionDatum, outputs: Vec<Utxo>, lifecycle: Lifecycle) -> Self {
        let key = datum.key();
        Self {
            datum,
            key,
            outputs,
            lifecycle,
        }
    }

    /// Entity observed on the ledger.
    pub fn active(datum: SubscriptionDatum, outputs: Vec<Utxo>) -> Self {
        Self::new(datum, outputs, Lifecycle::Active)
    }

    /// Entity for a freshly submitted open transaction.
    pub fn opening(datum: SubscriptionDatum, output: Utxo) -> Self {
        Self::new(datum, vec![output], Lifecycle::Opening)
    }

    /// Same subscription, marked as being spent.
    pub fn closing(&self) -> Self {
        Self {
            lifecycle: Lifecycle::Closing,
            ..self.clone()
        }
    }

    pub fn datum(&self) -> &SubscriptionDatum {
        &self.datum
    }

    pub fn key(&self) -> &DatumKey {
        &self.key
    }

    pub fn outputs(&self) -> &[Utxo] {
        &self.outputs
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn customer(&self) -> PubKeyHash {
        self.datum.customer
    }

    pub fn vendor(&self) -> PubKeyHash {
        self.datum.vendor
    }

    /// Funds committed in the datum; authoritative for successor transactions.
    pub fn funds(&self) -> &Value {
        &self.datum.funds
    }

    pub fn price(&self) -> &Value {
        &self.datum.price
    }

    pub fn interval_ms(&self) -> i64 {
        self.datum.interval_ms
    }

    pub fn next_withdrawal(&self) -> TimeMs {
        self.datum.next_withdrawal
    }

    /// Sum of the backing outputs, for display.
    pub fn available(&self) -> Value {
        Utxo::sum_value(&self.outputs)
    }

    pub fn can_withdraw(&self, now: TimeMs) -> bool {
        now >= self.datum.next_withdrawal
    }

    /// Customer address without a staking part.
    pub fn customer_address(&self, network: NetworkId) -> Address {
        Address::from_pub_key_hash(network, self.datum.customer)
    }

    pub fn vendor_address(&self, network: NetworkId) -> Address {
        Address::from_pub_key_hash(network, self.datum.vendor)
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Subscription {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OutputRef, TxId, TxOutput};

    fn datum(funds_ada: u64) -> SubscriptionDatum {
        SubscriptionDatum::new(
            PubKeyHash::new([1; 28]),
            PubKeyHash::new([2; 28]),
            Value::ada(funds_ada),
            Value::ada(1),
            86_400_000,
            TimeMs::new(1_000),
        )
        .unwrap()
    }

    fn utxo(index: u32, ada: u64) -> Utxo {
        Utxo::new(
            OutputRef::new(TxId::new([9; 32]), index),
            TxOutput::new(
                Address::from_pub_key_hash(NetworkId::Testnet, PubKeyHash::new([0; 28])),
                Value::ada(ada),
            ),
        )
    }

    #[test]
    fn test_equality_ignores_lifecycle_and_outputs() {
        let active = Subscription::active(datum(10), vec![utxo(0, 6), utxo(1, 4)]);
        let opening = Subscription::opening(datum(10), utxo(7, 10));
        assert_eq!(active, opening);
        assert_ne!(active, Subscription::active(datum(9), vec![]));
    }

    #[test]
    fn test_closing_produces_new_value() {
        let active = Subscription::active(datum(10), vec![utxo(0, 10)]);
        let closing = active.closing();
        assert_eq!(active.lifecycle(), Lifecycle::Active);
        assert_eq!(closing.lifecycle(), Lifecycle::Closing);
        assert_eq!(closing.lifecycle().index(), 2);
        assert_eq!(closing.outputs(), active.outputs());
    }

    #[test]
    fn test_available_sums_outputs() {
        let sub = Subscription::active(datum(5), vec![utxo(0, 3), utxo(1, 2)]);
        assert_eq!(sub.available(), Value::ada(5));
    }

    #[test]
    fn test_can_withdraw_after_next_withdrawal() {
        let sub = Subscription::active(datum(5), vec![]);
        assert!(!sub.can_withdraw(TimeMs::new(999)));
        assert!(sub.can_withdraw(TimeMs::new(1_000)));
    }
}
