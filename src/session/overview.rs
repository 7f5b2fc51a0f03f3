//! Rows shown in the subscription list.

use super::status::Status;
use crate::domain::{Address, Lifecycle, NetworkId, PubKeyHash, Subscription, TimeMs};
use crate::form::{format_date, MS_PER_DAY};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverviewRow {
    /// Hex of the canonical datum bytes.
    pub id: String,
    pub state: Lifecycle,
    pub state_index: u8,
    pub customer: Address,
    pub vendor: Address,
    /// Everything locked under the datum, native tokens included.
    pub available: String,
    pub price: String,
    pub interval_days: Decimal,
    pub next_withdrawal: String,
    pub can_cancel: bool,
    pub can_withdraw: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub address: Address,
    pub balance: String,
    pub rows: Vec<OverviewRow>,
    pub can_sync: bool,
    pub status: Status,
}

fn row(sub: &Subscription, owner: Option<PubKeyHash>, network: NetworkId, now: TimeMs) -> OverviewRow {
    let active = sub.lifecycle() == Lifecycle::Active;
    let is_customer = owner == Some(sub.customer());
    let is_vendor = owner == Some(sub.vendor());
    OverviewRow {
        id: sub.key().to_hex(),
        state: sub.lifecycle(),
        state_index: sub.lifecycle().index(),
        customer: sub.customer_address(network),
        vendor: sub.vendor_address(network),
        available: sub.available().to_string(),
        price: sub.price().to_string(),
        interval_days: (Decimal::from(sub.interval_ms()) / Decimal::from(MS_PER_DAY)).normalize(),
        next_withdrawal: format_date(sub.next_withdrawal()),
        can_cancel: is_customer && active,
        can_withdraw: is_vendor && active && sub.can_withdraw(now),
    }
}

/// Pending entities first, then ledger subscriptions the owner takes part in that
/// are not already shown as pending.
pub fn rows(
    owner: Option<PubKeyHash>,
    pending: &[Subscription],
    snapshot: &[Subscription],
    network: NetworkId,
    now: TimeMs,
) -> Vec<OverviewRow> {
    let pending_keys: HashSet<_> = pending.iter().map(|s| s.key()).collect();
    let involved = |s: &Subscription| owner == Some(s.customer()) || owner == Some(s.vendor());

    pending
        .iter()
        .chain(
            snapshot
                .iter()
                .filter(|s| involved(s) && !pending_keys.contains(s.key())),
        )
        .map(|s| row(s, owner, network, now))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SubscriptionDatum;
    use crate::domain::{
        Assets, MintingPolicyHash, OutputRef, TokenName, TxId, TxOutput, Utxo, ValidatorHash,
        Value,
    };

    const ME: PubKeyHash = PubKeyHash([1; 28]);
    const OTHER: PubKeyHash = PubKeyHash([2; 28]);
    const STRANGER: PubKeyHash = PubKeyHash([3; 28]);

    fn sub(customer: PubKeyHash, vendor: PubKeyHash, next: i64) -> Subscription {
        let datum = SubscriptionDatum::new(
            customer,
            vendor,
            Value::ada(5),
            Value::ada(1),
            MS_PER_DAY * 3 / 2,
            TimeMs::new(next),
        )
        .unwrap();
        Subscription::active(datum, vec![])
    }

    #[test]
    fn test_rows_filter_and_order() {
        let mine = sub(ME, OTHER, 0);
        let theirs = sub(OTHER, STRANGER, 0);
        let closing = sub(ME, OTHER, 5).closing();
        let still_listed = sub(ME, OTHER, 5);

        let out = rows(
            Some(ME),
            &[closing.clone()],
            &[mine.clone(), theirs, still_listed],
            NetworkId::Testnet,
            TimeMs::new(10),
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, closing.key().to_hex());
        assert_eq!(out[0].state_index, 2);
        assert!(!out[0].can_cancel);
        assert_eq!(out[1].id, mine.key().to_hex());
        assert!(out[1].can_cancel);
        assert!(!out[1].can_withdraw);
        assert_eq!(out[1].interval_days, Decimal::new(15, 1));
    }

    #[test]
    fn test_vendor_can_withdraw_once_due() {
        let s = sub(OTHER, ME, 100);
        let early = rows(Some(ME), &[], &[s.clone()], NetworkId::Testnet, TimeMs::new(99));
        let due = rows(Some(ME), &[], &[s], NetworkId::Testnet, TimeMs::new(100));
        assert!(!early[0].can_withdraw);
        assert!(due[0].can_withdraw);
        assert!(!due[0].can_cancel);
    }

    #[test]
    fn test_tokens_held_at_datum_are_listed() {
        let plain = sub(ME, OTHER, 0);
        let script = Address::from_validator_hash(NetworkId::Testnet, ValidatorHash::new([9; 28]));
        let tokens =
            Assets::new().with(MintingPolicyHash::new([4; 28]), TokenName::new(*b"coin"), 7);
        let output = TxOutput::with_inline_datum(
            script,
            Value::new(5_500_000, tokens),
            plain.datum().to_data(),
        );
        let held = Subscription::active(
            plain.datum().clone(),
            vec![Utxo::new(OutputRef::new(TxId::new([5; 32]), 0), output)],
        );

        let out = rows(Some(ME), &[], &[held], NetworkId::Testnet, TimeMs::new(0));
        assert_eq!(
            out[0].available,
            format!("5.5 ADA + 7 {}.{}", "04".repeat(28), hex::encode("coin"))
        );
        assert_eq!(out[0].price, "1 ADA");
    }
}
