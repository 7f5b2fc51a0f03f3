use crate::codec::DatumKey;
use crate::domain::{Lifecycle, Subscription};
use std::collections::HashSet;
use tracing::debug;

/// Result of merging the pending set with a fresh snapshot.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Entries still in flight.
    pub pending: Vec<Subscription>,
    /// `Opening` entries now visible on the ledger.
    pub confirmed: usize,
    /// `Closing` entries whose datum disappeared from the ledger.
    pub settled: usize,
}

/// Compute the next pending set.
///
/// - `Opening` is kept until an equal datum appears in the snapshot.
/// - `Closing` is kept while an equal datum is still in the snapshot.
/// - Anything else never belongs in the pending set and is dropped.
pub fn reconcile(pending: &[Subscription], snapshot: &[Subscription]) -> Reconciliation {
    let on_ledger: HashSet<&DatumKey> = snapshot.iter().map(|s| s.key()).collect();
    let mut out = Reconciliation::default();

    for entry in pending {
        let visible = on_ledger.contains(entry.key());
        match (entry.lifecycle(), visible) {
            (Lifecycle::Opening, false) | (Lifecycle::Closing, true) => {
                out.pending.push(entry.clone());
            }
            (Lifecycle::Opening, true) => {
                debug!("Open of {:?} confirmed", entry.key());
                out.confirmed += 1;
            }
            (Lifecycle::Closing, false) => {
                debug!("Spend of {:?} confirmed", entry.key());
                out.settled += 1;
            }
            (Lifecycle::Active, _) => {}
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SubscriptionDatum;
    use crate::domain::{
        Address, NetworkId, OutputRef, PubKeyHash, TimeMs, TxId, TxOutput, Utxo, Value,
    };

    fn sub(funds: u64) -> Subscription {
        let datum = SubscriptionDatum::new(
            PubKeyHash::new([1; 28]),
            PubKeyHash::new([2; 28]),
            Value::ada(funds),
            Value::ada(1),
            1_000,
            TimeMs::new(0),
        )
        .unwrap();
        let out = Utxo::new(
            OutputRef::new(TxId::new([funds as u8; 32]), 0),
            TxOutput::new(
                Address::from_pub_key_hash(NetworkId::Testnet, PubKeyHash::new([0; 28])),
                Value::ada(funds),
            ),
        );
        Subscription::active(datum, vec![out])
    }

    fn opening(funds: u64) -> Subscription {
        let s = sub(funds);
        Subscription::opening(s.datum().clone(), s.outputs()[0].clone())
    }

    #[test]
    fn test_opening_dropped_once_visible() {
        let result = reconcile(&[opening(10)], &[sub(10)]);
        assert!(result.pending.is_empty());
        assert_eq!(result.confirmed, 1);
    }

    #[test]
    fn test_opening_kept_while_invisible() {
        let result = reconcile(&[opening(10)], &[sub(3)]);
        assert_eq!(result.pending, vec![opening(10)]);
        assert_eq!(result.pending[0].lifecycle(), Lifecycle::Opening);
    }

    #[test]
    fn test_closing_kept_while_visible_then_dropped() {
        let closing = sub(10).closing();
        let still = reconcile(&[closing.clone()], &[sub(10)]);
        assert_eq!(still.pending.len(), 1);
        assert_eq!(still.pending[0].lifecycle(), Lifecycle::Closing);

        let gone = reconcile(&still.pending, &[sub(9)]);
        assert!(gone.pending.is_empty());
        assert_eq!(gone.settled, 1);
    }

    #[test]
    fn test_active_entries_never_stay_pending() {
        let result = reconcile(&[sub(10)], &[]);
        assert!(result.pending.is_empty());
    }

    #[test]
    fn test_matching_is_by_datum_not_output_ref() {
        // same datum, different backing output
        let mut moved = sub(10);
        moved = Subscription::active(
            moved.datum().clone(),
            vec![Utxo::new(
                OutputRef::new(TxId::new([0xee; 32]), 4),
                moved.outputs()[0].output.clone(),
            )],
        );
        let result = reconcile(&[opening(10)], &[moved]);
        assert!(result.pending.is_empty());
    }
}
