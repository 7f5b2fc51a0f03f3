use crate::codec::{DatumKey, SubscriptionDatum};
use crate::domain::{Subscription, Utxo};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Group outputs at the script address into one `Active` subscription per distinct datum.
///
/// Outputs without an inline datum, or whose datum is not a subscription datum, are
/// skipped. Groups appear in order of their first output, so the result is a pure
/// function of the input order.
pub fn group_utxos(utxos: &[Utxo]) -> Vec<Subscription> {
    let mut order: Vec<(SubscriptionDatum, Vec<Utxo>)> = Vec::new();
    let mut index: HashMap<DatumKey, usize> = HashMap::new();

    for utxo in utxos {
        let Some(data) = utxo.output.inline_datum() else {
            debug!("Skipping {} without inline datum", utxo.out_ref);
            continue;
        };

        let datum = match SubscriptionDatum::from_data(data) {
            Ok(datum) => datum,
            Err(e) => {
                warn!("Skipping {} with foreign datum: {}", utxo.out_ref, e);
                continue;
            }
        };

        match index.get(&datum.key()) {
            Some(&i) => order[i].1.push(utxo.clone()),
            None => {
                index.insert(datum.key(), order.len());
                order.push((datum, vec![utxo.clone()]));
            }
        }
    }

    order
        .into_iter()
        .map(|(datum, outputs)| Subscription::active(datum, outputs))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PlutusData;
    use crate::domain::{
        Address, Lifecycle, NetworkId, OutputRef, PubKeyHash, TimeMs, TxId, TxOutput,
        ValidatorHash, Value,
    };

    fn script() -> Address {
        Address::from_validator_hash(NetworkId::Testnet, ValidatorHash::new([8; 28]))
    }

    fn datum(customer: u8) -> SubscriptionDatum {
        SubscriptionDatum::new(
            PubKeyHash::new([customer; 28]),
            PubKeyHash::new([2; 28]),
            Value::ada(5),
            Value::ada(1),
            1_000,
            TimeMs::new(0),
        )
        .unwrap()
    }

    fn utxo(index: u32, ada: u64, data: Option<PlutusData>) -> Utxo {
        let out = match data {
            Some(d) => TxOutput::with_inline_datum(script(), Value::ada(ada), d),
            None => TxOutput::new(script(), Value::ada(ada)),
        };
        Utxo::new(OutputRef::new(TxId::new([1; 32]), index), out)
    }

    #[test]
    fn test_outputs_with_equal_datum_share_a_group() {
        let utxos = vec![
            utxo(0, 3, Some(datum(1).to_data())),
            utxo(1, 4, Some(datum(7).to_data())),
            utxo(2, 2, Some(datum(1).to_data())),
        ];
        let groups = group_utxos(&utxos);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].datum(), &datum(1));
        assert_eq!(groups[0].outputs().len(), 2);
        assert_eq!(groups[0].available(), Value::ada(5));
        assert_eq!(groups[1].outputs().len(), 1);
        assert!(groups.iter().all(|g| g.lifecycle() == Lifecycle::Active));
    }

    #[test]
    fn test_outputs_without_datum_are_ignored() {
        let utxos = vec![utxo(0, 3, None), utxo(1, 3, Some(PlutusData::Int(1)))];
        assert!(group_utxos(&utxos).is_empty());
    }

    #[test]
    fn test_grouping_is_idempotent() {
        let utxos = vec![
            utxo(0, 3, Some(datum(1).to_data())),
            utxo(1, 4, Some(datum(3).to_data())),
        ];
        let first = group_utxos(&utxos);
        let second = group_utxos(&utxos);
        assert_eq!(first, second);
        assert_eq!(
            first.iter().map(|s| s.outputs().to_vec()).collect::<Vec<_>>(),
            second.iter().map(|s| s.outputs().to_vec()).collect::<Vec<_>>()
        );
    }
}
