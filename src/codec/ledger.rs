//! Ledger-format serialization of values and outputs.

use super::cbor::Encoder;
use crate::domain::{Datum, TxOutput, Value};

const TAG_ENCODED_CBOR: u64 = 24;

pub fn encode_value(e: &mut Encoder, value: &Value) {
    if value.assets.is_zero() {
        e.uint(value.lovelace);
        return;
    }
    e.array(2);
    e.uint(value.lovelace);
    let policies: Vec<_> = value.assets.policies().collect();
    e.map(policies.len());
    for policy in policies {
        e.bytes(policy.as_bytes());
        let tokens = value.assets.tokens_of(policy).cloned().unwrap_or_default();
        e.map(tokens.len());
        for (name, qty) in tokens {
            e.bytes(name.as_bytes());
            e.uint(qty);
        }
    }
}

/// Outputs without a datum use the compact array form, others the keyed map form
/// with inline datums wrapped as tag-24 embedded bytes.
pub fn encode_output(output: &TxOutput) -> Vec<u8> {
    let mut e = Encoder::new();
    let address = output.address.to_bytes();
    match &output.datum {
        None => {
            e.array(2);
            e.bytes(&address);
            encode_value(&mut e, &output.value);
        }
        Some(datum) => {
            e.map(3);
            e.uint(0);
            e.bytes(&address);
            e.uint(1);
            encode_value(&mut e, &output.value);
            e.uint(2);
            match datum {
                Datum::Hash(hash) => {
                    e.array(2);
                    e.uint(0);
                    e.bytes(hash);
                }
                Datum::Inline(data) => {
                    e.array(2);
                    e.uint(1);
                    e.tag(TAG_ENCODED_CBOR);
                    e.bytes(&data.to_cbor());
                }
            }
        }
    }
    e.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PlutusData;
    use crate::domain::{Address, NetworkId, PubKeyHash};

    fn addr() -> Address {
        Address::from_pub_key_hash(NetworkId::Testnet, PubKeyHash::new([5; 28]))
    }

    #[test]
    fn test_plain_output_is_array() {
        let out = TxOutput::new(addr(), Value::ada(2));
        let bytes = encode_output(&out);
        assert_eq!(bytes[0], 0x82);
        // header + 28-byte hash
        assert_eq!(&bytes[1..3], &[0x58, 0x1d]);
        assert_eq!(bytes.len(), 1 + 2 + 29 + 5);
    }

    #[test]
    fn test_inline_datum_grows_output() {
        let plain = TxOutput::new(addr(), Value::ada(2));
        let with_datum = TxOutput::with_inline_datum(addr(), Value::ada(2), PlutusData::Int(1));
        let bytes = encode_output(&with_datum);
        assert_eq!(bytes[0], 0xa3);
        assert!(bytes.len() > encode_output(&plain).len());
    }
}
