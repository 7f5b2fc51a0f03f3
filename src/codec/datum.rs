//! Subscription datum layout and the successor-state computation.
//!
//! The datum is `Constr 0 [customer, vendor, funds, price, interval, next_withdrawal]`
//! where values are encoded as `Map policy -> Map token -> quantity`, with lovelace
//! under the empty policy and empty token name. Every place that needs to know
//! whether two outputs belong to the same subscription compares [`DatumKey`]s.

use super::cbor::CborError;
use super::plutus::PlutusData;
use crate::domain::{Assets, MintingPolicyHash, PubKeyHash, TimeMs, TokenName, Value};
use std::fmt;
use thiserror::Error;

const DATUM_FIELDS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatumError {
    #[error(transparent)]
    Cbor(#[from] CborError),
    #[error("malformed datum: {0}")]
    Shape(String),
    #[error("'{0}' doesn't yet support other assets")]
    MultiAsset(&'static str),
    #[error("interval must be positive, got {0}ms")]
    Interval(i64),
    #[error("not enough funds locked in subscription")]
    InsufficientFunds,
    #[error("next withdrawal time overflows")]
    TimeOverflow,
}

/// Canonical encoded bytes of a datum; the single notion of "same subscription".
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatumKey(Vec<u8>);

impl DatumKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for DatumKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DatumKey({})", hex::encode(&self.0))
    }
}

/// On-chain state of one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionDatum {
    pub customer: PubKeyHash,
    pub vendor: PubKeyHash,
    pub funds: Value,
    pub price: Value,
    pub interval_ms: i64,
    pub next_withdrawal: TimeMs,
}

impl SubscriptionDatum {
    /// Fields for a new subscription. Only lovelace amounts are accepted here.
    pub fn new(
        customer: PubKeyHash,
        vendor: PubKeyHash,
        funds: Value,
        price: Value,
        interval_ms: i64,
        next_withdrawal: TimeMs,
    ) -> Result<Self, DatumError> {
        if !funds.is_pure_lovelace() {
            return Err(DatumError::MultiAsset("funds"));
        }
        if !price.is_pure_lovelace() {
            return Err(DatumError::MultiAsset("price"));
        }
        if interval_ms <= 0 {
            return Err(DatumError::Interval(interval_ms));
        }
        Ok(Self {
            customer,
            vendor,
            funds,
            price,
            interval_ms,
            next_withdrawal,
        })
    }

    pub fn to_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                PlutusData::Bytes(self.customer.as_bytes().to_vec()),
                PlutusData::Bytes(self.vendor.as_bytes().to_vec()),
                value_to_data(&self.funds),
                value_to_data(&self.price),
                PlutusData::Int(self.interval_ms as i128),
                PlutusData::Int(self.next_withdrawal.as_ms() as i128),
            ],
        )
    }

    pub fn from_data(data: &PlutusData) -> Result<Self, DatumError> {
        let fields = match data {
            PlutusData::Constr { index: 0, fields } if fields.len() == DATUM_FIELDS => fields,
            _ => {
                return Err(DatumError::Shape(
                    "expected constructor 0 with six fields".to_string(),
                ))
            }
        };

        Ok(Self {
            customer: pkh_field(&fields[0], "customer")?,
            vendor: pkh_field(&fields[1], "vendor")?,
            funds: value_from_data(&fields[2])?,
            price: value_from_data(&fields[3])?,
            interval_ms: i64_field(&fields[4], "interval")?,
            next_withdrawal: TimeMs::new(i64_field(&fields[5], "next_withdrawal")?),
        })
    }

    pub fn to_cbor(&self) -> Vec<u8> {
        self.to_data().to_cbor()
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self, DatumError> {
        Self::from_data(&PlutusData::from_cbor(bytes)?)
    }

    pub fn key(&self) -> DatumKey {
        DatumKey(self.to_cbor())
    }

    /// Copy with `funds` replaced; used by the minimum-deposit correction.
    pub fn with_funds(&self, funds: Value) -> Self {
        Self {
            funds,
            ..self.clone()
        }
    }

    /// State after one withdrawal, exactly as the validator recomputes it:
    /// `funds - price` and `next_withdrawal + interval`, everything else unchanged.
    pub fn successor(&self) -> Result<Self, DatumError> {
        let remaining = self
            .funds
            .checked_sub(&self.price)
            .ok_or(DatumError::InsufficientFunds)?;
        let next = self
            .next_withdrawal
            .as_ms()
            .checked_add(self.interval_ms)
            .ok_or(DatumError::TimeOverflow)?;
        Ok(Self {
            funds: remaining,
            next_withdrawal: TimeMs::new(next),
            ..self.clone()
        })
    }
}

/// Lovelace entry first (always present), then policies in byte order.
pub fn value_to_data(value: &Value) -> PlutusData {
    let mut entries = vec![(
        PlutusData::Bytes(Vec::new()),
        PlutusData::Map(vec![(
            PlutusData::Bytes(Vec::new()),
            PlutusData::Int(value.lovelace as i128),
        )]),
    )];

    for policy in value.assets.policies() {
        let tokens = value
            .assets
            .tokens_of(policy)
            .map(|tokens| {
                tokens
                    .iter()
                    .map(|(name, qty)| {
                        (
                            PlutusData::Bytes(name.as_bytes().to_vec()),
                            PlutusData::Int(*qty as i128),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        entries.push((
            PlutusData::Bytes(policy.as_bytes().to_vec()),
            PlutusData::Map(tokens),
        ));
    }

    PlutusData::Map(entries)
}

pub fn value_from_data(data: &PlutusData) -> Result<Value, DatumError> {
    let outer = data
        .as_map()
        .ok_or_else(|| DatumError::Shape("value must be a map".to_string()))?;

    let mut value = Value::zero();
    for (policy_key, tokens) in outer {
        let policy_bytes = policy_key
            .as_bytes()
            .ok_or_else(|| DatumError::Shape("policy key must be bytes".to_string()))?;
        let tokens = tokens
            .as_map()
            .ok_or_else(|| DatumError::Shape("token map expected".to_string()))?;

        for (token_key, qty) in tokens {
            let token = token_key
                .as_bytes()
                .ok_or_else(|| DatumError::Shape("token name must be bytes".to_string()))?;
            let qty = qty
                .as_int()
                .and_then(|q| u64::try_from(q).ok())
                .ok_or_else(|| DatumError::Shape("quantity out of range".to_string()))?;

            let part = if policy_bytes.is_empty() {
                if !token.is_empty() {
                    return Err(DatumError::Shape(
                        "lovelace entry must use an empty token name".to_string(),
                    ));
                }
                Value::lovelace(qty)
            } else {
                let policy = MintingPolicyHash::from_slice(policy_bytes)
                    .map_err(|e| DatumError::Shape(format!("policy: {}", e)))?;
                Value::new(
                    0,
                    Assets::new().with(policy, TokenName::new(token.to_vec()), qty),
                )
            };
            value = value
                .checked_add(&part)
                .ok_or_else(|| DatumError::Shape("quantity overflow".to_string()))?;
        }
    }
    Ok(value)
}

fn pkh_field(data: &PlutusData, name: &str) -> Result<PubKeyHash, DatumError> {
    let bytes = data
        .as_bytes()
        .ok_or_else(|| DatumError::Shape(format!("{} must be bytes", name)))?;
    PubKeyHash::from_slice(bytes).map_err(|e| DatumError::Shape(format!("{}: {}", name, e)))
}

fn i64_field(data: &PlutusData, name: &str) -> Result<i64, DatumError> {
    data.as_int()
        .and_then(|n| i64::try_from(n).ok())
        .ok_or_else(|| DatumError::Shape(format!("{} must be a 64-bit integer", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: i64 = 86_400_000;

    fn sample() -> SubscriptionDatum {
        SubscriptionDatum::new(
            PubKeyHash::new([1; 28]),
            PubKeyHash::new([2; 28]),
            Value::ada(10),
            Value::ada(1),
            DAY_MS,
            TimeMs::new(1_700_000_000_000),
        )
        .unwrap()
    }

    #[test]
    fn test_datum_roundtrip() {
        let datum = sample();
        assert_eq!(SubscriptionDatum::from_cbor(&datum.to_cbor()).unwrap(), datum);
    }

    #[test]
    fn test_datum_roundtrip_at_encoding_edges() {
        // integer head widths switch at 24, 256, 65536 and 2^32
        let amounts = [
            1,
            23,
            24,
            255,
            256,
            65_535,
            65_536,
            u32::MAX as u64,
            1 << 32,
            u64::MAX,
        ];
        let times = [i64::MIN, -65_537, -25, -1, 0, 23, 24, 1 << 32, i64::MAX];

        for lovelace in amounts {
            for ms in times {
                let datum = SubscriptionDatum {
                    funds: Value::lovelace(lovelace),
                    price: Value::lovelace(lovelace),
                    interval_ms: ms,
                    next_withdrawal: TimeMs::new(ms),
                    ..sample()
                };
                let decoded = SubscriptionDatum::from_cbor(&datum.to_cbor()).unwrap();
                assert_eq!(decoded, datum, "lovelace {} time {}", lovelace, ms);
                assert_eq!(decoded.key(), datum.key());
            }
        }
    }

    #[test]
    fn test_datum_byte_layout() {
        let bytes = sample().to_cbor();
        // Constr 0, indefinite field list, then a 28-byte customer hash
        assert_eq!(&bytes[..5], &[0xd8, 0x79, 0x9f, 0x58, 0x1c]);
        assert_eq!(&bytes[5..33], &[1u8; 28]);
        // funds: {h'': {h'': 10_000_000}}
        let funds_at = 33 + 30;
        assert_eq!(
            &bytes[funds_at..funds_at + 9],
            &[0xa1, 0x40, 0xa1, 0x40, 0x1a, 0x00, 0x98, 0x96, 0x80]
        );
        assert_eq!(*bytes.last().unwrap(), 0xff);
    }

    #[test]
    fn test_successor_matches_withdrawal_rule() {
        let datum = sample();
        let next = datum.successor().unwrap();
        assert_eq!(next.funds, Value::ada(9));
        assert_eq!(next.next_withdrawal.as_ms(), 1_700_000_000_000 + DAY_MS);
        assert_eq!(next.customer, datum.customer);
        assert_eq!(next.vendor, datum.vendor);
        assert_eq!(next.price, datum.price);
        assert_eq!(next.interval_ms, datum.interval_ms);
    }

    #[test]
    fn test_successor_requires_funds_to_cover_price() {
        let datum = sample().with_funds(Value::lovelace(500_000));
        assert_eq!(datum.successor(), Err(DatumError::InsufficientFunds));
    }

    #[test]
    fn test_key_distinguishes_funds() {
        let a = sample();
        let b = a.with_funds(Value::ada(11));
        assert_ne!(a.key(), b.key());
        assert_eq!(a.key(), a.clone().key());
    }

    #[test]
    fn test_multi_asset_funds_rejected_for_new_datum() {
        let funds = Value::new(
            5,
            Assets::new().with(MintingPolicyHash::new([3; 28]), TokenName::new(vec![1]), 1),
        );
        let err = SubscriptionDatum::new(
            PubKeyHash::new([1; 28]),
            PubKeyHash::new([2; 28]),
            funds,
            Value::ada(1),
            DAY_MS,
            TimeMs::new(0),
        )
        .unwrap_err();
        assert_eq!(err, DatumError::MultiAsset("funds"));
    }

    #[test]
    fn test_decoded_multi_asset_value() {
        let value = Value::new(
            2_000_000,
            Assets::new().with(MintingPolicyHash::new([4; 28]), TokenName::new(b"x".to_vec()), 7),
        );
        assert_eq!(value_from_data(&value_to_data(&value)).unwrap(), value);
    }

    #[test]
    fn test_wrong_shape_rejected() {
        let data = PlutusData::constr(1, vec![]);
        assert!(matches!(
            SubscriptionDatum::from_data(&data),
            Err(DatumError::Shape(_))
        ));
    }
}
