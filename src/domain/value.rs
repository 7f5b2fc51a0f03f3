//! Multi-asset value: lovelace plus native assets keyed by policy and token name.

use crate::domain::MintingPolicyHash;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub const LOVELACE_PER_ADA: u64 = 1_000_000;

/// Raw token name bytes (at most 32 on the ledger).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TokenName(pub Vec<u8>);

impl TokenName {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        TokenName(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for TokenName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for TokenName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map(TokenName).map_err(serde::de::Error::custom)
    }
}

/// Native assets, kept sorted by policy then token name with zero quantities removed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Assets(BTreeMap<MintingPolicyHash, BTreeMap<TokenName, u64>>);

impl Assets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, policy: MintingPolicyHash, token: TokenName, qty: u64) -> Self {
        self.insert(policy, token, qty);
        self
    }

    fn insert(&mut self, policy: MintingPolicyHash, token: TokenName, qty: u64) {
        if qty == 0 {
            return;
        }
        let tokens = self.0.entry(policy).or_default();
        let slot = tokens.entry(token).or_insert(0);
        *slot = slot.saturating_add(qty);
    }

    pub fn get(&self, policy: &MintingPolicyHash, token: &TokenName) -> u64 {
        self.0
            .get(policy)
            .and_then(|tokens| tokens.get(token))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    pub fn policies(&self) -> impl Iterator<Item = &MintingPolicyHash> {
        self.0.keys()
    }

    /// Iterate `(policy, token, quantity)` in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&MintingPolicyHash, &TokenName, u64)> {
        self.0
            .iter()
            .flat_map(|(p, tokens)| tokens.iter().map(move |(t, q)| (p, t, *q)))
    }

    pub fn tokens_of(&self, policy: &MintingPolicyHash) -> Option<&BTreeMap<TokenName, u64>> {
        self.0.get(policy)
    }

    fn checked_add(&self, other: &Assets) -> Option<Assets> {
        let mut out = self.clone();
        for (p, t, q) in other.iter() {
            let current = out.get(p, t);
            let sum = current.checked_add(q)?;
            out.set(*p, t.clone(), sum);
        }
        Some(out)
    }

    fn checked_sub(&self, other: &Assets) -> Option<Assets> {
        let mut out = self.clone();
        for (p, t, q) in other.iter() {
            let diff = out.get(p, t).checked_sub(q)?;
            out.set(*p, t.clone(), diff);
        }
        Some(out)
    }

    fn set(&mut self, policy: MintingPolicyHash, token: TokenName, qty: u64) {
        if qty == 0 {
            if let Some(tokens) = self.0.get_mut(&policy) {
                tokens.remove(&token);
                if tokens.is_empty() {
                    self.0.remove(&policy);
                }
            }
        } else {
            self.0.entry(policy).or_default().insert(token, qty);
        }
    }

    fn covers(&self, other: &Assets) -> bool {
        other.iter().all(|(p, t, q)| self.get(p, t) >= q)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("{have} does not cover {need}")]
    Underflow { have: Value, need: Value },
    #[error("value overflow")]
    Overflow,
}

/// Ledger value: lovelace plus native assets.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Value {
    pub lovelace: u64,
    pub assets: Assets,
}

impl Value {
    pub fn new(lovelace: u64, assets: Assets) -> Self {
        Self { lovelace, assets }
    }

    pub fn lovelace(lovelace: u64) -> Self {
        Self {
            lovelace,
            assets: Assets::new(),
        }
    }

    pub fn ada(ada: u64) -> Self {
        Self::lovelace(ada * LOVELACE_PER_ADA)
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// True when there is neither lovelace nor any asset.
    pub fn is_zero(&self) -> bool {
        self.lovelace == 0 && self.assets.is_zero()
    }

    pub fn is_pure_lovelace(&self) -> bool {
        self.assets.is_zero()
    }

    pub fn checked_add(&self, other: &Value) -> Option<Value> {
        Some(Value {
            lovelace: self.lovelace.checked_add(other.lovelace)?,
            assets: self.assets.checked_add(&other.assets)?,
        })
    }

    /// Component-wise subtraction; `None` if any component would go negative.
    pub fn checked_sub(&self, other: &Value) -> Option<Value> {
        Some(Value {
            lovelace: self.lovelace.checked_sub(other.lovelace)?,
            assets: self.assets.checked_sub(&other.assets)?,
        })
    }

    pub fn try_add(&self, other: &Value) -> Result<Value, ValueError> {
        self.checked_add(other).ok_or(ValueError::Overflow)
    }

    pub fn try_sub(&self, other: &Value) -> Result<Value, ValueError> {
        self.checked_sub(other).ok_or_else(|| ValueError::Underflow {
            have: self.clone(),
            need: other.clone(),
        })
    }

    /// Component-wise `self >= other`.
    pub fn covers(&self, other: &Value) -> bool {
        self.lovelace >= other.lovelace && self.assets.covers(&other.assets)
    }

    pub fn with_lovelace(&self, lovelace: u64) -> Value {
        Value {
            lovelace,
            assets: self.assets.clone(),
        }
    }

    /// Saturating sum of many values.
    pub fn sum<'a>(values: impl IntoIterator<Item = &'a Value>) -> Value {
        values.into_iter().fold(Value::zero(), |acc, v| {
            acc.checked_add(v).unwrap_or_else(|| acc.with_lovelace(u64::MAX))
        })
    }
}

/// Render lovelace as ADA with up to six decimals, trailing zeros removed.
pub fn format_ada(lovelace: u64) -> String {
    let whole = lovelace / LOVELACE_PER_ADA;
    let frac = lovelace % LOVELACE_PER_ADA;
    if frac == 0 {
        whole.to_string()
    } else {
        let digits = format!("{:06}", frac);
        format!("{}.{}", whole, digits.trim_end_matches('0'))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ADA", format_ada(self.lovelace))?;
        for (p, t, q) in self.assets.iter() {
            write!(f, " + {} {}.{}", q, p, hex::encode(t.as_bytes()))?;
        }
        Ok(())
    }
}
