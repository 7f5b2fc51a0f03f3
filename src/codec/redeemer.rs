//! Redeemers attached to script-input spends.

use super::plutus::PlutusData;

/// Placeholder the deployed validator receives on both spend paths.
const IGNORED_REDEEMER: i128 = 42;

/// Which spend path a transaction takes.
///
/// The deployed validator decides the path from signatures and ignores the
/// redeemer content; a revision that reads it only has to change `to_data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendRedeemer {
    Cancel,
    Withdraw,
}

impl SpendRedeemer {
    pub fn to_data(&self) -> PlutusData {
        match self {
            SpendRedeemer::Cancel | SpendRedeemer::Withdraw => PlutusData::Int(IGNORED_REDEEMER),
        }
    }
}
