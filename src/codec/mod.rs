//! Encoding of on-chain data: CBOR primitives, structured data, the subscription
//! datum and ledger output serialization.

pub mod cbor;
pub mod datum;
pub mod ledger;
pub mod plutus;
pub mod redeemer;

pub use cbor::CborError;
pub use datum::{DatumError, DatumKey, SubscriptionDatum};
pub use plutus::PlutusData;
pub use redeemer::SpendRedeemer;
