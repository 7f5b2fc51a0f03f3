//! Ledger-facing domain types and the subscription entity.
//!
//! This module provides:
//! - Domain primitives: TimeMs, key/script hashes, TxId, OutputRef, NetworkId
//! - Multi-asset Value arithmetic
//! - Shelley addresses with bech32 text form
//! - Transaction outputs and unspent outputs
//! - The Subscription entity and its lifecycle tag

pub mod address;
pub mod output;
pub mod primitives;
pub mod subscription;
pub mod value;

pub use address::{Address, AddressError, Credential};
pub use output::{Datum, TxOutput, Utxo};
pub use primitives::{
    HashParseError, MintingPolicyHash, Network, NetworkId, OutputRef, PubKeyHash, Slot, TimeMs,
    TxId, ValidatorHash,
};
pub use subscription::{Lifecycle, Subscription};
pub use value::{format_ada, Assets, TokenName, Value, ValueError, LOVELACE_PER_ADA};
