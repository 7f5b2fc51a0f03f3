//! Seams to the external collaborators: ledger query client, wallet connector and
//! script compiler.
//!
//! This module provides:
//! - `LedgerClient`, `Wallet` and `ScriptCompiler` async traits
//! - `ProtocolParams` with minimum-deposit and time/slot conversion
//! - `WalletState` with coin and collateral selection
//! - In-memory implementations of all three collaborators (`mock`)

use crate::domain::{Address, NetworkId, OutputRef, TxId, Utxo, ValidatorHash};
use crate::tx::{Tx, Witness};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod mock;
pub mod params;
pub mod wallet;

pub use mock::{MockCompiler, MockKey, MockLedger, MockWallet};
pub use params::{ProtocolParams, SlotConfig};
pub use wallet::WalletState;

/// Failure reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Transport failure (timeout, connection refused).
    #[error("network error: {0}")]
    Network(String),
    /// The collaborator understood the request and refused it.
    #[error("{0}")]
    Rejected(String),
    /// The collaborator is not reachable at all (e.g. wallet extension gone).
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Other(String),
}

/// Compiled validator: its hash and serialized program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validator {
    pub hash: ValidatorHash,
    pub program: Vec<u8>,
}

impl Validator {
    /// Enterprise script address; a pure function of the validator hash.
    pub fn address(&self, network: NetworkId) -> Address {
        Address::from_validator_hash(network, self.hash)
    }
}

/// Read and submit access to the ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync + fmt::Debug {
    /// Unspent outputs currently sitting at `address`.
    async fn utxos_at(&self, address: &Address) -> Result<Vec<Utxo>, ServiceError>;

    async fn has_utxo(&self, out_ref: &OutputRef) -> Result<bool, ServiceError>;

    async fn params(&self) -> Result<ProtocolParams, ServiceError>;

    /// Submit a fully signed transaction, returning its id once accepted.
    async fn submit(&self, tx: &Tx) -> Result<TxId, ServiceError>;
}

/// The user's wallet connector.
#[async_trait]
pub trait Wallet: Send + Sync + fmt::Debug {
    async fn network_id(&self) -> Result<NetworkId, ServiceError>;

    async fn state(&self) -> Result<WalletState, ServiceError>;

    /// Ask the user to sign; returns the witnesses to append.
    async fn sign(&self, tx: &Tx) -> Result<Vec<Witness>, ServiceError>;
}

#[async_trait]
pub trait ScriptCompiler: Send + Sync + fmt::Debug {
    async fn compile(&self, source: &str) -> Result<Validator, ServiceError>;
}
