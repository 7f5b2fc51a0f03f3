//! Domain primitives: TimeMs, key/script hashes, TxId, OutputRef, NetworkId, Network.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// Shift by a (possibly negative) number of milliseconds.
    pub fn plus_ms(&self, ms: i64) -> Self {
        TimeMs(self.0.saturating_add(ms))
    }
}

impl fmt::Display for TimeMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match chrono::DateTime::<chrono::Utc>::from_timestamp_millis(self.0) {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            None => write!(f, "{}ms", self.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashParseError {
    #[error("invalid hex: {0}")]
    Hex(String),
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

macro_rules! fixed_hash {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn new(bytes: [u8; $len]) -> Self {
                $name(bytes)
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self, HashParseError> {
                let arr: [u8; $len] = bytes.try_into().map_err(|_| HashParseError::Length {
                    expected: $len,
                    actual: bytes.len(),
                })?;
                Ok($name(arr))
            }

            pub fn from_hex(s: &str) -> Result<Self, HashParseError> {
                let bytes = hex::decode(s).map_err(|e| HashParseError::Hex(e.to_string()))?;
                Self::from_slice(&bytes)
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_hash!(
    /// Blake2b-224 hash of a verification key.
    PubKeyHash,
    28
);

fixed_hash!(
    /// Blake2b-224 hash of a validator script.
    ValidatorHash,
    28
);

fixed_hash!(
    /// Policy id of a native asset.
    MintingPolicyHash,
    28
);

fixed_hash!(
    /// Transaction id (hash of the transaction body).
    TxId,
    32
);

/// Reference to a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub tx_id: TxId,
    pub index: u32,
}

impl OutputRef {
    pub fn new(tx_id: TxId, index: u32) -> Self {
        Self { tx_id, index }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_id, self.index)
    }
}

/// Ledger network discriminator, as carried in address headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    Testnet,
    Mainnet,
}

impl NetworkId {
    pub fn from_header_nibble(n: u8) -> Option<Self> {
        match n {
            0 => Some(NetworkId::Testnet),
            1 => Some(NetworkId::Mainnet),
            _ => None,
        }
    }

    pub fn header_nibble(&self) -> u8 {
        match self {
            NetworkId::Testnet => 0,
            NetworkId::Mainnet => 1,
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkId::Testnet => write!(f, "testnet"),
            NetworkId::Mainnet => write!(f, "mainnet"),
        }
    }
}

/// Named network the application is deployed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Preview,
    Preprod,
    Mainnet,
}

impl Network {
    pub fn id(&self) -> NetworkId {
        match self {
            Network::Preview | Network::Preprod => NetworkId::Testnet,
            Network::Mainnet => NetworkId::Mainnet,
        }
    }

    /// Human readable name used in connection errors.
    pub fn label(&self) -> &'static str {
        match self {
            Network::Preview => "preview testnet",
            Network::Preprod => "preprod testnet",
            Network::Mainnet => "mainnet",
        }
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preview" => Ok(Network::Preview),
            "preprod" => Ok(Network::Preprod),
            "mainnet" => Ok(Network::Mainnet),
            other => Err(format!("must be preview, preprod, or mainnet, got {}", other)),
        }
    }
}

/// Absolute ledger slot number.
pub type Slot = u64;
