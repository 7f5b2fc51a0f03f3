//! Shelley-era addresses (base and enterprise) with bech32 text form.

use crate::domain::{NetworkId, PubKeyHash, ValidatorHash};
use bech32::{FromBase32, ToBase32, Variant};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("invalid bech32: {0}")]
    Bech32(String),
    #[error("unexpected human readable part: {0}")]
    Prefix(String),
    #[error("unsupported address type {0}")]
    UnsupportedType(u8),
    #[error("invalid network nibble {0}")]
    Network(u8),
    #[error("invalid address length {0}")]
    Length(usize),
}

/// Payment or staking credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credential {
    PubKey(PubKeyHash),
    Script(ValidatorHash),
}

impl Credential {
    fn bytes(&self) -> &[u8] {
        match self {
            Credential::PubKey(h) => h.as_bytes(),
            Credential::Script(h) => h.as_bytes(),
        }
    }

    fn is_script(&self) -> bool {
        matches!(self, Credential::Script(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    network: NetworkId,
    payment: Credential,
    staking: Option<Credential>,
}

impl Address {
    pub fn new(network: NetworkId, payment: Credential, staking: Option<Credential>) -> Self {
        Self {
            network,
            payment,
            staking,
        }
    }

    /// Enterprise address (no staking part) for a key hash.
    pub fn from_pub_key_hash(network: NetworkId, pkh: PubKeyHash) -> Self {
        Self::new(network, Credential::PubKey(pkh), None)
    }

    /// Enterprise address for a validator.
    pub fn from_validator_hash(network: NetworkId, hash: ValidatorHash) -> Self {
        Self::new(network, Credential::Script(hash), None)
    }

    pub fn network(&self) -> NetworkId {
        self.network
    }

    pub fn payment(&self) -> &Credential {
        &self.payment
    }

    pub fn staking(&self) -> Option<&Credential> {
        self.staking.as_ref()
    }

    pub fn pub_key_hash(&self) -> Option<PubKeyHash> {
        match self.payment {
            Credential::PubKey(h) => Some(h),
            Credential::Script(_) => None,
        }
    }

    pub fn validator_hash(&self) -> Option<ValidatorHash> {
        match self.payment {
            Credential::Script(h) => Some(h),
            Credential::PubKey(_) => None,
        }
    }

    fn header(&self) -> u8 {
        let kind = match (&self.payment, &self.staking) {
            (p, Some(s)) => (p.is_script() as u8) | ((s.is_script() as u8) << 1),
            (p, None) => 6 + p.is_script() as u8,
        };
        (kind << 4) | self.network.header_nibble()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(57);
        out.push(self.header());
        out.extend_from_slice(self.payment.bytes());
        if let Some(staking) = &self.staking {
            out.extend_from_slice(staking.bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AddressError> {
        let (&header, rest) = bytes.split_first().ok_or(AddressError::Length(0))?;
        let kind = header >> 4;
        let network = NetworkId::from_header_nibble(header & 0x0f)
            .ok_or(AddressError::Network(header & 0x0f))?;

        let cred = |script: bool, raw: &[u8]| -> Result<Credential, AddressError> {
            let len_err = |_| AddressError::Length(bytes.len());
            Ok(if script {
                Credential::Script(ValidatorHash::from_slice(raw).map_err(len_err)?)
            } else {
                Credential::PubKey(PubKeyHash::from_slice(raw).map_err(len_err)?)
            })
        };

        match kind {
            0..=3 => {
                if rest.len() != 56 {
                    return Err(AddressError::Length(bytes.len()));
                }
                let payment = cred(kind & 1 == 1, &rest[..28])?;
                let staking = cred(kind & 2 == 2, &rest[28..])?;
                Ok(Self::new(network, payment, Some(staking)))
            }
            6 | 7 => {
                if rest.len() != 28 {
                    return Err(AddressError::Length(bytes.len()));
                }
                Ok(Self::new(network, cred(kind == 7, rest)?, None))
            }
            other => Err(AddressError::UnsupportedType(other)),
        }
    }

    fn hrp(network: NetworkId) -> &'static str {
        match network {
            NetworkId::Mainnet => "addr",
            NetworkId::Testnet => "addr_test",
        }
    }

    pub fn to_bech32(&self) -> String {
        // Encoding only fails for an invalid hrp, and both prefixes are valid.
        bech32::encode(
            Self::hrp(self.network),
            self.to_bytes().to_base32(),
            Variant::Bech32,
        )
        .unwrap_or_default()
    }

    pub fn from_bech32(s: &str) -> Result<Self, AddressError> {
        let (hrp, data, _variant) =
            bech32::decode(s).map_err(|e| AddressError::Bech32(e.to_string()))?;
        let bytes =
            Vec::<u8>::from_base32(&data).map_err(|e| AddressError::Bech32(e.to_string()))?;
        let addr = Self::from_bytes(&bytes)?;
        if hrp != Self::hrp(addr.network) {
            return Err(AddressError::Prefix(hrp));
        }
        Ok(addr)
    }

    pub fn is_for_testnet(&self) -> bool {
        self.network == NetworkId::Testnet
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_bech32())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_bech32())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_bech32(&s).map_err(serde::de::Error::custom)
    }
}
