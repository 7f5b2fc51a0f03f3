//! Transaction model, its ledger encoding, and the open/cancel/withdraw builders.
//!
//! This module provides:
//! - `Tx` with inputs, outputs, collateral, signers, scripts and validity start
//! - Body/witness serialization used for sizing and transaction ids
//! - `TxFinalizer` (fee and change) and its default `BalancingFinalizer`
//! - The three builders and the shared sign-and-submit flow

use crate::codec::cbor::Encoder;
use crate::codec::SpendRedeemer;
use crate::domain::{Credential, PubKeyHash, Slot, TxId, TxOutput, Utxo, Value};
use crate::ledger::Validator;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

pub mod cancel;
pub mod finalize;
pub mod flow;
pub mod open;
pub mod withdraw;

pub use cancel::{cancel_draft, cancel_subscription};
pub use finalize::{BalancingFinalizer, FinalizeError, TxFinalizer};
pub use flow::{Stage, Submitted, TxContext};
pub use open::{correct_min_deposit, open_subscription, DepositCorrection, OpenRequest};
pub use withdraw::{withdraw, withdraw_draft};

/// Execution budget declared for each script spend.
pub const SPEND_EX_UNITS: (u64, u64) = (1_000_000, 500_000_000);

const BODY_INPUTS: u64 = 0;
const BODY_OUTPUTS: u64 = 1;
const BODY_FEE: u64 = 2;
const BODY_VALIDITY_START: u64 = 8;
const BODY_COLLATERAL: u64 = 13;
const BODY_REQUIRED_SIGNERS: u64 = 14;

const WITNESS_VKEYS: u64 = 0;
const WITNESS_REDEEMERS: u64 = 5;
const WITNESS_PLUTUS_V2: u64 = 6;

/// A spent output; script outputs carry the redeemer for their spend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    pub utxo: Utxo,
    pub redeemer: Option<SpendRedeemer>,
}

/// Key witness: verification key, signature and the key hash it proves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Witness {
    pub signer: PubKeyHash,
    pub vkey: [u8; 32],
    pub signature: Vec<u8>,
}

impl Witness {
    /// Same encoded size as a real witness; used for fee estimation.
    fn placeholder() -> Self {
        Self {
            signer: PubKeyHash::new([0; 28]),
            vkey: [0; 32],
            signature: vec![0; 64],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tx {
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub collateral: Vec<Utxo>,
    pub required_signers: Vec<PubKeyHash>,
    pub scripts: Vec<Validator>,
    pub valid_from: Option<Slot>,
    pub fee: u64,
    pub witnesses: Vec<Witness>,
}

impl Tx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(&mut self, utxo: Utxo) -> &mut Self {
        self.inputs.push(TxInput {
            utxo,
            redeemer: None,
        });
        self
    }

    pub fn add_inputs(&mut self, utxos: impl IntoIterator<Item = Utxo>) -> &mut Self {
        for utxo in utxos {
            self.add_input(utxo);
        }
        self
    }

    pub fn add_script_input(&mut self, utxo: Utxo, redeemer: SpendRedeemer) -> &mut Self {
        self.inputs.push(TxInput {
            utxo,
            redeemer: Some(redeemer),
        });
        self
    }

    pub fn add_output(&mut self, output: TxOutput) -> &mut Self {
        self.outputs.push(output);
        self
    }

    pub fn add_collateral(&mut self, utxo: Utxo) -> &mut Self {
        self.collateral.push(utxo);
        self
    }

    pub fn add_signer(&mut self, pkh: PubKeyHash) -> &mut Self {
        if !self.required_signers.contains(&pkh) {
            self.required_signers.push(pkh);
        }
        self
    }

    pub fn attach_script(&mut self, validator: Validator) -> &mut Self {
        if !self.scripts.iter().any(|s| s.hash == validator.hash) {
            self.scripts.push(validator);
        }
        self
    }

    pub fn valid_from(&mut self, slot: Slot) -> &mut Self {
        self.valid_from = Some(slot);
        self
    }

    pub fn add_witnesses(&mut self, witnesses: Vec<Witness>) -> &mut Self {
        self.witnesses.extend(witnesses);
        self
    }

    pub fn input_value(&self) -> Value {
        Value::sum(self.inputs.iter().map(|i| i.utxo.value()))
    }

    pub fn output_value(&self) -> Value {
        Value::sum(self.outputs.iter().map(|o| &o.value))
    }

    pub fn script_inputs(&self) -> impl Iterator<Item = &TxInput> {
        self.inputs.iter().filter(|i| i.redeemer.is_some())
    }

    pub fn is_signed_by(&self, pkh: &PubKeyHash) -> bool {
        self.witnesses.iter().any(|w| &w.signer == pkh)
    }

    /// Keys that must sign: owners of spent key outputs and collateral, plus
    /// explicitly required signers.
    pub fn expected_signers(&self) -> BTreeSet<PubKeyHash> {
        let owners = self
            .inputs
            .iter()
            .map(|i| &i.utxo)
            .chain(self.collateral.iter())
            .filter_map(|u| match u.output.address.payment() {
                Credential::PubKey(pkh) => Some(*pkh),
                Credential::Script(_) => None,
            });
        owners.chain(self.required_signers.iter().copied()).collect()
    }

    pub fn body_cbor(&self) -> Vec<u8> {
        let mut e = Encoder::new();
        let entries = 3
            + self.valid_from.is_some() as usize
            + !self.collateral.is_empty() as usize
            + !self.required_signers.is_empty() as usize;
        e.map(entries);

        e.uint(BODY_INPUTS);
        encode_refs(&mut e, self.inputs.iter().map(|i| &i.utxo));

        e.uint(BODY_OUTPUTS);
        e.array(self.outputs.len());
        for output in &self.outputs {
            e.raw(&output.to_cbor());
        }

        e.uint(BODY_FEE);
        e.uint(self.fee);

        if let Some(slot) = self.valid_from {
            e.uint(BODY_VALIDITY_START);
            e.uint(slot);
        }
        if !self.collateral.is_empty() {
            e.uint(BODY_COLLATERAL);
            encode_refs(&mut e, self.collateral.iter());
        }
        if !self.required_signers.is_empty() {
            e.uint(BODY_REQUIRED_SIGNERS);
            e.array(self.required_signers.len());
            for pkh in &self.required_signers {
                e.bytes(pkh.as_bytes());
            }
        }
        e.into_bytes()
    }

    fn witness_cbor(&self, witnesses: &[Witness]) -> Vec<u8> {
        let mut e = Encoder::new();
        let redeemers: Vec<(usize, SpendRedeemer)> = self
            .inputs
            .iter()
            .enumerate()
            .filter_map(|(i, input)| input.redeemer.map(|r| (i, r)))
            .collect();
        let entries = !witnesses.is_empty() as usize
            + !redeemers.is_empty() as usize
            + !self.scripts.is_empty() as usize;
        e.map(entries);

        if !witnesses.is_empty() {
            e.uint(WITNESS_VKEYS);
            e.array(witnesses.len());
            for w in witnesses {
                e.array(2);
                e.bytes(&w.vkey);
                e.bytes(&w.signature);
            }
        }
        if !redeemers.is_empty() {
            e.uint(WITNESS_REDEEMERS);
            e.array(redeemers.len());
            for (index, redeemer) in redeemers {
                e.array(4);
                e.uint(0);
                e.uint(index as u64);
                redeemer.to_data().encode(&mut e);
                e.array(2);
                e.uint(SPEND_EX_UNITS.0);
                e.uint(SPEND_EX_UNITS.1);
            }
        }
        if !self.scripts.is_empty() {
            e.uint(WITNESS_PLUTUS_V2);
            e.array(self.scripts.len());
            for script in &self.scripts {
                e.bytes(&script.program);
            }
        }
        e.into_bytes()
    }

    fn encode_with(&self, witnesses: &[Witness]) -> Vec<u8> {
        let mut e = Encoder::new();
        e.array(4);
        e.raw(&self.body_cbor());
        e.raw(&self.witness_cbor(witnesses));
        // valid flag, no auxiliary data
        e.raw(&[0xf5, 0xf6]);
        e.into_bytes()
    }

    pub fn to_cbor(&self) -> Vec<u8> {
        self.encode_with(&self.witnesses)
    }

    /// Serialized size once `signers` key witnesses are attached.
    pub fn estimated_size(&self, signers: usize) -> usize {
        let missing = signers.saturating_sub(self.witnesses.len());
        let mut witnesses = self.witnesses.clone();
        witnesses.extend(std::iter::repeat_with(Witness::placeholder).take(missing));
        self.encode_with(&witnesses).len()
    }

    /// Hash of the body; witnesses do not affect it.
    pub fn id(&self) -> TxId {
        let digest = Sha256::digest(self.body_cbor());
        TxId::new(digest.into())
    }
}

fn encode_refs<'a>(e: &mut Encoder, utxos: impl Iterator<Item = &'a Utxo>) {
    let refs: Vec<_> = utxos.map(|u| u.out_ref).collect();
    e.array(refs.len());
    for r in refs {
        e.array(2);
        e.bytes(r.tx_id.as_bytes());
        e.uint(r.index as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, NetworkId, OutputRef, ValidatorHash};

    fn key_utxo(i: u32) -> Utxo {
        Utxo::new(
            OutputRef::new(TxId::new([i as u8; 32]), i),
            TxOutput::new(
                Address::from_pub_key_hash(NetworkId::Testnet, PubKeyHash::new([1; 28])),
                Value::ada(5),
            ),
        )
    }

    fn script_utxo(i: u32) -> Utxo {
        Utxo::new(
            OutputRef::new(TxId::new([0xcc; 32]), i),
            TxOutput::new(
                Address::from_validator_hash(NetworkId::Testnet, ValidatorHash::new([2; 28])),
                Value::ada(3),
            ),
        )
    }

    #[test]
    fn test_id_ignores_witnesses() {
        let mut tx = Tx::new();
        tx.add_input(key_utxo(0));
        let before = tx.id();
        tx.add_witnesses(vec![Witness::placeholder()]);
        assert_eq!(tx.id(), before);
    }

    #[test]
    fn test_id_changes_with_fee() {
        let mut tx = Tx::new();
        tx.add_input(key_utxo(0));
        let before = tx.id();
        tx.fee = 170_000;
        assert_ne!(tx.id(), before);
    }

    #[test]
    fn test_estimated_size_matches_signed_size() {
        let mut tx = Tx::new();
        tx.add_input(key_utxo(0))
            .add_script_input(script_utxo(1), SpendRedeemer::Cancel)
            .add_signer(PubKeyHash::new([1; 28]));
        let estimate = tx.estimated_size(1);
        tx.add_witnesses(vec![Witness {
            signer: PubKeyHash::new([1; 28]),
            vkey: [7; 32],
            signature: vec![9; 64],
        }]);
        assert_eq!(tx.to_cbor().len(), estimate);
    }

    #[test]
    fn test_expected_signers_skip_script_inputs() {
        let mut tx = Tx::new();
        tx.add_input(key_utxo(0))
            .add_script_input(script_utxo(1), SpendRedeemer::Withdraw)
            .add_signer(PubKeyHash::new([6; 28]));
        let signers: Vec<_> = tx.expected_signers().into_iter().collect();
        assert_eq!(signers, vec![PubKeyHash::new([1; 28]), PubKeyHash::new([6; 28])]);
        assert_eq!(tx.script_inputs().count(), 1);
    }

    #[test]
    fn test_signer_added_once() {
        let mut tx = Tx::new();
        tx.add_signer(PubKeyHash::new([1; 28]))
            .add_signer(PubKeyHash::new([1; 28]));
        assert_eq!(tx.required_signers.len(), 1);
    }
}
