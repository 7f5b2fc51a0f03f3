//! Transaction outputs, attached datums and unspent outputs.

use crate::codec::{ledger, PlutusData};
use crate::domain::{Address, OutputRef, Value};

/// Datum attached to an output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datum {
    Inline(PlutusData),
    Hash([u8; 32]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub address: Address,
    pub value: Value,
    pub datum: Option<Datum>,
}

impl TxOutput {
    pub fn new(address: Address, value: Value) -> Self {
        Self {
            address,
            value,
            datum: None,
        }
    }

    pub fn with_inline_datum(address: Address, value: Value, datum: PlutusData) -> Self {
        Self {
            address,
            value,
            datum: Some(Datum::Inline(datum)),
        }
    }

    pub fn inline_datum(&self) -> Option<&PlutusData> {
        match &self.datum {
            Some(Datum::Inline(data)) => Some(data),
            _ => None,
        }
    }

    /// Ledger serialization, used for size-dependent minimum deposit.
    pub fn to_cbor(&self) -> Vec<u8> {
        ledger::encode_output(self)
    }
}

/// An unspent output together with its reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub out_ref: OutputRef,
    pub output: TxOutput,
}

impl Utxo {
    pub fn new(out_ref: OutputRef, output: TxOutput) -> Self {
        Self { out_ref, output }
    }

    pub fn value(&self) -> &Value {
        &self.output.value
    }

    pub fn sum_value<'a>(utxos: impl IntoIterator<Item = &'a Utxo>) -> Value {
        Value::sum(utxos.into_iter().map(|u| &u.output.value))
    }
}
