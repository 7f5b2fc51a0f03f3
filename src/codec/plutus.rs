//! Structured on-chain data (constructors, maps, lists, integers, byte strings).

use super::cbor::{CborError, Decoder, Encoder, TAG_NEG_BIGNUM, TAG_POS_BIGNUM};

const CONSTR_TAG_BASE: u64 = 121;
const CONSTR_TAG_EXT_BASE: u64 = 1280;
const CONSTR_TAG_GENERAL: u64 = 102;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlutusData {
    Constr { index: u64, fields: Vec<PlutusData> },
    Map(Vec<(PlutusData, PlutusData)>),
    List(Vec<PlutusData>),
    Int(i128),
    Bytes(Vec<u8>),
}

impl PlutusData {
    pub fn constr(index: u64, fields: Vec<PlutusData>) -> Self {
        PlutusData::Constr { index, fields }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            PlutusData::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PlutusData::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(PlutusData, PlutusData)]> {
        match self {
            PlutusData::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn to_cbor(&self) -> Vec<u8> {
        let mut e = Encoder::new();
        self.encode(&mut e);
        e.into_bytes()
    }

    pub fn encode(&self, e: &mut Encoder) {
        match self {
            PlutusData::Constr { index, fields } => {
                if *index < 7 {
                    e.tag(CONSTR_TAG_BASE + index);
                    encode_list(e, fields);
                } else if *index < 128 {
                    e.tag(CONSTR_TAG_EXT_BASE + index - 7);
                    encode_list(e, fields);
                } else {
                    e.tag(CONSTR_TAG_GENERAL);
                    e.array(2);
                    e.uint(*index);
                    encode_list(e, fields);
                }
            }
            PlutusData::Map(entries) => {
                e.map(entries.len());
                for (k, v) in entries {
                    k.encode(e);
                    v.encode(e);
                }
            }
            PlutusData::List(items) => encode_list(e, items),
            PlutusData::Int(n) => {
                e.int(*n);
            }
            PlutusData::Bytes(b) => {
                e.bytes(b);
            }
        }
    }

    /// Decode exactly one item, rejecting trailing bytes.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, CborError> {
        let mut d = Decoder::new(bytes);
        let data = Self::decode(&mut d)?;
        d.finish()?;
        Ok(data)
    }

    pub fn decode(d: &mut Decoder<'_>) -> Result<Self, CborError> {
        match d.peek_major()? {
            0 | 1 => Ok(PlutusData::Int(d.int()?)),
            2 => Ok(PlutusData::Bytes(d.bytes()?)),
            4 => Ok(PlutusData::List(decode_list(d)?)),
            5 => {
                let mut entries = Vec::new();
                match d.map()? {
                    Some(len) => {
                        for _ in 0..len {
                            let k = Self::decode(d)?;
                            let v = Self::decode(d)?;
                            entries.push((k, v));
                        }
                    }
                    None => {
                        while !d.at_break() {
                            let k = Self::decode(d)?;
                            let v = Self::decode(d)?;
                            entries.push((k, v));
                        }
                        d.read_break()?;
                    }
                }
                Ok(PlutusData::Map(entries))
            }
            6 => {
                let mut probe = d.clone();
                let tag = probe.tag()?;
                match tag {
                    TAG_POS_BIGNUM | TAG_NEG_BIGNUM => Ok(PlutusData::Int(d.int()?)),
                    121..=127 => {
                        d.tag()?;
                        Ok(PlutusData::constr(tag - CONSTR_TAG_BASE, decode_list(d)?))
                    }
                    1280..=1400 => {
                        d.tag()?;
                        Ok(PlutusData::constr(
                            tag - CONSTR_TAG_EXT_BASE + 7,
                            decode_list(d)?,
                        ))
                    }
                    CONSTR_TAG_GENERAL => {
                        d.tag()?;
                        if d.array()? != Some(2) {
                            return Err(CborError::Malformed(
                                "general constructor must be a pair".to_string(),
                            ));
                        }
                        let index = d.uint()?;
                        Ok(PlutusData::constr(index, decode_list(d)?))
                    }
                    other => Err(CborError::Malformed(format!("unexpected tag {}", other))),
                }
            }
            major => Err(CborError::Malformed(format!(
                "major type {} is not valid data",
                major
            ))),
        }
    }
}

/// Non-empty lists are indefinite-length, empty lists definite (matches the ledger node).
fn encode_list(e: &mut Encoder, items: &[PlutusData]) {
    if items.is_empty() {
        e.array(0);
    } else {
        e.begin_indefinite_array();
        for item in items {
            item.encode(e);
        }
        e.end_indefinite();
    }
}

fn decode_list(d: &mut Decoder<'_>) -> Result<Vec<PlutusData>, CborError> {
    let mut items = Vec::new();
    match d.array()? {
        Some(len) => {
            for _ in 0..len {
                items.push(PlutusData::decode(d)?);
            }
        }
        None => {
            while !d.at_break() {
                items.push(PlutusData::decode(d)?);
            }
            d.read_break()?;
        }
    }
    Ok(items)
}
