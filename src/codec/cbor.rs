//! Minimal CBOR reader/writer covering the subset the ledger's data encoding uses.

use thiserror::Error;

const MAJOR_UINT: u8 = 0;
const MAJOR_NINT: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;
const MAJOR_TAG: u8 = 6;

const INDEFINITE: u8 = 31;
const BREAK: u8 = 0xff;

/// Byte strings longer than this are written as indefinite-length chunks.
pub const MAX_BYTES_CHUNK: usize = 64;

pub const TAG_POS_BIGNUM: u64 = 2;
pub const TAG_NEG_BIGNUM: u64 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CborError {
    #[error("unexpected end of input at offset {0}")]
    Eof(usize),
    #[error("unexpected major type {found} at offset {offset}, expected {expected}")]
    Major { expected: u8, found: u8, offset: usize },
    #[error("unsupported additional info {0}")]
    AdditionalInfo(u8),
    #[error("integer out of range")]
    IntRange,
    #[error("trailing bytes after item: {0}")]
    Trailing(usize),
    #[error("malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Default, Clone)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn head(&mut self, major: u8, arg: u64) {
        let m = major << 5;
        if arg < 24 {
            self.buf.push(m | arg as u8);
        } else if arg <= u8::MAX as u64 {
            self.buf.push(m | 24);
            self.buf.push(arg as u8);
        } else if arg <= u16::MAX as u64 {
            self.buf.push(m | 25);
            self.buf.extend_from_slice(&(arg as u16).to_be_bytes());
        } else if arg <= u32::MAX as u64 {
            self.buf.push(m | 26);
            self.buf.extend_from_slice(&(arg as u32).to_be_bytes());
        } else {
            self.buf.push(m | 27);
            self.buf.extend_from_slice(&arg.to_be_bytes());
        }
    }

    pub fn uint(&mut self, n: u64) -> &mut Self {
        self.head(MAJOR_UINT, n);
        self
    }

    /// Signed integer; values outside the 64-bit head range become bignums.
    pub fn int(&mut self, n: i128) -> &mut Self {
        if n >= 0 {
            match u64::try_from(n) {
                Ok(u) => self.head(MAJOR_UINT, u),
                Err(_) => self.bignum(TAG_POS_BIGNUM, n as u128),
            }
        } else {
            let magnitude = (-1 - n) as u128;
            match u64::try_from(magnitude) {
                Ok(u) => self.head(MAJOR_NINT, u),
                Err(_) => self.bignum(TAG_NEG_BIGNUM, magnitude),
            }
        }
        self
    }

    fn bignum(&mut self, tag: u64, magnitude: u128) {
        self.tag(tag);
        let raw = magnitude.to_be_bytes();
        let first = raw.iter().position(|b| *b != 0).unwrap_or(raw.len() - 1);
        self.bytes(&raw[first..]);
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        if data.len() <= MAX_BYTES_CHUNK {
            self.head(MAJOR_BYTES, data.len() as u64);
            self.buf.extend_from_slice(data);
        } else {
            self.buf.push((MAJOR_BYTES << 5) | INDEFINITE);
            for chunk in data.chunks(MAX_BYTES_CHUNK) {
                self.head(MAJOR_BYTES, chunk.len() as u64);
                self.buf.extend_from_slice(chunk);
            }
            self.buf.push(BREAK);
        }
        self
    }

    pub fn array(&mut self, len: usize) -> &mut Self {
        self.head(MAJOR_ARRAY, len as u64);
        self
    }

    pub fn begin_indefinite_array(&mut self) -> &mut Self {
        self.buf.push((MAJOR_ARRAY << 5) | INDEFINITE);
        self
    }

    pub fn end_indefinite(&mut self) -> &mut Self {
        self.buf.push(BREAK);
        self
    }

    pub fn map(&mut self, len: usize) -> &mut Self {
        self.head(MAJOR_MAP, len as u64);
        self
    }

    pub fn tag(&mut self, tag: u64) -> &mut Self {
        self.head(MAJOR_TAG, tag);
        self
    }

    /// Append an already-encoded item.
    pub fn raw(&mut self, encoded: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(encoded);
        self
    }
}

/// Decoded item head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Head {
    pub major: u8,
    /// `None` for indefinite length.
    pub arg: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn finish(&self) -> Result<(), CborError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CborError::Trailing(self.data.len() - self.pos))
        }
    }

    fn byte(&mut self) -> Result<u8, CborError> {
        let b = *self.data.get(self.pos).ok_or(CborError::Eof(self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CborError> {
        let end = self.pos.checked_add(n).ok_or(CborError::Eof(self.pos))?;
        let slice = self.data.get(self.pos..end).ok_or(CborError::Eof(self.pos))?;
        self.pos = end;
        Ok(slice)
    }

    pub fn peek_major(&self) -> Result<u8, CborError> {
        self.data
            .get(self.pos)
            .map(|b| b >> 5)
            .ok_or(CborError::Eof(self.pos))
    }

    pub fn at_break(&self) -> bool {
        self.data.get(self.pos) == Some(&BREAK)
    }

    pub fn read_break(&mut self) -> Result<(), CborError> {
        if self.at_break() {
            self.pos += 1;
            Ok(())
        } else {
            Err(CborError::Malformed("expected break".to_string()))
        }
    }

    pub fn head(&mut self) -> Result<Head, CborError> {
        let initial = self.byte()?;
        let major = initial >> 5;
        let info = initial & 0x1f;
        let arg = match info {
            0..=23 => Some(info as u64),
            24 => Some(self.byte()? as u64),
            25 => Some(u16::from_be_bytes([self.byte()?, self.byte()?]) as u64),
            26 => {
                let raw = self.take(4)?;
                Some(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as u64)
            }
            27 => {
                let raw = self.take(8)?;
                let mut arr = [0u8; 8];
                arr.copy_from_slice(raw);
                Some(u64::from_be_bytes(arr))
            }
            INDEFINITE => None,
            other => return Err(CborError::AdditionalInfo(other)),
        };
        Ok(Head { major, arg })
    }

    fn expect(&mut self, major: u8) -> Result<Option<u64>, CborError> {
        let offset = self.pos;
        let head = self.head()?;
        if head.major != major {
            return Err(CborError::Major {
                expected: major,
                found: head.major,
                offset,
            });
        }
        Ok(head.arg)
    }

    pub fn uint(&mut self) -> Result<u64, CborError> {
        self.expect(MAJOR_UINT)?.ok_or(CborError::AdditionalInfo(INDEFINITE))
    }

    pub fn tag(&mut self) -> Result<u64, CborError> {
        self.expect(MAJOR_TAG)?.ok_or(CborError::AdditionalInfo(INDEFINITE))
    }

    /// Integer in either head form or bignum tag form.
    pub fn int(&mut self) -> Result<i128, CborError> {
        let offset = self.pos;
        let head = self.head()?;
        let arg = head.arg.ok_or(CborError::AdditionalInfo(INDEFINITE));
        match head.major {
            MAJOR_UINT => Ok(arg? as i128),
            MAJOR_NINT => Ok(-1 - arg? as i128),
            MAJOR_TAG => match arg? {
                TAG_POS_BIGNUM => Ok(self.bignum_magnitude()? as i128),
                TAG_NEG_BIGNUM => Ok(-1 - self.bignum_magnitude()? as i128),
                _ => Err(CborError::Malformed("unexpected tag for integer".to_string())),
            },
            found => Err(CborError::Major {
                expected: MAJOR_UINT,
                found,
                offset,
            }),
        }
    }

    fn bignum_magnitude(&mut self) -> Result<i128, CborError> {
        let raw = self.bytes()?;
        let significant: Vec<u8> = raw.iter().copied().skip_while(|b| *b == 0).collect();
        if significant.len() > 15 {
            return Err(CborError::IntRange);
        }
        Ok(significant
            .iter()
            .fold(0i128, |acc, b| (acc << 8) | *b as i128))
    }

    pub fn bytes(&mut self) -> Result<Vec<u8>, CborError> {
        match self.expect(MAJOR_BYTES)? {
            Some(len) => Ok(self.take(len as usize)?.to_vec()),
            None => {
                let mut out = Vec::new();
                while !self.at_break() {
                    let len = self.expect(MAJOR_BYTES)?.ok_or_else(|| {
                        CborError::Malformed("nested indefinite byte string".to_string())
                    })?;
                    out.extend_from_slice(self.take(len as usize)?);
                }
                self.read_break()?;
                Ok(out)
            }
        }
    }

    /// Array header; `None` means indefinite (terminated by a break).
    pub fn array(&mut self) -> Result<Option<u64>, CborError> {
        self.expect(MAJOR_ARRAY)
    }

    pub fn map(&mut self) -> Result<Option<u64>, CborError> {
        self.expect(MAJOR_MAP)
    }
}
