use std::fmt;

use super::dba::Dba;

const ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Row identifier: `(data_obj, dba, slot)`. String form is Oracle's 18-char
/// ROWID: 6 base-64 chars for the data object id, 3 for the file number, 6
/// for the block number, 3 for the row (slot) number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowId {
    pub data_obj: u32,
    pub dba: Dba,
    pub slot: u16,
}

impl RowId {
    pub fn new(data_obj: u32, dba: Dba, slot: u16) -> Self {
        Self { data_obj, dba, slot }
    }

    fn encode_group(out: &mut String, value: u64, chars: usize) {
        for i in (0..chars).rev() {
            let shift = i * 6;
            let idx = ((value >> shift) & 0x3F) as usize;
            out.push(ALPHABET[idx] as char);
        }
    }

    fn decode_group(s: &str, chars: usize) -> Result<u64, RowIdParseError> {
        let mut value: u64 = 0;
        for c in s.chars().take(chars) {
            let idx = ALPHABET
                .iter()
                .position(|&b| b as char == c)
                .ok_or_else(|| RowIdParseError(s.to_string()))?;
            value = (value << 6) | idx as u64;
        }
        Ok(value)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::with_capacity(18);
        Self::encode_group(&mut out, self.data_obj as u64, 6);
        Self::encode_group(&mut out, self.dba.file() as u64, 3);
        Self::encode_group(&mut out, self.dba.block() as u64, 6);
        Self::encode_group(&mut out, self.slot as u64, 3);
        f.write_str(&out)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("malformed rowid string: {0:?}")]
pub struct RowIdParseError(String);

impl std::str::FromStr for RowId {
    type Err = RowIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 18 {
            return Err(RowIdParseError(s.to_string()));
        }
        let data_obj = Self::decode_group(&s[0..6], 6)? as u32;
        let file = Self::decode_group(&s[6..9], 3)? as u16;
        let block = Self::decode_group(&s[9..15], 6)? as u32;
        let slot = Self::decode_group(&s[15..18], 3)? as u16;
        Ok(RowId {
            data_obj,
            dba: Dba::new(file, block),
            slot,
        })
    }
}
