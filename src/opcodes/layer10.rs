//! Layer 10: index (KDX) vectors (§4.5).

use crate::error::DecodeError;
use crate::io::Endianness;
use crate::record::ChangeVector;
use crate::types::LobId;

/// `10.2` insert leaf row, `10.8` init header, `10.18` update key data.
/// All three share the same key-bytes field; only the sub-opcode differs in
/// what else is attached.
#[derive(Debug, Clone)]
pub struct IndexKeyVector {
    pub ind_key: Vec<u8>,
    pub ind_key_data: Option<Vec<u8>>,
    pub lob_mapping: Option<LobIndexEntry>,
}

/// A LOB id/page-number pair recovered from an index key that encodes a LOB
/// mapping (§4.8): `ind_key_size==16`, leading byte `0x0A`, byte[11]==4 — a
/// 10-byte lob id at offset 1 followed by a 4-byte big-endian page number.
#[derive(Debug, Clone, Copy)]
pub struct LobIndexEntry {
    pub lob_id: LobId,
    pub lob_page_no: u32,
}

fn detect_lob_mapping(key: &[u8]) -> Option<LobIndexEntry> {
    if key.len() != 16 || key[0] != 0x0A || key[11] != 4 {
        return None;
    }
    let lob_id = LobId::from_bytes(&key[1..11])?;
    let lob_page_no = u32::from_be_bytes(key[12..16].try_into().ok()?);
    Some(LobIndexEntry { lob_id, lob_page_no })
}

impl IndexKeyVector {
    pub fn decode(v: &ChangeVector, _endian: Endianness) -> Result<Self, DecodeError> {
        let ind_key = v.next_field(0, 0x1002)?.to_vec();
        let ind_key_data = v.next_field_opt(1).map(|f| f.to_vec());
        let lob_mapping = detect_lob_mapping(&ind_key);
        Ok(Self { ind_key, ind_key_data, lob_mapping })
    }
}
