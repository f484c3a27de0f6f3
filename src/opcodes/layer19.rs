//! Layer 19: direct-load LOB vectors (§4.5).

use bytes::Bytes;

use crate::error::DecodeError;
use crate::io::{BinaryReader, Endianness};
use crate::record::ChangeVector;
use crate::types::{LobId, TypeDataObj};

const HEADER_LEN: usize = 36;

/// `19.1`: a direct-path LOB page write. Header is a fixed 36 bytes
/// followed by the page payload.
#[derive(Debug, Clone)]
pub struct DirectLobWrite {
    pub data_obj: TypeDataObj,
    pub lob_id: LobId,
    pub lob_page_no: u32,
    pub page: Bytes,
}

impl DirectLobWrite {
    pub fn decode(v: &ChangeVector, endian: Endianness) -> Result<Self, DecodeError> {
        let f0 = v.next_field(0, 0x1901)?;
        if f0.len() < HEADER_LEN {
            return Err(DecodeError::TruncatedField { code: 0x1901, need: HEADER_LEN, have: f0.len() });
        }
        let r = BinaryReader::new(f0, endian);
        let data_obj = TypeDataObj::from(r.read32(0)?);
        let lob_id = LobId::from_bytes(&f0[4..14]).ok_or(DecodeError::TruncatedField { code: 0x1901, need: 14, have: f0.len() })?;
        let lob_page_no = r.read32(14)?;
        let page = v.next_field_opt(1).map(Bytes::copy_from_slice).unwrap_or_default();
        Ok(Self { data_obj, lob_id, lob_page_no, page })
    }
}
