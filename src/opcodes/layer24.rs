//! Layer 24: DDL marker vectors (§4.5).

use crate::error::DecodeError;
use crate::io::{BinaryReader, Endianness};
use crate::record::ChangeVector;
use crate::types::TypeObj;

/// `24.1`: records that a DDL statement touched `obj`. The engine only
/// appends this to the transaction when the schema filter selects the
/// object (§4.6 rule 7); that decision lives in the state machine, not here.
#[derive(Debug, Clone)]
pub struct DdlMarker {
    pub obj: TypeObj,
}

impl DdlMarker {
    pub fn decode(v: &ChangeVector, endian: Endianness) -> Result<Self, DecodeError> {
        let f0 = v.next_field(0, 0x2401)?;
        let r = BinaryReader::new(f0, endian);
        Ok(Self { obj: TypeObj::from(r.read32(0)?) })
    }
}
