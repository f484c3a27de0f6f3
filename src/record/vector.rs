//! A single change vector within a record: opcode, envelope fields, and a
//! padded field table (§3, §4.4).

use bytes::Bytes;

use crate::error::FramingError;
use crate::io::{BinaryReader, Endianness};
use crate::record::header::RecordVersion;
use crate::types::{Dba, Scn, Seq};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpCode {
    pub layer: u8,
    pub sub: u8,
}

impl OpCode {
    pub fn new(layer: u8, sub: u8) -> Self {
        Self { layer, sub }
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.layer, self.sub)
    }
}

#[derive(Debug, Clone)]
pub struct VectorHeader {
    pub opcode: OpCode,
    pub class: u16,
    pub afn: u16,
    pub dba: Dba,
    pub scn_record: Scn,
    pub seq: Seq,
    pub typ: u8,
    pub con_id: Option<u32>,
    pub flg_record: Option<u16>,
}

impl VectorHeader {
    /// Size in bytes of the fixed envelope preceding the field table,
    /// version-dependent because 12.1 added `con_id`/`flg_record` (§4.4).
    fn envelope_size(version: RecordVersion) -> usize {
        match version {
            RecordVersion::Pre12_1 => 16,
            RecordVersion::V12_1Plus => 22,
        }
    }
}

/// A fully-split vector: its envelope plus each field's bytes, sliced
/// directly out of the owning record so no field is copied twice.
#[derive(Debug, Clone)]
pub struct ChangeVector {
    pub header: VectorHeader,
    pub fields: Vec<Bytes>,
    /// Total size, in bytes, this vector occupies within its record —
    /// callers advance their cursor by exactly this much.
    pub vector_size: usize,
}

impl ChangeVector {
    /// Bounds-checked field access (§4.4): decoders read fields through this
    /// rather than indexing `fields` directly, so a short field table
    /// surfaces as `DecodeError::TruncatedField` carrying the caller's own
    /// diagnostic `code` rather than a bare `None`.
    pub fn next_field(&self, index: usize, code: u32) -> Result<&[u8], crate::error::DecodeError> {
        self.next_field_opt(index).ok_or(crate::error::DecodeError::TruncatedField { code, need: index + 1, have: self.fields.len() })
    }

    pub fn next_field_opt(&self, index: usize) -> Option<&[u8]> {
        self.fields.get(index).map(|b| b.as_ref())
    }

    /// Parses one vector starting at byte 0 of `buf` (a view into the
    /// record starting at this vector), returning the vector and its total
    /// size. `remaining_record_size` bounds the field table against
    /// running past the end of the record (§4.4 step 3).
    pub fn decode(
        buf: &Bytes,
        endian: Endianness,
        version: RecordVersion,
        remaining_record_size: usize,
    ) -> Result<Self, FramingError> {
        let envelope_size = VectorHeader::envelope_size(version);
        if buf.len() < envelope_size + 2 {
            return Err(FramingError::FieldTableOutOfBounds { position: buf.len(), record_size: remaining_record_size });
        }
        let r = BinaryReader::new(buf, endian);
        let to_framing = |e: crate::error::DecodeError| FramingError::InvalidLwnHeader(e.to_string());

        let layer = buf[0];
        let sub = buf[1];
        let class = r.read16(2).map_err(to_framing)?;
        let afn = r.read16(4).map_err(to_framing)?;
        let dba = Dba::from(r.read32(6).map_err(to_framing)?);
        let scn_record = r.read_scn_r(10).map_err(to_framing)?;
        let seq = Seq::from(r.read16(16).map_err(to_framing)? as u32);
        let typ = buf[18];
        let (con_id, flg_record) = if version == RecordVersion::V12_1Plus {
            (Some(r.read32(envelope_size - 6).map_err(to_framing)?), Some(r.read16(envelope_size - 2).map_err(to_framing)?))
        } else {
            (None, None)
        };

        let field_cnt_raw = r.read16(envelope_size).map_err(to_framing)?;
        if field_cnt_raw < 2 {
            return Err(FramingError::FieldTableOutOfBounds { position: envelope_size, record_size: remaining_record_size });
        }
        let field_count = (field_cnt_raw / 2 - 1) as usize;

        let table_header_len = 2 + field_count * 2;
        let mut field_sizes = Vec::with_capacity(field_count);
        for i in 0..field_count {
            let at = envelope_size + 2 + i * 2;
            field_sizes.push(r.read16(at).map_err(to_framing)? as usize);
        }

        let fields_start = envelope_size + round_up_4(table_header_len);
        if fields_start > remaining_record_size {
            return Err(FramingError::FieldTableOutOfBounds { position: fields_start, record_size: remaining_record_size });
        }

        let mut fields = Vec::with_capacity(field_count);
        let mut cursor = fields_start;
        for size in &field_sizes {
            let padded = round_up_4(*size);
            if cursor + padded > remaining_record_size || cursor + padded > buf.len() {
                return Err(FramingError::FieldTableOutOfBounds { position: cursor + padded, record_size: remaining_record_size });
            }
            fields.push(buf.slice(cursor..cursor + size));
            cursor += padded;
        }

        let vector_size = cursor;
        let header = VectorHeader { opcode: OpCode::new(layer, sub), class, afn, dba, scn_record, seq, typ, con_id, flg_record };
        Ok(Self { header, fields, vector_size })
    }
}

pub(crate) fn round_up_4(n: usize) -> usize {
    (n + 3) & !3
}
