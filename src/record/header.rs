//! Record header (§3): the >=24-byte preamble every record carries before
//! its vectors.

use bytes::Bytes;

use crate::error::{DecodeError, FramingError};
use crate::io::{BinaryReader, Endianness};
use crate::types::{Scn, SubScn};

/// Pre-12.1 records pack vectors starting at byte 24; 12.1 widened the
/// vector header (added `con_id`/`flg_record`, §4.4) and pushed the start to
/// byte 32. Which applies is a property of the redo stream, not of any one
/// record, so callers pass it in rather than sniffing it per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordVersion {
    Pre12_1,
    V12_1Plus,
}

impl RecordVersion {
    pub fn vectors_start(self) -> usize {
        match self {
            RecordVersion::Pre12_1 => 24,
            RecordVersion::V12_1Plus => 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub size: u32,
    pub vld: u8,
    pub scn: Scn,
    pub sub_scn: SubScn,
    pub con_uid: Option<u32>,
}

const HAS_CON_UID: u8 = 0x08;

impl RecordHeader {
    /// Decodes the fixed header fields. The remaining bytes up to
    /// `version.vectors_start()` are reserved padding this crate never
    /// interprets.
    pub fn decode(buf: &Bytes, endian: Endianness, version: RecordVersion) -> Result<Self, FramingError> {
        if buf.len() < version.vectors_start() {
            return Err(FramingError::TruncatedLwnGroup);
        }
        let r = BinaryReader::new(buf, endian);
        let to_framing = |e: DecodeError| FramingError::InvalidLwnHeader(e.to_string());
        let size = r.read32(0).map_err(to_framing)?;
        let vld = buf[4];
        let scn = r.read_scn(8).map_err(to_framing)?;
        let sub_scn = r.read_sub_scn(14).map_err(to_framing)?;
        let con_uid = if vld & HAS_CON_UID != 0 {
            Some(r.read32(16).map_err(to_framing)?)
        } else {
            None
        };
        if (size as usize) > buf.len() {
            return Err(FramingError::HeaderLargerThanRecord {
                header_size: version.vectors_start(),
                record_size: buf.len(),
            });
        }
        Ok(Self { size, vld, scn, sub_scn, con_uid })
    }
}
