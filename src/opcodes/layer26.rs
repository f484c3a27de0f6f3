//! Layer 26: KDLI LOB-data vectors (§4.5). `26.2`/`26.6` share one
//! `kdli_common` envelope followed by a stream of sub-records keyed by a
//! `code` byte.

use bytes::Bytes;

use crate::error::DecodeError;
use crate::io::{BinaryReader, Endianness};
use crate::record::ChangeVector;
use crate::types::{Dba, LobId, Xid};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdliOp {
    Redo,
    Undo,
    Cr,
    Frmt,
    Invl,
    Load,
    Bimg,
    Sinv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdliType {
    New,
    Lock,
    Lhb,
    Data,
    Btree,
    Itree,
    Aux,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdliCode {
    Info,
    LoadCommon,
    LoadData,
    Zero,
    Fill,
    Lmap,
    Lmapx,
    Suplog,
    Gmap,
    Fpload,
    LoadLhb,
    Almap,
    Almapx,
    LoadItree,
    Imap,
    Imapx,
}

impl KdliCode {
    fn from_raw(code: u8) -> Result<Self, DecodeError> {
        Ok(match code {
            0 => KdliCode::Info,
            1 => KdliCode::LoadCommon,
            2 => KdliCode::LoadData,
            3 => KdliCode::Zero,
            4 => KdliCode::Fill,
            5 => KdliCode::Lmap,
            6 => KdliCode::Lmapx,
            7 => KdliCode::Suplog,
            8 => KdliCode::Gmap,
            9 => KdliCode::Fpload,
            10 => KdliCode::LoadLhb,
            11 => KdliCode::Almap,
            12 => KdliCode::Almapx,
            13 => KdliCode::LoadItree,
            14 => KdliCode::Imap,
            15 => KdliCode::Imapx,
            other => return Err(DecodeError::UnknownKdliCode(other)),
        })
    }
}

#[derive(Debug, Clone)]
pub struct KdliCommon {
    pub op: KdliOp,
    pub typ: KdliType,
    pub psiz: u32,
    pub poff: u32,
    pub dba: Dba,
}

#[derive(Debug, Clone)]
pub struct KdliSubRecord {
    pub code: KdliCode,
    pub lob_id: Option<LobId>,
    pub lob_page_no: Option<u32>,
    pub lob_offset: Option<u32>,
    pub lob_data: Option<Bytes>,
    pub xid: Option<Xid>,
}

#[derive(Debug, Clone)]
pub struct KdliVector {
    pub common: KdliCommon,
    pub sub_records: Vec<KdliSubRecord>,
}

fn decode_op(raw: u8) -> Result<KdliOp, DecodeError> {
    Ok(match raw {
        0 => KdliOp::Redo,
        1 => KdliOp::Undo,
        2 => KdliOp::Cr,
        3 => KdliOp::Frmt,
        4 => KdliOp::Invl,
        5 => KdliOp::Load,
        6 => KdliOp::Bimg,
        7 => KdliOp::Sinv,
        other => return Err(DecodeError::UnknownKdliCode(other)),
    })
}

fn decode_type(raw: u8) -> Result<KdliType, DecodeError> {
    Ok(match raw {
        0 => KdliType::New,
        1 => KdliType::Lock,
        2 => KdliType::Lhb,
        3 => KdliType::Data,
        4 => KdliType::Btree,
        5 => KdliType::Itree,
        6 => KdliType::Aux,
        other => return Err(DecodeError::UnknownKdliCode(other)),
    })
}

impl KdliCommon {
    fn decode(buf: &[u8], endian: Endianness) -> Result<Self, DecodeError> {
        if buf.len() < 14 {
            return Err(DecodeError::TruncatedField { code: 0x2602, need: 14, have: buf.len() });
        }
        let r = BinaryReader::new(buf, endian);
        Ok(Self {
            op: decode_op(buf[0])?,
            typ: decode_type(buf[1])?,
            psiz: r.read32(2)?,
            poff: r.read32(6)?,
            dba: Dba::from(r.read32(10)?),
        })
    }
}

impl KdliSubRecord {
    /// Parses one `{code, len, payload}` sub-record and returns it along
    /// with the number of bytes consumed.
    fn decode(buf: &[u8], endian: Endianness) -> Result<(Self, usize), DecodeError> {
        if buf.len() < 3 {
            return Err(DecodeError::TruncatedField { code: 0x2603, need: 3, have: buf.len() });
        }
        let code = KdliCode::from_raw(buf[0])?;
        let r = BinaryReader::new(buf, endian);
        let len = r.read16(1)? as usize;
        let payload = buf.get(3..3 + len).ok_or(DecodeError::TruncatedField { code: 0x2603, need: 3 + len, have: buf.len() })?;

        let mut record = KdliSubRecord { code, lob_id: None, lob_page_no: None, lob_offset: None, lob_data: None, xid: None };
        match code {
            KdliCode::LoadCommon | KdliCode::LoadData => {
                if payload.len() >= 18 {
                    let pr = BinaryReader::new(payload, endian);
                    record.lob_id = LobId::from_bytes(&payload[0..10]);
                    record.lob_page_no = pr.read32(10).ok();
                    record.lob_offset = pr.read32(14).ok();
                    record.lob_data = Some(Bytes::copy_from_slice(&payload[18.min(payload.len())..]));
                }
            }
            KdliCode::Suplog | KdliCode::Fpload => {
                if payload.len() >= 8 {
                    let pr = BinaryReader::new(payload, endian);
                    record.xid = pr.read_xid(0).ok();
                }
            }
            _ => {}
        }
        Ok((record, 3 + len))
    }
}

impl KdliVector {
    pub fn decode(v: &ChangeVector, endian: Endianness) -> Result<Self, DecodeError> {
        let f0 = v.next_field(0, 0x2602)?;
        let common = KdliCommon::decode(f0, endian)?;

        let mut sub_records = Vec::new();
        if let Some(f1) = v.next_field_opt(1) {
            let mut cursor = 0;
            while cursor < f1.len() {
                let (record, consumed) = KdliSubRecord::decode(&f1[cursor..], endian)?;
                sub_records.push(record);
                cursor += consumed;
            }
        }
        Ok(Self { common, sub_records })
    }
}
