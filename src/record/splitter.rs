//! Splits one record into its sequence of change vectors (§4.4).

use bytes::Bytes;

use crate::error::FramingError;
use crate::io::Endianness;
use crate::record::header::{RecordHeader, RecordVersion};
use crate::record::vector::ChangeVector;

pub struct RecordSplitter {
    endian: Endianness,
    version: RecordVersion,
}

impl RecordSplitter {
    pub fn new(endian: Endianness, version: RecordVersion) -> Self {
        Self { endian, version }
    }

    pub fn split(&self, record: Bytes) -> Result<Vec<ChangeVector>, FramingError> {
        let header = RecordHeader::decode(&record, self.endian, self.version)?;
        let record_size = header.size as usize;
        if record_size > record.len() {
            return Err(FramingError::HeaderLargerThanRecord { header_size: self.version.vectors_start(), record_size });
        }

        let mut cursor = self.version.vectors_start();
        let mut vectors = Vec::new();
        while cursor < record_size {
            let remaining = record_size - cursor;
            let view = record.slice(cursor..record_size);
            let vector = ChangeVector::decode(&view, self.endian, self.version, remaining)?;
            cursor += vector.vector_size;
            vectors.push(vector);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::vector::round_up_4;
    use crate::types::Scn;

    fn build_record(vectors: &[&[u8]]) -> Vec<u8> {
        let mut buf = vec![0u8; 24];
        for v in vectors {
            buf.extend_from_slice(v);
        }
        let size = buf.len() as u32;
        buf[0..4].copy_from_slice(&size.to_le_bytes());
        buf[8..12].copy_from_slice(&Scn::new(10).get().to_le_bytes()[0..4]);
        buf
    }

    fn build_vector(layer: u8, sub: u8, fields: &[&[u8]]) -> Vec<u8> {
        let envelope_size = 16;
        let field_count = fields.len();
        let field_cnt_raw = ((field_count + 1) * 2) as u16;
        let mut buf = vec![0u8; envelope_size];
        buf[0] = layer;
        buf[1] = sub;
        buf.extend_from_slice(&field_cnt_raw.to_le_bytes());
        for f in fields {
            buf.extend_from_slice(&(f.len() as u16).to_le_bytes());
        }
        let table_header_len = 2 + field_count * 2;
        let pad = round_up_4(table_header_len) - table_header_len;
        buf.extend(std::iter::repeat(0).take(pad));
        for f in fields {
            buf.extend_from_slice(f);
            let padded = round_up_4(f.len());
            buf.extend(std::iter::repeat(0).take(padded - f.len()));
        }
        buf
    }

    #[test]
    fn splits_multiple_vectors_in_order() {
        let v1 = build_vector(5, 2, &[b"a"]);
        let v2 = build_vector(5, 4, &[b"bb"]);
        let record = build_record(&[&v1, &v2]);
        let splitter = RecordSplitter::new(Endianness::Little, RecordVersion::Pre12_1);
        let vectors = splitter.split(Bytes::from(record)).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].header.opcode.layer, 5);
        assert_eq!(vectors[0].header.opcode.sub, 2);
        assert_eq!(vectors[1].header.opcode.sub, 4);
    }
}
