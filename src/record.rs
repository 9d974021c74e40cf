//! # Record envelope & Pointer
//!
//! [`write_record`]/[`read_record`] implement the generic framing of §4.3:
//! `op:u8 | payload_len:u64 | payload_bytes`, where `payload_bytes` is
//! produced by the [`DataKind`] itself and never includes the `op` byte.
//! Hoisting `op` and a length prefix out of the DataKind-specific payload
//! lets chunk/WAL code skip a record it cannot otherwise interpret.
//!
//! [`Pointer`] is the index slot used by an SST: `op:u8 | key (DataKind
//! key encoding) | offset:u64` (§6.6) — enough to locate a record's payload
//! without reading it.

use std::marker::PhantomData;

use thiserror::Error;

use crate::data_kind::{DataKind, Op};
use crate::encoding::{Decode, Encode, EncodingError};

/// Errors raised while framing or parsing a [`Record`]/[`Pointer`] envelope.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("corrupt record: declared payload length {declared} does not match decoded length {decoded}")]
    Corrupt { declared: usize, decoded: usize },
}

/// Writes one record using the generic envelope described in §4.3.
pub fn write_record<D: DataKind>(record: &D, buf: &mut Vec<u8>) -> Result<(), RecordError> {
    let op = D::op_of(record);
    let mut payload = Vec::new();
    D::serialize_payload(record, &mut payload)?;

    op.encode_to(buf)?;
    (payload.len() as u64).encode_to(buf)?;
    buf.extend_from_slice(&payload);
    Ok(())
}

/// Reads one record previously written by [`write_record`].
///
/// Returns `(record, bytes_consumed)`. A mismatch between the declared
/// `payload_len` and what the DataKind actually consumed is reported as
/// [`RecordError::Corrupt`] rather than silently accepted (§4.3).
pub fn read_record<D: DataKind>(buf: &[u8]) -> Result<(D, usize), RecordError> {
    let (op, mut offset) = Op::decode_from(buf)?;
    let (payload_len, consumed) = u64::decode_from(&buf[offset..])?;
    offset += consumed;
    let payload_len = payload_len as usize;

    if buf.len() < offset + payload_len {
        return Err(RecordError::Encoding(EncodingError::UnexpectedEof {
            needed: offset + payload_len,
            available: buf.len(),
        }));
    }

    let payload = &buf[offset..offset + payload_len];
    let (record, payload_consumed) = D::deserialize_payload(op, payload)?;
    if payload_consumed != payload_len {
        return Err(RecordError::Corrupt {
            declared: payload_len,
            decoded: payload_consumed,
        });
    }

    offset += payload_len;
    Ok((record, offset))
}

/// An index slot inside an SST: locates a record's payload by key without
/// reading it (§6.6).
#[derive(Debug, Clone)]
pub struct Pointer<D: DataKind> {
    pub op: Op,
    pub key: D::Key,
    pub offset: u64,
    _kind: PhantomData<D>,
}

impl<D: DataKind> Pointer<D> {
    pub fn new(op: Op, key: D::Key, offset: u64) -> Self {
        Self {
            op,
            key,
            offset,
            _kind: PhantomData,
        }
    }
}

impl<D: DataKind> Encode for Pointer<D> {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.op.encode_to(buf)?;
        D::serialize_key(&self.key, buf)?;
        self.offset.encode_to(buf)
    }
}

impl<D: DataKind> Decode for Pointer<D> {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (op, mut offset) = Op::decode_from(buf)?;
        let (key, consumed) = D::deserialize_key(&buf[offset..])?;
        offset += consumed;
        let (file_offset, consumed) = u64::decode_from(&buf[offset..])?;
        offset += consumed;
        Ok((Pointer::new(op, key, file_offset), offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_kind::KvEntry;

    #[test]
    fn record_round_trips_byte_for_byte() {
        let record = KvEntry::upsert(b"k".to_vec(), b"v".to_vec(), 42);
        let mut buf = Vec::new();
        write_record(&record, &mut buf).unwrap();

        let (decoded, consumed) = read_record::<KvEntry>(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, record);
    }

    #[test]
    fn delete_record_round_trips() {
        let record = KvEntry::delete(b"k".to_vec(), 7);
        let mut buf = Vec::new();
        write_record(&record, &mut buf).unwrap();

        let (decoded, _) = read_record::<KvEntry>(&buf).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn read_record_rejects_truncated_payload() {
        let record = KvEntry::upsert(b"k".to_vec(), b"v".to_vec(), 1);
        let mut buf = Vec::new();
        write_record(&record, &mut buf).unwrap();
        buf.truncate(buf.len() - 1);

        assert!(read_record::<KvEntry>(&buf).is_err());
    }

    #[test]
    fn pointer_round_trips() {
        let pointer: Pointer<KvEntry> = Pointer::new(Op::Upsert, b"k".to_vec(), 1234);
        let mut buf = Vec::new();
        pointer.encode_to(&mut buf).unwrap();

        let (decoded, consumed) = Pointer::<KvEntry>::decode_from(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded.op, pointer.op);
        assert_eq!(decoded.key, pointer.key);
        assert_eq!(decoded.offset, pointer.offset);
    }
}
