//! # DataKind capability
//!
//! The engine core (chunk, WAL, SST writer/reader) is written once against
//! the [`DataKind`] trait rather than against one concrete record shape.
//! A `DataKind` supplies everything those layers need to serialize a record,
//! project its key, and order two records for on-disk placement.
//!
//! Only one instance is built here — [`KvDataKind`], variable-length byte
//! key/value pairs tagged with an [`Op`] and a nanosecond timestamp. A second
//! instance (fixed-width timestamped samples) would implement the same trait
//! without touching any of `chunk`, `wal`, `sstable`, or `engine`.

use crate::encoding::{Decode, Encode, EncodingError};

/// The operation an entry records.
///
/// `Skip` is a sentinel: it is the value of a default-constructed key bound
/// (e.g. a chunk with no records yet) and must never be persisted as part of
/// real user data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Op {
    Upsert = 0,
    Delete = 1,
    Skip = 2,
}

impl Op {
    fn from_tag(tag: u8) -> Result<Self, EncodingError> {
        match tag {
            0 => Ok(Op::Upsert),
            1 => Ok(Op::Delete),
            2 => Ok(Op::Skip),
            other => Err(EncodingError::InvalidTag {
                tag: other as u32,
                type_name: "Op",
            }),
        }
    }
}

impl Encode for Op {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        buf.push(*self as u8);
        Ok(())
    }
}

impl Decode for Op {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (tag, consumed) = u8::decode_from(buf)?;
        Ok((Op::from_tag(tag)?, consumed))
    }
}

/// A capability set over a concrete record shape `T` with key type `Key`.
///
/// Implementations must provide a strict weak order via [`DataKind::cmp_records`]
/// that breaks ties on key first, then on the auxiliary `op` field, so that
/// readers and writers of a chunk agree on its sorted form (§4.1, §4.4).
pub trait DataKind: Sized + Clone + std::fmt::Debug {
    /// The key type projected out of a record.
    type Key: Ord + Clone + std::fmt::Debug;

    /// Serializes the key alone (used for chunk/SST metadata fields).
    fn serialize_key(key: &Self::Key, buf: &mut Vec<u8>) -> Result<(), EncodingError>;

    /// Deserializes a key previously written by [`DataKind::serialize_key`].
    fn deserialize_key(buf: &[u8]) -> Result<(Self::Key, usize), EncodingError>;

    /// Three-way key comparison, used by the SST index's binary search.
    fn compare_key(a: &Self::Key, b: &Self::Key) -> std::cmp::Ordering {
        a.cmp(b)
    }

    /// The key an entry's comparisons and lookups are performed against.
    fn key_of(record: &Self) -> &Self::Key;

    /// The operation tag driving the tie-break in [`DataKind::cmp_records`].
    fn op_of(record: &Self) -> Op;

    /// Serializes everything about `record` *except* its `op` tag — the
    /// generic record envelope (§4.3) hoists `op` into its own leading byte
    /// so the chunk/WAL framing can skip a record without understanding
    /// this DataKind's payload layout.
    fn serialize_payload(record: &Self, buf: &mut Vec<u8>) -> Result<(), EncodingError>;

    /// Inverse of [`DataKind::serialize_payload`]; `op` is supplied by the
    /// caller since it was decoded from the generic envelope.
    fn deserialize_payload(op: Op, buf: &[u8]) -> Result<(Self, usize), EncodingError>;

    /// Orders two records for on-disk placement within a chunk: key ascending,
    /// then `op` ordinal ascending (`Upsert` < `Delete` < `Skip`).
    fn cmp_records(a: &Self, b: &Self) -> std::cmp::Ordering {
        Self::compare_key(Self::key_of(a), Self::key_of(b)).then_with(|| Self::op_of(a).cmp(&Self::op_of(b)))
    }

    /// A key strictly less than any key this `DataKind` will ever serialize
    /// for real data, used to initialize an empty chunk's/WAL's key bounds.
    fn min_key_sentinel() -> Self::Key;

    /// A key strictly greater than any key this `DataKind` will ever
    /// serialize for real data, used to initialize an empty chunk's/WAL's
    /// key bounds before the first record arrives.
    fn max_key_sentinel() -> Self::Key;
}

/// The built-in DataKind: variable-length byte keys and values, an [`Op`]
/// tag, and a signed 128-bit nanosecond timestamp (§6.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub op: Op,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub timestamp: i128,
}

impl KvEntry {
    pub fn upsert(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, timestamp: i128) -> Self {
        Self {
            op: Op::Upsert,
            key: key.into(),
            value: value.into(),
            timestamp,
        }
    }

    pub fn delete(key: impl Into<Vec<u8>>, timestamp: i128) -> Self {
        Self {
            op: Op::Delete,
            key: key.into(),
            value: Vec::new(),
            timestamp,
        }
    }
}

impl DataKind for KvEntry {
    type Key = Vec<u8>;

    fn serialize_key(key: &Self::Key, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        let len = u16::try_from(key.len())
            .map_err(|_| EncodingError::LengthOverflow(format!("key length {} exceeds u16::MAX", key.len())))?;
        len.encode_to(buf)?;
        buf.extend_from_slice(key);
        Ok(())
    }

    fn deserialize_key(buf: &[u8]) -> Result<(Self::Key, usize), EncodingError> {
        let (len, mut offset) = u16::decode_from(buf)?;
        let len = len as usize;
        if buf.len() < offset + len {
            return Err(EncodingError::UnexpectedEof {
                needed: offset + len,
                available: buf.len(),
            });
        }
        let key = buf[offset..offset + len].to_vec();
        offset += len;
        Ok((key, offset))
    }

    fn key_of(record: &Self) -> &Self::Key {
        &record.key
    }

    fn op_of(record: &Self) -> Op {
        record.op
    }

    fn serialize_payload(record: &Self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        record.timestamp.encode_to(buf)?;
        Self::serialize_key(&record.key, buf)?;
        let value_len = u16::try_from(record.value.len()).map_err(|_| {
            EncodingError::LengthOverflow(format!(
                "value length {} exceeds u16::MAX",
                record.value.len()
            ))
        })?;
        value_len.encode_to(buf)?;
        buf.extend_from_slice(&record.value);
        Ok(())
    }

    fn deserialize_payload(op: Op, buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (timestamp, mut offset) = i128::decode_from(buf)?;
        let (key, consumed) = Self::deserialize_key(&buf[offset..])?;
        offset += consumed;
        let (value_len, consumed) = u16::decode_from(&buf[offset..])?;
        offset += consumed;
        let value_len = value_len as usize;
        if buf.len() < offset + value_len {
            return Err(EncodingError::UnexpectedEof {
                needed: offset + value_len,
                available: buf.len(),
            });
        }
        let value = buf[offset..offset + value_len].to_vec();
        offset += value_len;
        Ok((
            KvEntry {
                op,
                key,
                value,
                timestamp,
            },
            offset,
        ))
    }

    fn min_key_sentinel() -> Self::Key {
        Vec::new()
    }

    fn max_key_sentinel() -> Self::Key {
        vec![0xFF; 256]
    }
}
