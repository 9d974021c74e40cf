//! # Chunk
//!
//! A [`Chunk`] is a bounded, in-memory ordered batch of up to `MAX_VALUES`
//! records (§4.4). It is the unit of persistence for both the WAL (§6.1,
//! written without metadata) and the SST (§6.4, written with metadata so
//! each chunk is self-describing).

use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::data_kind::DataKind;
use crate::encoding::{Decode, Encode, EncodingError};
use crate::record::{self, RecordError};

/// Magic value prefixing chunk metadata, guarding against misreading an
/// arbitrary byte offset as a chunk header.
pub const CHUNK_META_MAGIC: u16 = 0x434B; // "CK"

/// Marks which container a chunk's metadata was written for — a chunk
/// carries this tag so a reader can sanity-check it was read from the
/// container type it expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkKind {
    Wal = 0,
    Index = 1,
}

impl ChunkKind {
    fn from_tag(tag: u8) -> Result<Self, EncodingError> {
        match tag {
            0 => Ok(ChunkKind::Wal),
            1 => Ok(ChunkKind::Index),
            other => Err(EncodingError::InvalidTag {
                tag: other as u32,
                type_name: "ChunkKind",
            }),
        }
    }
}

impl Encode for ChunkKind {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        buf.push(*self as u8);
        Ok(())
    }
}

impl Decode for ChunkKind {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (tag, consumed) = u8::decode_from(buf)?;
        Ok((ChunkKind::from_tag(tag)?, consumed))
    }
}

/// A short, non-cryptographic identifier stamped into chunk metadata for
/// diagnostics. Not used for correctness — recovery identifies chunks by
/// position and CRC, never by this id.
fn next_chunk_id() -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let counter = COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!(
        "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
        (nanos >> 32) as u32,
        (nanos >> 16) as u16,
        nanos as u16,
        (counter >> 16) as u16,
        (counter as u64) | ((nanos & 0xFFFF_FFFF) << 16)
    )
}

/// Errors produced while appending to, writing, or reading a [`Chunk`].
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("chunk is full (max {max} records)")]
    ChunkFull { max: usize },

    #[error("chunk metadata magic mismatch: expected {expected:04x}, found {found:04x}")]
    BadMagic { expected: u16, found: u16 },

    #[error("chunk record encoding error: {0}")]
    Record(#[from] RecordError),

    #[error("chunk encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error(
        "chunk size mismatch: header declared {declared} bytes, body occupies {actual} bytes"
    )]
    SizeMismatch { declared: u64, actual: u64 },
}

/// Metadata describing a chunk, present on disk only when the chunk is
/// written with `include_metadata = true` (§6.3).
#[derive(Debug, Clone)]
pub struct ChunkMeta<D: DataKind> {
    pub kind: ChunkKind,
    pub id: String,
    pub count: u64,
    pub first_key: D::Key,
    pub last_key: D::Key,
}

/// Writes the `magic | kind | id | count | first_key | last_key` header
/// shared by a self-describing chunk (§6.3) and an SST's top-of-file
/// metadata (§6.4, which reuses this layout but is not itself a chunk — no
/// trailing `size` word follows it).
pub(crate) fn write_meta_header<D: DataKind>(
    kind: ChunkKind,
    count: u64,
    first_key: &D::Key,
    last_key: &D::Key,
    buf: &mut Vec<u8>,
) -> Result<(), ChunkError> {
    CHUNK_META_MAGIC.encode_to(buf)?;
    kind.encode_to(buf)?;
    let id = next_chunk_id();
    buf.extend_from_slice(id.as_bytes());
    count.encode_to(buf)?;
    D::serialize_key(first_key, buf)?;
    D::serialize_key(last_key, buf)?;
    Ok(())
}

/// Inverse of [`write_meta_header`]. Returns `(meta, bytes_consumed)`.
pub(crate) fn read_meta_header<D: DataKind>(
    buf: &[u8],
) -> Result<(ChunkMeta<D>, usize), ChunkError> {
    let mut offset = 0usize;

    let (magic, consumed) = u16::decode_from(buf)?;
    offset += consumed;
    if magic != CHUNK_META_MAGIC {
        return Err(ChunkError::BadMagic {
            expected: CHUNK_META_MAGIC,
            found: magic,
        });
    }

    let (kind, consumed) = ChunkKind::decode_from(&buf[offset..])?;
    offset += consumed;

    if buf.len() < offset + 36 {
        return Err(ChunkError::Encoding(EncodingError::UnexpectedEof {
            needed: offset + 36,
            available: buf.len(),
        }));
    }
    let id = String::from_utf8_lossy(&buf[offset..offset + 36]).into_owned();
    offset += 36;

    let (count, consumed) = u64::decode_from(&buf[offset..])?;
    offset += consumed;

    let (first_key, consumed) = D::deserialize_key(&buf[offset..])?;
    offset += consumed;
    let (last_key, consumed) = D::deserialize_key(&buf[offset..])?;
    offset += consumed;

    Ok((
        ChunkMeta {
            kind,
            id,
            count,
            first_key,
            last_key,
        },
        offset,
    ))
}

/// A bounded, ordered batch of records (§4.4).
#[derive(Debug, Clone)]
pub struct Chunk<D: DataKind> {
    max_values: usize,
    records: Vec<D>,
    /// Cached total byte size from the most recent `write`, including the
    /// trailing `size` field itself. `None` until the chunk has been
    /// written at least once.
    cached_size: Option<u64>,
}

impl<D: DataKind> Chunk<D> {
    pub fn new(max_values: usize) -> Self {
        Self {
            max_values,
            records: Vec::new(),
            cached_size: None,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.max_values
    }

    pub fn records(&self) -> &[D] {
        &self.records
    }

    /// Cached size in bytes from the last `write` call, if any.
    pub fn cached_size(&self) -> Option<u64> {
        self.cached_size
    }

    /// Appends `record`, failing with [`ChunkError::ChunkFull`] once
    /// `max_values` is reached. No partial state on failure.
    pub fn append(&mut self, record: D) -> Result<(), ChunkError> {
        if self.is_full() {
            return Err(ChunkError::ChunkFull {
                max: self.max_values,
            });
        }
        self.records.push(record);
        Ok(())
    }

    /// Sorts a copy by the DataKind's record order, optionally emits
    /// metadata, then the record count, then each record, with a trailing
    /// back-patched `size` word (§4.4, §6.3). Returns total bytes written.
    ///
    /// `self.records` keeps its original append order — the sort is applied
    /// only to the serialized copy — so an in-memory, not-yet-closed chunk
    /// can still resolve same-key duplicates by true recency (see
    /// [`crate::wal`]'s discussion of why this matters for `find`).
    pub fn write(
        &mut self,
        kind: ChunkKind,
        include_metadata: bool,
        buf: &mut Vec<u8>,
    ) -> Result<u64, ChunkError> {
        let mut sorted: Vec<&D> = self.records.iter().collect();
        sorted.sort_by(|a, b| D::cmp_records(a, b));

        let start = buf.len();

        if include_metadata {
            let first_key = sorted
                .first()
                .map(|r| D::key_of(r).clone())
                .unwrap_or_else(D::min_key_sentinel);
            let last_key = sorted
                .last()
                .map(|r| D::key_of(r).clone())
                .unwrap_or_else(D::max_key_sentinel);

            write_meta_header::<D>(kind, sorted.len() as u64, &first_key, &last_key, buf)?;
        }

        // Reserve the trailing `size` word; back-patch once body length is
        // known. On disk, `size` counts only itself plus the records that
        // follow — not the metadata, which a reader has already consumed by
        // the time it reaches this field (see `read`'s `body_end`).
        let size_field_offset = buf.len();
        0u64.encode_to(buf)?;

        for record in &sorted {
            record::write_record(record, buf)?;
        }

        let body_len = (buf.len() - size_field_offset) as u64;
        buf[size_field_offset..size_field_offset + 8].copy_from_slice(&body_len.to_le_bytes());

        // The value returned to the caller (and cached) is the *total*
        // footprint of this write call, metadata included — what an SST
        // writer needs to know how far to step back in the file (§4.6).
        let total_len = (buf.len() - start) as u64;
        self.cached_size = Some(total_len);

        Ok(total_len)
    }

    /// Inverse of [`Chunk::write`]. Reads exactly the bytes `write` produced
    /// (starting at the metadata, or at the `size` word if
    /// `include_metadata = false`). Returns `(chunk, meta, bytes_consumed)`.
    pub fn read(
        max_values: usize,
        include_metadata: bool,
        buf: &[u8],
    ) -> Result<(Self, Option<ChunkMeta<D>>, usize), ChunkError> {
        let mut offset = 0usize;
        let mut meta = None;

        if include_metadata {
            let (decoded_meta, consumed) = read_meta_header::<D>(buf)?;
            offset += consumed;
            meta = Some(decoded_meta);
        }

        let (declared_size, consumed) = u64::decode_from(&buf[offset..])?;
        let size_field_offset = offset;
        offset += consumed;

        let mut records = Vec::new();
        // Records run until `size_field_offset + declared_size` (the size
        // field counts itself, per §6.3).
        let body_end = size_field_offset + declared_size as usize;
        if body_end > buf.len() {
            return Err(ChunkError::Encoding(EncodingError::UnexpectedEof {
                needed: body_end,
                available: buf.len(),
            }));
        }
        while offset < body_end {
            let (record, consumed) = record::read_record::<D>(&buf[offset..body_end])?;
            offset += consumed;
            records.push(record);
        }

        if offset != body_end {
            return Err(ChunkError::SizeMismatch {
                declared: declared_size,
                actual: (offset - size_field_offset) as u64,
            });
        }

        Ok((
            Self {
                max_values,
                records,
                cached_size: Some(offset as u64),
            },
            meta,
            offset,
        ))
    }
}
