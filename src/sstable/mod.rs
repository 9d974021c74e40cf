//! # SST (sorted string table)
//!
//! An SST is an immutable, fixed-size file produced by flushing a WAL
//! (§4.6). Its layout packs from both ends:
//!
//! ```text
//! [metadata header]           (kind=Index, aggregate first/last key, chunk count)
//! [sparse index]               count * (offset, first_key, last_key)
//! [zero padding]
//! ...chunks, written high to low from the end of the file...
//! ```
//!
//! The metadata and index sit at low file offsets so a reader can load them
//! with a single small read (or, here, a single mmap); chunks sit at the
//! high offsets because the writer does not know their total size until it
//! has serialized them.
//!
//! [`SstIndex`] is the read side: it memory-maps the file, keeps the sparse
//! index in memory, and demand-decodes one chunk at a time to answer a
//! lookup. [`builder::SstWriter`] is the write side.

pub mod builder;

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use thiserror::Error;

use crate::chunk::{Chunk, ChunkError, ChunkKind, ChunkMeta};
use crate::data_kind::DataKind;
use crate::encoding::{Decode, Encode, EncodingError};

pub use builder::SstWriter;

/// Errors raised while building or reading an SST.
#[derive(Debug, Error)]
pub enum SstableError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("sstable encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("sstable metadata tagged {found:?}, expected Index")]
    WrongKind { found: ChunkKind },

    #[error("sstable index entry {index} points past end of file (offset {offset}, len {len})")]
    OffsetOutOfRange { index: usize, offset: u64, len: usize },
}

/// One sparse index slot: the chunk's file offset and its key bounds (§4.6
/// step 4). No `op`/size field — unlike [`crate::record::Pointer`], this
/// locates a whole chunk, not a single record.
#[derive(Debug, Clone)]
struct SstIndexEntry<D: DataKind> {
    offset: u64,
    first_key: D::Key,
    last_key: D::Key,
}

impl<D: DataKind> SstIndexEntry<D> {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.offset.encode_to(buf)?;
        D::serialize_key(&self.first_key, buf)?;
        D::serialize_key(&self.last_key, buf)?;
        Ok(())
    }

    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (offset, mut consumed) = u64::decode_from(buf)?;
        let (first_key, n) = D::deserialize_key(&buf[consumed..])?;
        consumed += n;
        let (last_key, n) = D::deserialize_key(&buf[consumed..])?;
        consumed += n;
        Ok((
            Self {
                offset,
                first_key,
                last_key,
            },
            consumed,
        ))
    }

    fn covers(&self, key: &D::Key) -> bool {
        D::compare_key(&self.first_key, key) != std::cmp::Ordering::Greater
            && D::compare_key(key, &self.last_key) != std::cmp::Ordering::Greater
    }
}

/// A memory-mapped, read-only view of one SST (§4.7).
pub struct SstIndex<D: DataKind> {
    path: std::path::PathBuf,
    mmap: Mmap,
    first_key: D::Key,
    last_key: D::Key,
    entries: Vec<SstIndexEntry<D>>,
    max_chunk_values: usize,
}

impl<D: DataKind> SstIndex<D> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn first_key(&self) -> &D::Key {
        &self.first_key
    }

    pub fn last_key(&self) -> &D::Key {
        &self.last_key
    }

    pub fn chunk_count(&self) -> usize {
        self.entries.len()
    }

    /// Maps, parses the header and sparse index, and keeps the file handle
    /// alive for the lifetime of the returned value.
    pub fn open(path: impl AsRef<Path>, max_chunk_values: usize) -> Result<Self, SstableError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        // Safety: the file is immutable by convention (an SST is never
        // reopened for writing once built) and lives for as long as `self`.
        let mmap = unsafe { Mmap::map(&file)? };

        let (meta, consumed): (ChunkMeta<D>, usize) = crate::chunk::read_meta_header(&mmap)?;
        if !matches!(meta.kind, ChunkKind::Index) {
            return Err(SstableError::WrongKind { found: meta.kind });
        }

        let mut offset = consumed;
        let mut entries = Vec::with_capacity(meta.count as usize);
        for _ in 0..meta.count {
            let (entry, n) = SstIndexEntry::<D>::decode_from(&mmap[offset..])?;
            offset += n;
            entries.push(entry);
        }

        Ok(Self {
            path,
            mmap,
            first_key: meta.first_key,
            last_key: meta.last_key,
            entries,
            max_chunk_values,
        })
    }

    /// `first_key <= key <= last_key` (§4.7).
    pub fn is_between(&self, key: &D::Key) -> bool {
        D::compare_key(&self.first_key, key) != std::cmp::Ordering::Greater
            && D::compare_key(key, &self.last_key) != std::cmp::Ordering::Greater
    }

    /// Binary search over the sparse index, then over the decoded chunk's
    /// records. Returns a clone of the matching record, tombstones included.
    pub fn find(&self, key: &D::Key) -> Result<Option<D>, SstableError> {
        if !self.is_between(key) {
            return Ok(None);
        }

        let idx = match self
            .entries
            .partition_point(|e| D::compare_key(&e.first_key, key) != std::cmp::Ordering::Greater)
            .checked_sub(1)
        {
            Some(idx) => idx,
            None => return Ok(None),
        };

        let entry = &self.entries[idx];
        if !entry.covers(key) {
            return Ok(None);
        }

        let chunk = self.read_chunk_at(idx)?;
        let found = chunk
            .records()
            .binary_search_by(|r| D::compare_key(D::key_of(r), key))
            .ok()
            .map(|i| chunk.records()[i].clone());
        Ok(found)
    }

    fn read_chunk_at(&self, entry_index: usize) -> Result<Chunk<D>, SstableError> {
        let entry = &self.entries[entry_index];
        let offset = entry.offset as usize;
        if offset >= self.mmap.len() {
            return Err(SstableError::OffsetOutOfRange {
                index: entry_index,
                offset: entry.offset,
                len: self.mmap.len(),
            });
        }
        let (chunk, _meta, _consumed) =
            Chunk::<D>::read(self.max_chunk_values, true, &self.mmap[offset..])?;
        Ok(chunk)
    }

    /// Records across the whole SST, ascending by key (§4.7, used by
    /// compaction). Chunks are non-overlapping and already key-sorted by
    /// construction (see [`builder::SstWriter::build`]), so concatenating
    /// them in index order is sufficient.
    pub fn iter_records(&self) -> Result<Vec<D>, SstableError> {
        let mut out = Vec::new();
        for i in 0..self.entries.len() {
            let chunk = self.read_chunk_at(i)?;
            out.extend(chunk.records().iter().cloned());
        }
        Ok(out)
    }

    /// Drops the mapping and file handle. Provided for symmetry with §4.7;
    /// equivalent to letting `self` go out of scope.
    pub fn close(self) {}
}
