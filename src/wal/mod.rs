//! # Write-ahead log
//!
//! [`Wal`] is an append-only, chunked, CRC-protected log (§4.5). Every
//! accepted record is first durably appended to a side journal `C` (the
//! `.chk` file, §6.2) and then buffered into an in-memory `current_chunk`.
//! When that chunk fills, [`Wal::switch_chunk`] serializes it into the
//! primary log `W` (the `.wal` file, §6.1) behind a CRC-32, and a fresh
//! empty chunk begins.
//!
//! `current_chunk` keeps records in true append order (never re-sorted in
//! place — see [`crate::chunk::Chunk::write`]), so [`Wal::find`] can resolve
//! same-key duplicates within an open chunk by genuine recency rather than
//! by on-disk sort order.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher as Crc32;
use thiserror::Error;
use tracing::{debug, warn};

use crate::chunk::{Chunk, ChunkError, ChunkKind};
use crate::data_kind::DataKind;
use crate::record::{self, RecordError};
use crate::sstable::{SstWriter, SstableError};

/// Errors raised by WAL operations (§7).
#[derive(Debug, Error)]
pub enum WalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("record error: {0}")]
    Record(#[from] RecordError),

    #[error("sstable error: {0}")]
    Sstable(#[from] SstableError),

    /// `persist` was called on a WAL with zero records. Translated to
    /// `Ok(None)` at the `SstManager` boundary (§7).
    #[error("persist called on an empty WAL")]
    EmptyWal,
}

/// Outcome of a successful [`Wal::append`] (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The record was durably appended; the WAL has room for more.
    Written,
    /// The record was durably appended, but the WAL has reached
    /// `wal_max_size` — the caller should rotate it via `persist`.
    TableFull,
}

/// A chunked, append-only, recoverable write-ahead log.
pub struct Wal<D: DataKind> {
    wal_path: PathBuf,
    chk_path: PathBuf,
    wal_file: File,
    chk_file: File,
    max_chunk_values: usize,
    wal_max_size: u64,
    current_chunk: Chunk<D>,
    closed_chunks: Vec<Chunk<D>>,
    /// Bytes written to `wal_file` so far (CRC prefixes included).
    bytes_on_disk: u64,
}

impl<D: DataKind> Wal<D> {
    /// Creates a brand-new WAL at `wal_path`/`chk_path`, both of which must
    /// not yet exist.
    pub fn create(
        wal_path: impl AsRef<Path>,
        chk_path: impl AsRef<Path>,
        max_chunk_values: usize,
        wal_max_size: u64,
    ) -> Result<Self, WalError> {
        let wal_file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .append(true)
            .open(&wal_path)?;
        let chk_file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .append(true)
            .open(&chk_path)?;

        Ok(Self {
            wal_path: wal_path.as_ref().to_path_buf(),
            chk_path: chk_path.as_ref().to_path_buf(),
            wal_file,
            chk_file,
            max_chunk_values,
            wal_max_size,
            current_chunk: Chunk::new(max_chunk_values),
            closed_chunks: Vec::new(),
            bytes_on_disk: 0,
        })
    }

    /// Reopens a WAL whose on-disk state was already reconstructed by
    /// [`crate::recovery`] — the closed chunks and any uncommitted current
    /// chunk are handed in directly rather than re-parsed here.
    pub fn reopen_recovered(
        wal_path: impl AsRef<Path>,
        chk_path: impl AsRef<Path>,
        max_chunk_values: usize,
        wal_max_size: u64,
        closed_chunks: Vec<Chunk<D>>,
        current_records: Vec<D>,
    ) -> Result<Self, WalError> {
        let wal_file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&wal_path)?;
        let chk_file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&chk_path)?;

        let bytes_on_disk = wal_file.metadata()?.len();

        let mut current_chunk = Chunk::new(max_chunk_values);
        for record in current_records {
            current_chunk.append(record)?;
        }

        Ok(Self {
            wal_path: wal_path.as_ref().to_path_buf(),
            chk_path: chk_path.as_ref().to_path_buf(),
            wal_file,
            chk_file,
            max_chunk_values,
            wal_max_size,
            current_chunk,
            closed_chunks,
            bytes_on_disk,
        })
    }

    pub fn wal_path(&self) -> &Path {
        &self.wal_path
    }

    pub fn chk_path(&self) -> &Path {
        &self.chk_path
    }

    pub fn is_empty(&self) -> bool {
        self.current_chunk.is_empty() && self.closed_chunks.is_empty()
    }

    pub fn closed_chunk_count(&self) -> usize {
        self.closed_chunks.len()
    }

    /// Appends `record`, durably, to the side journal first (§4.5).
    pub fn append(&mut self, record: D) -> Result<AppendOutcome, WalError> {
        let mut buf = Vec::new();
        record::write_record(&record, &mut buf)?;
        self.chk_file.write_all(&buf)?;
        self.chk_file.sync_data()?;

        self.current_chunk.append(record)?;

        if self.current_chunk.is_full() {
            self.switch_chunk()?;
            if self.bytes_on_disk >= self.wal_max_size {
                return Ok(AppendOutcome::TableFull);
            }
        }

        Ok(AppendOutcome::Written)
    }

    /// Serializes `current_chunk` into the log file behind a CRC-32,
    /// truncates-and-reopens the side journal, and starts a fresh chunk.
    fn switch_chunk(&mut self) -> Result<(), WalError> {
        let mut body = Vec::new();
        self.current_chunk.write(ChunkKind::Wal, false, &mut body)?;

        let mut hasher = Crc32::new();
        hasher.update(&body);
        let crc = hasher.finalize();

        self.wal_file.write_all(&crc.to_le_bytes())?;
        self.wal_file.write_all(&body)?;
        self.wal_file.sync_all()?;
        self.bytes_on_disk += 4 + body.len() as u64;

        debug!(
            chunk_records = self.current_chunk.len(),
            bytes_on_disk = self.bytes_on_disk,
            "wal: closed chunk"
        );

        let closed = std::mem::replace(&mut self.current_chunk, Chunk::new(self.max_chunk_values));
        self.closed_chunks.push(closed);

        // Reopen `C` empty: truncate in place, then seek to start.
        self.chk_file.set_len(0)?;
        self.chk_file.seek(SeekFrom::Start(0))?;

        Ok(())
    }

    /// Scans `current_chunk` (true append order) then `closed_chunks` in
    /// reverse insertion order, returning the most recent match for `key`
    /// (§4.5). The record's `op` (including `Delete`) is returned as-is; the
    /// caller decides whether a tombstone means "absent" (§8 invariant 2).
    pub fn find(&self, key: &D::Key) -> Option<&D> {
        if let Some(found) = self
            .current_chunk
            .records()
            .iter()
            .rev()
            .find(|r| D::key_of(r) == key)
        {
            return Some(found);
        }

        for chunk in self.closed_chunks.iter().rev() {
            if let Some(found) = chunk.records().iter().rev().find(|r| D::key_of(r) == key) {
                return Some(found);
            }
        }

        None
    }

    /// Materializes the WAL as a full-size SST at `dest_path` (§4.5, §6.4).
    /// On success, both `W` and `C` are truncated-and-reopened.
    pub fn persist(&mut self, dest_path: impl AsRef<Path>) -> Result<(), WalError> {
        if self.is_empty() {
            return Err(WalError::EmptyWal);
        }

        let mut all_chunks: Vec<&Chunk<D>> = self.closed_chunks.iter().collect();
        if !self.current_chunk.is_empty() {
            all_chunks.push(&self.current_chunk);
        }

        SstWriter::<D>::build(
            dest_path.as_ref(),
            self.wal_max_size,
            &all_chunks,
            self.max_chunk_values,
        )?;

        self.wal_file.set_len(0)?;
        self.wal_file.seek(SeekFrom::Start(0))?;
        self.chk_file.set_len(0)?;
        self.chk_file.seek(SeekFrom::Start(0))?;
        self.bytes_on_disk = 0;
        self.closed_chunks.clear();
        self.current_chunk = Chunk::new(self.max_chunk_values);

        Ok(())
    }
}

/// Replays the `.wal` file's closed chunks, stopping cleanly at the first
/// CRC mismatch or truncated chunk (§4.10, §8 invariant 7). Earlier chunks
/// remain valid and are returned.
pub fn replay_closed_chunks<D: DataKind>(max_chunk_values: usize, bytes: &[u8]) -> Vec<Chunk<D>> {
    let mut offset = 0usize;
    let mut chunks = Vec::new();

    while offset + 4 <= bytes.len() {
        let crc_bytes: [u8; 4] = match bytes[offset..offset + 4].try_into() {
            Ok(b) => b,
            Err(_) => break,
        };
        let stored_crc = u32::from_le_bytes(crc_bytes);
        let body_start = offset + 4;

        if body_start + 8 > bytes.len() {
            warn!(offset, "wal replay: truncated chunk header, stopping");
            break;
        }
        let size_bytes: [u8; 8] = match bytes[body_start..body_start + 8].try_into() {
            Ok(b) => b,
            Err(_) => break,
        };
        let declared_size = u64::from_le_bytes(size_bytes) as usize;

        if body_start + declared_size > bytes.len() {
            warn!(offset, declared_size, "wal replay: truncated chunk body, stopping");
            break;
        }

        let body = &bytes[body_start..body_start + declared_size];
        let mut hasher = Crc32::new();
        hasher.update(body);
        if hasher.finalize() != stored_crc {
            warn!(offset, "wal replay: CRC mismatch, stopping replay at this chunk");
            break;
        }

        match Chunk::<D>::read(max_chunk_values, false, body) {
            Ok((chunk, _meta, consumed)) if consumed == declared_size => {
                chunks.push(chunk);
            }
            Ok(_) => {
                warn!(offset, "wal replay: chunk body size mismatch, stopping replay");
                break;
            }
            Err(err) => {
                warn!(offset, %err, "wal replay: chunk decode error, stopping replay");
                break;
            }
        }

        offset = body_start + declared_size;
    }

    chunks
}

/// Replays the raw, unframed records in a `.chk` side journal (§4.10, §6.2).
/// Stops silently at the first decode error — the file carries no CRC, so a
/// partial trailing record from a crash mid-write is expected, not corrupt.
pub fn replay_chk_records<D: DataKind>(bytes: &[u8]) -> Vec<D> {
    let mut offset = 0usize;
    let mut records = Vec::new();

    while offset < bytes.len() {
        match record::read_record::<D>(&bytes[offset..]) {
            Ok((record, consumed)) => {
                records.push(record);
                offset += consumed;
            }
            Err(err) => {
                warn!(offset, %err, "chk replay: stopping at undecodable record");
                break;
            }
        }
    }

    records
}

/// Reads a file fully into memory. Helper used by [`crate::recovery`] before
/// handing bytes to [`replay_closed_chunks`]/[`replay_chk_records`].
pub fn read_file_bytes(path: impl AsRef<Path>) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(buf)
}
