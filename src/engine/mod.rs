//! # SST manager & host-facing engine
//!
//! [`SstManager`] owns the live [`Wal`] plus the set of on-disk [`SstIndex`]
//! tables and answers point lookups across both (§4.9). [`Engine`] wraps it
//! with the small host-facing API (§6.8): `open`, `append`, `find`, `flush`,
//! `compact`, `close`.
//!
//! Scheduling is single-threaded and cooperative (§5) — there is no internal
//! locking here. A host that needs concurrent access wraps an `Engine` in
//! its own mutex.

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

use crate::chunk::ChunkError;
use crate::data_kind::{DataKind, Op};
use crate::recovery::{self, RecoveryError};
use crate::sstable::{SstIndex, SstableError};
use crate::storage::{StorageError, StorageManager};
use crate::wal::{AppendOutcome, Wal, WalError};

/// Errors raised by [`SstManager`]/[`Engine`] operations (§7).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("wal error: {0}")]
    Wal(#[from] WalError),

    #[error("chunk error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("sstable error: {0}")]
    Sstable(#[from] SstableError),

    #[error("recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("compaction input {0} not present in the index set")]
    IdNotFound(u64),

    /// A chunk was used before its on-disk size was ever computed by
    /// `write`. A programming error, not a recoverable I/O condition — the
    /// core never triggers this through its own code paths.
    #[error("chunk size was never computed before use")]
    UnknownChunkSize,
}

/// Configuration required to open an [`Engine`] (§11: no compiled-in default
/// for `wal_max_size`).
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Fixed size, in bytes, of every WAL and every SST file it produces.
    pub wal_max_size: u64,
    /// Maximum records held by one in-memory chunk before it closes.
    pub max_chunk_values: usize,
}

struct SstEntry<D: DataKind> {
    id: u64,
    index: SstIndex<D>,
}

/// Owns the WAL and the set of on-disk SSTs, and answers `append`/`find`
/// across both (§4.9).
pub struct SstManager<D: DataKind> {
    storage: StorageManager,
    wal: Wal<D>,
    ssts: Vec<SstEntry<D>>,
    global_min: Option<D::Key>,
    global_max: Option<D::Key>,
    config: EngineConfig,
}

impl<D: DataKind> SstManager<D> {
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self, EngineError> {
        let storage = StorageManager::open_or_create(&path)?;
        let state = recovery::recover::<D>(&storage, config.max_chunk_values)?;

        let wal = Wal::reopen_recovered(
            &state.wal_path,
            &state.chk_path,
            config.max_chunk_values,
            config.wal_max_size,
            state.closed_chunks,
            state.current_records,
        )?;

        let mut ssts = Vec::with_capacity(state.sst_indices.len());
        for index in state.sst_indices {
            let id = id_from_path(index.path());
            ssts.push(SstEntry { id, index });
        }
        ssts.sort_by_key(|e| e.id);

        let mut manager = Self {
            storage,
            wal,
            ssts,
            global_min: None,
            global_max: None,
            config,
        };
        manager.recompute_bounds();

        info!(ssts = manager.ssts.len(), "engine: opened");
        Ok(manager)
    }

    fn recompute_bounds(&mut self) {
        self.global_min = self.ssts.iter().map(|e| e.index.first_key().clone()).min_by(|a, b| D::compare_key(a, b));
        self.global_max = self.ssts.iter().map(|e| e.index.last_key().clone()).max_by(|a, b| D::compare_key(a, b));
    }

    pub fn append(&mut self, record: D) -> Result<(), EngineError> {
        match self.wal.append(record)? {
            AppendOutcome::Written => Ok(()),
            AppendOutcome::TableFull => self.rotate(),
        }
    }

    /// Force-rotates the WAL into a new SST even if it is below
    /// `wal_max_size`. A no-op (not an error) on an empty WAL (§8 boundary
    /// behaviors).
    pub fn flush(&mut self) -> Result<(), EngineError> {
        if self.wal.is_empty() {
            return Ok(());
        }
        self.rotate()
    }

    fn rotate(&mut self) -> Result<(), EngineError> {
        let (file, path) = self.storage.new_file("sst")?;
        drop(file);
        match self.wal.persist(&path) {
            Ok(()) => {
                let index = SstIndex::open(&path, self.config.max_chunk_values)?;
                let id = id_from_path(&path);
                debug!(id, chunks = index.chunk_count(), "engine: wal rotated to sst");
                self.ssts.push(SstEntry { id, index });
                self.recompute_bounds();
                Ok(())
            }
            Err(WalError::EmptyWal) => {
                // Shouldn't happen: `rotate` only runs after a successful
                // append, or from `flush` which already checked emptiness.
                self.storage.remove_file(&path)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// `wal.find` first, then SSTs newest-registered first (so a later
    /// flush's record wins over an older flush's stale copy of the same
    /// key), skipping the scan entirely when `key` falls outside the
    /// aggregate SST range (§4.9, §8 boundary behaviors).
    pub fn find(&self, key: &D::Key) -> Result<Option<D>, EngineError> {
        if let Some(record) = self.wal.find(key) {
            return Ok(resolve_tombstone(record.clone()));
        }

        let (Some(min), Some(max)) = (&self.global_min, &self.global_max) else {
            return Ok(None);
        };
        if D::compare_key(key, min) == std::cmp::Ordering::Less
            || D::compare_key(key, max) == std::cmp::Ordering::Greater
        {
            return Ok(None);
        }

        for entry in self.ssts.iter().rev() {
            if entry.index.is_between(key)
                && let Some(record) = entry.index.find(key)?
            {
                return Ok(resolve_tombstone(record));
            }
        }
        Ok(None)
    }

    /// Merges two registered SSTs (key-sorted union, higher id wins ties),
    /// persists the result as a new SST, and deregisters/deletes the
    /// inputs (§4.9).
    pub fn compact(&mut self, id_a: u64, id_b: u64) -> Result<(), EngineError> {
        let pos_a = self.ssts.iter().position(|e| e.id == id_a).ok_or(EngineError::IdNotFound(id_a))?;
        let pos_b = self.ssts.iter().position(|e| e.id == id_b).ok_or(EngineError::IdNotFound(id_b))?;

        let (lower, higher) = if self.ssts[pos_a].id <= self.ssts[pos_b].id {
            (pos_a, pos_b)
        } else {
            (pos_b, pos_a)
        };

        let mut by_key: BTreeMap<D::Key, D> = BTreeMap::new();
        for record in self.ssts[lower].index.iter_records()? {
            by_key.insert(D::key_of(&record).clone(), record);
        }
        for record in self.ssts[higher].index.iter_records()? {
            by_key.insert(D::key_of(&record).clone(), record);
        }
        let merged: Vec<D> = by_key.into_values().collect();

        let (wal_file, wal_path) = self.storage.new_file("wal")?;
        drop(wal_file);
        let (chk_file, chk_path) = self.storage.new_file("chk")?;
        drop(chk_file);

        let mut scratch = Wal::<D>::reopen_recovered(
            &wal_path,
            &chk_path,
            self.config.max_chunk_values,
            self.config.wal_max_size,
            Vec::new(),
            Vec::new(),
        )?;
        for record in merged {
            scratch.append(record)?;
        }

        let (sst_file, sst_path) = self.storage.new_file("sst")?;
        drop(sst_file);
        scratch.persist(&sst_path)?;

        self.storage.remove_file(&wal_path)?;
        self.storage.remove_file(&chk_path)?;

        let new_index = SstIndex::open(&sst_path, self.config.max_chunk_values)?;
        let new_id = id_from_path(&sst_path);

        let old_a_path = self.ssts[lower].index.path().to_path_buf();
        let old_b_path = self.ssts[higher].index.path().to_path_buf();
        self.ssts.retain(|e| e.id != id_a && e.id != id_b);
        self.storage.remove_file(&old_a_path)?;
        self.storage.remove_file(&old_b_path)?;

        self.ssts.push(SstEntry {
            id: new_id,
            index: new_index,
        });
        self.ssts.sort_by_key(|e| e.id);
        self.recompute_bounds();

        info!(id_a, id_b, new_id, "engine: compacted");
        Ok(())
    }

    pub fn close(self) -> Result<(), EngineError> {
        Ok(())
    }
}

fn resolve_tombstone<D: DataKind>(record: D) -> Option<D> {
    if D::op_of(&record) == Op::Delete {
        None
    } else {
        Some(record)
    }
}

fn id_from_path(path: &Path) -> u64 {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0)
}

/// The host-facing engine (§6.8).
pub struct Engine<D: DataKind> {
    manager: SstManager<D>,
}

impl<D: DataKind> Engine<D> {
    pub fn open(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self, EngineError> {
        Ok(Self {
            manager: SstManager::open(path, config)?,
        })
    }

    pub fn append(&mut self, record: D) -> Result<(), EngineError> {
        self.manager.append(record)
    }

    pub fn find(&self, key: &D::Key) -> Result<Option<D>, EngineError> {
        self.manager.find(key)
    }

    pub fn flush(&mut self) -> Result<(), EngineError> {
        self.manager.flush()
    }

    pub fn compact(&mut self, a: u64, b: u64) -> Result<(), EngineError> {
        self.manager.compact(a, b)
    }

    pub fn close(self) -> Result<(), EngineError> {
        self.manager.close()
    }
}
