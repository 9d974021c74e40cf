//! # Recovery
//!
//! No manifest file; the presence of files in the data directory *is* the
//! manifest (§6.7). On startup the data directory is scanned for `.wal`,
//! `.chk`, and `.sst` files and the in-memory WAL/SST-index state is
//! rebuilt directly from what is found (§4.10).

use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::chunk::{Chunk, ChunkError};
use crate::data_kind::DataKind;
use crate::sstable::{SstIndex, SstableError};
use crate::storage::{StorageError, StorageManager};
use crate::wal::{self, WalError};

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("wal error: {0}")]
    Wal(#[from] WalError),

    #[error("chunk error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("sstable error: {0}")]
    Sstable(#[from] SstableError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// More than one `.wal` or `.chk` file exists in the data directory.
    /// This core never produces more than one of each; finding more means
    /// the directory was tampered with or shared with another process (§7).
    #[error("directory contains {wal_count} .wal and {chk_count} .chk files, expected at most one of each")]
    UnexpectedWalState { wal_count: usize, chk_count: usize },
}

/// Everything recovery reconstructs from the data directory, ready to be
/// handed to `Wal::reopen_recovered`/`SstManager`.
pub struct RecoveredState<D: DataKind> {
    pub wal_path: PathBuf,
    pub chk_path: PathBuf,
    pub closed_chunks: Vec<Chunk<D>>,
    pub current_records: Vec<D>,
    pub sst_indices: Vec<SstIndex<D>>,
}

/// Scans `storage`'s data directory and rebuilds in-memory state per §4.10.
pub fn recover<D: DataKind>(
    storage: &StorageManager,
    max_chunk_values: usize,
) -> Result<RecoveredState<D>, RecoveryError> {
    let wal_paths = storage.list_filenames("wal")?;
    let chk_paths = storage.list_filenames("chk")?;
    if wal_paths.len() > 1 || chk_paths.len() > 1 {
        return Err(RecoveryError::UnexpectedWalState {
            wal_count: wal_paths.len(),
            chk_count: chk_paths.len(),
        });
    }

    let mut closed_chunks = Vec::new();
    let wal_path = match wal_paths.into_iter().next() {
        Some(path) => {
            let bytes = wal::read_file_bytes(&path)?;
            if bytes.is_empty() {
                storage.remove_file(&path)?;
                storage.dir().join(default_wal_name())
            } else {
                closed_chunks = wal::replay_closed_chunks::<D>(max_chunk_values, &bytes);
                info!(path = %path.display(), chunks = closed_chunks.len(), "recovery: replayed wal");
                path
            }
        }
        None => storage.dir().join(default_wal_name()),
    };

    let mut current_records = Vec::new();
    let chk_path = match chk_paths.into_iter().next() {
        Some(path) => {
            let bytes = wal::read_file_bytes(&path)?;
            if bytes.is_empty() {
                storage.remove_file(&path)?;
                storage.dir().join(default_chk_name())
            } else {
                current_records = wal::replay_chk_records::<D>(&bytes);
                info!(path = %path.display(), records = current_records.len(), "recovery: replayed chk");
                path
            }
        }
        None => storage.dir().join(default_chk_name()),
    };

    let mut sst_indices = Vec::new();
    for path in storage.list_filenames("sst")? {
        match SstIndex::<D>::open(&path, max_chunk_values) {
            Ok(index) => sst_indices.push(index),
            Err(err) => {
                warn!(path = %path.display(), %err, "recovery: failed to open sst, skipping");
            }
        }
    }

    Ok(RecoveredState {
        wal_path,
        chk_path,
        closed_chunks,
        current_records,
        sst_indices,
    })
}

fn default_wal_name() -> &'static str {
    "000000000001.wal"
}

fn default_chk_name() -> &'static str {
    "000000000001.chk"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_kind::KvEntry;
    use tempfile::tempdir;

    #[test]
    fn recover_empty_directory_yields_empty_state() {
        let dir = tempdir().unwrap();
        let storage = StorageManager::open_or_create(dir.path()).unwrap();
        let state: RecoveredState<KvEntry> = recover(&storage, 100).unwrap();
        assert!(state.closed_chunks.is_empty());
        assert!(state.current_records.is_empty());
        assert!(state.sst_indices.is_empty());
    }

    #[test]
    fn recover_rejects_duplicate_wal_files() {
        let dir = tempdir().unwrap();
        let storage = StorageManager::open_or_create(dir.path()).unwrap();
        storage.new_file("wal").unwrap();
        storage.new_file("wal").unwrap();

        let err = recover::<KvEntry>(&storage, 100).unwrap_err();
        assert!(matches!(err, RecoveryError::UnexpectedWalState { wal_count: 2, .. }));
    }

    #[test]
    fn recover_deletes_empty_wal_and_chk_files() {
        let dir = tempdir().unwrap();
        let storage = StorageManager::open_or_create(dir.path()).unwrap();
        storage.new_file("wal").unwrap();
        storage.new_file("chk").unwrap();

        recover::<KvEntry>(&storage, 100).unwrap();

        assert!(storage.list_filenames("wal").unwrap().is_empty());
        assert!(storage.list_filenames("chk").unwrap().is_empty());
    }
}
