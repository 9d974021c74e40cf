//! # Storage manager
//!
//! Owns the data directory: minting uniquely-named files for the WAL, its
//! side journal, and SSTs, and listing files by extension for recovery
//! (§4.8). File names are not trusted to be unique on their own — each
//! candidate name is probed with `create_new` before being handed back.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not mint a unique .{ext} file after {attempts} attempts")]
    NameExhausted { ext: &'static str, attempts: u32 },
}

/// A single flat data directory holding any number of `.sst` files, at most
/// one `.wal`, and at most one `.chk` (§6.7).
pub struct StorageManager {
    dir: PathBuf,
    next_id: AtomicU64,
}

impl StorageManager {
    /// Creates `path` if missing and fsyncs its parent so the creation is
    /// durable, mirroring the directory-fsync-after-rename discipline the
    /// WAL and SST writer use for their own files.
    ///
    /// `next_id` is seeded past every numeric filename already present, not
    /// just `1`: ids are a recency proxy elsewhere (`SstManager::find` and
    /// `compact`'s tie-break both treat a higher id as newer), so minting a
    /// fresh id that happens to be lower than a surviving on-disk file would
    /// make a stale file outrank a newer one after a restart.
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = path.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Self::fsync_dir(&dir)?;
        let next_id = Self::max_existing_id(&dir)?.map_or(1, |max| max + 1);
        Ok(Self {
            dir,
            next_id: AtomicU64::new(next_id),
        })
    }

    /// Highest numeric stem among all files directly in `dir`, across every
    /// extension — a fresh WAL/CHK pair can occupy a low stem via
    /// [`super::recovery`]'s hardcoded fallback name, not just minted SSTs,
    /// so the scan can't be filtered to `.sst`.
    fn max_existing_id(dir: &Path) -> Result<Option<u64>, StorageError> {
        let mut max = None;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).and_then(|s| s.parse::<u64>().ok()) else {
                continue;
            };
            max = Some(max.map_or(id, |m: u64| m.max(id)));
        }
        Ok(max)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Mints a new, empty file with extension `ext` under the data
    /// directory. The candidate name is a monotonically increasing counter,
    /// zero-padded, but uniqueness is verified by `create_new` rather than
    /// trusted to the counter alone.
    pub fn new_file(&self, ext: &'static str) -> Result<(File, PathBuf), StorageError> {
        for _ in 0..10_000 {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let path = self.dir.join(format!("{id:012}.{ext}"));
            match OpenOptions::new()
                .create_new(true)
                .read(true)
                .write(true)
                .open(&path)
            {
                Ok(file) => return Ok((file, path)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StorageError::NameExhausted {
            ext,
            attempts: 10_000,
        })
    }

    /// Paths of every file with extension `ext` in the data directory.
    pub fn list_filenames(&self, ext: &str) -> Result<Vec<PathBuf>, StorageError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(ext) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Opens every file with extension `ext` in the data directory.
    pub fn list_files(&self, ext: &str) -> Result<Vec<(File, PathBuf)>, StorageError> {
        self.list_filenames(ext)?
            .into_iter()
            .map(|path| {
                let file = OpenOptions::new().read(true).write(true).open(&path)?;
                Ok((file, path))
            })
            .collect()
    }

    /// Removes a file, ignoring a not-found error (another thread or a prior
    /// crash may already have cleaned it up).
    pub fn remove_file(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn fsync_dir(dir: &Path) -> Result<(), StorageError> {
        let dir_file = File::open(dir)?;
        dir_file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn new_file_mints_unique_names() {
        let dir = tempdir().unwrap();
        let manager = StorageManager::open_or_create(dir.path()).unwrap();

        let (_f1, p1) = manager.new_file("sst").unwrap();
        let (_f2, p2) = manager.new_file("sst").unwrap();
        assert_ne!(p1, p2);
    }

    #[test]
    fn list_filenames_filters_by_extension() {
        let dir = tempdir().unwrap();
        let manager = StorageManager::open_or_create(dir.path()).unwrap();

        manager.new_file("sst").unwrap();
        manager.new_file("sst").unwrap();
        manager.new_file("wal").unwrap();

        assert_eq!(manager.list_filenames("sst").unwrap().len(), 2);
        assert_eq!(manager.list_filenames("wal").unwrap().len(), 1);
        assert_eq!(manager.list_filenames("chk").unwrap().len(), 0);
    }

    #[test]
    fn remove_file_ignores_missing() {
        let dir = tempdir().unwrap();
        let manager = StorageManager::open_or_create(dir.path()).unwrap();
        manager.remove_file(dir.path().join("does-not-exist.sst")).unwrap();
    }

    #[test]
    fn open_or_create_reseeds_next_id_past_existing_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("000000000001.sst"), b"").unwrap();
        std::fs::write(dir.path().join("000000000006.sst"), b"").unwrap();
        std::fs::write(dir.path().join("000000000002.wal"), b"").unwrap();

        let manager = StorageManager::open_or_create(dir.path()).unwrap();
        let (_file, path) = manager.new_file("sst").unwrap();
        assert_eq!(path.file_stem().unwrap().to_str().unwrap(), "000000000007");
    }

    #[test]
    fn open_or_create_starts_at_one_on_empty_dir() {
        let dir = tempdir().unwrap();
        let manager = StorageManager::open_or_create(dir.path()).unwrap();
        let (_file, path) = manager.new_file("sst").unwrap();
        assert_eq!(path.file_stem().unwrap().to_str().unwrap(), "000000000001");
    }
}
