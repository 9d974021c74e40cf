//! SST writer — packs a WAL's chunks into a fixed-size file (§4.6).
//!
//! # Output guarantees
//!
//! - Records are deduplicated by key (last writer wins) and regrouped into
//!   fresh, key-sorted chunks — the input chunks' own boundaries (WAL
//!   chronological order, possibly overlapping key ranges across chunks) are
//!   not preserved. This keeps the sparse index's chunk ranges disjoint and
//!   makes [`super::SstIndex::iter_records`] a straight concatenation.
//! - The final file is written atomically via a `.tmp` → final rename.
//!
//! # Atomicity
//!
//! 1. Reserve `wal_max_size` bytes in `path.tmp`.
//! 2. Write chunks high to low from the end of the file.
//! 3. Write metadata header and sparse index at offset 0.
//! 4. Sync and rename `path.tmp` → `path`.

use std::collections::BTreeMap;
use std::fs::{OpenOptions, rename};
use std::io::{Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::Path;

use crate::chunk::{Chunk, ChunkKind, write_meta_header};
use crate::data_kind::DataKind;

use super::{SstIndexEntry, SstableError};

pub struct SstWriter<D: DataKind> {
    _kind: PhantomData<D>,
}

impl<D: DataKind> SstWriter<D> {
    /// Builds an SST of exactly `wal_max_size` bytes at `dest_path` from
    /// `chunks`, given in WAL chronological order (oldest first). `chunks`
    /// must be non-empty in aggregate (the caller — [`crate::wal::Wal::persist`]
    /// — rejects an entirely empty WAL before calling this).
    pub fn build(
        dest_path: &Path,
        wal_max_size: u64,
        chunks: &[&Chunk<D>],
        max_chunk_values: usize,
    ) -> Result<(), SstableError> {
        // Flatten in time order, then let a BTreeMap resolve both
        // last-writer-wins (later insert overwrites) and ascending sort in
        // one pass.
        let mut by_key: BTreeMap<D::Key, D> = BTreeMap::new();
        for chunk in chunks {
            for record in chunk.records() {
                by_key.insert(D::key_of(record).clone(), record.clone());
            }
        }
        let sorted: Vec<D> = by_key.into_values().collect();

        let tmp_path = dest_path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .read(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.set_len(wal_max_size)?;

        let mut pos = wal_max_size;
        let mut index_entries = Vec::new();
        let mut aggregate_first: Option<D::Key> = None;
        let mut aggregate_last: Option<D::Key> = None;

        for group in sorted.chunks(max_chunk_values.max(1)) {
            let mut out_chunk = Chunk::<D>::new(max_chunk_values);
            for record in group {
                out_chunk.append(record.clone())?;
            }

            let mut body = Vec::new();
            let footprint = out_chunk.write(ChunkKind::Index, true, &mut body)?;
            pos -= footprint;
            file.seek(SeekFrom::Start(pos))?;
            file.write_all(&body)?;

            let first_key = D::key_of(&group[0]).clone();
            let last_key = D::key_of(&group[group.len() - 1]).clone();
            if aggregate_first.is_none() {
                aggregate_first = Some(first_key.clone());
            }
            aggregate_last = Some(last_key.clone());

            index_entries.push(SstIndexEntry {
                offset: pos,
                first_key,
                last_key,
            });
        }

        let aggregate_first = aggregate_first.unwrap_or_else(D::min_key_sentinel);
        let aggregate_last = aggregate_last.unwrap_or_else(D::max_key_sentinel);

        let mut header = Vec::new();
        write_meta_header::<D>(
            ChunkKind::Index,
            index_entries.len() as u64,
            &aggregate_first,
            &aggregate_last,
            &mut header,
        )?;
        for entry in &index_entries {
            entry.encode_to(&mut header)?;
        }

        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header)?;
        file.sync_all()?;
        drop(file);

        rename(&tmp_path, dest_path)?;
        Ok(())
    }
}
