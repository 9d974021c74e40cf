//! # chunkstore
//!
//! An embeddable, single-writer key-value storage engine built on a
//! chunked **Log-Structured Merge Tree (LSM-tree)** write path. There is no
//! separate in-memory memtable: the write-ahead log's own in-memory buffer
//! (an open chunk plus any closed-but-unflushed chunks) *is* the read-side
//! front end, backed by immutable on-disk SSTs once a WAL rotates.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Engine                            │
//! │  ┌──────────────────────────┐   ┌───────────────────────┐│
//! │  │  Wal<D>                  │   │  Vec<SstIndex<D>>     ││
//! │  │  current_chunk (open)    │   │  (immutable, mmapped, ││
//! │  │  closed_chunks (unflushed│   │   key-range indexed)  ││
//! │  │  in .wal) + side .chk    │   │                       ││
//! │  └────────────┬─────────────┘   └───────────┬───────────┘│
//! │               │ rotate (TableFull / flush)   │           │
//! │               └──────────► SstWriter::build ─┘           │
//! │                                                           │
//! │  compact(i, j): merge two SstIndex into one, via a       │
//! │  scratch Wal, deregistering the inputs                   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`data_kind`] | `DataKind` capability trait, plus the built-in `KvEntry` |
//! | [`record`] | Generic record envelope and index `Pointer` wire forms |
//! | [`chunk`] | Bounded, self-describing batch of records |
//! | [`wal`] | Chunked, CRC-protected, recoverable write-ahead log |
//! | [`sstable`] | Immutable, mmap-backed, descending-chunk-packed SST |
//! | [`storage`] | Data directory lifecycle (unique file minting, listing) |
//! | [`recovery`] | Directory-scan startup recovery — no manifest file |
//! | [`engine`] | `SstManager` + host-facing `Engine`/`EngineConfig` |
//! | [`encoding`] | Little-endian wire primitives shared by every module |
//!
//! ## Key properties
//!
//! - **Write-ahead logging** — every record is durably appended to a side
//!   journal before it is visible, so a crash mid-chunk loses nothing.
//! - **Last-writer-wins** — `find` resolves duplicate keys by true recency,
//!   both in memory and once packed into an SST.
//! - **CRC-checked recovery** — a corrupt WAL chunk stops replay at that
//!   chunk; everything earlier stays valid.
//! - **No manifest** — startup state is derived entirely from a directory
//!   scan; the presence of `.wal`/`.chk`/`.sst` files is the manifest.
//! - **Single-threaded core** — no internal locking; a concurrent host
//!   wraps `Engine` in its own mutex.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use chunkstore::data_kind::KvEntry;
//! use chunkstore::engine::{Engine, EngineConfig};
//!
//! let config = EngineConfig {
//!     wal_max_size: 64 * 1024 * 1024,
//!     max_chunk_values: 256,
//! };
//!
//! let mut engine: Engine<KvEntry> = Engine::open("/tmp/my_db", config).unwrap();
//!
//! engine.append(KvEntry::upsert(b"hello".to_vec(), b"world".to_vec(), 1)).unwrap();
//! assert_eq!(engine.find(&b"hello".to_vec()).unwrap().unwrap().value, b"world");
//!
//! engine.append(KvEntry::delete(b"hello".to_vec(), 2)).unwrap();
//! assert!(engine.find(&b"hello".to_vec()).unwrap().is_none());
//!
//! engine.close().unwrap();
//! ```

#![allow(dead_code)]

pub mod chunk;
pub mod data_kind;
pub mod encoding;
pub mod engine;
pub mod record;
pub mod recovery;
pub mod sstable;
pub mod storage;
pub mod wal;
