//! # hnswdb
//!
//! A persistent approximate nearest-neighbor index built on HNSW graphs.
//!
//! This library provides:
//! - Several independent indexes in one transactional database file
//! - Distance metrics (Euclidean, Cosine, Manhattan, Dot Product)
//! - Single-writer-per-index transactions with atomic commits
//! - Snapshot-isolated searchers usable from any number of threads
//!
//! ## Example
//!
//! ```rust
//! use hnswdb::{Database, DatabaseConfig, Metric};
//!
//! let dir = tempfile::tempdir()?;
//! let db = Database::open(dir.path().join("vectors.redb"), DatabaseConfig::default())?;
//!
//! // Insert vectors
//! let mut writer = db.writer(0, 3, Metric::Euclidean)?;
//! writer.add_item(0, &[0.0, 0.0, 0.0])?;
//! writer.add_item(1, &[1.0, 0.0, 0.0])?;
//! writer.add_item(2, &[10.0, 10.0, 10.0])?;
//! writer.commit()?;
//!
//! // Search for similar vectors
//! let searcher = db.searcher(0)?;
//! let results = searcher.search(&[0.0, 0.0, 0.0], 2, 10)?;
//! assert_eq!(results, vec![(0, 0.0), (1, 1.0)]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod database;
pub mod distance;
pub mod error;
pub mod hnsw;
pub mod persistence;
pub mod searcher;
pub mod stats;
pub mod writer;

/// User-assigned identifier of an item within an index.
pub type ItemId = u32;

/// Identifier of an index within a database.
pub type IndexId = u16;

pub use config::{AcquireMode, DatabaseConfig, HnswParams, WriterOptions};
pub use database::Database;
pub use distance::Metric;
pub use error::{Error, Result, StorageError};
pub use searcher::{ItemIter, Searcher};
pub use stats::IndexStats;
pub use writer::Writer;
