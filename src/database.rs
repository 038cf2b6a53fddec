//! The top-level handle: owns the redb environment and hands out writers and searchers.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::SeedableRng;
use redb::ReadableTable;
use tracing::{debug, info, warn};

use crate::config::{AcquireMode, DatabaseConfig, WriterOptions};
use crate::distance::Metric;
use crate::error::{Error, Result, StorageError};
use crate::persistence::{
    nodes_table, nodes_table_name, open_nodes, read_metadata, IndexMetadata, METADATA_TABLE,
};
use crate::searcher::Searcher;
use crate::writer::Writer;
use crate::IndexId;

/// A database file holding any number of independent indexes.
///
/// `Database` is `Sync`: share it between threads by reference to run
/// searchers in parallel, or writers on different indexes.
pub struct Database {
    pub(crate) env: redb::Database,
    pub(crate) config: DatabaseConfig,
    writers: WriterRegistry,
}

impl Database {
    /// Open or create a database file at `path`.
    ///
    /// Fails with [`StorageError::IncompatibleVersion`] if any index was
    /// written by a newer engine.
    pub fn open(path: impl AsRef<Path>, config: DatabaseConfig) -> Result<Self> {
        config.params.validate()?;
        let path = path.as_ref();

        let mut builder = redb::Database::builder();
        if let Some(size) = config.cache_size {
            builder.set_cache_size(size);
        }
        let env = builder.create(path)?;

        // Create the metadata table up front so read transactions always find it.
        let wtxn = env.begin_write()?;
        wtxn.open_table(METADATA_TABLE)?;
        wtxn.commit()?;

        let db = Self {
            env,
            config,
            writers: WriterRegistry::default(),
        };
        let indexes = db.check_versions()?;

        info!(
            path = %path.display(),
            indexes,
            max_indexes = db.config.max_indexes,
            "opened database"
        );
        Ok(db)
    }

    /// Decode every metadata row, returning the number of indexes.
    fn check_versions(&self) -> Result<usize> {
        let rtxn = self.env.begin_read()?;
        let table = rtxn.open_table(METADATA_TABLE)?;
        let mut count = 0;
        for entry in table.iter()? {
            let (index, bytes) = entry?;
            if let Err(e) = IndexMetadata::decode(bytes.value()) {
                if let StorageError::IncompatibleVersion { found, supported } = &e {
                    warn!(index = index.value(), found, supported, "index written by a newer engine");
                }
                return Err(e.into());
            }
            count += 1;
        }
        Ok(count)
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Open the writer of `index`, creating the index on first commit.
    ///
    /// Fails with [`Error::WriterBusy`] if another writer is open on the same
    /// index, and with [`Error::DimensionMismatch`] or [`Error::MetricMismatch`]
    /// if the index exists with another shape.
    pub fn writer(&self, index: IndexId, dimension: usize, metric: Metric) -> Result<Writer<'_>> {
        self.writer_with_options(index, dimension, metric, WriterOptions::default())
    }

    pub fn writer_with_options(
        &self,
        index: IndexId,
        dimension: usize,
        metric: Metric,
        options: WriterOptions,
    ) -> Result<Writer<'_>> {
        if dimension == 0 {
            return Err(Error::InvalidParameter("dimension must be at least 1".into()));
        }

        let slot = self.writers.acquire(index, options.acquire)?;
        let rtxn = self.env.begin_read()?;

        let (meta, is_new) = match read_metadata(&rtxn, index)? {
            Some(meta) => {
                if meta.dimension() != dimension {
                    return Err(Error::DimensionMismatch {
                        expected: meta.dimension(),
                        actual: dimension,
                    });
                }
                if meta.metric != metric {
                    return Err(Error::MetricMismatch {
                        expected: meta.metric,
                        actual: metric,
                    });
                }
                (meta, false)
            }
            None => {
                let params = options.params.unwrap_or_else(|| self.config.params.clone());
                params.validate()?;
                (IndexMetadata::new(dimension, metric, params), true)
            }
        };
        let snapshot = open_nodes(&rtxn, index)?;

        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        debug!(index, dimension, metric = metric.name(), is_new, len = meta.len, "writer opened");
        Ok(Writer::new(self, slot, index, meta, is_new, snapshot, rng))
    }

    /// A searcher over the latest committed state of `index`.
    pub fn searcher(&self, index: IndexId) -> Result<Searcher> {
        let rtxn = self.env.begin_read()?;
        let meta = read_metadata(&rtxn, index)?.ok_or(Error::IndexNotFound { index })?;
        let nodes = open_nodes(&rtxn, index)?;
        Ok(Searcher::new(index, meta, nodes))
    }

    /// Remove every item and the metadata of `index` in one transaction.
    pub fn drop_index(&self, index: IndexId) -> Result<()> {
        let _slot = self.writers.acquire(index, AcquireMode::FailFast)?;

        let wtxn = self.env.begin_write()?;
        {
            let mut table = wtxn.open_table(METADATA_TABLE)?;
            if table.remove(index)?.is_none() {
                return Err(Error::IndexNotFound { index });
            }
        }
        let name = nodes_table_name(index);
        wtxn.delete_table(nodes_table(&name))?;
        wtxn.commit()?;

        info!(index, "dropped index");
        Ok(())
    }

    /// Ids of every committed index, ascending.
    pub fn index_ids(&self) -> Result<Vec<IndexId>> {
        let rtxn = self.env.begin_read()?;
        let table = rtxn.open_table(METADATA_TABLE)?;
        let mut ids = Vec::new();
        for entry in table.iter()? {
            let (index, _) = entry?;
            ids.push(index.value());
        }
        Ok(ids)
    }

    pub fn contains_index(&self, index: IndexId) -> Result<bool> {
        let rtxn = self.env.begin_read()?;
        let table = rtxn.open_table(METADATA_TABLE)?;
        let found = table.get(index)?.is_some();
        Ok(found)
    }
}

/// Tracks which indexes currently have an open writer.
#[derive(Debug, Default)]
pub(crate) struct WriterRegistry {
    active: Mutex<HashSet<IndexId>>,
    released: Condvar,
}

impl WriterRegistry {
    pub(crate) fn acquire(&self, index: IndexId, mode: AcquireMode) -> Result<WriterSlot<'_>> {
        let mut active = self.lock();
        loop {
            if active.insert(index) {
                return Ok(WriterSlot {
                    registry: self,
                    index,
                });
            }
            match mode {
                AcquireMode::FailFast => return Err(Error::WriterBusy { index }),
                AcquireMode::Block => {
                    debug!(index, "waiting for writer slot");
                    active = self
                        .released
                        .wait(active)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    // The set stays consistent even if a holder panicked.
    fn lock(&self) -> MutexGuard<'_, HashSet<IndexId>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, index: IndexId) {
        self.lock().remove(&index);
        self.released.notify_all();
    }
}

/// Exclusive right to write one index, released on drop.
#[derive(Debug)]
pub(crate) struct WriterSlot<'a> {
    registry: &'a WriterRegistry,
    index: IndexId,
}

impl Drop for WriterSlot<'_> {
    fn drop(&mut self) {
        self.registry.release(self.index);
    }
}
