//! Read-only access to a committed index.

use std::borrow::Cow;

use redb::{Range, ReadableTable};
use roaring::RoaringBitmap;

use crate::config::HnswParams;
use crate::distance::Metric;
use crate::error::{Error, Result, StorageError};
use crate::hnsw::{distance_to, greedy_descend, search_layer, GraphReader};
use crate::persistence::{read_node, IndexMetadata, NodeRecord, NodeTable};
use crate::stats::IndexStats;
use crate::{IndexId, ItemId};

/// A snapshot of one index, taken by [`Database::searcher`](crate::Database::searcher).
///
/// Commits made after the searcher was created are not visible to it.
pub struct Searcher {
    index: IndexId,
    meta: IndexMetadata,
    nodes: Option<NodeTable>,
}

impl Searcher {
    pub(crate) fn new(index: IndexId, meta: IndexMetadata, nodes: Option<NodeTable>) -> Self {
        Self { index, meta, nodes }
    }

    pub fn index(&self) -> IndexId {
        self.index
    }

    pub fn len(&self) -> u64 {
        self.meta.len
    }

    pub fn is_empty(&self) -> bool {
        self.meta.len == 0
    }

    pub fn dimension(&self) -> usize {
        self.meta.dimension()
    }

    pub fn metric(&self) -> Metric {
        self.meta.metric
    }

    pub fn params(&self) -> &HnswParams {
        &self.meta.params
    }

    pub fn entry_point(&self) -> Option<ItemId> {
        self.meta.entry_point
    }

    pub fn max_level(&self) -> usize {
        self.meta.max_level()
    }

    /// The `k` nearest items to `query`, closest first, ties broken by id.
    ///
    /// Layer 0 is explored with a beam of `max(ef, k)`. Returns fewer than `k`
    /// results only when the index holds fewer than `k` items.
    pub fn search(&self, query: &[f32], k: usize, ef: usize) -> Result<Vec<(ItemId, f32)>> {
        self.check_query(query)?;
        self.nns(query, k, ef, None)
    }

    /// Like [`Searcher::search`] using the stored vector of `item`, which is
    /// part of the results. `None` if the item does not exist.
    pub fn search_by_item(&self, item: ItemId, k: usize, ef: usize) -> Result<Option<Vec<(ItemId, f32)>>> {
        match self.item_vector(item)? {
            Some(vector) => Ok(Some(self.nns(&vector, k, ef, None)?)),
            None => Ok(None),
        }
    }

    /// Like [`Searcher::search`] but only ids in `candidates` are returned.
    ///
    /// The graph is still traversed through every node, so a sparse filter
    /// costs up to a full scan.
    pub fn search_filtered(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        candidates: &RoaringBitmap,
    ) -> Result<Vec<(ItemId, f32)>> {
        self.check_query(query)?;
        self.nns(query, k, ef, Some(candidates))
    }

    fn check_query(&self, query: &[f32]) -> Result<()> {
        if query.len() != self.dimension() {
            return Err(Error::DimensionMismatch {
                expected: self.dimension(),
                actual: query.len(),
            });
        }
        Ok(())
    }

    /// SEARCH: Algorithm 5 from the HNSW paper.
    fn nns(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        filter: Option<&RoaringBitmap>,
    ) -> Result<Vec<(ItemId, f32)>> {
        if k == 0 || filter.is_some_and(RoaringBitmap::is_empty) {
            return Ok(Vec::new());
        }
        let Some(ep_id) = self.meta.entry_point else {
            return Ok(Vec::new());
        };
        let ep = distance_to(self, query, ep_id)?.ok_or_else(|| {
            StorageError::Corrupted(format!("entry point {ep_id} does not resolve"))
        })?;

        // Phase 1: Greedy descent from top layer to layer 1 (ef=1)
        let entry = greedy_descend(self, query, ep, self.meta.max_level(), 0)?;

        // Phase 2: Search layer 0 with ef. Every item is reachable from the
        // entry point on this layer, so it seeds the beam too.
        let seeds = if entry.id == ep.id { vec![entry] } else { vec![entry, ep] };
        let mut nearest = search_layer(self, query, &seeds, ef.max(k), 0, filter)?;
        nearest.truncate(k);

        let metric = self.meta.metric;
        Ok(nearest
            .into_iter()
            .map(|n| (n.id, metric.finalize(n.distance)))
            .collect())
    }

    pub fn contains_item(&self, id: ItemId) -> Result<bool> {
        match &self.nodes {
            Some(table) => {
                let found = table.get(id)?.is_some();
                Ok(found)
            }
            None => Ok(false),
        }
    }

    pub fn item_vector(&self, id: ItemId) -> Result<Option<Vec<f32>>> {
        Ok(self.node(id)?.map(|node| node.into_owned().vector))
    }

    /// Every item id in the index.
    pub fn item_ids(&self) -> Result<RoaringBitmap> {
        let mut ids = RoaringBitmap::new();
        if let Some(table) = &self.nodes {
            for entry in table.iter()? {
                let (id, _) = entry?;
                ids.insert(id.value());
            }
        }
        Ok(ids)
    }

    /// Iterate over `(id, vector)` pairs in ascending id order.
    pub fn iter(&self) -> Result<ItemIter<'_>> {
        let inner = match &self.nodes {
            Some(table) => Some(table.iter()?),
            None => None,
        };
        Ok(ItemIter { inner })
    }

    /// Layer and degree statistics, computed with a full scan.
    pub fn stats(&self) -> Result<IndexStats> {
        let mut stats = IndexStats::default();
        if let Some(table) = &self.nodes {
            for entry in table.iter()? {
                let (_, bytes) = entry?;
                stats.record(&NodeRecord::decode(bytes.value())?);
            }
        }
        Ok(stats)
    }
}

impl GraphReader for Searcher {
    fn metric(&self) -> Metric {
        self.meta.metric
    }

    fn node(&self, id: ItemId) -> Result<Option<Cow<'_, NodeRecord>>> {
        match &self.nodes {
            Some(table) => Ok(read_node(table, id)?.map(Cow::Owned)),
            None => Ok(None),
        }
    }
}

/// Iterator over the items of a [`Searcher`], see [`Searcher::iter`].
pub struct ItemIter<'a> {
    inner: Option<Range<'a, ItemId, &'static [u8]>>,
}

impl Iterator for ItemIter<'_> {
    type Item = Result<(ItemId, Vec<f32>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.inner.as_mut()?.next()?;
        Some(entry.map_err(Error::from).and_then(|(id, bytes)| {
            let node = NodeRecord::decode(bytes.value())?;
            Ok((id.value(), node.vector))
        }))
    }
}
