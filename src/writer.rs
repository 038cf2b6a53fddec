//! Transactional writer for one index.
//!
//! A [`Writer`] reads the index through a snapshot taken when it was opened
//! and keeps every node it touches in a private overlay. Nothing reaches the
//! database until [`Writer::commit`], which applies the overlay in a single
//! redb write transaction. Dropping the writer discards the overlay.
//!
//! Before committing, the writer makes sure every live node can be reached
//! from the entry point on layer 0.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};

use rand::rngs::StdRng;
use redb::{ReadableTable, ReadableTableMetadata};
use roaring::RoaringBitmap;
use tracing::{debug, trace, warn};

use crate::config::HnswParams;
use crate::database::{Database, WriterSlot};
use crate::distance::Metric;
use crate::error::{Error, Result, StorageError};
use crate::hnsw::{
    distance_to, greedy_descend, random_level, search_layer, select_neighbors, Backlinks,
    Candidate, GraphReader, Neighbor,
};
use crate::persistence::{
    nodes_table, nodes_table_name, read_node, IndexMetadata, NodeRecord, NodeTable,
    METADATA_TABLE,
};
use crate::{IndexId, ItemId};

/// Exclusive, transactional write access to one index.
///
/// Obtained from [`Database::writer`]. Only one writer per index can be open
/// at a time.
pub struct Writer<'db> {
    db: &'db Database,
    _slot: WriterSlot<'db>,
    index: IndexId,
    meta: IndexMetadata,
    /// The index has no committed metadata yet.
    is_new: bool,
    snapshot: Option<NodeTable>,
    /// Every committed item was removed by [`Writer::clear`].
    cleared: bool,
    /// Nodes added or modified since the writer was opened.
    nodes: HashMap<ItemId, NodeRecord>,
    /// Committed ids removed since the writer was opened.
    deleted: BTreeSet<ItemId>,
    /// In-links of every live node, built on the first delete.
    backlinks: Option<Backlinks>,
    rng: StdRng,
}

impl<'db> Writer<'db> {
    pub(crate) fn new(
        db: &'db Database,
        slot: WriterSlot<'db>,
        index: IndexId,
        meta: IndexMetadata,
        is_new: bool,
        snapshot: Option<NodeTable>,
        rng: StdRng,
    ) -> Self {
        Self {
            db,
            _slot: slot,
            index,
            meta,
            is_new,
            snapshot,
            cleared: false,
            nodes: HashMap::new(),
            deleted: BTreeSet::new(),
            backlinks: None,
            rng,
        }
    }

    pub fn index(&self) -> IndexId {
        self.index
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

    /// Number of live items, including uncommitted changes.
    pub fn len(&self) -> u64 {
        self.meta.len
    }

    pub fn is_empty(&self) -> bool {
        self.meta.len == 0
    }

    /// The committed snapshot, unless [`Writer::clear`] discarded it.
    fn stored(&self) -> Option<&NodeTable> {
        if self.cleared {
            None
        } else {
            self.snapshot.as_ref()
        }
    }

    pub fn contains_item(&self, id: ItemId) -> Result<bool> {
        if self.nodes.contains_key(&id) {
            return Ok(true);
        }
        if self.deleted.contains(&id) {
            return Ok(false);
        }
        match self.stored() {
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

    fn check_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension() {
            return Err(Error::DimensionMismatch {
                expected: self.dimension(),
                actual: vector.len(),
            });
        }
        if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
            return Err(Error::InvalidVector {
                reason: format!("component {pos} is {}", vector[pos]),
            });
        }
        Ok(())
    }

    /// Insert a new item. Fails with [`Error::DuplicateId`] if `id` is already present.
    pub fn add_item(&mut self, id: ItemId, vector: &[f32]) -> Result<()> {
        self.check_vector(vector)?;
        if self.contains_item(id)? {
            return Err(Error::DuplicateId { id });
        }
        self.insert(id, vector)
    }

    /// Replace the vector of an existing item. Fails with [`Error::ItemNotFound`] if absent.
    pub fn update_item(&mut self, id: ItemId, vector: &[f32]) -> Result<()> {
        self.check_vector(vector)?;
        if !self.contains_item(id)? {
            return Err(Error::ItemNotFound { id });
        }
        self.delete_item(id)?;
        self.insert(id, vector)
    }

    /// INSERT: Algorithm 1 from the HNSW paper.
    fn insert(&mut self, id: ItemId, vector: &[f32]) -> Result<()> {
        let params = self.meta.params.clone();
        let level = random_level(&mut self.rng, params.ml, params.max_layers);

        self.deleted.remove(&id);
        self.nodes.insert(id, NodeRecord::new(vector.to_vec(), level));
        self.meta.len += 1;

        // If this is the first node, set it as entry point
        let Some(ep_id) = self.meta.entry_point else {
            self.set_entry_point(Some(id), level);
            return Ok(());
        };
        let ep = distance_to(self, vector, ep_id)?
            .ok_or_else(|| missing_entry_point(ep_id))?;
        let current_max_level = self.meta.max_level();

        // Phase 1: Greedy descent from top layer down to level+1 (ef=1)
        let entry = greedy_descend(self, vector, ep, current_max_level, level)?;

        // Phase 2: Insert at layers min(level, current_max_level) down to 0
        let mut entry_points = vec![entry];
        for layer in (0..=level.min(current_max_level)).rev() {
            let mut nearest =
                search_layer(self, vector, &entry_points, params.ef_construction, layer, None)?;
            nearest.retain(|n| n.id != id);

            let selected = self.select(&nearest, &[], params.cap(layer))?;
            if let Some(node) = self.nodes.remove(&id) {
                self.set_links(id, node, layer, selected.iter().map(|n| n.id).collect());
            }

            // Add bidirectional connections
            for n in &selected {
                self.connect(n.id, id, layer)?;
            }

            if !nearest.is_empty() {
                entry_points = nearest;
            }
        }

        // Update entry point if new node has a higher level
        if level > current_max_level {
            self.set_entry_point(Some(id), level);
        }

        Ok(())
    }

    /// Remove an item and repair the links around it.
    pub fn delete_item(&mut self, id: ItemId) -> Result<()> {
        let Some(removed) = self.node(id)?.map(Cow::into_owned) else {
            return Err(Error::ItemNotFound { id });
        };

        let backlinks = self.backlinks()?;
        let linked_from: Vec<Vec<ItemId>> = (0..=removed.level())
            .map(|layer| backlinks.sources(layer, id))
            .collect();
        backlinks.remove_node(id, &removed);

        self.nodes.remove(&id);
        self.deleted.insert(id);
        self.meta.len -= 1;

        if self.meta.len == 0 {
            self.set_entry_point(None, 0);
            return Ok(());
        }
        if self.meta.entry_point == Some(id) {
            self.promote_entry_point()?;
        }

        for (layer, sources) in linked_from.iter().enumerate().rev() {
            trace!(index = self.index, id, layer, affected = sources.len(), "repairing links");
            for &node_id in sources {
                self.repair(node_id, id, &removed, layer)?;
            }
        }

        Ok(())
    }

    /// Remove every item.
    pub fn clear(&mut self) -> Result<()> {
        self.cleared = true;
        self.nodes.clear();
        self.deleted.clear();
        self.backlinks = Some(Backlinks::new());
        self.meta.len = 0;
        self.set_entry_point(None, 0);
        debug!(index = self.index, "cleared index");
        Ok(())
    }

    /// Persist every change atomically.
    ///
    /// On error nothing is written and the committed state is unchanged.
    #[tracing::instrument(skip(self), fields(index = self.index, len = self.meta.len))]
    pub fn commit(mut self) -> Result<()> {
        if self.cleared || !self.nodes.is_empty() || !self.deleted.is_empty() {
            self.reconnect()?;
        }

        let config = &self.db.config;
        let wtxn = self.db.env.begin_write()?;

        {
            let mut metadata = wtxn.open_table(METADATA_TABLE)?;
            if self.is_new && metadata.get(self.index)?.is_none() {
                let count = metadata.len()?;
                if count >= u64::from(config.max_indexes) {
                    warn!(index = self.index, count, max = config.max_indexes, "index limit reached");
                    return Err(Error::IndexLimitReached {
                        index: self.index,
                        max: config.max_indexes,
                    });
                }
            }
            metadata.insert(self.index, self.meta.encode()?.as_slice())?;
        }

        let name = nodes_table_name(self.index);
        if self.cleared {
            wtxn.delete_table(nodes_table(&name))?;
        }
        {
            let mut table = wtxn.open_table(nodes_table(&name))?;
            for &id in &self.deleted {
                table.remove(id)?;
            }
            for (&id, node) in &self.nodes {
                table.insert(id, node.encode().as_slice())?;
            }
        }

        let stats = wtxn.stats()?;
        let required = stats.allocated_pages() * stats.page_size() as u64;
        if required > config.map_size_bytes {
            warn!(index = self.index, required, limit = config.map_size_bytes, "map size exceeded");
            return Err(StorageError::MapFull {
                required,
                limit: config.map_size_bytes,
            }
            .into());
        }

        wtxn.commit()?;
        debug!(
            index = self.index,
            written = self.nodes.len(),
            removed = self.deleted.len(),
            entry_point = ?self.meta.entry_point,
            "writer committed"
        );
        Ok(())
    }

    /// Discard every change.
    pub fn abort(self) {
        debug!(index = self.index, discarded = self.nodes.len(), "writer aborted");
    }

    fn set_entry_point(&mut self, entry_point: Option<ItemId>, level: usize) {
        if self.meta.entry_point != entry_point {
            debug!(index = self.index, ?entry_point, level, "entry point changed");
        }
        self.meta.entry_point = entry_point;
        self.meta.max_level = level as u8;
    }

    /// Pick the remaining node with the highest level, ties going to the lowest id.
    fn promote_entry_point(&mut self) -> Result<()> {
        let mut best: Option<(usize, ItemId)> = None;
        let mut consider = |id: ItemId, level: usize| match best {
            Some((l, b)) if l > level || (l == level && b < id) => {}
            _ => best = Some((level, id)),
        };

        for (&id, node) in &self.nodes {
            consider(id, node.level());
        }
        if let Some(table) = self.stored() {
            for entry in table.iter()? {
                let (key, bytes) = entry?;
                let id = key.value();
                if self.nodes.contains_key(&id) || self.deleted.contains(&id) {
                    continue;
                }
                consider(id, NodeRecord::decode_level(bytes.value())?);
            }
        }

        match best {
            Some((level, id)) => self.set_entry_point(Some(id), level),
            None => self.set_entry_point(None, 0),
        }
        Ok(())
    }

    /// Drop the link from `node_id` to the deleted node and find replacements.
    fn repair(&mut self, node_id: ItemId, deleted: ItemId, removed: &NodeRecord, layer: usize) -> Result<()> {
        let Some(node) = self.node(node_id)?.map(Cow::into_owned) else {
            return Ok(());
        };
        if layer > node.level() {
            return Ok(());
        }

        // Surviving links; dangling ones are dropped here too.
        let remaining = self.score(&node.vector, node.links(layer))?;

        // The deleted node's other neighbors are natural replacements.
        let siblings: Vec<ItemId> = removed
            .links(layer)
            .iter()
            .copied()
            .filter(|&n| n != node_id && n != deleted)
            .collect();
        let mut seeds = remaining.clone();
        seeds.extend(self.score(&node.vector, &siblings)?);
        if seeds.is_empty() {
            if let Some(ep_id) = self.meta.entry_point.filter(|&ep| ep != node_id) {
                if let Some(ep) = distance_to(self, &node.vector, ep_id)? {
                    seeds.push(greedy_descend(self, &node.vector, ep, self.meta.max_level(), layer)?);
                }
            }
        }

        let mut candidates = search_layer(
            self,
            &node.vector,
            &seeds,
            self.meta.params.ef_construction,
            layer,
            None,
        )?;
        candidates.extend(seeds);
        candidates.retain(|n| n.id != node_id);

        let selected = self.select(&candidates, &remaining, self.meta.params.cap(layer))?;
        trace!(
            index = self.index,
            node = node_id,
            layer,
            before = remaining.len(),
            after = selected.len(),
            "relinked node"
        );

        let added: Vec<ItemId> = selected
            .iter()
            .map(|n| n.id)
            .filter(|id| !remaining.iter().any(|r| r.id == *id))
            .collect();
        self.set_links(node_id, node, layer, selected.into_iter().map(|n| n.id).collect());

        for n in added {
            self.connect(n, node_id, layer)?;
        }
        Ok(())
    }

    /// Add a link `from -> to` at `layer`, pruning `from` back to its cap if needed.
    ///
    /// Pruning can leave a node without in-links; [`Writer::reconnect`] links
    /// such nodes back before commit.
    fn connect(&mut self, from: ItemId, to: ItemId, layer: usize) -> Result<()> {
        let Some(node) = self.node(from)?.map(Cow::into_owned) else {
            return Ok(());
        };
        if layer > node.level() || node.links(layer).contains(&to) {
            return Ok(());
        }
        let mut links = node.links(layer).to_vec();
        links.push(to);

        let cap = self.meta.params.cap(layer);
        if links.len() > cap {
            let scored = self.score(&node.vector, &links)?;
            links = self.select(&scored, &[], cap)?.into_iter().map(|n| n.id).collect();
        }

        self.set_links(from, node, layer, links);
        Ok(())
    }

    /// Replace the neighbors of `id` on `layer` and stage the node.
    fn set_links(&mut self, id: ItemId, mut node: NodeRecord, layer: usize, links: Vec<ItemId>) {
        if let Some(backlinks) = &mut self.backlinks {
            backlinks.replace(layer, id, node.links(layer), &links);
        }
        node.links[layer] = links;
        self.nodes.insert(id, node);
    }

    /// The in-link index, scanning every live node the first time.
    fn backlinks(&mut self) -> Result<&mut Backlinks> {
        if self.backlinks.is_none() {
            let mut backlinks = Backlinks::new();
            for (&id, node) in &self.nodes {
                backlinks.add_node(id, node);
            }
            if let Some(table) = self.stored() {
                for entry in table.iter()? {
                    let (key, bytes) = entry?;
                    let id = key.value();
                    if self.nodes.contains_key(&id) || self.deleted.contains(&id) {
                        continue;
                    }
                    backlinks.add_node(id, &NodeRecord::decode(bytes.value())?);
                }
            }
            debug!(index = self.index, "indexed backlinks");
            self.backlinks = Some(backlinks);
        }
        Ok(self.backlinks.get_or_insert_with(Backlinks::new))
    }

    /// Ids of every live node.
    fn live_ids(&self) -> Result<RoaringBitmap> {
        let mut ids: RoaringBitmap = self.nodes.keys().copied().collect();
        if let Some(table) = self.stored() {
            for entry in table.iter()? {
                let (key, _) = entry?;
                let id = key.value();
                if !self.deleted.contains(&id) {
                    ids.insert(id);
                }
            }
        }
        Ok(ids)
    }

    /// Link back every live node the entry point cannot reach on layer 0.
    ///
    /// The walk from the entry point records the link it used to enter each
    /// node. Those links are never removed here, so attaching one node never
    /// detaches another.
    fn reconnect(&mut self) -> Result<()> {
        let Some(ep) = self.meta.entry_point else {
            return Ok(());
        };
        let live = self.live_ids()?;
        let mut reached = RoaringBitmap::new();
        let mut entered_from = HashMap::new();
        self.walk(ep, &mut reached, &mut entered_from)?;
        if reached.len() == live.len() {
            return Ok(());
        }

        let unreachable = &live - &reached;
        let mut attached = 0usize;
        for id in &unreachable {
            if reached.contains(id) {
                continue;
            }
            let host = self.attach(id, &reached, &entered_from)?;
            entered_from.insert(id, host);
            self.walk(id, &mut reached, &mut entered_from)?;
            attached += 1;
        }
        debug!(
            index = self.index,
            unreachable = unreachable.len(),
            attached,
            "reconnected layer 0"
        );
        Ok(())
    }

    /// Mark everything reachable from `start` on layer 0.
    fn walk(
        &self,
        start: ItemId,
        reached: &mut RoaringBitmap,
        entered_from: &mut HashMap<ItemId, ItemId>,
    ) -> Result<()> {
        reached.insert(start);
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id)? else {
                continue;
            };
            for &n in node.links(0) {
                if reached.contains(n) || !self.contains_item(n)? {
                    continue;
                }
                reached.insert(n);
                entered_from.insert(n, id);
                stack.push(n);
            }
        }
        Ok(())
    }

    /// Add a layer-0 link to `id` from a reached node and return that node.
    ///
    /// Nodes close to `id` are tried first. A full list gives up its furthest
    /// link that the walk did not enter through.
    fn attach(
        &mut self,
        id: ItemId,
        reached: &RoaringBitmap,
        entered_from: &HashMap<ItemId, ItemId>,
    ) -> Result<ItemId> {
        let Some(orphan) = self.node(id)?.map(Cow::into_owned) else {
            return Err(StorageError::Corrupted(format!("item {id} does not resolve")).into());
        };
        let mut near = Vec::new();
        if let Some(ep_id) = self.meta.entry_point {
            if let Some(ep) = distance_to(self, &orphan.vector, ep_id)? {
                let entry = greedy_descend(self, &orphan.vector, ep, self.meta.max_level(), 0)?;
                near = search_layer(
                    self,
                    &orphan.vector,
                    &[entry],
                    self.meta.params.ef_construction,
                    0,
                    None,
                )?;
            }
        }

        let cap = self.meta.params.cap(0);
        for host in near.iter().map(|n| n.id).chain(reached.iter()) {
            if host == id || !reached.contains(host) {
                continue;
            }
            let Some(node) = self.node(host)?.map(Cow::into_owned) else {
                continue;
            };
            let mut links = Vec::with_capacity(cap);
            for &n in node.links(0) {
                if self.contains_item(n)? {
                    links.push(n);
                }
            }
            if links.len() >= cap {
                let spare: Vec<ItemId> = links
                    .iter()
                    .copied()
                    .filter(|n| entered_from.get(n) != Some(&host))
                    .collect();
                let Some(furthest) = self.score(&node.vector, &spare)?.into_iter().max() else {
                    continue;
                };
                links.retain(|&n| n != furthest.id);
            }
            links.push(id);
            trace!(index = self.index, id, host, "attached unreachable node");
            self.set_links(host, node, 0, links);
            return Ok(host);
        }
        Err(StorageError::Corrupted(format!("no reachable node can link to {id}")).into())
    }

    /// Score `ids` against `base`, skipping ids that do not resolve.
    fn score(&self, base: &[f32], ids: &[ItemId]) -> Result<Vec<Neighbor>> {
        let mut scored = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(n) = distance_to(self, base, id)? {
                scored.push(n);
            }
        }
        Ok(scored)
    }

    /// Run the neighbor selection heuristic over scored nodes.
    fn select(&self, candidates: &[Neighbor], existing: &[Neighbor], cap: usize) -> Result<Vec<Neighbor>> {
        let candidates = self.resolve(candidates)?;
        let existing = self.resolve(existing)?;
        Ok(select_neighbors(
            self.meta.metric,
            &as_candidates(&candidates),
            &as_candidates(&existing),
            cap,
        ))
    }

    fn resolve(&self, neighbors: &[Neighbor]) -> Result<Vec<(Neighbor, Cow<'_, NodeRecord>)>> {
        let mut nodes = Vec::with_capacity(neighbors.len());
        for &n in neighbors {
            if let Some(node) = self.node(n.id)? {
                nodes.push((n, node));
            }
        }
        Ok(nodes)
    }
}

impl GraphReader for Writer<'_> {
    fn metric(&self) -> Metric {
        self.meta.metric
    }

    fn node(&self, id: ItemId) -> Result<Option<Cow<'_, NodeRecord>>> {
        if let Some(node) = self.nodes.get(&id) {
            return Ok(Some(Cow::Borrowed(node)));
        }
        if self.deleted.contains(&id) {
            return Ok(None);
        }
        match self.stored() {
            Some(table) => Ok(read_node(table, id)?.map(Cow::Owned)),
            None => Ok(None),
        }
    }
}

fn as_candidates<'a>(nodes: &'a [(Neighbor, Cow<'_, NodeRecord>)]) -> Vec<Candidate<'a>> {
    nodes
        .iter()
        .map(|(n, node)| Candidate::new(*n, &node.vector))
        .collect()
}

fn missing_entry_point(id: ItemId) -> Error {
    StorageError::Corrupted(format!("entry point {id} does not resolve")).into()
}
