//! Reverse adjacency for a graph under modification.
//!
//! Neighbor lists are directed, so a node cannot tell who links to it. A
//! writer keeps this index next to its overlay to find every in-link of a node
//! it is about to remove.

use std::collections::{BTreeSet, HashMap};

use crate::persistence::NodeRecord;
use crate::ItemId;

/// `layers[l][to]` holds every node with a link to `to` on layer `l`.
#[derive(Debug, Default, Clone)]
pub struct Backlinks {
    layers: Vec<HashMap<ItemId, BTreeSet<ItemId>>>,
}

impl Backlinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every out-link of `id`.
    pub fn add_node(&mut self, id: ItemId, node: &NodeRecord) {
        for (layer, links) in node.links.iter().enumerate() {
            for &to in links {
                self.insert(layer, id, to);
            }
        }
    }

    /// Forget `id` both as a source and as a target.
    pub fn remove_node(&mut self, id: ItemId, node: &NodeRecord) {
        for (layer, links) in node.links.iter().enumerate() {
            for &to in links {
                self.remove(layer, id, to);
            }
        }
        for sources in &mut self.layers {
            sources.remove(&id);
        }
    }

    pub fn insert(&mut self, layer: usize, from: ItemId, to: ItemId) {
        if self.layers.len() <= layer {
            self.layers.resize_with(layer + 1, HashMap::new);
        }
        self.layers[layer].entry(to).or_default().insert(from);
    }

    pub fn remove(&mut self, layer: usize, from: ItemId, to: ItemId) {
        let Some(sources) = self.layers.get_mut(layer) else {
            return;
        };
        if let Some(set) = sources.get_mut(&to) {
            set.remove(&from);
            if set.is_empty() {
                sources.remove(&to);
            }
        }
    }

    /// Apply the change of `from`'s list on `layer` from `old` to `new`.
    pub fn replace(&mut self, layer: usize, from: ItemId, old: &[ItemId], new: &[ItemId]) {
        for &to in old.iter().filter(|to| !new.contains(to)) {
            self.remove(layer, from, to);
        }
        for &to in new.iter().filter(|to| !old.contains(to)) {
            self.insert(layer, from, to);
        }
    }

    /// Nodes linking to `to` on `layer`, ascending.
    pub fn sources(&self, layer: usize, to: ItemId) -> Vec<ItemId> {
        self.layers
            .get(layer)
            .and_then(|sources| sources.get(&to))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}
