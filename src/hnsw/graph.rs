//! HNSW graph traversal: layer search and greedy descent.
//!
//! Implements the search routines of the Hierarchical Navigable Small World graph from:
//! "Efficient and robust approximate nearest neighbor search using
//!  Hierarchical Navigable Small World graphs" (Malkov & Yashunin, 2016/2018).
//!
//! The routines are generic over [`GraphReader`], so the same code walks a
//! committed snapshot (searchers) or a snapshot with uncommitted changes
//! layered on top (writers).

use std::borrow::Cow;

use rand::Rng;
use roaring::RoaringBitmap;

use crate::distance::Metric;
use crate::error::Result;
use crate::persistence::NodeRecord;
use crate::ItemId;

use super::neighbor_queue::{MaxHeap, MinHeap, Neighbor};

/// Read access to the nodes of one index.
pub trait GraphReader {
    fn metric(&self) -> Metric;

    /// The node stored under `id`, or `None` if it does not exist (or was deleted).
    ///
    /// Links may reference ids that no longer resolve; traversal skips them.
    fn node(&self, id: ItemId) -> Result<Option<Cow<'_, NodeRecord>>>;
}

/// Generate a random level for a new node: `floor(-ln(u) * ml)`, capped at `max_layers - 1`.
pub fn random_level<R: Rng + ?Sized>(rng: &mut R, ml: f64, max_layers: usize) -> usize {
    // 1 - [0, 1) lies in (0, 1], so ln() stays finite.
    let r: f64 = 1.0 - rng.gen::<f64>();
    let level = (-r.ln() * ml).floor() as usize;
    level.min(max_layers.saturating_sub(1))
}

/// Distance from `query` to node `id`, `None` when the node does not resolve.
pub fn distance_to<G: GraphReader + ?Sized>(
    graph: &G,
    query: &[f32],
    id: ItemId,
) -> Result<Option<Neighbor>> {
    Ok(graph
        .node(id)?
        .map(|node| Neighbor::new(id, graph.metric().ordering_distance(query, &node.vector))))
}

/// SEARCH-LAYER: Algorithm 2 from the HNSW paper.
///
/// Search a single layer of the graph for the `ef` closest neighbors to `query`,
/// starting from `entry_points` (already scored against the query).
///
/// With a `filter`, every reachable node is still traversed but only ids in
/// the filter enter the result set. Returns the results sorted ascending.
pub fn search_layer<G: GraphReader + ?Sized>(
    graph: &G,
    query: &[f32],
    entry_points: &[Neighbor],
    ef: usize,
    layer: usize,
    filter: Option<&RoaringBitmap>,
) -> Result<Vec<Neighbor>> {
    let metric = graph.metric();
    let admits = |id: ItemId| filter.map_or(true, |f| f.contains(id));

    let mut visited = RoaringBitmap::new();
    let mut candidates = MinHeap::new(); // closest candidate on top
    let mut results = MaxHeap::new(); // furthest result on top

    for &ep in entry_points {
        if !visited.insert(ep.id) {
            continue;
        }
        candidates.push(ep);
        if admits(ep.id) {
            results.push_bounded(ep, ef);
        }
    }

    while let Some(c) = candidates.pop() {
        // If the closest candidate is further than the furthest of a full result set, stop
        if results.len() >= ef {
            if let Some(furthest) = results.peek() {
                if c.distance > furthest.distance {
                    break;
                }
            }
        }

        // Explore neighbors of c at this layer
        let Some(node) = graph.node(c.id)? else {
            continue;
        };
        for &neighbor_id in node.links(layer) {
            if !visited.insert(neighbor_id) {
                continue;
            }
            // Skip dangling links
            let Some(neighbor) = graph.node(neighbor_id)? else {
                continue;
            };

            let dist = metric.ordering_distance(query, &neighbor.vector);
            let furthest_dist = results.peek().map(|n| n.distance).unwrap_or(f32::INFINITY);

            if results.len() < ef || dist < furthest_dist {
                let n = Neighbor::new(neighbor_id, dist);
                candidates.push(n);
                if admits(neighbor_id) {
                    results.push_bounded(n, ef);
                }
            }
        }
    }

    Ok(results.into_sorted_vec())
}

/// Greedy descent with ef = 1 from `top_layer` down to `bottom_layer` (exclusive).
///
/// Returns the closest node found on the last layer walked, or `entry` unchanged
/// when `top_layer <= bottom_layer`.
pub fn greedy_descend<G: GraphReader + ?Sized>(
    graph: &G,
    query: &[f32],
    mut entry: Neighbor,
    top_layer: usize,
    bottom_layer: usize,
) -> Result<Neighbor> {
    for layer in (bottom_layer + 1..=top_layer).rev() {
        let nearest = search_layer(graph, query, &[entry], 1, layer, None)?;
        if let Some(&n) = nearest.first() {
            entry = n;
        }
    }
    Ok(entry)
}
