//! Graph shape statistics.

use crate::persistence::NodeRecord;

/// Summary of an index's graph, see [`Searcher::stats`](crate::Searcher::stats).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexStats {
    pub items: u64,
    /// Number of nodes present on each layer, layer 0 first.
    pub layer_distribution: Vec<u64>,
    /// Total number of links stored on each layer.
    pub links_per_layer: Vec<u64>,
    /// Average number of links per (node, layer) pair.
    pub mean_degree: f64,
}

impl IndexStats {
    pub(crate) fn record(&mut self, node: &NodeRecord) {
        self.items += 1;
        let layers = node.level() + 1;
        if self.layer_distribution.len() < layers {
            self.layer_distribution.resize(layers, 0);
            self.links_per_layer.resize(layers, 0);
        }
        for (layer, links) in node.links.iter().enumerate() {
            self.layer_distribution[layer] += 1;
            self.links_per_layer[layer] += links.len() as u64;
        }

        let lists: u64 = self.layer_distribution.iter().sum();
        let links: u64 = self.links_per_layer.iter().sum();
        self.mean_degree = links as f64 / lists as f64;
    }

    /// Number of layers in use.
    pub fn layers(&self) -> usize {
        self.layer_distribution.len()
    }
}
