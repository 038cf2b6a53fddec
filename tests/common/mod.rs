//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;

use hnswdb::{Database, DatabaseConfig, HnswParams, IndexId, ItemId, Metric, WriterOptions};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Install a test subscriber once; respects `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A fresh database in its own temporary directory.
pub fn open_db(config: DatabaseConfig) -> (TempDir, Database) {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("test.redb"), config).unwrap();
    (dir, db)
}

pub fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.gen::<f32>()).collect())
        .collect()
}

/// Commit `vectors` into `index` under ids `0..n`.
pub fn build_index(
    db: &Database,
    index: IndexId,
    metric: Metric,
    vectors: &[Vec<f32>],
    params: HnswParams,
) {
    let dim = vectors[0].len();
    let options = WriterOptions::new().params(params).seed(42);
    let mut writer = db.writer_with_options(index, dim, metric, options).unwrap();
    for (i, v) in vectors.iter().enumerate() {
        writer.add_item(i as ItemId, v).unwrap();
    }
    writer.commit().unwrap();
}

/// Exact k nearest neighbors of `query` among `items`, ordered like search results.
pub fn brute_force(
    metric: Metric,
    items: &[(ItemId, Vec<f32>)],
    query: &[f32],
    k: usize,
) -> Vec<(ItemId, f32)> {
    let mut scored: Vec<(ItemId, f32)> = items
        .iter()
        .map(|(id, v)| (*id, metric.distance(query, v).unwrap()))
        .collect();
    scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    scored.truncate(k);
    scored
}

pub fn recall_at_k(truth: &[(ItemId, f32)], found: &[(ItemId, f32)]) -> f64 {
    let ground_truth: HashSet<ItemId> = truth.iter().map(|(id, _)| *id).collect();
    let hits = found
        .iter()
        .filter(|(id, _)| ground_truth.contains(id))
        .count();
    hits as f64 / truth.len() as f64
}

pub fn ids(results: &[(ItemId, f32)]) -> Vec<ItemId> {
    results.iter().map(|(id, _)| *id).collect()
}
