//! Index metadata: dimension, metric, counts, entry point and build parameters.
//!
//! Stored as: [schema_version: u32][bincode(IndexMetadata)]

use serde::{Deserialize, Serialize};

use crate::config::HnswParams;
use crate::distance::Metric;
use crate::error::StorageError;
use crate::ItemId;

/// Version of the persisted layout written by this engine.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub dimension: u32,
    pub metric: Metric,
    /// Number of live items.
    pub len: u64,
    /// Node with the highest layer, `None` when the index is empty.
    pub entry_point: Option<ItemId>,
    /// Layer of the entry point.
    pub max_level: u8,
    pub params: HnswParams,
}

impl IndexMetadata {
    pub fn new(dimension: usize, metric: Metric, params: HnswParams) -> Self {
        Self {
            dimension: dimension as u32,
            metric,
            len: 0,
            entry_point: None,
            max_level: 0,
            params,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension as usize
    }

    pub fn max_level(&self) -> usize {
        usize::from(self.max_level)
    }

    pub fn encode(&self) -> Result<Vec<u8>, StorageError> {
        let payload =
            bincode::serialize(self).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let mut bytes = Vec::with_capacity(4 + payload.len());
        bytes.extend_from_slice(&SCHEMA_VERSION.to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        if bytes.len() < 4 {
            return Err(StorageError::Corrupted("metadata record too small".into()));
        }
        let (version, payload) = bytes.split_at(4);
        let version = u32::from_le_bytes([version[0], version[1], version[2], version[3]]);
        if version > SCHEMA_VERSION {
            return Err(StorageError::IncompatibleVersion {
                found: version,
                supported: SCHEMA_VERSION,
            });
        }
        bincode::deserialize(payload).map_err(|e| StorageError::Corrupted(e.to_string()))
    }
}
