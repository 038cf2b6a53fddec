//! On-disk layout of the graph store inside the redb environment.
//!
//! - `hnsw_metadata`: one row per index, `IndexId -> IndexMetadata`
//! - `hnsw_nodes_{index}`: one table per index, `ItemId -> NodeRecord`

pub mod metadata;
pub mod node;

use redb::{ReadOnlyTable, ReadTransaction, ReadableTable, TableDefinition, TableError};

use crate::error::Result;
use crate::{IndexId, ItemId};

pub use metadata::{IndexMetadata, SCHEMA_VERSION};
pub use node::NodeRecord;

/// Metadata rows for every index of the database.
pub(crate) const METADATA_TABLE: TableDefinition<'static, IndexId, &[u8]> =
    TableDefinition::new("hnsw_metadata");

/// A committed snapshot of one index's node table.
pub(crate) type NodeTable = ReadOnlyTable<ItemId, &'static [u8]>;

pub(crate) fn nodes_table_name(index: IndexId) -> String {
    format!("hnsw_nodes_{index}")
}

pub(crate) fn nodes_table(name: &str) -> TableDefinition<'_, ItemId, &'static [u8]> {
    TableDefinition::new(name)
}

/// Read the metadata of `index`, `None` if it was never committed.
pub(crate) fn read_metadata(rtxn: &ReadTransaction, index: IndexId) -> Result<Option<IndexMetadata>> {
    let table = match rtxn.open_table(METADATA_TABLE) {
        Ok(table) => table,
        Err(TableError::TableDoesNotExist(_)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let meta = match table.get(index)? {
        Some(bytes) => Some(IndexMetadata::decode(bytes.value())?),
        None => None,
    };
    Ok(meta)
}

/// Open the node table of `index` in a read snapshot, `None` if it does not exist.
pub(crate) fn open_nodes(rtxn: &ReadTransaction, index: IndexId) -> Result<Option<NodeTable>> {
    let name = nodes_table_name(index);
    match rtxn.open_table(nodes_table(&name)) {
        Ok(table) => Ok(Some(table)),
        Err(TableError::TableDoesNotExist(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Decode the node stored under `id`.
pub(crate) fn read_node(table: &NodeTable, id: ItemId) -> Result<Option<NodeRecord>> {
    let node = match table.get(id)? {
        Some(bytes) => Some(NodeRecord::decode(bytes.value())?),
        None => None,
    };
    Ok(node)
}
