//! Node records: one per live item, holding its vector and per-layer links.
//!
//! Each record is written as: [crc32: u32][payload]
//! payload = [layers: u8][dimension: u32][f32 * dimension]
//!           then per layer: [count: u32][ItemId * count]
//! All integers and floats are little-endian.

use crate::error::StorageError;
use crate::ItemId;

/// A graph node as persisted in an index's node table.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub vector: Vec<f32>,
    /// Neighbor ids per layer. `links[l]` exists for every `l <= level`.
    pub links: Vec<Vec<ItemId>>,
}

impl NodeRecord {
    /// A node with empty neighbor lists on layers `0..=level`.
    pub fn new(vector: Vec<f32>, level: usize) -> Self {
        Self {
            vector,
            links: vec![Vec::new(); level + 1],
        }
    }

    /// The highest layer this node participates in.
    pub fn level(&self) -> usize {
        self.links.len().saturating_sub(1)
    }

    /// Neighbors at `layer`, empty when the node does not reach it.
    pub fn links(&self, layer: usize) -> &[ItemId] {
        self.links.get(layer).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn encode(&self) -> Vec<u8> {
        let link_count: usize = self.links.iter().map(Vec::len).sum();
        let mut payload =
            Vec::with_capacity(5 + self.vector.len() * 4 + self.links.len() * 4 + link_count * 4);

        payload.push(self.links.len() as u8);
        payload.extend_from_slice(&(self.vector.len() as u32).to_le_bytes());
        for &val in &self.vector {
            payload.extend_from_slice(&val.to_le_bytes());
        }
        for layer in &self.links {
            payload.extend_from_slice(&(layer.len() as u32).to_le_bytes());
            for &id in layer {
                payload.extend_from_slice(&id.to_le_bytes());
            }
        }

        let crc = crc32fast::hash(&payload);
        let mut bytes = Vec::with_capacity(4 + payload.len());
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes.extend_from_slice(&payload);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        let mut reader = ByteReader::new(checked_payload(bytes)?);

        let layers = reader.read_u8()? as usize;
        if layers == 0 {
            return Err(StorageError::Corrupted("node without layers".into()));
        }
        let dimension = reader.read_u32()? as usize;
        let mut vector = Vec::with_capacity(dimension);
        for _ in 0..dimension {
            vector.push(reader.read_f32()?);
        }

        let mut links = Vec::with_capacity(layers);
        for _ in 0..layers {
            let count = reader.read_u32()? as usize;
            let mut layer = Vec::with_capacity(count);
            for _ in 0..count {
                layer.push(reader.read_u32()?);
            }
            links.push(layer);
        }

        if !reader.is_empty() {
            return Err(StorageError::Corrupted("trailing bytes after node".into()));
        }

        Ok(Self { vector, links })
    }

    /// Read only the level of an encoded node.
    pub fn decode_level(bytes: &[u8]) -> Result<usize, StorageError> {
        let layers = ByteReader::new(checked_payload(bytes)?).read_u8()? as usize;
        if layers == 0 {
            return Err(StorageError::Corrupted("node without layers".into()));
        }
        Ok(layers - 1)
    }
}

/// Verify the CRC prefix and return the payload.
fn checked_payload(bytes: &[u8]) -> Result<&[u8], StorageError> {
    if bytes.len() < 4 {
        return Err(StorageError::Corrupted("node record too small".into()));
    }
    let (crc, payload) = bytes.split_at(4);
    let expected = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
    if crc32fast::hash(payload) != expected {
        return Err(StorageError::Corrupted("node checksum mismatch".into()));
    }
    Ok(payload)
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], StorageError> {
        let end = self.pos + N;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| StorageError::Corrupted("truncated node record".into()))?;
        self.pos = end;
        let mut buf = [0u8; N];
        buf.copy_from_slice(slice);
        Ok(buf)
    }

    fn read_u8(&mut self) -> Result<u8, StorageError> {
        Ok(self.take::<1>()?[0])
    }

    fn read_u32(&mut self) -> Result<u32, StorageError> {
        self.take::<4>().map(u32::from_le_bytes)
    }

    fn read_f32(&mut self) -> Result<f32, StorageError> {
        self.take::<4>().map(f32::from_le_bytes)
    }

    fn is_empty(&self) -> bool {
        self.pos == self.bytes.len()
    }
}
