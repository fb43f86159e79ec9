//! Block index nodes.
//!
//! A [`BlockNode`] records a header's position in the block index. Nodes are
//! created once a header passes the contextual checks and live for the
//! lifetime of the index; the parent links are what the median-time-past and
//! ancestor lookups walk.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::constants::MEDIAN_TIME_BLOCKS;
use crate::types::{BlockHash, BlockHeader};

/// A block's position in the block index.
#[derive(Debug, Clone)]
pub struct BlockNode {
    pub hash: BlockHash,
    pub height: u32,
    pub version: i32,
    pub bits: u32,
    pub timestamp: DateTime<Utc>,
    pub parent: Option<Arc<BlockNode>>,
}

impl BlockNode {
    /// Create a node for `header` extending `parent`. A node without a
    /// parent sits at height zero.
    pub fn new(header: &BlockHeader, parent: Option<Arc<BlockNode>>) -> Self {
        BlockNode {
            hash: header.block_hash(),
            height: parent.as_ref().map_or(0, |p| p.height + 1),
            version: header.version,
            bits: header.bits,
            timestamp: header.timestamp,
            parent,
        }
    }

    /// The ancestor at the given height, walking parent links. Returns
    /// `None` when the height is above this node or the chain of parents is
    /// too short.
    pub fn ancestor(&self, height: u32) -> Option<&BlockNode> {
        if height > self.height {
            return None;
        }
        let mut node = self;
        while node.height > height {
            node = node.parent.as_deref()?;
        }
        Some(node)
    }

    /// Median of the timestamps of the last 11 blocks ending at this node.
    ///
    /// With fewer than 11 ancestors, the median of what exists.
    pub fn calc_past_median_time(&self) -> DateTime<Utc> {
        let mut timestamps = Vec::with_capacity(MEDIAN_TIME_BLOCKS);
        let mut node = Some(self);
        while let Some(n) = node {
            timestamps.push(n.timestamp);
            if timestamps.len() == MEDIAN_TIME_BLOCKS {
                break;
            }
            node = n.parent.as_deref();
        }
        timestamps.sort_unstable();
        timestamps[timestamps.len() / 2]
    }
}
