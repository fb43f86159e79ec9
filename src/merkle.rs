//! Merkle tree construction over transaction ids.

use crate::serialization::double_sha256;
use crate::types::{Hash, Txid, ZERO_HASH};

/// Compute the merkle root over the given transaction ids.
///
/// Interior nodes are the double SHA-256 of the concatenated children; a
/// level with an odd number of nodes duplicates its last node. An empty
/// list yields the zero hash (block sanity rejects empty blocks before the
/// merkle check runs).
pub fn merkle_root(txids: &[Txid]) -> Hash {
    if txids.is_empty() {
        return ZERO_HASH;
    }

    let mut level: Vec<Hash> = txids.iter().map(|id| id.0).collect();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            let mut concat = [0u8; 64];
            concat[..32].copy_from_slice(left);
            concat[32..].copy_from_slice(right);
            next.push(double_sha256(&concat));
        }
        level = next;
    }
    level[0]
}
