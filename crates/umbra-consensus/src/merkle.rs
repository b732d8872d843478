//! Merkle tree construction.

use crate::block::{Block, PoSBlockSummary};
use crate::hashing::{double_sha256, Hash256};

/// Root of a double-SHA-256 merkle tree over the given leaf hashes.
/// An odd level duplicates its last node. Empty input yields the null
/// hash.
pub fn merkle_root_from_hashes(mut hashes: Vec<Hash256>) -> Hash256 {
    if hashes.is_empty() {
        return Hash256::ZERO;
    }
    while hashes.len() > 1 {
        if hashes.len() % 2 != 0 {
            let last = *hashes.last().expect("non-empty level");
            hashes.push(last);
        }
        let mut next = Vec::with_capacity(hashes.len() / 2);
        for pair in hashes.chunks(2) {
            let mut buf = [0u8; 64];
            buf[..32].copy_from_slice(pair[0].as_bytes());
            buf[32..].copy_from_slice(pair[1].as_bytes());
            next.push(double_sha256(&buf));
        }
        hashes = next;
    }
    hashes[0]
}

/// Merkle root over a block's transactions.
pub fn block_merkle_root(block: &Block) -> Hash256 {
    merkle_root_from_hashes(block.vtx.iter().map(|tx| tx.hash()).collect())
}

/// Merkle root over the audited proof-of-stake summaries of an audit
/// block. Each leaf commits to the summary's hash, height and time.
pub fn poa_merkle_root(audits: &[PoSBlockSummary]) -> Hash256 {
    let leaves = audits
        .iter()
        .map(|summary| {
            let mut buf = Vec::with_capacity(40);
            buf.extend_from_slice(summary.hash.as_bytes());
            buf.extend_from_slice(&summary.height.to_le_bytes());
            buf.extend_from_slice(&summary.time.to_le_bytes());
            double_sha256(&buf)
        })
        .collect();
    merkle_root_from_hashes(leaves)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tree_is_null() {
        assert!(merkle_root_from_hashes(Vec::new()).is_zero());
    }

    #[test]
    fn test_single_leaf_is_identity() {
        let leaf = double_sha256(b"leaf");
        assert_eq!(merkle_root_from_hashes(vec![leaf]), leaf);
    }

    #[test]
    fn test_odd_level_duplicates_last() {
        let a = double_sha256(b"a");
        let b = double_sha256(b"b");
        let c = double_sha256(b"c");
        let three = merkle_root_from_hashes(vec![a, b, c]);
        let four = merkle_root_from_hashes(vec![a, b, c, c]);
        assert_eq!(three, four);
    }

    #[test]
    fn test_order_matters() {
        let a = double_sha256(b"a");
        let b = double_sha256(b"b");
        assert_ne!(
            merkle_root_from_hashes(vec![a, b]),
            merkle_root_from_hashes(vec![b, a])
        );
    }
}
