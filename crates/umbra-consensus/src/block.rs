//! Block types for the three block flavors.
//!
//! Proof-of-work and proof-of-stake blocks share the same header
//! layout and carry user transactions. Proof-of-audit blocks are
//! tagged by a distinct version, carry exactly one reward transaction,
//! and certify a window of earlier proof-of-stake blocks through the
//! `pos_blocks_audited` list and its dedicated merkle root.

use crate::hashing::{double_sha256, Hash256};
use crate::merkle::poa_merkle_root;
use crate::script::Script;
use crate::transaction::{put_compact_size, Transaction};
use crate::BlockHash;

/// Version of regular (PoW / PoS) blocks.
pub const POW_POS_BLOCK_VERSION: i32 = 5;

/// Version tag marking a proof-of-audit block.
pub const POA_BLOCK_VERSION: i32 = 100;

/// Block header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    /// Format/fork version.
    pub version: i32,
    /// Hash of the parent block.
    pub prev_hash: BlockHash,
    /// Merkle root over the block's transactions.
    pub merkle_root: Hash256,
    /// Block timestamp.
    pub time: u32,
    /// Compact difficulty target.
    pub bits: u32,
    /// Proof-of-work nonce.
    pub nonce: u32,
    /// Accumulator checkpoint carried for legacy compatibility.
    pub accumulator_checkpoint: Hash256,
}

impl Default for BlockHeader {
    fn default() -> Self {
        BlockHeader {
            version: POW_POS_BLOCK_VERSION,
            prev_hash: Hash256::ZERO,
            merkle_root: Hash256::ZERO,
            time: 0,
            bits: 0,
            nonce: 0,
            accumulator_checkpoint: Hash256::ZERO,
        }
    }
}

impl BlockHeader {
    /// Header hash (double SHA-256 of the serialized header).
    pub fn hash(&self) -> BlockHash {
        let mut buf = Vec::with_capacity(112);
        self.encode(&mut buf);
        double_sha256(&buf)
    }

    /// Whether the version marks a proof-of-audit block.
    pub fn is_poa_by_version(&self) -> bool {
        self.version == POA_BLOCK_VERSION
    }

    /// Serialize into `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(self.prev_hash.as_bytes());
        out.extend_from_slice(self.merkle_root.as_bytes());
        out.extend_from_slice(&self.time.to_le_bytes());
        out.extend_from_slice(&self.bits.to_le_bytes());
        out.extend_from_slice(&self.nonce.to_le_bytes());
        out.extend_from_slice(self.accumulator_checkpoint.as_bytes());
    }
}

/// Summary of an audited proof-of-stake block.
///
/// `time == 0` marks a block whose re-verification failed; the entry
/// is still carried so downstream reward accounting can discount the
/// slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoSBlockSummary {
    /// Hash of the audited block.
    pub hash: BlockHash,
    /// Height of the audited block.
    pub height: u32,
    /// Header time, or zero on re-verification failure.
    pub time: u32,
}

/// A block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Block {
    /// Header.
    pub header: BlockHeader,
    /// Transactions; index zero is the coinbase.
    pub vtx: Vec<Transaction>,
    /// Hash of the previous proof-of-audit block, null for the first.
    pub prev_poa_hash: BlockHash,
    /// Audited proof-of-stake window (audit blocks only).
    pub pos_blocks_audited: Vec<PoSBlockSummary>,
    /// Merkle root over `pos_blocks_audited`.
    pub poa_merkle_root: Hash256,
    /// Audit-block identity hash.
    pub mined_hash: Hash256,
    /// Masternode/budget payee script recorded at template time.
    pub payee: Script,
    /// Stake-key signature over the block (proof-of-stake blocks).
    pub block_sig: Vec<u8>,
}

impl Block {
    /// Block hash (header hash).
    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    /// Whether this is a proof-of-stake block.
    pub fn is_proof_of_stake(&self) -> bool {
        self.vtx.len() > 1 && self.vtx[1].is_coinstake()
    }

    /// Whether this is a proof-of-work block.
    pub fn is_proof_of_work(&self) -> bool {
        !self.is_proof_of_stake() && !self.is_proof_of_audit()
    }

    /// Whether this is a proof-of-audit block.
    pub fn is_proof_of_audit(&self) -> bool {
        self.header.is_poa_by_version()
    }

    /// Recompute the audit-block identity hash: the header plus the
    /// audit linkage fields.
    pub fn compute_mined_hash(&self) -> Hash256 {
        let mut buf = Vec::with_capacity(176);
        self.header.encode(&mut buf);
        buf.extend_from_slice(self.prev_poa_hash.as_bytes());
        buf.extend_from_slice(self.poa_merkle_root.as_bytes());
        double_sha256(&buf)
    }

    /// Recompute the merkle root over the audited summaries.
    pub fn compute_poa_merkle_root(&self) -> Hash256 {
        poa_merkle_root(&self.pos_blocks_audited)
    }

    /// Serialized size of the whole block in bytes.
    pub fn serialized_size(&self) -> usize {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf.len()
    }

    /// Serialize into `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        self.header.encode(out);
        put_compact_size(out, self.vtx.len() as u64);
        for tx in &self.vtx {
            tx.encode(out);
        }
        out.extend_from_slice(self.prev_poa_hash.as_bytes());
        put_compact_size(out, self.pos_blocks_audited.len() as u64);
        for summary in &self.pos_blocks_audited {
            out.extend_from_slice(summary.hash.as_bytes());
            out.extend_from_slice(&summary.height.to_le_bytes());
            out.extend_from_slice(&summary.time.to_le_bytes());
        }
        out.extend_from_slice(self.poa_merkle_root.as_bytes());
        out.extend_from_slice(self.mined_hash.as_bytes());
        put_compact_size(out, self.block_sig.len() as u64);
        out.extend_from_slice(&self.block_sig);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{TxIn, TxOut};

    fn coinbase_only_block() -> Block {
        let coinbase = Transaction {
            vin: vec![TxIn::null()],
            vout: vec![TxOut::new(50, Script::new())],
            ..Default::default()
        };
        Block {
            vtx: vec![coinbase],
            ..Default::default()
        }
    }

    #[test]
    fn test_flavor_detection() {
        let block = coinbase_only_block();
        assert!(block.is_proof_of_work());
        assert!(!block.is_proof_of_stake());
        assert!(!block.is_proof_of_audit());

        let mut audit = coinbase_only_block();
        audit.header.version = POA_BLOCK_VERSION;
        assert!(audit.is_proof_of_audit());
        assert!(!audit.is_proof_of_work());
    }

    #[test]
    fn test_header_hash_covers_nonce() {
        let mut block = coinbase_only_block();
        let before = block.hash();
        block.header.nonce += 1;
        assert_ne!(before, block.hash());
    }

    #[test]
    fn test_mined_hash_covers_audit_linkage() {
        let mut block = coinbase_only_block();
        block.header.version = POA_BLOCK_VERSION;
        let before = block.compute_mined_hash();
        block.prev_poa_hash = double_sha256(b"previous audit");
        assert_ne!(before, block.compute_mined_hash());
    }

    #[test]
    fn test_serialized_size_grows_with_txs() {
        let one = coinbase_only_block();
        let mut two = one.clone();
        two.vtx.push(one.vtx[0].clone());
        assert!(two.serialized_size() > one.serialized_size());
    }
}
