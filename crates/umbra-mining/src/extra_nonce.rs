//! Extra-nonce coinbase stamping.
//!
//! Repeated stamping on the same parent yields distinct coinbase
//! script-sigs, extending the proof-of-work search space beyond the
//! header nonce. The single-slot parent cache resets the counter when
//! the parent changes, so counters never alias across reorgs.

use tracing::trace;
use umbra_consensus::{
    block_merkle_root, coinbase_flags, Block, BlockHash, Script, MAX_COINBASE_SCRIPT_SIG_SIZE,
};

/// Extra-nonce stamper state: the last parent seen and the counter of
/// stamps issued on it.
#[derive(Debug, Default)]
pub struct ExtraNonce {
    prev_hash: BlockHash,
    counter: u32,
}

impl ExtraNonce {
    /// Fresh stamper with an empty parent slot.
    pub fn new() -> Self {
        ExtraNonce::default()
    }

    /// Stamp `block`'s coinbase with the next counter value and
    /// recompute the merkle root. `height` is the block's own height
    /// (height-in-coinbase rule). Returns the encoded counter value.
    pub fn stamp(&mut self, block: &mut Block, height: u32) -> u32 {
        if self.prev_hash != block.header.prev_hash {
            self.counter = 0;
            self.prev_hash = block.header.prev_hash;
        }
        let value = self.counter;
        self.counter = self.counter.wrapping_add(1);

        let script_sig = Script::new()
            .push_int(height as i64)
            .push_scriptnum(value as i64)
            .extend(&coinbase_flags());
        assert!(script_sig.len() <= MAX_COINBASE_SCRIPT_SIG_SIZE);
        block.vtx[0].vin[0].script_sig = script_sig;
        block.header.merkle_root = block_merkle_root(block);
        trace!(height, extra_nonce = value, "stamped coinbase");
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_consensus::{double_sha256, Block, Script, Transaction, TxIn, TxOut};

    fn block_with_parent(parent_seed: &[u8]) -> Block {
        let coinbase = Transaction {
            vin: vec![TxIn::null()],
            vout: vec![TxOut::new(50, Script::new())],
            ..Default::default()
        };
        let mut block = Block {
            vtx: vec![coinbase],
            ..Default::default()
        };
        block.header.prev_hash = double_sha256(parent_seed);
        block
    }

    #[test]
    fn test_same_parent_counts_up() {
        let mut stamper = ExtraNonce::new();
        let mut block = block_with_parent(b"parent");
        assert_eq!(stamper.stamp(&mut block, 10), 0);
        assert_eq!(stamper.stamp(&mut block, 10), 1);
        assert_eq!(stamper.stamp(&mut block, 10), 2);
    }

    #[test]
    fn test_parent_change_resets_counter() {
        let mut stamper = ExtraNonce::new();
        let mut first = block_with_parent(b"parent-a");
        stamper.stamp(&mut first, 10);
        stamper.stamp(&mut first, 10);
        stamper.stamp(&mut first, 10);

        // New parent: the next two stamps encode 0 then 1, not 3, 4.
        let mut second = block_with_parent(b"parent-b");
        assert_eq!(stamper.stamp(&mut second, 11), 0);
        assert_eq!(stamper.stamp(&mut second, 11), 1);
    }

    #[test]
    fn test_stamp_rewrites_script_and_merkle() {
        let mut stamper = ExtraNonce::new();
        let mut block = block_with_parent(b"parent");
        stamper.stamp(&mut block, 10);
        let first_sig = block.vtx[0].vin[0].script_sig.clone();
        let first_root = block.header.merkle_root;

        stamper.stamp(&mut block, 10);
        assert_ne!(block.vtx[0].vin[0].script_sig, first_sig);
        assert_ne!(block.header.merkle_root, first_root);
        assert_eq!(block.header.merkle_root, block_merkle_root(&block));
    }

    #[test]
    fn test_script_sig_stays_within_limit() {
        let mut stamper = ExtraNonce::new();
        let mut block = block_with_parent(b"parent");
        for _ in 0..1000 {
            stamper.stamp(&mut block, 1_000_000);
        }
        assert!(block.vtx[0].vin[0].script_sig.len() <= MAX_COINBASE_SCRIPT_SIG_SIZE);
    }
}
