//! Test data generators: blocks, coinstakes and mempool
//! transactions with controllable ranking inputs.

use umbra_consensus::{
    double_sha256, Amount, Block, BlockHash, KeyImage, OutPoint, PoSBlockSummary, Script,
    Transaction, TxIn, TxOut, COIN, POA_BLOCK_VERSION,
};
use umbra_mempool::MempoolEntry;

/// A key image whose first byte is `tag`.
pub fn key_image(tag: u8) -> KeyImage {
    let mut bytes = [0u8; 33];
    bytes[0] = 2;
    bytes[1] = tag;
    KeyImage(bytes)
}

/// A spending input with a deterministic prevout and key image.
pub fn spending_input(seed: u8, image_tag: u8) -> TxIn {
    TxIn {
        prevout: OutPoint {
            hash: double_sha256(&[0xa0, seed]),
            n: 0,
        },
        script_sig: Script::new(),
        sequence: u32::MAX,
        key_image: key_image(image_tag),
    }
}

/// A coinbase transaction paying `value`.
pub fn coinbase_tx(value: Amount, seed: u8) -> Transaction {
    let mut tx = Transaction {
        vin: vec![TxIn::null()],
        vout: vec![TxOut::new(value, Script::new().push_slice(&[seed; 33]))],
        ..Default::default()
    };
    tx.vin[0].script_sig = Script::new().push_int(seed as i64);
    tx
}

/// A well-formed coinstake: empty marker, stake return with an
/// ephemeral key, and a reward slot.
pub fn coinstake_tx(seed: u8, stake_value: Amount, reward_value: Amount) -> Transaction {
    let mut marker = TxOut::new(1, Script::new());
    marker.set_empty();
    let mut stake_return = TxOut::new(stake_value, Script::new().push_slice(&[seed; 33]));
    stake_return.tx_pub = vec![0x31; 33];
    let reward = TxOut::new(reward_value, Script::new().push_slice(&[seed; 33]));
    Transaction {
        vin: vec![spending_input(seed, 0xc0 ^ seed)],
        vout: vec![marker, stake_return, reward],
        ..Default::default()
    }
}

/// A proof-of-work block on `prev_hash`.
pub fn pow_block(prev_hash: BlockHash, time: u32, seed: u8) -> Block {
    let mut block = Block {
        vtx: vec![coinbase_tx(50 * COIN, seed)],
        ..Default::default()
    };
    block.header.prev_hash = prev_hash;
    block.header.time = time;
    block.header.bits = 0x207f_ffff;
    block.header.merkle_root = umbra_consensus::block_merkle_root(&block);
    block
}

/// A proof-of-stake block on `prev_hash`.
pub fn pos_block(prev_hash: BlockHash, time: u32, seed: u8) -> Block {
    let mut coinbase = coinbase_tx(0, seed);
    coinbase.vout[0].set_empty();
    let mut block = Block {
        vtx: vec![coinbase, coinstake_tx(seed, 400 * COIN, 2 * COIN)],
        ..Default::default()
    };
    block.header.prev_hash = prev_hash;
    block.header.time = time;
    block.header.bits = 0x207f_ffff;
    block.header.merkle_root = umbra_consensus::block_merkle_root(&block);
    block
}

/// A proof-of-audit block on `prev_hash` certifying `audits`.
pub fn poa_block(prev_hash: BlockHash, time: u32, audits: Vec<PoSBlockSummary>) -> Block {
    let mut block = Block {
        vtx: vec![coinbase_tx(COIN, 0xee)],
        pos_blocks_audited: audits,
        ..Default::default()
    };
    block.header.version = POA_BLOCK_VERSION;
    block.header.prev_hash = prev_hash;
    block.header.time = time;
    block.poa_merkle_root = block.compute_poa_merkle_root();
    block.header.merkle_root = umbra_consensus::block_merkle_root(&block);
    block.mined_hash = block.compute_mined_hash();
    block
}

/// A spendable mempool transaction with one input.
pub fn pool_tx(seed: u8, image_tag: u8, fee: Amount) -> Transaction {
    Transaction {
        vin: vec![spending_input(seed, image_tag)],
        vout: vec![TxOut::new(10 * COIN, Script::new().push_slice(&[seed; 33]))],
        fee,
        ..Default::default()
    }
}

/// Wrap a transaction into a mempool entry with an explicit priority.
pub fn pool_entry(tx: Transaction, priority: f64, height: u32) -> MempoolEntry {
    MempoolEntry::new(tx, priority, 0, height, 0)
}
