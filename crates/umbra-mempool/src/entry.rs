//! Pooled transaction entries.

use crate::FeeRate;
use std::sync::Arc;
use umbra_consensus::{Amount, KeyImage, Transaction, TxHash};

/// A transaction held in the mempool together with the data the miner
/// needs to rank it.
#[derive(Clone, Debug)]
pub struct MempoolEntry {
    /// The transaction.
    pub tx: Arc<Transaction>,
    /// Cached hash.
    pub hash: TxHash,
    /// Fee paid.
    pub fee: Amount,
    /// Serialized size in bytes.
    pub size: usize,
    /// Priority at admission.
    pub entry_priority: f64,
    /// Confirmed input value backing the priority accrual.
    pub in_chain_input_value: Amount,
    /// Height at admission.
    pub entry_height: u32,
    /// Arrival time (unix seconds).
    pub arrival_time: u64,
}

impl MempoolEntry {
    /// Build an entry for `tx` admitted at `height`.
    pub fn new(
        tx: Transaction,
        entry_priority: f64,
        in_chain_input_value: Amount,
        entry_height: u32,
        arrival_time: u64,
    ) -> Self {
        let hash = tx.hash();
        let size = tx.serialized_size();
        let fee = tx.fee;
        MempoolEntry {
            tx: Arc::new(tx),
            hash,
            fee,
            size,
            entry_priority,
            in_chain_input_value,
            entry_height,
            arrival_time,
        }
    }

    /// Priority at `height`: the admission priority plus the value-age
    /// accrued since admission, normalized by size.
    pub fn priority_at(&self, height: u32) -> f64 {
        if self.size == 0 {
            return self.entry_priority;
        }
        let aged_heights = height.saturating_sub(self.entry_height) as f64;
        let delta = aged_heights * self.in_chain_input_value as f64 / self.size as f64;
        self.entry_priority + delta
    }

    /// Fee rate implied by this entry.
    pub fn fee_rate(&self) -> FeeRate {
        FeeRate::new(self.fee, self.size)
    }

    /// Key images of every input.
    pub fn key_images(&self) -> impl Iterator<Item = &KeyImage> {
        self.tx.key_images()
    }
}
