//! Transaction pool implementation.

use crate::{MempoolEntry, MempoolError, MempoolResult, DEFAULT_MAX_TXS};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use umbra_consensus::{Amount, KeyImage, TxHash};

/// Mempool configuration.
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// Maximum number of transactions.
    pub max_transactions: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        MempoolConfig {
            max_transactions: DEFAULT_MAX_TXS,
        }
    }
}

/// Transaction mempool.
///
/// Admission enforces key-image exclusivity inside the pool; the
/// template builder additionally checks images against the chain and
/// against the block being assembled.
pub struct Mempool {
    /// Configuration.
    config: MempoolConfig,
    /// Entries by transaction hash.
    entries: DashMap<TxHash, MempoolEntry>,
    /// Key image to owning transaction.
    key_image_to_tx: DashMap<KeyImage, TxHash>,
    /// Priority / fee adjustments applied on top of entries.
    deltas: DashMap<TxHash, (f64, Amount)>,
    /// Monotone counter bumped on every add/remove.
    transactions_updated: AtomicU64,
}

impl Mempool {
    /// Create a new mempool with the given configuration.
    pub fn new(config: MempoolConfig) -> Self {
        Mempool {
            config,
            entries: DashMap::new(),
            key_image_to_tx: DashMap::new(),
            deltas: DashMap::new(),
            transactions_updated: AtomicU64::new(0),
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(MempoolConfig::default())
    }

    /// Add a transaction to the pool.
    pub fn add(&self, entry: MempoolEntry) -> MempoolResult<()> {
        if entry.tx.is_coinbase() || entry.tx.is_coinstake() {
            return Err(MempoolError::RewardTransaction);
        }
        if self.entries.contains_key(&entry.hash) {
            return Err(MempoolError::AlreadyExists(entry.hash.to_hex()));
        }
        if self.entries.len() >= self.config.max_transactions {
            return Err(MempoolError::Full(self.entries.len()));
        }
        for image in entry.key_images() {
            if self.key_image_to_tx.contains_key(image) {
                return Err(MempoolError::KeyImageConflict(image.to_hex()));
            }
        }

        for image in entry.key_images() {
            self.key_image_to_tx.insert(*image, entry.hash);
        }
        debug!(tx = %entry.hash, fee = entry.fee, size = entry.size, "tx admitted to mempool");
        self.entries.insert(entry.hash, entry);
        self.transactions_updated.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Insert an entry without conflict checks: the reload path for
    /// entries that were already validated before a shutdown. The
    /// miner still enforces key-image exclusivity per block.
    pub fn add_unchecked(&self, entry: MempoolEntry) {
        for image in entry.key_images() {
            self.key_image_to_tx.insert(*image, entry.hash);
        }
        self.entries.insert(entry.hash, entry);
        self.transactions_updated.fetch_add(1, Ordering::SeqCst);
    }

    /// Remove a transaction, releasing its key images.
    pub fn remove(&self, hash: &TxHash) -> Option<MempoolEntry> {
        let (_, entry) = self.entries.remove(hash)?;
        for image in entry.key_images() {
            self.key_image_to_tx.remove(image);
        }
        self.deltas.remove(hash);
        self.transactions_updated.fetch_add(1, Ordering::SeqCst);
        Some(entry)
    }

    /// Whether a transaction is pooled.
    pub fn contains(&self, hash: &TxHash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Look up a pooled transaction.
    pub fn get(&self, hash: &TxHash) -> Option<MempoolEntry> {
        self.entries.get(hash).map(|entry| entry.clone())
    }

    /// Number of pooled transactions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Monotone counter the miner polls to notice churn.
    pub fn get_transactions_updated(&self) -> u64 {
        self.transactions_updated.load(Ordering::SeqCst)
    }

    /// Record priority / fee adjustments for a transaction.
    pub fn prioritise_transaction(&self, hash: TxHash, priority_delta: f64, fee_delta: Amount) {
        let mut slot = self.deltas.entry(hash).or_insert((0.0, 0));
        slot.0 += priority_delta;
        slot.1 += fee_delta;
        debug!(tx = %hash, priority_delta, fee_delta, "prioritised transaction");
    }

    /// Apply recorded adjustments to a (priority, fee) pair.
    pub fn apply_deltas(&self, hash: &TxHash, priority: &mut f64, fee: &mut Amount) {
        if let Some(delta) = self.deltas.get(hash) {
            *priority += delta.0;
            *fee += delta.1;
        }
    }

    /// Consistent snapshot of all entries for template building.
    pub fn snapshot(&self) -> Vec<(TxHash, MempoolEntry)> {
        self.entries
            .iter()
            .map(|item| (*item.key(), item.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_consensus::{double_sha256, KeyImage, OutPoint, Script, Transaction, TxIn, TxOut};

    fn tx_with_image(seed: u8, image_byte: u8) -> Transaction {
        let mut image = [0u8; 33];
        image[0] = image_byte;
        Transaction {
            vin: vec![TxIn {
                prevout: OutPoint {
                    hash: double_sha256(&[seed]),
                    n: 0,
                },
                key_image: KeyImage(image),
                ..TxIn::null()
            }],
            vout: vec![TxOut::new(1000, Script::new())],
            fee: 100,
            ..Default::default()
        }
    }

    fn entry(seed: u8, image_byte: u8) -> MempoolEntry {
        MempoolEntry::new(tx_with_image(seed, image_byte), 10.0, 0, 1, 0)
    }

    #[test]
    fn test_add_and_snapshot() {
        let pool = Mempool::with_defaults();
        pool.add(entry(1, 1)).unwrap();
        pool.add(entry(2, 2)).unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.snapshot().len(), 2);
    }

    #[test]
    fn test_key_image_conflict_rejected() {
        let pool = Mempool::with_defaults();
        pool.add(entry(1, 7)).unwrap();
        let result = pool.add(entry(2, 7));
        assert!(matches!(result, Err(MempoolError::KeyImageConflict(_))));
    }

    #[test]
    fn test_remove_releases_key_image() {
        let pool = Mempool::with_defaults();
        let first = entry(1, 7);
        let hash = first.hash;
        pool.add(first).unwrap();
        pool.remove(&hash).unwrap();
        pool.add(entry(2, 7)).unwrap();
    }

    #[test]
    fn test_update_counter_moves_on_churn() {
        let pool = Mempool::with_defaults();
        let before = pool.get_transactions_updated();
        let item = entry(1, 1);
        let hash = item.hash;
        pool.add(item).unwrap();
        pool.remove(&hash);
        assert_eq!(pool.get_transactions_updated(), before + 2);
    }

    #[test]
    fn test_apply_deltas() {
        let pool = Mempool::with_defaults();
        let item = entry(1, 1);
        let hash = item.hash;
        pool.add(item).unwrap();
        pool.prioritise_transaction(hash, 25.0, 500);

        let mut priority = 1.0;
        let mut fee = 100;
        pool.apply_deltas(&hash, &mut priority, &mut fee);
        assert_eq!(priority, 26.0);
        assert_eq!(fee, 600);
    }

    #[test]
    fn test_duplicate_rejected() {
        let pool = Mempool::with_defaults();
        pool.add(entry(1, 1)).unwrap();
        assert!(matches!(
            pool.add(entry(1, 1)),
            Err(MempoolError::AlreadyExists(_))
        ));
    }
}
