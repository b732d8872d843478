//! Transaction priority queue.
//!
//! A max-heap over `(priority, fee rate)` whose comparator can be
//! switched mid-selection. Selection starts in priority order, and
//! once the priority budget is spent (or the queue front stops
//! qualifying as free) the builder flips the comparator to fee order
//! and the heap is rebuilt in O(n). Late insertions (dependents
//! becoming ready) keep whatever mode is active.

use std::cmp::Ordering;
use std::sync::Arc;
use umbra_consensus::{Amount, Transaction, TxHash, COIN};
use umbra_mempool::FeeRate;

/// Priority above which a transaction rides for free: one coin of
/// day-old inputs per 250 bytes.
pub fn allow_free(priority: f64) -> bool {
    priority > COIN as f64 * 144.0 / 250.0
}

/// Heap ordering mode.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SortMode {
    /// Priority first, fee rate breaks ties.
    Priority,
    /// Fee rate first, priority breaks ties.
    Fee,
}

/// One selectable transaction with its ranking data.
#[derive(Clone, Debug)]
pub struct TxPriority {
    /// Aged, delta-adjusted priority.
    pub priority: f64,
    /// Fee per kilobyte.
    pub fee_rate: FeeRate,
    /// Absolute fee.
    pub fee: Amount,
    /// Serialized size.
    pub size: usize,
    /// Transaction hash.
    pub hash: TxHash,
    /// The transaction.
    pub tx: Arc<Transaction>,
}

/// Max-heap with a mode-switchable comparator.
pub struct TxPriorityQueue {
    items: Vec<TxPriority>,
    mode: SortMode,
}

impl TxPriorityQueue {
    /// An empty queue in the given mode.
    pub fn new(mode: SortMode) -> Self {
        TxPriorityQueue {
            items: Vec::new(),
            mode,
        }
    }

    /// Heapify `items` under `mode` in O(n).
    pub fn from_vec(items: Vec<TxPriority>, mode: SortMode) -> Self {
        let mut queue = TxPriorityQueue { items, mode };
        queue.make_heap();
        queue
    }

    /// Current ordering mode.
    pub fn mode(&self) -> SortMode {
        self.mode
    }

    /// Number of queued transactions.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Priority of the current front, if any.
    pub fn front_priority(&self) -> Option<f64> {
        self.items.first().map(|item| item.priority)
    }

    /// Insert under the current mode.
    pub fn push(&mut self, item: TxPriority) {
        self.items.push(item);
        self.sift_up(self.items.len() - 1);
    }

    /// Remove and return the current maximum.
    pub fn pop(&mut self) -> Option<TxPriority> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() - 1;
        self.items.swap(0, last);
        let top = self.items.pop();
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        top
    }

    /// Switch ordering mode and restore the heap property in O(n).
    pub fn rebuild(&mut self, mode: SortMode) {
        self.mode = mode;
        self.make_heap();
    }

    /// Strict-weak "a ranks below b" under the current mode.
    fn less(&self, a: &TxPriority, b: &TxPriority) -> bool {
        match self.mode {
            SortMode::Fee => match a.fee_rate.cmp(&b.fee_rate) {
                Ordering::Equal => a.priority.total_cmp(&b.priority) == Ordering::Less,
                ord => ord == Ordering::Less,
            },
            SortMode::Priority => match a.priority.total_cmp(&b.priority) {
                Ordering::Equal => a.fee_rate < b.fee_rate,
                ord => ord == Ordering::Less,
            },
        }
    }

    fn make_heap(&mut self) {
        let len = self.items.len();
        for i in (0..len / 2).rev() {
            self.sift_down(i);
        }
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.less(&self.items[parent], &self.items[i]) {
                self.items.swap(parent, i);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut largest = i;
            if left < len && self.less(&self.items[largest], &self.items[left]) {
                largest = left;
            }
            if right < len && self.less(&self.items[largest], &self.items[right]) {
                largest = right;
            }
            if largest == i {
                break;
            }
            self.items.swap(i, largest);
            i = largest;
        }
    }
}
