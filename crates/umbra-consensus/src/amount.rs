//! Monetary amounts.

/// Amount in atomic units. Negative values are used as sentinels
/// (unset fees, emptied outputs) the same way the serialized format
/// treats them.
pub type Amount = i64;

/// Atomic units per coin.
pub const COIN: Amount = 100_000_000;
