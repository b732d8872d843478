//! Transaction types.
//!
//! Outputs carry the privacy envelope of this chain: an ephemeral
//! public key pair, a Pedersen commitment to the amount, and the
//! amount itself masked under a shared secret. Inputs carry a ring
//! signature key image; a key image may appear at most once across the
//! whole chain and across any single block.

use crate::hashing::{double_sha256, Hash256};
use crate::script::Script;
use crate::{Amount, TxHash, LOCKTIME_THRESHOLD};
use std::fmt;

/// Size of a compressed-point key image.
pub const KEY_IMAGE_SIZE: usize = 33;

/// Ring signature nullifier, one per input.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyImage(pub [u8; KEY_IMAGE_SIZE]);

impl KeyImage {
    /// The null key image (coinbase inputs).
    pub const ZERO: KeyImage = KeyImage([0u8; KEY_IMAGE_SIZE]);

    /// Lowercase hex encoding, the form the spent-key-image index is
    /// keyed by.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Whether this is the null key image.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; KEY_IMAGE_SIZE]
    }
}

impl fmt::Debug for KeyImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyImage({})", self.to_hex())
    }
}

/// Reference to a transaction output.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct OutPoint {
    /// Hash of the referenced transaction.
    pub hash: TxHash,
    /// Output index.
    pub n: u32,
}

impl OutPoint {
    /// The null outpoint used by coinbase inputs.
    pub fn null() -> Self {
        OutPoint {
            hash: Hash256::ZERO,
            n: u32::MAX,
        }
    }

    /// Whether this is the null outpoint.
    pub fn is_null(&self) -> bool {
        self.hash.is_zero() && self.n == u32::MAX
    }
}

/// Transaction input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxIn {
    /// Referenced output (decoy-set anchor for ring inputs).
    pub prevout: OutPoint,
    /// Unlocking script.
    pub script_sig: Script,
    /// Sequence number.
    pub sequence: u32,
    /// Ring signature key image.
    pub key_image: KeyImage,
}

impl TxIn {
    /// A coinbase-style input with a null prevout.
    pub fn null() -> Self {
        TxIn {
            prevout: OutPoint::null(),
            script_sig: Script::new(),
            sequence: u32::MAX,
            key_image: KeyImage::ZERO,
        }
    }
}

/// Transaction output.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct TxOut {
    /// Amount in atomic units.
    pub value: Amount,
    /// Locking script.
    pub script_pubkey: Script,
    /// Ephemeral transaction public key for the stealth derivation.
    pub tx_pub: Vec<u8>,
    /// Ephemeral transaction private key, carried so the staker can
    /// later recover the output.
    pub tx_priv: Vec<u8>,
    /// Pedersen commitment to `value`.
    pub commitment: Vec<u8>,
    /// `value` masked under the shared secret.
    pub masked_amount: Vec<u8>,
}

impl TxOut {
    /// Create an output paying `value` to `script_pubkey`.
    pub fn new(value: Amount, script_pubkey: Script) -> Self {
        TxOut {
            value,
            script_pubkey,
            ..Default::default()
        }
    }

    /// Reset to the empty marker form.
    pub fn set_empty(&mut self) {
        self.value = 0;
        self.script_pubkey.clear();
        self.commitment.clear();
        self.masked_amount.clear();
    }

    /// Whether this output is the empty marker (coinstake slot zero).
    pub fn is_empty(&self) -> bool {
        self.value == 0 && self.script_pubkey.is_empty()
    }
}

/// Transaction kind tag carried on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TxType {
    /// Fully shielded transfer.
    #[default]
    Standard = 0,
    /// Reward transaction whose amount is publicly revealed.
    RevealAmount = 1,
}

/// A transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// Format version.
    pub version: i32,
    /// Kind tag.
    pub tx_type: TxType,
    /// Inputs.
    pub vin: Vec<TxIn>,
    /// Outputs.
    pub vout: Vec<TxOut>,
    /// Lock time (height or timestamp, see [`LOCKTIME_THRESHOLD`]).
    pub lock_time: u32,
    /// Fee paid, computed at mempool admission. Ring inputs hide the
    /// input sum, so the fee is an explicit field rather than a
    /// derived quantity.
    pub fee: Amount,
}

impl Default for Transaction {
    fn default() -> Self {
        Transaction {
            version: 1,
            tx_type: TxType::Standard,
            vin: Vec::new(),
            vout: Vec::new(),
            lock_time: 0,
            fee: 0,
        }
    }
}

impl Transaction {
    /// Transaction hash (double SHA-256 of the serialized form).
    pub fn hash(&self) -> TxHash {
        let mut buf = Vec::with_capacity(self.serialized_size());
        self.encode(&mut buf);
        double_sha256(&buf)
    }

    /// Whether this is a coinbase (single null-prevout input).
    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].prevout.is_null()
    }

    /// Whether this is a coinstake (spends a real output into a block
    /// whose first output slot is the empty marker).
    pub fn is_coinstake(&self) -> bool {
        !self.vin.is_empty()
            && !self.vin[0].prevout.is_null()
            && self.vout.len() >= 2
            && self.vout[0].is_empty()
    }

    /// Serialized size in bytes.
    pub fn serialized_size(&self) -> usize {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf.len()
    }

    /// Serialize into `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        out.push(self.tx_type as u8);
        put_compact_size(out, self.vin.len() as u64);
        for input in &self.vin {
            out.extend_from_slice(input.prevout.hash.as_bytes());
            out.extend_from_slice(&input.prevout.n.to_le_bytes());
            put_compact_size(out, input.script_sig.len() as u64);
            out.extend_from_slice(input.script_sig.as_bytes());
            out.extend_from_slice(&input.sequence.to_le_bytes());
            out.extend_from_slice(&input.key_image.0);
        }
        put_compact_size(out, self.vout.len() as u64);
        for output in &self.vout {
            out.extend_from_slice(&output.value.to_le_bytes());
            put_compact_size(out, output.script_pubkey.len() as u64);
            out.extend_from_slice(output.script_pubkey.as_bytes());
            put_compact_size(out, output.tx_pub.len() as u64);
            out.extend_from_slice(&output.tx_pub);
            put_compact_size(out, output.tx_priv.len() as u64);
            out.extend_from_slice(&output.tx_priv);
            put_compact_size(out, output.commitment.len() as u64);
            out.extend_from_slice(&output.commitment);
            put_compact_size(out, output.masked_amount.len() as u64);
            out.extend_from_slice(&output.masked_amount);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out.extend_from_slice(&self.fee.to_le_bytes());
    }

    /// Key images of all inputs.
    pub fn key_images(&self) -> impl Iterator<Item = &KeyImage> {
        self.vin.iter().map(|input| &input.key_image)
    }
}

/// Variable-length integer prefix for collection lengths.
pub fn put_compact_size(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x10000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

/// Whether a transaction is final at the given height and block time.
pub fn is_final_tx(tx: &Transaction, height: u32, block_time: u32) -> bool {
    if tx.lock_time == 0 {
        return true;
    }
    let cutoff = if tx.lock_time < LOCKTIME_THRESHOLD {
        height as u64
    } else {
        block_time as u64
    };
    if (tx.lock_time as u64) < cutoff {
        return true;
    }
    tx.vin.iter().all(|input| input.sequence == u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_input(image_byte: u8) -> TxIn {
        let mut image = [0u8; KEY_IMAGE_SIZE];
        image[0] = image_byte;
        TxIn {
            prevout: OutPoint {
                hash: double_sha256(&[image_byte]),
                n: 0,
            },
            script_sig: Script::new(),
            sequence: u32::MAX,
            key_image: KeyImage(image),
        }
    }

    #[test]
    fn test_coinbase_detection() {
        let tx = Transaction {
            vin: vec![TxIn::null()],
            vout: vec![TxOut::new(50, Script::new())],
            ..Default::default()
        };
        assert!(tx.is_coinbase());
        assert!(!tx.is_coinstake());
    }

    #[test]
    fn test_coinstake_detection() {
        let mut empty = TxOut::new(10, Script::new());
        empty.set_empty();
        let tx = Transaction {
            vin: vec![dummy_input(1)],
            vout: vec![empty, TxOut::new(10, Script::new())],
            ..Default::default()
        };
        assert!(tx.is_coinstake());
        assert!(!tx.is_coinbase());
    }

    #[test]
    fn test_hash_changes_with_content() {
        let a = Transaction {
            vin: vec![dummy_input(1)],
            ..Default::default()
        };
        let mut b = a.clone();
        b.lock_time = 7;
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), a.clone().hash());
    }

    #[test]
    fn test_is_final_by_height() {
        let mut tx = Transaction::default();
        tx.lock_time = 0;
        assert!(is_final_tx(&tx, 100, 0));

        tx.lock_time = 99;
        assert!(is_final_tx(&tx, 100, 0));

        tx.vin = vec![TxIn {
            sequence: 0,
            ..TxIn::null()
        }];
        tx.lock_time = 100;
        assert!(!is_final_tx(&tx, 100, 0));
    }

    #[test]
    fn test_is_final_all_sequences_final() {
        let mut tx = Transaction {
            vin: vec![TxIn::null()],
            ..Default::default()
        };
        tx.lock_time = u32::MAX;
        // lock time unreached but every sequence is final
        assert!(is_final_tx(&tx, 1, 1));
    }

    #[test]
    fn test_compact_size_boundaries() {
        let mut buf = Vec::new();
        put_compact_size(&mut buf, 0xfc);
        assert_eq!(buf, vec![0xfc]);
        buf.clear();
        put_compact_size(&mut buf, 0xfd);
        assert_eq!(buf, vec![0xfd, 0xfd, 0x00]);
        buf.clear();
        put_compact_size(&mut buf, 0x10000);
        assert_eq!(buf[0], 0xfe);
    }
}
