//! The miner-facing wallet interface.

use crate::WalletResult;
use umbra_consensus::{Amount, Block, Transaction, TxOut};

/// A freshly generated reward address: the spend public key plus the
/// ephemeral transaction keypair stamped onto the reward output.
#[derive(Clone, Debug)]
pub struct MinerAddress {
    /// Compressed spend public key.
    pub pubkey: Vec<u8>,
    /// Ephemeral transaction public key.
    pub tx_pub: Vec<u8>,
    /// Ephemeral transaction private key.
    pub tx_priv: Vec<u8>,
}

/// Result of a successful coinstake search.
#[derive(Clone, Debug)]
pub struct CoinStake {
    /// The coinstake transaction. Output 0 is the empty marker,
    /// output 1 the stake return, output 2 the reward slot.
    pub tx: Transaction,
    /// Block time dictated by the found kernel.
    pub time: u32,
}

/// Handle for a key reserved from the key pool.
pub type ReservedKeyId = u64;

/// Wallet operations the miner consumes.
///
/// Implementations are internally synchronized.
pub trait MinerWallet: Send + Sync {
    /// Generate a fresh address together with its ephemeral keypair.
    fn generate_address(&self) -> WalletResult<MinerAddress>;

    /// Search the stake set for a kernel satisfying `bits` within the
    /// window of `search_interval` seconds. `Ok(None)` means no stake
    /// was found.
    fn create_coinstake(&self, bits: u32, search_interval: i64) -> WalletResult<Option<CoinStake>>;

    /// Encode `amount` onto `out` under the shared secret (stealth
    /// amount masking).
    fn encode_tx_out_amount(&self, out: &mut TxOut, amount: Amount, shared_secret: &[u8]);

    /// Create a Pedersen commitment to `value` with the given blinding
    /// factor, returning the serialized commitment.
    fn create_commitment(&self, blind: &[u8; 32], value: Amount) -> WalletResult<Vec<u8>>;

    /// Attach the Schnorr key-image signature to a coinstake.
    fn make_schnorr_signature(&self, tx: &mut Transaction) -> WalletResult<()>;

    /// Sign a proof-of-stake block with the stake key.
    fn sign_block(&self, block: &mut Block) -> WalletResult<()>;

    /// Derive and store the private key for an output the wallet can
    /// compute (recovery path when block signing misses the key).
    fn add_computed_private_key(&self, out: &TxOut);

    /// Let the wallet register a transaction that pays it.
    fn is_transaction_for_me(&self, tx: &Transaction) -> bool;

    /// Whether any coin is currently eligible to stake.
    fn mintable_coins(&self) -> bool;

    /// Spendable balance.
    fn balance(&self) -> Amount;

    /// Balance the operator asked to keep out of staking.
    fn reserve_balance(&self) -> Amount;

    /// Whether the wallet is locked.
    fn is_locked(&self) -> bool;

    /// Minimum seconds between stake attempts on one tip.
    fn hash_interval(&self) -> u64;

    /// Reserve a key from the key pool.
    fn reserve_key(&self) -> WalletResult<ReservedKeyId>;

    /// Consume a reserved key after the block it funded was accepted.
    fn keep_key(&self, id: ReservedKeyId);

    /// Return an unused reserved key to the pool.
    fn return_key(&self, id: ReservedKeyId);
}
