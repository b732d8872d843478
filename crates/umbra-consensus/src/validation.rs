//! Validation interface consumed by the template builder.

use crate::chain::{BlockIndex, CoinView};
use crate::transaction::Transaction;

/// Script verification flags every block transaction must satisfy.
pub const MANDATORY_SCRIPT_VERIFY_FLAGS: u32 = 1;

/// Transaction/block validation hooks.
///
/// The template builder uses these to make sure a candidate block only
/// contains transactions that are valid in new blocks; full block
/// validation happens again at submission.
pub trait TxValidator: Send + Sync {
    /// Verify the inputs of `tx` against a coin view under the given
    /// script flags.
    fn check_inputs(&self, tx: &Transaction, view: &dyn CoinView, flags: u32) -> bool;

    /// Re-run proof-of-stake verification for an already accepted
    /// block. Audit blocks record a zero time for entries that fail
    /// this.
    fn re_verify_pos_block(&self, index: &BlockIndex) -> bool;

    /// Verify the Schnorr key-image signature of a coinstake.
    fn verify_schnorr_key_image(&self, tx: &Transaction) -> bool;
}

/// Legacy signature-operation count across all scripts of a
/// transaction.
pub fn get_legacy_sig_op_count(tx: &Transaction) -> u32 {
    let ins: u32 = tx
        .vin
        .iter()
        .map(|input| input.script_sig.sig_op_count())
        .sum();
    let outs: u32 = tx
        .vout
        .iter()
        .map(|output| output.script_pubkey.sig_op_count())
        .sum();
    ins + outs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{opcodes, Script};
    use crate::transaction::{TxIn, TxOut};

    #[test]
    fn test_legacy_sig_op_count_sums_all_scripts() {
        let mut tx = Transaction::default();
        let mut input = TxIn::null();
        input.script_sig = Script::new().push_opcode(opcodes::OP_CHECKSIG);
        tx.vin.push(input);
        tx.vout.push(TxOut::new(
            1,
            Script::new()
                .push_slice(&[2u8; 33])
                .push_opcode(opcodes::OP_CHECKSIG),
        ));
        assert_eq!(get_legacy_sig_op_count(&tx), 2);
    }
}
