use bitcoin::{consensus::serialize, Amount, Script, Transaction, Witness};

use crate::types::{Result, TxBuilderError, WITNESS_SCALE_FACTOR};

// Witness items assumed when sizing a reveal before it is signed.
const SCHNORR_SIGNATURE_SIZE: usize = 64;
const CONTROL_BLOCK_SIZE: usize = 33;
// Segwit marker and flag bytes.
const WITNESS_MARKER_SIZE: usize = 2;

/// Value the commit output of one reveal has to lock, and the part of it paying the reveal fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealRequirement {
    pub prev_output_value: Amount,
    pub fee: Amount,
}

/// Sizes the still unsigned `reveal_tx`: its base bytes at full rate plus the witness
/// `[signature, envelope, control block]` at the discounted rate.
pub fn reveal_requirement(
    reveal_tx: &Transaction,
    envelope: &Script,
    reveal_out_value: Amount,
    fee_rate: u64,
) -> Result<RevealRequirement> {
    let witness_size = estimated_witness_size(envelope);
    let discounted = (witness_size + WITNESS_MARKER_SIZE + WITNESS_SCALE_FACTOR - 1)
        / WITNESS_SCALE_FACTOR;

    let fee = (reveal_tx.base_size() as u64)
        .checked_mul(fee_rate)
        .and_then(|base| {
            (discounted as u64)
                .checked_mul(fee_rate)
                .and_then(|witness| base.checked_add(witness))
        })
        .map(Amount::from_sat)
        .ok_or(TxBuilderError::AmountOverflow)?;
    let prev_output_value = reveal_out_value
        .checked_add(fee)
        .ok_or(TxBuilderError::AmountOverflow)?;

    Ok(RevealRequirement {
        prev_output_value,
        fee,
    })
}

fn estimated_witness_size(envelope: &Script) -> usize {
    let mut witness = Witness::new();
    witness.push([0u8; SCHNORR_SIGNATURE_SIZE]);
    witness.push(envelope.as_bytes());
    witness.push([0u8; CONTROL_BLOCK_SIZE]);
    serialize(&witness).len()
}
