use std::collections::HashMap;

use bitcoin::{OutPoint, Script, ScriptBuf, Transaction, Witness, WitnessVersion};

use crate::types::{Result, TxBuilderError, WITNESS_SCALE_FACTOR};

/// Locking scripts of the outputs a transaction spends.
pub type UtxoView = HashMap<OutPoint, ScriptBuf>;

pub fn transaction_weight(tx: &Transaction) -> u64 {
    (tx.base_size() * (WITNESS_SCALE_FACTOR - 1) + tx.total_size()) as u64
}

pub fn virtual_size(tx: &Transaction) -> u64 {
    let scale = WITNESS_SCALE_FACTOR as u64;
    (transaction_weight(tx) + scale - 1) / scale
}

/// Unified sigop cost: legacy and P2SH sigops scaled by the witness factor plus unscaled
/// witness sigops.
pub fn sig_op_cost(tx: &Transaction, view: &UtxoView, is_coinbase: bool) -> Result<u64> {
    let scale = WITNESS_SCALE_FACTOR;
    let mut cost = legacy_sig_op_count(tx) * scale;
    if is_coinbase {
        return Ok(cost as u64);
    }

    for (input_index, input) in tx.input.iter().enumerate() {
        let prev_script =
            view.get(&input.previous_output)
                .ok_or(TxBuilderError::MissingPrevOut {
                    outpoint: input.previous_output,
                    input_index,
                })?;

        if prev_script.is_p2sh() {
            cost += p2sh_sig_op_count(&input.script_sig) * scale;
        }
        cost += witness_sig_op_count(&input.script_sig, prev_script, &input.witness);
    }

    Ok(cost as u64)
}

/// Effective size used for fees and standardness: the larger of vsize and sigop cost.
pub fn virtual_size_or_sig_cost(tx: &Transaction, view: &UtxoView) -> Result<u64> {
    let vsize = virtual_size(tx);
    if view.is_empty() {
        return Ok(vsize);
    }
    Ok(vsize.max(sig_op_cost(tx, view, false)?))
}

fn legacy_sig_op_count(tx: &Transaction) -> usize {
    let inputs: usize = tx
        .input
        .iter()
        .map(|input| input.script_sig.count_sigops_legacy())
        .sum();
    let outputs: usize = tx
        .output
        .iter()
        .map(|output| output.script_pubkey.count_sigops_legacy())
        .sum();
    inputs + outputs
}

/// Precise count of the redeem script pushed last by a push-only signature script.
fn p2sh_sig_op_count(script_sig: &Script) -> usize {
    script_sig
        .redeem_script()
        .map(Script::count_sigops)
        .unwrap_or(0)
}

fn witness_sig_op_count(script_sig: &Script, prev_script: &Script, witness: &Witness) -> usize {
    if prev_script.is_witness_program() {
        return witness_program_sig_ops(prev_script, witness);
    }

    if prev_script.is_p2sh() {
        if let Some(redeem) = script_sig.redeem_script() {
            if redeem.is_witness_program() {
                return witness_program_sig_ops(redeem, witness);
            }
        }
    }
    0
}

fn witness_program_sig_ops(program_script: &Script, witness: &Witness) -> usize {
    if program_script.witness_version() != Some(WitnessVersion::V0) {
        return 0;
    }
    // OP_0 followed by a single push of the program.
    match program_script.len() - 2 {
        20 => 1,
        32 => witness
            .last()
            .map(|witness_script| Script::from_bytes(witness_script).count_sigops())
            .unwrap_or(0),
        _ => 0,
    }
}
