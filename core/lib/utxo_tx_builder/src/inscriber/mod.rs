//! Commit/reveal inscriptions.
//!
//! The build runs through phase-tagged values, each consumed by the next step:
//!
//! ```text
//! InscriptionBuilder -> EmptyReveal -> FundedCommit -> SignedCommit -> FinalizedReveal
//! ```
//!
//! Reveal transactions are created first with a placeholder commit txid so that the value each
//! commit output has to lock is known. The commit transaction is then funded and signed, and
//! only then are the reveals pointed at it and signed along their script path.

use std::collections::HashMap;

use bitcoin::{
    absolute::LockTime, hashes::Hash, transaction::Version, Amount, OutPoint, PrivateKey,
    ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use secp256k1::Secp256k1;
use tracing::{debug, instrument, warn};
use utxo_config::TxBuilderConfig;

use crate::{
    address::{parse_private_key, resolve},
    metrics::{InscriptionErrorType, METRICS},
    network::ChainParams,
    signer::{sign_tapscript_input, sign_transaction, signed_copy},
    types::{
        Result, TxBuilderError, DEFAULT_MIN_CHANGE_VALUE, DEFAULT_REVEAL_OUT_VALUE,
        DEFAULT_SEQUENCE, DEFAULT_TX_VERSION, MAX_STANDARD_TX_WEIGHT,
    },
    utils::serialize_tx_hex,
    weight::{virtual_size_or_sig_cost, UtxoView},
};

mod fee;
mod script_builder;
pub mod types;

pub use fee::{reveal_requirement, RevealRequirement};
pub use script_builder::InscriptionScript;
pub use types::{InscribeTxs, InscriptionData, InscriptionRequest, PrevOutput};

/// Per-item state: the key signing the reveal, its envelope and where the reveal pays to.
#[derive(Debug, Clone)]
struct InscriptionContext {
    private_key: PrivateKey,
    script: InscriptionScript,
    reveal_script_pubkey: ScriptBuf,
}

/// Request with every key, address and envelope resolved.
#[derive(Debug)]
pub struct InscriptionBuilder {
    params: ChainParams,
    commit_fee_rate: u64,
    reveal_fee_rate: u64,
    reveal_out_value: Amount,
    min_change_value: Amount,
    change_script_pubkey: ScriptBuf,
    prev_outputs: Vec<TxOut>,
    prev_outpoints: Vec<OutPoint>,
    prev_keys: Vec<PrivateKey>,
    contexts: Vec<InscriptionContext>,
}

/// Reveal transactions that still point at a placeholder commit txid.
#[derive(Debug)]
pub struct EmptyReveal {
    builder: InscriptionBuilder,
    reveal_txs: Vec<Transaction>,
    requirements: Vec<RevealRequirement>,
}

/// Commit transaction with its final outputs, not yet signed.
#[derive(Debug)]
pub struct FundedCommit {
    builder: InscriptionBuilder,
    reveal_txs: Vec<Transaction>,
    commit_tx: Transaction,
    commit_fee: Amount,
}

#[derive(Debug)]
pub struct SignedCommit {
    builder: InscriptionBuilder,
    reveal_txs: Vec<Transaction>,
    commit_tx: Transaction,
}

/// Signed commit and reveal transactions, all within standardness limits.
#[derive(Debug)]
pub struct FinalizedReveal {
    builder: InscriptionBuilder,
    reveal_txs: Vec<Transaction>,
    commit_tx: Transaction,
}

impl InscriptionBuilder {
    #[instrument(skip(request, params), target = "utxo_tx_builder::inscriber")]
    pub fn new(request: &InscriptionRequest, params: ChainParams) -> Result<Self> {
        if request.commit_prev_outputs.is_empty() || request.inscriptions.is_empty() {
            return Err(TxBuilderError::EmptyInputsOrOutputs);
        }

        let secp = Secp256k1::new();
        let mut prev_outputs = Vec::with_capacity(request.commit_prev_outputs.len());
        let mut prev_outpoints = Vec::with_capacity(request.commit_prev_outputs.len());
        let mut prev_keys = Vec::with_capacity(request.commit_prev_outputs.len());
        for prev_output in &request.commit_prev_outputs {
            prev_outputs.push(TxOut {
                value: prev_output.amount,
                script_pubkey: resolve(&prev_output.address, &params)?,
            });
            prev_outpoints.push(prev_output.outpoint());
            prev_keys.push(parse_private_key(&prev_output.private_key, &params)?);
        }

        // every envelope is keyed by the first funding key
        let private_key = prev_keys[0];
        let (internal_key, _) = private_key.inner.x_only_public_key(&secp);
        let contexts = request
            .inscriptions
            .iter()
            .map(|data| {
                Ok(InscriptionContext {
                    private_key,
                    script: InscriptionScript::new(data, &secp, internal_key, &params)?,
                    reveal_script_pubkey: resolve(&data.reveal_address, &params)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            params,
            commit_fee_rate: request.commit_fee_rate,
            reveal_fee_rate: request.reveal_fee_rate,
            reveal_out_value: positive(request.reveal_out_value)
                .unwrap_or(DEFAULT_REVEAL_OUT_VALUE),
            min_change_value: positive(request.min_change_value)
                .unwrap_or(DEFAULT_MIN_CHANGE_VALUE),
            change_script_pubkey: resolve(&request.change_address, &params)?,
            prev_outputs,
            prev_outpoints,
            prev_keys,
            contexts,
        })
    }

    /// Like [`InscriptionBuilder::new`], taking the chain and any value the request leaves
    /// unset or zero from `config`.
    pub fn from_config(request: &InscriptionRequest, config: &TxBuilderConfig) -> Result<Self> {
        let params = ChainParams::from_config(config)?;
        let mut builder = Self::new(request, params)?;
        if positive(request.reveal_out_value).is_none() {
            builder.reveal_out_value = Amount::from_sat(config.reveal_out_value());
        }
        if positive(request.min_change_value).is_none() {
            builder.min_change_value = Amount::from_sat(config.min_change_value());
        }
        Ok(builder)
    }

    /// Creates one reveal per item spending output `i` of the future commit transaction and
    /// sizes the value that output has to lock.
    #[instrument(skip(self), target = "utxo_tx_builder::inscriber")]
    pub fn build_empty_reveals(self) -> Result<EmptyReveal> {
        let mut reveal_txs = Vec::with_capacity(self.contexts.len());
        let mut requirements = Vec::with_capacity(self.contexts.len());
        for (index, context) in self.contexts.iter().enumerate() {
            let vout = u32::try_from(index).map_err(|_| {
                TxBuilderError::InvalidInscription(format!("too many inscriptions: {index}"))
            })?;
            let reveal_tx = Transaction {
                version: Version(DEFAULT_TX_VERSION),
                lock_time: LockTime::ZERO,
                input: vec![TxIn {
                    previous_output: OutPoint::new(Txid::all_zeros(), vout),
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence(DEFAULT_SEQUENCE),
                    witness: Witness::new(),
                }],
                output: vec![TxOut {
                    value: self.reveal_out_value,
                    script_pubkey: context.reveal_script_pubkey.clone(),
                }],
            };

            let requirement = reveal_requirement(
                &reveal_tx,
                &context.script.envelope,
                self.reveal_out_value,
                self.reveal_fee_rate,
            )?;
            debug!(
                "Reveal {} needs {} locked, fee {}",
                index, requirement.prev_output_value, requirement.fee
            );
            reveal_txs.push(reveal_tx);
            requirements.push(requirement);
        }

        Ok(EmptyReveal {
            builder: self,
            reveal_txs,
            requirements,
        })
    }

    fn utxo_view(&self) -> UtxoView {
        self.prev_outpoints
            .iter()
            .zip(&self.prev_outputs)
            .map(|(outpoint, output)| (*outpoint, output.script_pubkey.clone()))
            .collect()
    }

    fn prev_output_lookup(&self) -> HashMap<OutPoint, TxOut> {
        self.prev_outpoints
            .iter()
            .copied()
            .zip(self.prev_outputs.iter().cloned())
            .collect()
    }

    /// Fee of `commit_tx` once signed, from a signed throwaway copy.
    fn estimate_commit_fee(&self, commit_tx: &Transaction) -> Result<Amount> {
        let signed = signed_copy(commit_tx, &self.prev_keys, &self.prev_output_lookup())?;
        virtual_size_or_sig_cost(&signed, &self.utxo_view())?
            .checked_mul(self.commit_fee_rate)
            .map(Amount::from_sat)
            .ok_or(TxBuilderError::AmountOverflow)
    }
}

impl EmptyReveal {
    pub fn reveal_txs(&self) -> &[Transaction] {
        &self.reveal_txs
    }

    pub fn requirements(&self) -> &[RevealRequirement] {
        &self.requirements
    }

    /// Spends every funding output into one output per reveal plus change. A change below the
    /// minimum is left to the miner. Fails when the funds cannot pay the reveals and the fee
    /// even without change.
    #[instrument(skip(self), target = "utxo_tx_builder::inscriber")]
    pub fn fund_commit(self) -> Result<FundedCommit> {
        let builder = self.builder;

        let input = builder
            .prev_outpoints
            .iter()
            .map(|outpoint| TxIn {
                previous_output: *outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence(DEFAULT_SEQUENCE),
                witness: Witness::new(),
            })
            .collect();
        let mut output: Vec<TxOut> = builder
            .contexts
            .iter()
            .zip(&self.requirements)
            .map(|(context, requirement)| TxOut {
                value: requirement.prev_output_value,
                script_pubkey: context.script.script_pubkey.clone(),
            })
            .collect();
        output.push(TxOut {
            value: Amount::ZERO,
            script_pubkey: builder.change_script_pubkey.clone(),
        });
        let mut commit_tx = Transaction {
            version: Version(DEFAULT_TX_VERSION),
            lock_time: LockTime::ZERO,
            input,
            output,
        };

        let total_in = sum(builder.prev_outputs.iter().map(|output| output.value))?;
        let total_reveals = sum(self.requirements.iter().map(|r| r.prev_output_value))?;
        let fee = builder.estimate_commit_fee(&commit_tx)?;

        let change = total_reveals
            .checked_add(fee)
            .and_then(|required| total_in.checked_sub(required));
        let commit_fee = match change {
            Some(change) if change >= builder.min_change_value => {
                if let Some(change_output) = commit_tx.output.last_mut() {
                    change_output.value = change;
                }
                fee
            }
            change => {
                commit_tx.output.pop();
                if change.is_none() {
                    let fee_without_change = builder.estimate_commit_fee(&commit_tx)?;
                    let required = total_reveals
                        .checked_add(fee_without_change)
                        .ok_or(TxBuilderError::AmountOverflow)?;
                    if total_in < required {
                        return Err(TxBuilderError::InsufficientBalance {
                            available: total_in,
                            required,
                            required_fee: fee,
                        });
                    }
                } else {
                    warn!(
                        "Change of {:?} is below {}, leaving it to the fee",
                        change, builder.min_change_value
                    );
                }
                // whatever the reveals do not lock is paid to the miner
                total_in - total_reveals
            }
        };

        debug!(
            "Commit transaction funded with {} inputs, fee {}",
            commit_tx.input.len(),
            commit_fee
        );
        Ok(FundedCommit {
            builder,
            reveal_txs: self.reveal_txs,
            commit_tx,
            commit_fee,
        })
    }
}

impl FundedCommit {
    pub fn commit_tx(&self) -> &Transaction {
        &self.commit_tx
    }

    pub fn commit_fee(&self) -> Amount {
        self.commit_fee
    }

    #[instrument(skip(self), target = "utxo_tx_builder::inscriber")]
    pub fn sign_commit(self) -> Result<SignedCommit> {
        let mut commit_tx = self.commit_tx;
        sign_transaction(
            &mut commit_tx,
            &self.builder.prev_keys,
            &self.builder.prev_output_lookup(),
        )?;

        Ok(SignedCommit {
            builder: self.builder,
            reveal_txs: self.reveal_txs,
            commit_tx,
        })
    }
}

impl SignedCommit {
    pub fn commit_tx(&self) -> &Transaction {
        &self.commit_tx
    }

    /// Points every reveal at the commit transaction, signs its script-path spend and checks
    /// its weight against the standardness limit.
    #[instrument(skip(self), target = "utxo_tx_builder::inscriber")]
    pub fn finalize_reveals(self) -> Result<FinalizedReveal> {
        let commit_txid = self.commit_tx.compute_txid();
        let mut reveal_txs = self.reveal_txs;

        for (index, (reveal_tx, context)) in
            reveal_txs.iter_mut().zip(&self.builder.contexts).enumerate()
        {
            reveal_tx.input[0].previous_output.txid = commit_txid;
            let prev_output = self.commit_tx.output.get(index).cloned().ok_or_else(|| {
                TxBuilderError::InvalidInscription(format!("commit output {index} is missing"))
            })?;
            sign_tapscript_input(
                reveal_tx,
                0,
                &context.script.envelope,
                &context.script.control_block,
                &context.private_key,
                &[prev_output],
            )?;
        }

        for (index, reveal_tx) in reveal_txs.iter().enumerate() {
            let weight = reveal_tx.weight().to_wu();
            if weight > MAX_STANDARD_TX_WEIGHT {
                return Err(TxBuilderError::StandardnessViolation {
                    index,
                    weight,
                    max: MAX_STANDARD_TX_WEIGHT,
                });
            }
        }

        debug!(
            "Finalized {} reveals of commit {}",
            reveal_txs.len(),
            commit_txid
        );
        Ok(FinalizedReveal {
            builder: self.builder,
            reveal_txs,
            commit_tx: self.commit_tx,
        })
    }
}

impl FinalizedReveal {
    pub fn commit_tx(&self) -> &Transaction {
        &self.commit_tx
    }

    pub fn reveal_txs(&self) -> &[Transaction] {
        &self.reveal_txs
    }

    pub fn commit_tx_hex(&self) -> String {
        serialize_tx_hex(&self.commit_tx)
    }

    pub fn reveal_tx_hexes(&self) -> Vec<String> {
        self.reveal_txs.iter().map(serialize_tx_hex).collect()
    }

    /// Taproot addresses the commit transaction pays to, one per item.
    pub fn commit_addresses(&self) -> Vec<String> {
        self.builder
            .contexts
            .iter()
            .map(|context| context.script.commit_address.clone())
            .collect()
    }

    /// Commit fee and the fee of every reveal.
    pub fn calculate_fees(&self) -> Result<(Amount, Vec<Amount>)> {
        let commit_in = sum(self.builder.prev_outputs.iter().map(|output| output.value))?;
        let commit_out = sum(self.commit_tx.output.iter().map(|output| output.value))?;
        let commit_fee = commit_in
            .checked_sub(commit_out)
            .ok_or(TxBuilderError::AmountOverflow)?;

        let reveal_fees = self
            .reveal_txs
            .iter()
            .zip(&self.commit_tx.output)
            .map(|(reveal_tx, prev_output)| {
                let reveal_out = sum(reveal_tx.output.iter().map(|output| output.value))?;
                prev_output
                    .value
                    .checked_sub(reveal_out)
                    .ok_or(TxBuilderError::AmountOverflow)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((commit_fee, reveal_fees))
    }

    pub fn params(&self) -> &ChainParams {
        &self.builder.params
    }

    pub fn into_result(self) -> Result<InscribeTxs> {
        let (commit_fee, reveal_fees) = self.calculate_fees()?;
        Ok(InscribeTxs {
            commit_tx: self.commit_tx_hex(),
            reveal_txs: self.reveal_tx_hexes(),
            commit_tx_fee: commit_fee,
            reveal_tx_fees: reveal_fees.iter().map(|fee| fee.to_sat()).collect(),
            commit_addresses: self.commit_addresses(),
        })
    }
}

fn positive(value: Option<Amount>) -> Option<Amount> {
    value.filter(|value| *value > Amount::ZERO)
}

fn sum(mut amounts: impl Iterator<Item = Amount>) -> Result<Amount> {
    amounts
        .try_fold(Amount::ZERO, |acc, amount| acc.checked_add(amount))
        .ok_or(TxBuilderError::AmountOverflow)
}

/// Builds, funds and signs the commit transaction and every reveal of `request`.
#[instrument(skip(request, params), target = "utxo_tx_builder::inscriber")]
pub fn inscribe(request: &InscriptionRequest, params: ChainParams) -> Result<InscribeTxs> {
    let result = InscriptionBuilder::new(request, params)
        .and_then(InscriptionBuilder::build_empty_reveals)
        .and_then(EmptyReveal::fund_commit)
        .and_then(FundedCommit::sign_commit)
        .and_then(SignedCommit::finalize_reveals)
        .and_then(FinalizedReveal::into_result);

    match &result {
        Ok(txs) => {
            debug!(
                "Inscribed {} items, commit fee {}",
                txs.reveal_txs.len(),
                txs.commit_tx_fee
            );
            METRICS.inscriptions_built.inc();
        }
        Err(err) => {
            let error_type = match err {
                TxBuilderError::InsufficientBalance { .. } => {
                    InscriptionErrorType::InsufficientBalance
                }
                TxBuilderError::StandardnessViolation { .. } => InscriptionErrorType::Standardness,
                _ => InscriptionErrorType::Other,
            };
            METRICS.inscription_errors[&error_type].inc();
        }
    }
    result
}
