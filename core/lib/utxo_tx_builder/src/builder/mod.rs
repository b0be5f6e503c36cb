use std::collections::{BTreeMap, HashMap};

use bitcoin::{
    absolute::LockTime,
    hashes::Hash,
    opcodes::OP_FALSE,
    script::{Builder as ScriptBuilder, PushBytesBuf},
    sighash::SighashCache,
    transaction::Version,
    Amount, OutPoint, PrivateKey, PublicKey, ScriptBuf, Sequence, Transaction, TxIn, TxOut,
    Witness,
};
use secp256k1::Secp256k1;
use tracing::{debug, instrument, warn};
use utxo_config::TxBuilderConfig;

use crate::{
    address::{parse_private_key, parse_public_key, resolve, resolve_explicit},
    metrics::{BuildPath, METRICS},
    network::ChainParams,
    signer::{self, legacy_sighash, sign_digest, signature_push},
    types::{
        InputSpec, OutputSpec, Result, ScriptSource, TxBuilderError, UnsignedTx,
        DEFAULT_DUST_FLOOR,
    },
    utils::serialize_tx_hex,
    weight::UtxoView,
};

mod external;

pub use external::{
    calc_tx_id, compressed_tx_size, sign_tx, sign_tx_legacy_compressed, sign_tx_uncompressed,
    tx_size,
};

/// DER length the unsigned placeholder reserves for every signature: the longest DER encoding,
/// with both integers padded to 33 bytes.
pub const PLACEHOLDER_SIGNATURE_LEN: usize = 72;

/// Accumulates inputs and outputs and turns them into a transaction of one chain.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    version: i32,
    params: ChainParams,
    dust_floor: Amount,
    inputs: Vec<InputSpec>,
    outputs: Vec<OutputSpec>,
}

impl TransactionBuilder {
    pub fn new(version: i32, params: ChainParams) -> Self {
        Self {
            version,
            params,
            dust_floor: DEFAULT_DUST_FLOOR,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn from_config(config: &TxBuilderConfig) -> Result<Self> {
        let params = ChainParams::from_config(config)?;
        Ok(Self::new(config.tx_version(), params)
            .with_dust_floor(Amount::from_sat(config.dust_floor())))
    }

    pub fn with_dust_floor(mut self, dust_floor: Amount) -> Self {
        self.dust_floor = dust_floor;
        self
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn inputs(&self) -> &[InputSpec] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputSpec] {
        &self.outputs
    }

    pub fn add_input(&mut self, input: InputSpec) -> &mut Self {
        self.inputs.push(input);
        self
    }

    pub fn add_output(&mut self, output: OutputSpec) -> &mut Self {
        self.outputs.push(output);
        self
    }

    pub fn total_input_amount(&self) -> Result<Amount> {
        self.inputs
            .iter()
            .try_fold(Amount::ZERO, |acc, input| acc.checked_add(input.amount))
            .ok_or(TxBuilderError::AmountOverflow)
    }

    pub fn total_output_amount(&self) -> Result<Amount> {
        self.outputs
            .iter()
            .try_fold(Amount::ZERO, |acc, output| acc.checked_add(output.amount))
            .ok_or(TxBuilderError::AmountOverflow)
    }

    /// Locking scripts of the spent outputs, keyed by outpoint.
    pub fn utxo_view(&self) -> Result<UtxoView> {
        self.inputs
            .iter()
            .map(|input| Ok((input.outpoint(), self.resolve_source(&input.source)?)))
            .collect()
    }

    /// Assembles the transaction and signs every input with its own key.
    #[instrument(skip(self), target = "utxo_tx_builder::builder")]
    pub fn build(&self) -> Result<Transaction> {
        self.ensure_not_empty()?;

        let mut lookup = HashMap::with_capacity(self.inputs.len());
        let mut private_keys = Vec::with_capacity(self.inputs.len());
        let mut tx_inputs = Vec::with_capacity(self.inputs.len());
        for (input_index, input) in self.inputs.iter().enumerate() {
            let outpoint = input.outpoint();
            lookup.insert(
                outpoint,
                TxOut {
                    value: input.amount,
                    script_pubkey: self.resolve_source(&input.source)?,
                },
            );
            tx_inputs.push(empty_input(outpoint, ScriptBuf::new()));
            private_keys.push(self.input_key(input_index, input)?);
        }

        let tx_outputs = self.resolve_outputs()?;
        let total_in = self.total_input_amount()?;
        let total_out = tx_outputs
            .iter()
            .try_fold(Amount::ZERO, |acc, output| acc.checked_add(output.value))
            .ok_or(TxBuilderError::AmountOverflow)?;
        if total_out > total_in {
            return Err(TxBuilderError::InsufficientBalance {
                available: total_in,
                required: total_out,
                required_fee: Amount::ZERO,
            });
        }

        let mut tx = self.skeleton(tx_inputs, tx_outputs);
        signer::sign_transaction(&mut tx, &private_keys, &lookup)?;

        debug!(
            "Built transaction {} with fee {}",
            tx.compute_txid(),
            total_in - total_out
        );
        METRICS.transactions_built[&BuildPath::Signed].inc();
        Ok(tx)
    }

    /// Legacy path: signs each input against its P2PKH script, or against the explicit
    /// redeem script for multisig inputs, and returns the serialized transaction.
    #[instrument(skip(self), target = "utxo_tx_builder::builder")]
    pub fn single_build(&self) -> Result<String> {
        self.ensure_not_empty()?;

        let secp = Secp256k1::new();
        let mut keys = Vec::with_capacity(self.inputs.len());
        let mut script_codes = Vec::with_capacity(self.inputs.len());
        let mut tx_inputs = Vec::with_capacity(self.inputs.len());
        for (input_index, input) in self.inputs.iter().enumerate() {
            let private_key = self.input_key(input_index, input)?;
            let (script_code, redeem) = match &input.source {
                ScriptSource::Script(script_hex) => (resolve_explicit(script_hex)?, true),
                ScriptSource::Address(_) => (
                    ScriptBuf::new_p2pkh(&private_key.public_key(&secp).pubkey_hash()),
                    false,
                ),
            };
            tx_inputs.push(empty_input(input.outpoint(), script_code.clone()));
            keys.push(private_key);
            script_codes.push((script_code, redeem));
        }

        let mut tx = self.skeleton(tx_inputs, self.resolve_outputs()?);

        let script_sigs = {
            let sighash_cache = SighashCache::new(&tx);
            script_codes
                .iter()
                .zip(&keys)
                .enumerate()
                .map(|(input_index, ((script_code, redeem), private_key))| {
                    let sighash = legacy_sighash(&sighash_cache, input_index, script_code)?;
                    let signature = sign_digest(&secp, sighash.to_byte_array(), private_key);
                    let builder = if *redeem {
                        ScriptBuilder::new()
                            .push_opcode(OP_FALSE)
                            .push_slice(signature_push(&signature)?)
                            .push_slice(
                                PushBytesBuf::try_from(script_code.to_bytes())
                                    .map_err(|e| TxBuilderError::ScriptDecode(e.to_string()))?,
                            )
                    } else {
                        ScriptBuilder::new()
                            .push_slice(signature_push(&signature)?)
                            .push_key(&private_key.public_key(&secp))
                    };
                    Ok(builder.into_script())
                })
                .collect::<Result<Vec<_>>>()?
        };
        for (input, script_sig) in tx.input.iter_mut().zip(script_sigs) {
            input.script_sig = script_sig;
        }

        METRICS.transactions_built[&BuildPath::Single].inc();
        Ok(serialize_tx_hex(&tx))
    }

    /// Builds a transaction whose signature scripts are zero-filled placeholders of the final
    /// size, together with the SIGHASH_ALL digest every input has to sign. Each input is
    /// expected to spend the P2PKH output of the public key given for its index.
    #[instrument(skip(self, public_keys), target = "utxo_tx_builder::builder")]
    pub fn unsigned_tx(&self, public_keys: &BTreeMap<usize, String>) -> Result<UnsignedTx> {
        self.ensure_not_empty()?;

        let mut keys = Vec::with_capacity(self.inputs.len());
        let mut tx_inputs = Vec::with_capacity(self.inputs.len());
        for (input_index, input) in self.inputs.iter().enumerate() {
            let public_key = public_keys
                .get(&input_index)
                .ok_or(TxBuilderError::KeyCountMismatch {
                    keys: public_keys.len(),
                    inputs: self.inputs.len(),
                })
                .and_then(|key| parse_public_key(key))?;
            let script_code = ScriptBuf::new_p2pkh(&public_key.pubkey_hash());
            tx_inputs.push(empty_input(input.outpoint(), script_code));
            keys.push(public_key);
        }

        let mut tx = self.skeleton(tx_inputs, self.resolve_outputs()?);

        let mut sighashes = BTreeMap::new();
        {
            let sighash_cache = SighashCache::new(&tx);
            for (input_index, input) in tx.input.iter().enumerate() {
                let sighash = legacy_sighash(&sighash_cache, input_index, &input.script_sig)?;
                sighashes.insert(input_index, hex::encode(sighash.to_byte_array()));
            }
        }
        for (input, public_key) in tx.input.iter_mut().zip(&keys) {
            input.script_sig = placeholder_script_sig(public_key)?;
        }

        debug!("Unsigned transaction forecast size {}", tx.total_size());
        METRICS.transactions_built[&BuildPath::Unsigned].inc();
        Ok(UnsignedTx {
            tx_hex: serialize_tx_hex(&tx),
            sighashes,
        })
    }

    fn ensure_not_empty(&self) -> Result<()> {
        if self.inputs.is_empty() || self.outputs.is_empty() {
            return Err(TxBuilderError::EmptyInputsOrOutputs);
        }
        Ok(())
    }

    fn skeleton(&self, input: Vec<TxIn>, output: Vec<TxOut>) -> Transaction {
        Transaction {
            version: Version(self.version),
            lock_time: LockTime::ZERO,
            input,
            output,
        }
    }

    fn resolve_source(&self, source: &ScriptSource) -> Result<ScriptBuf> {
        match source {
            ScriptSource::Address(address) => resolve(address, &self.params),
            ScriptSource::Script(script_hex) => resolve_explicit(script_hex),
        }
    }

    fn input_key(&self, input_index: usize, input: &InputSpec) -> Result<PrivateKey> {
        let key = input.private_key.as_deref().ok_or_else(|| {
            TxBuilderError::InvalidPrivateKey(format!("input {input_index} has no private key"))
        })?;
        parse_private_key(key, &self.params)
    }

    /// Output scripts in order, leaving out change outputs under the dust floor.
    fn resolve_outputs(&self) -> Result<Vec<TxOut>> {
        let mut outputs = Vec::with_capacity(self.outputs.len());
        for output in &self.outputs {
            if output.is_change && output.amount < self.dust_floor {
                warn!(
                    "Dropping change output of {} below dust floor {}",
                    output.amount, self.dust_floor
                );
                continue;
            }
            outputs.push(TxOut {
                value: output.amount,
                script_pubkey: self.resolve_source(&output.destination)?,
            });
        }

        if outputs.is_empty() {
            return Err(TxBuilderError::EmptyInputsOrOutputs);
        }
        Ok(outputs)
    }
}

fn empty_input(previous_output: OutPoint, script_sig: ScriptBuf) -> TxIn {
    TxIn {
        previous_output,
        script_sig,
        sequence: Sequence::MAX,
        witness: Witness::new(),
    }
}

/// `<zero signature + SIGHASH_ALL> <public key>`, as long as the signed script.
fn placeholder_script_sig(public_key: &PublicKey) -> Result<ScriptBuf> {
    let mut placeholder = vec![0u8; PLACEHOLDER_SIGNATURE_LEN];
    placeholder.push(bitcoin::EcdsaSighashType::All.to_u32() as u8);
    let placeholder = PushBytesBuf::try_from(placeholder)
        .map_err(|e| TxBuilderError::SigningError(e.to_string()))?;

    Ok(ScriptBuilder::new()
        .push_slice(placeholder)
        .push_key(public_key)
        .into_script())
}
