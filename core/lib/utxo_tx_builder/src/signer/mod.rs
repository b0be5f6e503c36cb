use bitcoin::{
    ecdsa,
    hashes::Hash,
    key::TapTweak,
    script::{Builder as ScriptBuilder, PushBytesBuf},
    sighash::{LegacySighash, Prevouts, SighashCache},
    taproot::{self, ControlBlock, LeafVersion},
    CompressedPublicKey, EcdsaSighashType, PrivateKey, Script, ScriptBuf, TapLeafHash,
    TapSighashType, Transaction, TxOut, Witness,
};
use secp256k1::{Keypair, Message, Secp256k1, Signing, Verification};
use tracing::{debug, instrument};

use crate::{
    metrics::{ScriptKind, METRICS},
    traits::PrevOutLookup,
    types::{Result, TxBuilderError},
};

/// Every way of spending an output the signer knows how to unlock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpendKind {
    P2pkh,
    P2wpkh,
    P2shP2wpkh {
        redeem_script: ScriptBuf,
    },
    TaprootKeyPath,
    TaprootScriptPath {
        leaf_script: ScriptBuf,
        control_block: ControlBlock,
    },
}

impl SpendKind {
    fn label(&self) -> ScriptKind {
        match self {
            SpendKind::P2pkh => ScriptKind::P2pkh,
            SpendKind::P2wpkh => ScriptKind::P2wpkh,
            SpendKind::P2shP2wpkh { .. } => ScriptKind::P2shP2wpkh,
            SpendKind::TaprootKeyPath => ScriptKind::TaprootKeyPath,
            SpendKind::TaprootScriptPath { .. } => ScriptKind::TaprootScriptPath,
        }
    }
}

/// Unlocking data for one input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Unlocking {
    pub script_sig: ScriptBuf,
    pub witness: Witness,
}

fn signing_error(error: impl ToString) -> TxBuilderError {
    TxBuilderError::SigningError(error.to_string())
}

/// Picks the spend kind of a previous output locked by `prev_script`. Anything that is not
/// P2TR, P2PKH, P2WPKH or the P2SH wrapping of the key's own P2WPKH is rejected.
pub fn classify<C: Signing>(
    secp: &Secp256k1<C>,
    prev_script: &Script,
    private_key: &PrivateKey,
    input_index: usize,
) -> Result<SpendKind> {
    if prev_script.is_p2tr() {
        return Ok(SpendKind::TaprootKeyPath);
    }
    if prev_script.is_p2pkh() {
        return Ok(SpendKind::P2pkh);
    }
    if prev_script.is_p2wpkh() {
        return Ok(SpendKind::P2wpkh);
    }
    if prev_script.is_p2sh() {
        if let Ok(public_key) = CompressedPublicKey::from_private_key(secp, private_key) {
            let redeem_script = ScriptBuf::new_p2wpkh(&public_key.wpubkey_hash());
            if ScriptBuf::new_p2sh(&redeem_script.script_hash()) == *prev_script {
                return Ok(SpendKind::P2shP2wpkh { redeem_script });
            }
        }
    }

    Err(TxBuilderError::UnsupportedScriptType {
        input_index,
        script: prev_script.to_hex_string(),
    })
}

/// Signs every input of `tx`. Keys are aligned with inputs by index. All unlocking data is
/// computed before the transaction is touched, so on error `tx` is left as it was.
#[instrument(skip_all, target = "utxo_tx_builder::signer")]
pub fn sign_transaction<L: PrevOutLookup + ?Sized>(
    tx: &mut Transaction,
    private_keys: &[PrivateKey],
    lookup: &L,
) -> Result<()> {
    let unlockings = unlock_all(tx, private_keys, lookup)?;
    for (kind, _) in &unlockings {
        METRICS.inputs_signed[&kind.label()].inc();
    }
    apply(tx, unlockings.into_iter().map(|(_, unlocking)| unlocking));
    Ok(())
}

/// Signed copy of `tx`, used to measure its final size. Not counted as signed inputs.
pub(crate) fn signed_copy<L: PrevOutLookup + ?Sized>(
    tx: &Transaction,
    private_keys: &[PrivateKey],
    lookup: &L,
) -> Result<Transaction> {
    let unlockings = unlock_all(tx, private_keys, lookup)?;
    let mut signed = tx.clone();
    apply(&mut signed, unlockings.into_iter().map(|(_, unlocking)| unlocking));
    Ok(signed)
}

fn unlock_all<L: PrevOutLookup + ?Sized>(
    tx: &Transaction,
    private_keys: &[PrivateKey],
    lookup: &L,
) -> Result<Vec<(SpendKind, Unlocking)>> {
    if private_keys.len() < tx.input.len() {
        return Err(TxBuilderError::KeyCountMismatch {
            keys: private_keys.len(),
            inputs: tx.input.len(),
        });
    }

    let prevouts = tx
        .input
        .iter()
        .enumerate()
        .map(|(input_index, input)| {
            lookup
                .fetch_prev_output(&input.previous_output)
                .ok_or(TxBuilderError::UnknownPrevOut {
                    outpoint: input.previous_output,
                    input_index,
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let secp = Secp256k1::new();
    let mut sighash_cache = SighashCache::new(tx);
    prevouts
        .iter()
        .zip(private_keys)
        .enumerate()
        .map(|(input_index, (prev_output, private_key))| {
            let kind = classify(&secp, &prev_output.script_pubkey, private_key, input_index)?;
            debug!("Signing input {} as {:?}", input_index, kind.label());
            let unlocking = unlock(
                &mut sighash_cache,
                &secp,
                input_index,
                &kind,
                private_key,
                &prevouts,
            )?;
            Ok((kind, unlocking))
        })
        .collect::<Result<Vec<_>>>()
}

/// Signs the script-path spend of `leaf_script` for a single input.
#[instrument(skip_all, target = "utxo_tx_builder::signer")]
pub fn sign_tapscript_input(
    tx: &mut Transaction,
    input_index: usize,
    leaf_script: &Script,
    control_block: &ControlBlock,
    private_key: &PrivateKey,
    prevouts: &[TxOut],
) -> Result<()> {
    let secp = Secp256k1::new();
    let kind = SpendKind::TaprootScriptPath {
        leaf_script: leaf_script.to_owned(),
        control_block: control_block.clone(),
    };
    let unlocking = {
        let mut sighash_cache = SighashCache::new(&*tx);
        unlock(
            &mut sighash_cache,
            &secp,
            input_index,
            &kind,
            private_key,
            prevouts,
        )?
    };

    let input = tx
        .input
        .get_mut(input_index)
        .ok_or_else(|| signing_error(format!("input {input_index} out of range")))?;
    input.script_sig = unlocking.script_sig;
    input.witness = unlocking.witness;
    METRICS.inputs_signed[&kind.label()].inc();
    Ok(())
}

fn apply(tx: &mut Transaction, unlockings: impl IntoIterator<Item = Unlocking>) {
    for (input, unlocking) in tx.input.iter_mut().zip(unlockings) {
        input.script_sig = unlocking.script_sig;
        input.witness = unlocking.witness;
    }
}

/// Produces the unlocking data of one input for the given spend kind.
pub fn unlock<C: Signing + Verification>(
    sighash_cache: &mut SighashCache<&Transaction>,
    secp: &Secp256k1<C>,
    input_index: usize,
    kind: &SpendKind,
    private_key: &PrivateKey,
    prevouts: &[TxOut],
) -> Result<Unlocking> {
    let prev_output = prevouts
        .get(input_index)
        .ok_or_else(|| signing_error(format!("no previous output for input {input_index}")))?;

    let unlocking = match kind {
        SpendKind::P2pkh => {
            let sighash =
                legacy_sighash(sighash_cache, input_index, &prev_output.script_pubkey)?;
            let signature = sign_digest(secp, sighash.to_byte_array(), private_key);
            let script_sig = ScriptBuilder::new()
                .push_slice(signature_push(&signature)?)
                .push_key(&private_key.public_key(secp))
                .into_script();
            Unlocking {
                script_sig,
                witness: Witness::new(),
            }
        }
        SpendKind::P2wpkh | SpendKind::P2shP2wpkh { .. } => {
            let public_key =
                CompressedPublicKey::from_private_key(secp, private_key).map_err(signing_error)?;
            let script_code = ScriptBuf::new_p2wpkh(&public_key.wpubkey_hash());
            let sighash = sighash_cache
                .p2wpkh_signature_hash(
                    input_index,
                    &script_code,
                    prev_output.value,
                    EcdsaSighashType::All,
                )
                .map_err(signing_error)?;
            let signature = sign_digest(secp, sighash.to_byte_array(), private_key);

            let script_sig = match kind {
                SpendKind::P2shP2wpkh { redeem_script } => {
                    let redeem_push =
                        PushBytesBuf::try_from(redeem_script.to_bytes()).map_err(signing_error)?;
                    ScriptBuilder::new().push_slice(redeem_push).into_script()
                }
                _ => ScriptBuf::new(),
            };
            Unlocking {
                script_sig,
                witness: Witness::p2wpkh(&signature, &public_key.0),
            }
        }
        SpendKind::TaprootKeyPath => {
            let sighash = sighash_cache
                .taproot_key_spend_signature_hash(
                    input_index,
                    &Prevouts::All(prevouts),
                    TapSighashType::Default,
                )
                .map_err(signing_error)?;
            let keypair = Keypair::from_secret_key(secp, &private_key.inner);
            let tweaked = keypair.tap_tweak(secp, None);
            let message = Message::from_digest(sighash.to_byte_array());
            let signature = secp.sign_schnorr_no_aux_rand(&message, &tweaked.to_keypair());

            Unlocking {
                script_sig: ScriptBuf::new(),
                witness: Witness::p2tr_key_spend(&taproot::Signature {
                    signature,
                    sighash_type: TapSighashType::Default,
                }),
            }
        }
        SpendKind::TaprootScriptPath {
            leaf_script,
            control_block,
        } => {
            let leaf_hash = TapLeafHash::from_script(leaf_script, LeafVersion::TapScript);
            let sighash = sighash_cache
                .taproot_script_spend_signature_hash(
                    input_index,
                    &Prevouts::All(prevouts),
                    leaf_hash,
                    TapSighashType::Default,
                )
                .map_err(signing_error)?;
            let keypair = Keypair::from_secret_key(secp, &private_key.inner);
            let message = Message::from_digest(sighash.to_byte_array());
            let signature = taproot::Signature {
                signature: secp.sign_schnorr_no_aux_rand(&message, &keypair),
                sighash_type: TapSighashType::Default,
            };

            let mut witness = Witness::new();
            witness.push(signature.serialize());
            witness.push(leaf_script.as_bytes());
            witness.push(control_block.serialize());
            Unlocking {
                script_sig: ScriptBuf::new(),
                witness,
            }
        }
    };

    Ok(unlocking)
}

/// SIGHASH_ALL digest of a legacy input against `script_code`.
pub(crate) fn legacy_sighash(
    sighash_cache: &SighashCache<&Transaction>,
    input_index: usize,
    script_code: &Script,
) -> Result<LegacySighash> {
    sighash_cache
        .legacy_signature_hash(input_index, script_code, EcdsaSighashType::All.to_u32())
        .map_err(signing_error)
}

/// Low-R ECDSA signature over a 32-byte digest, tagged SIGHASH_ALL.
pub(crate) fn sign_digest<C: Signing>(
    secp: &Secp256k1<C>,
    digest: [u8; 32],
    private_key: &PrivateKey,
) -> ecdsa::Signature {
    let message = Message::from_digest(digest);
    ecdsa::Signature {
        signature: secp.sign_ecdsa_low_r(&message, &private_key.inner),
        sighash_type: EcdsaSighashType::All,
    }
}

pub(crate) fn signature_push(signature: &ecdsa::Signature) -> Result<PushBytesBuf> {
    PushBytesBuf::try_from(signature.to_vec()).map_err(signing_error)
}
