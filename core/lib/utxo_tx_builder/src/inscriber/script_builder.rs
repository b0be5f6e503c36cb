use bitcoin::{
    key::UntweakedPublicKey,
    opcodes::{all, OP_0, OP_FALSE},
    script::{Builder as ScriptBuilder, PushBytesBuf},
    taproot::{ControlBlock, LeafVersion, TaprootBuilder},
    ScriptBuf,
};
use secp256k1::{Secp256k1, Verification};
use tracing::{debug, instrument};

use super::types::{
    InscriptionData, CONTENT_TYPE_TAG, INSCRIPTION_PROTOCOL, MAX_SCRIPT_ELEMENT_SIZE,
};
use crate::{
    address::encode_witness_address,
    network::ChainParams,
    types::{Result, TxBuilderError},
};

/// Envelope script of one inscription and the single-leaf taproot output committing to it.
#[derive(Debug, Clone)]
pub struct InscriptionScript {
    pub envelope: ScriptBuf,
    pub script_size: usize,
    pub script_pubkey: ScriptBuf,
    pub control_block: ControlBlock,
    pub commit_address: String,
}

impl InscriptionScript {
    #[instrument(skip(data, secp, internal_key), target = "utxo_tx_builder::inscriber")]
    pub fn new<C: Verification>(
        data: &InscriptionData,
        secp: &Secp256k1<C>,
        internal_key: UntweakedPublicKey,
        params: &ChainParams,
    ) -> Result<Self> {
        let envelope = Self::build_envelope(data, internal_key)?;
        let script_size = envelope.len();

        let spend_info = TaprootBuilder::new()
            .add_leaf(0, envelope.clone())
            .map_err(|e| TxBuilderError::InvalidInscription(e.to_string()))?
            .finalize(secp, internal_key)
            .map_err(|_| {
                TxBuilderError::InvalidInscription("taproot tree is incomplete".to_string())
            })?;
        let control_block = spend_info
            .control_block(&(envelope.clone(), LeafVersion::TapScript))
            .ok_or_else(|| {
                TxBuilderError::InvalidInscription("envelope leaf is missing".to_string())
            })?;

        let script_pubkey = ScriptBuf::new_p2tr_tweaked(spend_info.output_key());
        let commit_address = encode_witness_address(&script_pubkey, params)?;

        debug!(
            "Inscription envelope of {} bytes committed to {}",
            script_size, commit_address
        );
        Ok(Self {
            envelope,
            script_size,
            script_pubkey,
            control_block,
            commit_address,
        })
    }

    /// `<key> OP_CHECKSIG OP_FALSE OP_IF "ord" 0x01 <content type> OP_0 <body chunks...> OP_ENDIF`
    fn build_envelope(
        data: &InscriptionData,
        internal_key: UntweakedPublicKey,
    ) -> Result<ScriptBuf> {
        let mut script = ScriptBuilder::new()
            .push_slice(Self::encode_push_bytes(&internal_key.serialize())?)
            .push_opcode(all::OP_CHECKSIG)
            .push_opcode(OP_FALSE)
            .push_opcode(all::OP_IF)
            .push_slice(Self::encode_push_bytes(INSCRIPTION_PROTOCOL.as_bytes())?)
            .push_slice(Self::encode_push_bytes(&[CONTENT_TYPE_TAG])?)
            .push_slice(Self::encode_push_bytes(data.content_type.as_bytes())?)
            .push_opcode(OP_0);

        for chunk in data.body.chunks(MAX_SCRIPT_ELEMENT_SIZE) {
            script = script.push_slice(Self::encode_push_bytes(chunk)?);
        }

        Ok(script.push_opcode(all::OP_ENDIF).into_script())
    }

    fn encode_push_bytes(data: &[u8]) -> Result<PushBytesBuf> {
        PushBytesBuf::try_from(data.to_vec())
            .map_err(|e| TxBuilderError::InvalidInscription(e.to_string()))
    }
}
