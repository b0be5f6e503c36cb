use bech32::{segwit, Fe32, Hrp};
use bitcoin::{
    base58,
    hashes::Hash,
    script::Instruction,
    PrivateKey, PubkeyHash, PublicKey, Script, ScriptBuf, ScriptHash, WitnessProgram,
    WitnessVersion,
};
use secp256k1::SecretKey;

use crate::{
    network::ChainParams,
    types::{Result, TxBuilderError},
    utils::{decode_hex, strip_hex_prefix},
};

fn address_error(address: &str, reason: impl ToString) -> TxBuilderError {
    TxBuilderError::Address {
        address: address.to_string(),
        reason: reason.to_string(),
    }
}

/// Converts an address of the given chain into the locking script it stands for.
pub fn resolve(address: &str, params: &ChainParams) -> Result<ScriptBuf> {
    if let Some(hrp) = params.bech32_hrp {
        if looks_like_bech32(address, hrp) {
            // base58 addresses of some chains start with the hrp as well
            return resolve_segwit(address, hrp)
                .or_else(|err| resolve_base58(address, params).map_err(|_| err));
        }
    }
    resolve_base58(address, params)
}

/// Bech32 strings are single-case and start with `<hrp>1`.
fn looks_like_bech32(address: &str, hrp: &str) -> bool {
    let single_case = address == address.to_ascii_lowercase()
        || address == address.to_ascii_uppercase();
    single_case && address.to_ascii_lowercase().starts_with(&format!("{hrp}1"))
}

fn resolve_base58(address: &str, params: &ChainParams) -> Result<ScriptBuf> {
    let payload = base58::decode_check(address).map_err(|e| address_error(address, e))?;
    let (version, hash) = match payload.split_first() {
        Some((version, hash)) if hash.len() == 20 => (*version, hash),
        _ => return Err(address_error(address, "payload is not a 20-byte hash")),
    };

    let mut hash_bytes = [0u8; 20];
    hash_bytes.copy_from_slice(hash);

    if version == params.pubkey_hash_prefix {
        Ok(ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash_bytes)))
    } else if version == params.script_hash_prefix {
        Ok(ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(hash_bytes)))
    } else {
        Err(address_error(
            address,
            format!("version byte {version:#04x} does not belong to {}", params.chain),
        ))
    }
}

fn resolve_segwit(address: &str, expected_hrp: &str) -> Result<ScriptBuf> {
    let (hrp, version, program) =
        segwit::decode(address).map_err(|e| address_error(address, e))?;
    if hrp.to_lowercase() != expected_hrp {
        return Err(address_error(address, "wrong network prefix"));
    }

    let version =
        WitnessVersion::try_from(version.to_u8()).map_err(|e| address_error(address, e))?;
    let program = WitnessProgram::new(version, &program).map_err(|e| address_error(address, e))?;
    Ok(ScriptBuf::new_witness_program(&program))
}

/// Decodes a caller supplied script, e.g. a pre-built redeem script.
pub fn resolve_explicit(script_hex: &str) -> Result<ScriptBuf> {
    let bytes = decode_hex(script_hex).map_err(|e| TxBuilderError::ScriptDecode(e.to_string()))?;
    let script = ScriptBuf::from_bytes(bytes);
    for instruction in script.instructions() {
        instruction.map_err(|e| TxBuilderError::ScriptDecode(e.to_string()))?;
    }
    Ok(script)
}

/// Encodes a witness program locking script as an address of the given chain.
pub fn encode_witness_address(script: &Script, params: &ChainParams) -> Result<String> {
    let hrp_str = params.bech32_hrp.ok_or_else(|| {
        address_error(&script.to_hex_string(), format!("{} has no segwit", params.chain))
    })?;
    let version = script
        .witness_version()
        .ok_or_else(|| address_error(&script.to_hex_string(), "not a witness program"))?;

    let hrp = Hrp::parse(hrp_str).map_err(|e| address_error(hrp_str, e))?;
    let version = Fe32::try_from(version.to_num()).map_err(|e| address_error(hrp_str, e))?;
    let program = match script.instructions().nth(1) {
        Some(Ok(Instruction::PushBytes(bytes))) => bytes.as_bytes().to_vec(),
        _ => return Err(address_error(&script.to_hex_string(), "missing program")),
    };

    segwit::encode(hrp, version, &program).map_err(|e| address_error(hrp_str, e))
}

/// Parses a 64-char hex scalar (compressed key assumed) or a WIF string of the given chain.
pub fn parse_private_key(value: &str, params: &ChainParams) -> Result<PrivateKey> {
    let value = strip_hex_prefix(value.trim());
    if value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit()) {
        let bytes =
            hex::decode(value).map_err(|e| TxBuilderError::InvalidPrivateKey(e.to_string()))?;
        let secret = SecretKey::from_slice(&bytes)
            .map_err(|e| TxBuilderError::InvalidPrivateKey(e.to_string()))?;
        return Ok(PrivateKey::new(secret, params.network_kind()));
    }

    let payload = base58::decode_check(value)
        .map_err(|e| TxBuilderError::InvalidPrivateKey(e.to_string()))?;
    let compressed = match payload.len() {
        33 => false,
        34 if payload[33] == 0x01 => true,
        len => {
            return Err(TxBuilderError::InvalidPrivateKey(format!(
                "unexpected WIF payload length {len}"
            )))
        }
    };
    if payload[0] != params.private_key_prefix {
        return Err(TxBuilderError::InvalidPrivateKey(format!(
            "WIF version byte {:#04x} does not belong to {}",
            payload[0], params.chain
        )));
    }

    let secret = SecretKey::from_slice(&payload[1..33])
        .map_err(|e| TxBuilderError::InvalidPrivateKey(e.to_string()))?;
    Ok(if compressed {
        PrivateKey::new(secret, params.network_kind())
    } else {
        PrivateKey::new_uncompressed(secret, params.network_kind())
    })
}

/// Encodes a private key as WIF with the chain's version byte.
pub fn encode_wif(key: &PrivateKey, params: &ChainParams) -> String {
    let mut payload = Vec::with_capacity(34);
    payload.push(params.private_key_prefix);
    payload.extend_from_slice(&key.inner.secret_bytes());
    if key.compressed {
        payload.push(0x01);
    }
    base58::encode_check(&payload)
}

/// Encodes the pay-to-pubkey-hash address of a public key on the given chain.
pub fn encode_p2pkh(public_key: &PublicKey, params: &ChainParams) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(params.pubkey_hash_prefix);
    payload.extend_from_slice(public_key.pubkey_hash().as_byte_array());
    base58::encode_check(&payload)
}

pub fn parse_public_key(value: &str) -> Result<PublicKey> {
    let bytes = decode_hex(value).map_err(|e| TxBuilderError::InvalidPublicKey(e.to_string()))?;
    PublicKey::from_slice(&bytes).map_err(|e| TxBuilderError::InvalidPublicKey(e.to_string()))
}
