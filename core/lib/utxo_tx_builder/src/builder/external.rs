use std::collections::BTreeMap;

use bitcoin::{
    ecdsa,
    hashes::{sha256d, Hash},
    script::{Builder as ScriptBuilder, PushBytesBuf},
    EcdsaSighashType, PublicKey, Txid,
};
use secp256k1::Secp256k1;
use tracing::{debug, instrument};

use super::TransactionBuilder;
use crate::{
    address::{parse_private_key, parse_public_key},
    metrics::{BuildPath, METRICS},
    signer::{sign_digest, signature_push},
    types::{Result, TxBuilderError},
    utils::{decode_hex, deserialize_tx_hex, serialize_tx_hex},
};

/// Splices externally produced DER signatures into an unsigned transaction. Input `i` gets
/// `<signatures[i] + SIGHASH_ALL> <public_keys[i] compressed>`.
pub fn sign_tx(raw_tx: &str, public_keys: &[String], signatures: &[String]) -> Result<String> {
    splice_signatures(raw_tx, public_keys, signatures, true)
}

/// Same as [`sign_tx`], pushing the 65-byte uncompressed form of each key.
pub fn sign_tx_uncompressed(
    raw_tx: &str,
    public_keys: &[String],
    signatures: &[String],
) -> Result<String> {
    splice_signatures(raw_tx, public_keys, signatures, false)
}

#[instrument(skip_all, target = "utxo_tx_builder::builder")]
fn splice_signatures(
    raw_tx: &str,
    public_keys: &[String],
    signatures: &[String],
    compressed: bool,
) -> Result<String> {
    let mut tx = deserialize_tx_hex(raw_tx)?;
    if signatures.len() != tx.input.len() {
        return Err(TxBuilderError::SignatureCountMismatch {
            signatures: signatures.len(),
            inputs: tx.input.len(),
        });
    }
    if public_keys.len() != tx.input.len() {
        return Err(TxBuilderError::KeyCountMismatch {
            keys: public_keys.len(),
            inputs: tx.input.len(),
        });
    }

    let script_sigs = signatures
        .iter()
        .zip(public_keys)
        .map(|(signature, public_key)| {
            let der = decode_hex(signature)
                .map_err(|e| TxBuilderError::SigningError(e.to_string()))?;
            let signature = ecdsa::Signature {
                signature: secp256k1::ecdsa::Signature::from_der(&der)?,
                sighash_type: EcdsaSighashType::All,
            };
            let public_key = parse_public_key(public_key)?;
            let key_bytes = if compressed {
                public_key.inner.serialize().to_vec()
            } else {
                public_key.inner.serialize_uncompressed().to_vec()
            };
            let key_push = PushBytesBuf::try_from(key_bytes)
                .map_err(|e| TxBuilderError::InvalidPublicKey(e.to_string()))?;

            Ok(ScriptBuilder::new()
                .push_slice(signature_push(&signature)?)
                .push_slice(key_push)
                .into_script())
        })
        .collect::<Result<Vec<_>>>()?;

    for (input, script_sig) in tx.input.iter_mut().zip(script_sigs) {
        input.script_sig = script_sig;
    }

    METRICS.transactions_built[&BuildPath::Spliced].inc();
    Ok(serialize_tx_hex(&tx))
}

/// Double SHA-256 of the given bytes in display order. The bytes are hashed as supplied, so
/// for segwit transactions this is the wtxid rather than the txid.
pub fn calc_tx_id(raw_tx: &str) -> Result<String> {
    let bytes = decode_hex(raw_tx)?;
    Ok(Txid::from_raw_hash(sha256d::Hash::hash(&bytes)).to_string())
}

/// Serialized size in bytes of a transaction, witness included.
pub fn tx_size(raw_tx: &str) -> Result<usize> {
    Ok(deserialize_tx_hex(raw_tx)?.total_size())
}

/// Size the builder's transaction will have once every input is signed by the compressed key
/// of `private_key`.
pub fn compressed_tx_size(builder: &TransactionBuilder, private_key: &str) -> Result<usize> {
    let public_key = compressed_public_key(builder, private_key)?;
    let unsigned = builder.unsigned_tx(&same_key_for_all(builder, &public_key))?;
    tx_size(&unsigned.tx_hex)
}

/// Runs the external-signing flow locally: forecasts the transaction for the compressed key
/// of `private_key`, signs every digest and splices the signatures back in.
/// Returns the raw transaction and its id.
#[instrument(skip_all, target = "utxo_tx_builder::builder")]
pub fn sign_tx_legacy_compressed(
    builder: &TransactionBuilder,
    private_key: &str,
) -> Result<(String, String)> {
    let secp = Secp256k1::new();
    let mut private_key = parse_private_key(private_key, builder.params())?;
    private_key.compressed = true;
    let public_key = private_key.public_key(&secp);

    let unsigned = builder.unsigned_tx(&same_key_for_all(builder, &public_key))?;
    let signatures = unsigned
        .sighashes
        .values()
        .map(|sighash| {
            let digest: [u8; 32] = decode_hex(sighash)
                .ok()
                .and_then(|bytes| bytes.try_into().ok())
                .ok_or_else(|| TxBuilderError::SigningError(format!("bad digest {sighash}")))?;
            Ok(hex::encode(
                sign_digest(&secp, digest, &private_key).signature.serialize_der(),
            ))
        })
        .collect::<Result<Vec<_>>>()?;
    let public_keys = vec![public_key.to_string(); signatures.len()];

    let raw_tx = sign_tx(&unsigned.tx_hex, &public_keys, &signatures)?;
    let txid = calc_tx_id(&raw_tx)?;
    debug!("Signed legacy transaction {}", txid);
    Ok((raw_tx, txid))
}

fn compressed_public_key(builder: &TransactionBuilder, private_key: &str) -> Result<PublicKey> {
    let mut private_key = parse_private_key(private_key, builder.params())?;
    private_key.compressed = true;
    Ok(private_key.public_key(&Secp256k1::signing_only()))
}

fn same_key_for_all(
    builder: &TransactionBuilder,
    public_key: &PublicKey,
) -> BTreeMap<usize, String> {
    (0..builder.inputs().len())
        .map(|input_index| (input_index, public_key.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bitcoin::{sighash::SighashCache, Amount, ScriptBuf, Transaction};
    use secp256k1::Message;

    use super::*;
    use crate::{
        address::encode_p2pkh,
        builder::PLACEHOLDER_SIGNATURE_LEN,
        network::RAVENCOIN,
        types::{InputSpec, OutputSpec},
    };

    const KEY: &str = "7e53ae5d15dd6af9601fb0cbc6ce0ecda62fa8e56a4620b402a8a1061e648b87";
    const OUTPUT_ADDRESS: &str = "RPVW6ifbuCr4BQqAAjZ4APaT3sqL61tU8a";

    fn builder(inputs: u32) -> TransactionBuilder {
        let secp = Secp256k1::new();
        let key = parse_private_key(KEY, &RAVENCOIN).unwrap();
        let address = encode_p2pkh(&key.public_key(&secp), &RAVENCOIN);

        let mut builder = TransactionBuilder::new(2, RAVENCOIN);
        for vout in 0..inputs {
            builder.add_input(InputSpec::from_address(
                Txid::from_byte_array([7; 32]),
                vout,
                Amount::from_sat(60_000_000),
                address.clone(),
                KEY,
            ));
        }
        builder.add_output(OutputSpec::to_address(
            OUTPUT_ADDRESS,
            Amount::from_sat(59_000_000),
        ));
        builder
    }

    #[test]
    fn tx_id_matches_consensus_txid() {
        let tx = builder(1).build().unwrap();
        let raw = serialize_tx_hex(&tx);

        assert_eq!(calc_tx_id(&raw).unwrap(), tx.compute_txid().to_string());
        assert_eq!(calc_tx_id(&format!("0x{raw}")).unwrap(), tx.compute_txid().to_string());
        assert_matches!(calc_tx_id("zz"), Err(TxBuilderError::InvalidTransaction(_)));
    }

    #[test]
    fn tx_size_reads_serialized_length() {
        let raw = builder(2).single_build().unwrap();
        assert_eq!(tx_size(&raw).unwrap(), raw.len() / 2);
        assert_matches!(tx_size("00"), Err(TxBuilderError::InvalidTransaction(_)));
    }

    #[test]
    fn local_external_signing_matches_direct_signing() {
        let builder = builder(2);
        let (raw, txid) = sign_tx_legacy_compressed(&builder, KEY).unwrap();
        let direct = builder.build().unwrap();

        assert_eq!(raw, serialize_tx_hex(&direct));
        assert_eq!(txid, direct.compute_txid().to_string());
    }

    #[test]
    fn forecast_size_covers_signed_size() {
        for inputs in 1..=3 {
            let builder = builder(inputs);
            let forecast = compressed_tx_size(&builder, KEY).unwrap();
            let (raw, _) = sign_tx_legacy_compressed(&builder, KEY).unwrap();
            let signed = tx_size(&raw).unwrap();

            // low-R signatures are at most 70 bytes DER
            let inputs = inputs as usize;
            assert!(forecast - signed >= 2 * inputs);
            assert!(forecast - signed <= 4 * inputs);
        }
    }

    #[test]
    fn forecast_covers_high_r_and_longest_signatures() {
        let secp = Secp256k1::new();
        let private_key = parse_private_key(KEY, &RAVENCOIN).unwrap();
        let public_key = private_key.public_key(&secp);
        let builder = builder(2);
        let unsigned = builder
            .unsigned_tx(&same_key_for_all(&builder, &public_key))
            .unwrap();
        let forecast = tx_size(&unsigned.tx_hex).unwrap();
        let public_keys = vec![public_key.to_string(); 2];

        let high_r: Vec<_> = unsigned
            .sighashes
            .values()
            .map(|sighash| {
                let digest: [u8; 32] = hex::decode(sighash).unwrap().try_into().unwrap();
                let signature = secp.sign_ecdsa(&Message::from_digest(digest), &private_key.inner);
                hex::encode(signature.serialize_der().to_vec())
            })
            .collect();
        let raw = sign_tx(&unsigned.tx_hex, &public_keys, &high_r).unwrap();
        assert!(tx_size(&raw).unwrap() <= forecast);

        // r and s both have their top bit set, so each needs a padding byte
        let mut compact = [0u8; 64];
        compact[0] = 0x80;
        compact[31] = 0x01;
        compact[32] = 0x80;
        compact[63] = 0x02;
        let longest = secp256k1::ecdsa::Signature::from_compact(&compact)
            .unwrap()
            .serialize_der()
            .to_vec();
        assert_eq!(longest.len(), PLACEHOLDER_SIGNATURE_LEN);

        let raw = sign_tx(&unsigned.tx_hex, &public_keys, &vec![hex::encode(longest); 2]).unwrap();
        assert_eq!(tx_size(&raw).unwrap(), forecast);
    }

    #[test]
    fn spliced_signatures_verify_against_digests() {
        let secp = Secp256k1::new();
        let private_key = parse_private_key(KEY, &RAVENCOIN).unwrap();
        let public_key = private_key.public_key(&secp);
        let builder = builder(1);

        let unsigned = builder
            .unsigned_tx(&BTreeMap::from([(0, public_key.to_string())]))
            .unwrap();
        let digest: [u8; 32] = hex::decode(&unsigned.sighashes[&0])
            .unwrap()
            .try_into()
            .unwrap();
        let signature = sign_digest(&secp, digest, &private_key).signature;

        let raw = sign_tx_uncompressed(
            &unsigned.tx_hex,
            &[public_key.to_string()],
            &[hex::encode(signature.serialize_der())],
        )
        .unwrap();
        let tx: Transaction = deserialize_tx_hex(&raw).unwrap();
        let pushes: Vec<_> = tx.input[0]
            .script_sig
            .instructions()
            .map(|i| i.unwrap().push_bytes().unwrap().as_bytes().to_vec())
            .collect();
        assert_eq!(pushes[1].len(), 65);
        assert_eq!(*pushes[0].last().unwrap(), 0x01);

        let script_code = ScriptBuf::new_p2pkh(&public_key.pubkey_hash());
        let sighash = SighashCache::new(&tx)
            .legacy_signature_hash(0, &script_code, EcdsaSighashType::All.to_u32())
            .unwrap();
        assert_eq!(hex::encode(sighash.to_byte_array()), unsigned.sighashes[&0]);
        let parsed = ecdsa::Signature::from_slice(&pushes[0]).unwrap();
        secp.verify_ecdsa(
            &Message::from_digest(sighash.to_byte_array()),
            &parsed.signature,
            &public_key.inner,
        )
        .unwrap();
    }

    #[test]
    fn splicing_checks_counts_and_der() {
        let secp = Secp256k1::new();
        let public_key = parse_private_key(KEY, &RAVENCOIN)
            .unwrap()
            .public_key(&secp)
            .to_string();
        let builder = builder(2);
        let unsigned = builder
            .unsigned_tx(&same_key_for_all(&builder, &parse_public_key(&public_key).unwrap()))
            .unwrap();

        assert_matches!(
            sign_tx(&unsigned.tx_hex, &[public_key.clone()], &["30".into()]),
            Err(TxBuilderError::SignatureCountMismatch { signatures: 1, inputs: 2 })
        );
        assert_matches!(
            sign_tx(
                &unsigned.tx_hex,
                &[public_key.clone(), public_key.clone()],
                &["3000".into(), "3000".into()]
            ),
            Err(TxBuilderError::SigningError(_))
        );
    }
}
