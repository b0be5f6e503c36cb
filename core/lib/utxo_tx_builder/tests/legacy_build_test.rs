use std::collections::BTreeMap;

use assert_matches::assert_matches;
use bitcoin::{hashes::Hash, sighash::SighashCache, Amount, EcdsaSighashType, Txid};
use secp256k1::{ecdsa, Message, Secp256k1};
use tracing_test::traced_test;
use utxo_config::TxBuilderConfig;
use utxo_tx_builder::{
    address::{encode_p2pkh, parse_private_key, resolve},
    builder::{
        calc_tx_id, sign_tx, sign_tx_legacy_compressed, tx_size, PLACEHOLDER_SIGNATURE_LEN,
    },
    network::RAVENCOIN,
    utils::{deserialize_tx_hex, serialize_tx_hex},
    InputSpec, OutputSpec, TransactionBuilder, TxBuilderError,
};

const RVN_KEY: &str = "7e53ae5d15dd6af9601fb0cbc6ce0ecda62fa8e56a4620b402a8a1061e648b87";
const RVN_KEY_SCRIPT: &str = "76a914b5c2e59a0ce4f5c8090fc3a5c835f2bea331e2a388ac";
const RVN_INPUT_TXID: &str = "760544b0faf975c4c0a2d908f5ff6109e9dd2b42dfe3f9704b265760937b32bc";
const RVN_OUTPUT_ADDRESS: &str = "RPVW6ifbuCr4BQqAAjZ4APaT3sqL61tU8a";

fn rvn_builder() -> TransactionBuilder {
    let mut config = TxBuilderConfig::for_tests();
    config.network = "ravencoin".to_string();

    let secp = Secp256k1::new();
    let key = parse_private_key(RVN_KEY, &RAVENCOIN).unwrap();
    let own_address = encode_p2pkh(&key.public_key(&secp), &RAVENCOIN);
    assert_eq!(
        resolve(&own_address, &RAVENCOIN).unwrap().to_hex_string(),
        RVN_KEY_SCRIPT
    );

    let mut builder = TransactionBuilder::from_config(&config).unwrap();
    builder
        .add_input(InputSpec::from_address(
            RVN_INPUT_TXID.parse::<Txid>().unwrap(),
            0,
            Amount::from_sat(60_000_000),
            own_address,
            RVN_KEY,
        ))
        .add_output(OutputSpec::to_address(
            RVN_OUTPUT_ADDRESS,
            Amount::from_sat(59_000_000),
        ));
    builder
}

#[test]
#[traced_test]
fn ravencoin_p2pkh_spend_is_signed() {
    let secp = Secp256k1::new();
    let builder = rvn_builder();
    let tx = builder.build().unwrap();

    let fee = builder.total_input_amount().unwrap() - builder.total_output_amount().unwrap();
    assert_eq!(fee, Amount::from_sat(1_000_000));
    assert_eq!(tx.input.len(), 1);
    assert_eq!(tx.output[0].value, Amount::from_sat(59_000_000));
    assert_eq!(
        tx.output[0].script_pubkey,
        resolve(RVN_OUTPUT_ADDRESS, &RAVENCOIN).unwrap()
    );

    let items: Vec<_> = tx.input[0]
        .script_sig
        .instructions()
        .map(|i| i.unwrap().push_bytes().unwrap().as_bytes().to_vec())
        .collect();
    let key = parse_private_key(RVN_KEY, &RAVENCOIN).unwrap();
    assert_eq!(items[1], key.public_key(&secp).to_bytes());

    let script_code = bitcoin::ScriptBuf::from_hex(RVN_KEY_SCRIPT).unwrap();
    let sighash = SighashCache::new(&tx)
        .legacy_signature_hash(0, &script_code, EcdsaSighashType::All.to_u32())
        .unwrap();
    let message = Message::from_digest(sighash.to_byte_array());
    let der = &items[0][..items[0].len() - 1];
    let signature = ecdsa::Signature::from_der(der).unwrap();
    secp.verify_ecdsa(&message, &signature, &key.public_key(&secp).inner)
        .unwrap();

    // a flipped byte inside the signature no longer verifies
    let mut tampered = der.to_vec();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;
    let tampered_ok = ecdsa::Signature::from_der(&tampered)
        .map(|sig| secp.verify_ecdsa(&message, &sig, &key.public_key(&secp).inner).is_ok())
        .unwrap_or(false);
    assert!(!tampered_ok);
}

#[test]
fn all_build_paths_agree_on_the_signed_bytes() {
    let builder = rvn_builder();
    let built = serialize_tx_hex(&builder.build().unwrap());

    assert_eq!(builder.single_build().unwrap(), built);

    let (spliced, txid) = sign_tx_legacy_compressed(&builder, RVN_KEY).unwrap();
    assert_eq!(spliced, built);
    assert_eq!(txid, calc_tx_id(&built).unwrap());
    assert_eq!(
        deserialize_tx_hex(&built).unwrap().compute_txid().to_string(),
        txid
    );
}

#[test]
fn external_signer_flow_round_trips() {
    let secp = Secp256k1::new();
    let builder = rvn_builder();
    let key = parse_private_key(RVN_KEY, &RAVENCOIN).unwrap();
    let public_key = key.public_key(&secp).to_string();

    let unsigned = builder
        .unsigned_tx(&BTreeMap::from([(0, public_key.clone())]))
        .unwrap();
    let forecast = tx_size(&unsigned.tx_hex).unwrap();

    let digest: [u8; 32] = hex::decode(&unsigned.sighashes[&0])
        .unwrap()
        .try_into()
        .unwrap();
    let signature = secp.sign_ecdsa_low_r(&Message::from_digest(digest), &key.inner);
    let der = hex::encode(signature.serialize_der());

    let signed = sign_tx(&unsigned.tx_hex, &[public_key.clone()], &[der.clone()]).unwrap();
    assert!(tx_size(&signed).unwrap() <= forecast);
    assert_eq!(
        forecast - tx_size(&signed).unwrap(),
        PLACEHOLDER_SIGNATURE_LEN - signature.serialize_der().len()
    );

    assert_matches!(
        sign_tx(&unsigned.tx_hex, &[public_key.clone()], &[der.clone(), der]),
        Err(TxBuilderError::SignatureCountMismatch {
            signatures: 2,
            inputs: 1
        })
    );
}

#[test]
fn raw_transactions_reserialize_identically() {
    let raw = rvn_builder().single_build().unwrap();
    let tx = deserialize_tx_hex(&raw).unwrap();

    assert_eq!(serialize_tx_hex(&tx), raw);
    assert_eq!(calc_tx_id(&raw).unwrap(), calc_tx_id(&raw).unwrap());
}
