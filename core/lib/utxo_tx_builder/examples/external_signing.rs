use std::collections::BTreeMap;

use anyhow::{Context, Result};
use bitcoin::{Amount, Txid};
use secp256k1::{Message, Secp256k1, SecretKey};
use utxo_tx_builder::{
    address::encode_p2pkh,
    builder::{calc_tx_id, sign_tx, tx_size},
    network::RAVENCOIN,
    InputSpec, OutputSpec, TransactionBuilder,
};

const INPUT_TXID: &str = "760544b0faf975c4c0a2d908f5ff6109e9dd2b42dfe3f9704b265760937b32bc";
const OUTPUT_ADDRESS: &str = "RPVW6ifbuCr4BQqAAjZ4APaT3sqL61tU8a";

/// Plays both sides of a hardware-wallet flow: the builder forecasts the transaction and the
/// digests, the "device" signs them, and the signatures are spliced back in.
fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let secp = Secp256k1::new();
    let device_key = SecretKey::from_slice(&[0x42; 32])?;
    let public_key = bitcoin::PublicKey::new(device_key.public_key(&secp));

    let mut builder = TransactionBuilder::new(2, RAVENCOIN);
    builder
        .add_input(InputSpec::from_address(
            INPUT_TXID.parse::<Txid>()?,
            0,
            Amount::from_sat(60_000_000),
            encode_p2pkh(&public_key, &RAVENCOIN),
            hex::encode(device_key.secret_bytes()),
        ))
        .add_output(OutputSpec::to_address(
            OUTPUT_ADDRESS,
            Amount::from_sat(59_000_000),
        ));

    let unsigned = builder.unsigned_tx(&BTreeMap::from([(0, public_key.to_string())]))?;
    println!("forecast size: {} bytes", tx_size(&unsigned.tx_hex)?);

    let signatures = unsigned
        .sighashes
        .values()
        .map(|digest| {
            let digest: [u8; 32] = hex::decode(digest)?
                .try_into()
                .map_err(|_| anyhow::anyhow!("digest is not 32 bytes"))?;
            let signature = secp.sign_ecdsa_low_r(&Message::from_digest(digest), &device_key);
            Ok(hex::encode(signature.serialize_der()))
        })
        .collect::<Result<Vec<_>>>()?;

    let signed = sign_tx(&unsigned.tx_hex, &[public_key.to_string()], &signatures)
        .context("Failed to splice signatures")?;
    println!("signed size: {} bytes", tx_size(&signed)?);
    println!("txid: {}", calc_tx_id(&signed)?);
    println!("raw: {signed}");

    Ok(())
}
