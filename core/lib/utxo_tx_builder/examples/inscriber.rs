use anyhow::{Context, Result};
use bitcoin::{hashes::Hash, Amount, ScriptBuf, Txid};
use secp256k1::Secp256k1;
use utxo_config::TxBuilderConfig;
use utxo_env_config::FromEnv;
use utxo_tx_builder::{
    address::{encode_witness_address, parse_private_key},
    inscriber::{InscriptionData, InscriptionRequest, PrevOutput},
    network::ChainParams,
    InscriptionBuilder,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    // export UTXO_TX_BUILDER_NETWORK=regtest
    // export INSCRIBER_PRV=<64 hex chars or WIF>
    let config = TxBuilderConfig::from_env().unwrap_or_else(|_| TxBuilderConfig::for_tests());
    let params = ChainParams::from_config(&config)?;

    let secp = Secp256k1::new();
    let private_key =
        std::env::var("INSCRIBER_PRV").unwrap_or_else(|_| hex::encode([0x21; 32]));
    let secret = parse_private_key(&private_key, &params).context("Invalid INSCRIBER_PRV")?;
    let (internal_key, _) = secret.inner.x_only_public_key(&secp);
    let address =
        encode_witness_address(&ScriptBuf::new_p2tr(&secp, internal_key, None), &params)?;

    let request = InscriptionRequest {
        commit_prev_outputs: vec![PrevOutput {
            txid: Txid::from_byte_array([0x5a; 32]),
            vout: 0,
            amount: Amount::from_sat(100_000),
            address: address.clone(),
            private_key,
        }],
        commit_fee_rate: 2,
        reveal_fee_rate: 2,
        inscriptions: vec![InscriptionData {
            content_type: "text/plain;charset=utf-8".to_string(),
            body: b"hello from the commit/reveal builder".to_vec(),
            reveal_address: address.clone(),
        }],
        reveal_out_value: None,
        change_address: address,
        min_change_value: None,
    };

    let finalized = InscriptionBuilder::from_config(&request, &config)?
        .build_empty_reveals()?
        .fund_commit()?
        .sign_commit()?
        .finalize_reveals()
        .context("Failed to finalize reveals")?;

    let (commit_fee, reveal_fees) = finalized.calculate_fees()?;
    println!("commit address(es): {:?}", finalized.commit_addresses());
    println!("commit tx ({commit_fee}): {}", finalized.commit_tx_hex());
    for (reveal, fee) in finalized.reveal_tx_hexes().iter().zip(reveal_fees) {
        println!("reveal tx ({fee}): {reveal}");
    }

    Ok(())
}
