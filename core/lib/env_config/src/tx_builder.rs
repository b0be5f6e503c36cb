use utxo_config::TxBuilderConfig;

use crate::{envy_load, FromEnv};

impl FromEnv for TxBuilderConfig {
    fn from_env() -> anyhow::Result<Self> {
        envy_load("utxo_tx_builder", "UTXO_TX_BUILDER_")
    }
}
