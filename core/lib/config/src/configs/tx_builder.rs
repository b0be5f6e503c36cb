use serde::{Deserialize, Serialize};

/// Chain used when the configuration does not name one.
pub const DEFAULT_NETWORK: &str = "regtest";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TxBuilderConfig {
    /// Name of the chain whose parameter table is used (e.g. `bitcoin`, `testnet`, `litecoin`).
    #[serde(default = "default_network")]
    pub network: String,
    /// Version written into every built transaction.
    pub tx_version: Option<i32>,
    /// Change outputs below this value (in the smallest unit) are omitted.
    pub dust_floor: Option<u64>,
    /// Value of each reveal output of an inscription.
    pub reveal_out_value: Option<u64>,
    /// Smallest change output the commit transaction keeps.
    pub min_change_value: Option<u64>,
}

fn default_network() -> String {
    DEFAULT_NETWORK.to_string()
}

impl TxBuilderConfig {
    pub fn tx_version(&self) -> i32 {
        self.tx_version.unwrap_or(2)
    }

    pub fn dust_floor(&self) -> u64 {
        self.dust_floor.unwrap_or(546)
    }

    pub fn reveal_out_value(&self) -> u64 {
        self.reveal_out_value.filter(|value| *value > 0).unwrap_or(546)
    }

    pub fn min_change_value(&self) -> u64 {
        self.min_change_value.filter(|value| *value > 0).unwrap_or(546)
    }
}

impl TxBuilderConfig {
    // Creates a config object suitable for use in unit tests.
    pub fn for_tests() -> Self {
        Self {
            network: DEFAULT_NETWORK.to_string(),
            tx_version: Some(2),
            dust_floor: Some(546),
            reveal_out_value: Some(546),
            min_change_value: Some(546),
        }
    }
}
