use std::{fmt, str::FromStr};

use bitcoin::NetworkKind;
use serde::{Deserialize, Serialize};
use utxo_config::TxBuilderConfig;

use crate::types::{Result, TxBuilderError};

/// Ledgers the builder knows the parameter table of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chain {
    Bitcoin,
    BitcoinTestnet,
    BitcoinRegtest,
    Litecoin,
    Dogecoin,
    Ravencoin,
}

/// Fixed per-chain constants consumed by address resolution and key parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainParams {
    pub chain: Chain,
    pub pubkey_hash_prefix: u8,
    pub script_hash_prefix: u8,
    pub private_key_prefix: u8,
    pub bip32_private_version: [u8; 4],
    pub bip32_public_version: [u8; 4],
    pub bip44_coin_type: u32,
    /// Human readable part of segwit addresses, `None` where the chain has no segwit.
    pub bech32_hrp: Option<&'static str>,
}

pub const BITCOIN: ChainParams = ChainParams {
    chain: Chain::Bitcoin,
    pubkey_hash_prefix: 0x00,
    script_hash_prefix: 0x05,
    private_key_prefix: 0x80,
    bip32_private_version: [0x04, 0x88, 0xad, 0xe4],
    bip32_public_version: [0x04, 0x88, 0xb2, 0x1e],
    bip44_coin_type: 0,
    bech32_hrp: Some("bc"),
};

pub const BITCOIN_TESTNET: ChainParams = ChainParams {
    chain: Chain::BitcoinTestnet,
    pubkey_hash_prefix: 0x6f,
    script_hash_prefix: 0xc4,
    private_key_prefix: 0xef,
    bip32_private_version: [0x04, 0x35, 0x83, 0x94],
    bip32_public_version: [0x04, 0x35, 0x87, 0xcf],
    bip44_coin_type: 1,
    bech32_hrp: Some("tb"),
};

pub const BITCOIN_REGTEST: ChainParams = ChainParams {
    chain: Chain::BitcoinRegtest,
    bech32_hrp: Some("bcrt"),
    ..BITCOIN_TESTNET
};

pub const LITECOIN: ChainParams = ChainParams {
    chain: Chain::Litecoin,
    pubkey_hash_prefix: 0x30,
    script_hash_prefix: 0x32,
    private_key_prefix: 0xb0,
    bip32_private_version: [0x04, 0x88, 0xad, 0xe4],
    bip32_public_version: [0x04, 0x88, 0xb2, 0x1e],
    bip44_coin_type: 2,
    bech32_hrp: Some("ltc"),
};

pub const DOGECOIN: ChainParams = ChainParams {
    chain: Chain::Dogecoin,
    pubkey_hash_prefix: 0x1e,
    script_hash_prefix: 0x16,
    private_key_prefix: 0x9e,
    bip32_private_version: [0x02, 0xfa, 0xc3, 0x98],
    bip32_public_version: [0x02, 0xfa, 0xca, 0xfd],
    bip44_coin_type: 3,
    bech32_hrp: None,
};

pub const RAVENCOIN: ChainParams = ChainParams {
    chain: Chain::Ravencoin,
    pubkey_hash_prefix: 0x3c,
    script_hash_prefix: 0x7a,
    private_key_prefix: 0x80,
    bip32_private_version: [0x04, 0x88, 0xad, 0xe4],
    bip32_public_version: [0x04, 0x88, 0xb2, 0x1e],
    bip44_coin_type: 175,
    bech32_hrp: Some("rc"),
};

impl Chain {
    pub fn params(self) -> ChainParams {
        match self {
            Chain::Bitcoin => BITCOIN,
            Chain::BitcoinTestnet => BITCOIN_TESTNET,
            Chain::BitcoinRegtest => BITCOIN_REGTEST,
            Chain::Litecoin => LITECOIN,
            Chain::Dogecoin => DOGECOIN,
            Chain::Ravencoin => RAVENCOIN,
        }
    }

    pub fn is_mainnet(self) -> bool {
        !matches!(self, Chain::BitcoinTestnet | Chain::BitcoinRegtest)
    }
}

impl FromStr for Chain {
    type Err = TxBuilderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bitcoin" | "btc" | "mainnet" => Ok(Chain::Bitcoin),
            "testnet" | "btc_testnet" | "bitcoin_testnet" => Ok(Chain::BitcoinTestnet),
            "regtest" | "btc_regtest" | "bitcoin_regtest" => Ok(Chain::BitcoinRegtest),
            "litecoin" | "ltc" => Ok(Chain::Litecoin),
            "dogecoin" | "doge" => Ok(Chain::Dogecoin),
            "ravencoin" | "rvn" => Ok(Chain::Ravencoin),
            other => Err(TxBuilderError::UnknownNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Chain::Bitcoin => "bitcoin",
            Chain::BitcoinTestnet => "testnet",
            Chain::BitcoinRegtest => "regtest",
            Chain::Litecoin => "litecoin",
            Chain::Dogecoin => "dogecoin",
            Chain::Ravencoin => "ravencoin",
        };
        f.write_str(name)
    }
}

impl ChainParams {
    pub fn from_config(config: &TxBuilderConfig) -> Result<Self> {
        Ok(Chain::from_str(&config.network)?.params())
    }

    /// Network kind stamped on parsed private keys.
    pub fn network_kind(&self) -> NetworkKind {
        if self.chain.is_mainnet() {
            NetworkKind::Main
        } else {
            NetworkKind::Test
        }
    }

    pub fn supports_segwit(&self) -> bool {
        self.bech32_hrp.is_some()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn chain_names_resolve_to_their_tables() {
        assert_eq!(Chain::from_str("LTC").unwrap().params(), LITECOIN);
        assert_eq!(Chain::from_str("rvn").unwrap().params().bip44_coin_type, 175);
        assert_eq!(Chain::from_str("regtest").unwrap().params().bech32_hrp, Some("bcrt"));
        assert!(!Chain::from_str("doge").unwrap().params().supports_segwit());
        assert_matches!(
            Chain::from_str("solana"),
            Err(TxBuilderError::UnknownNetwork(name)) if name == "solana"
        );
    }

    #[test]
    fn regtest_shares_testnet_prefixes() {
        assert_eq!(BITCOIN_REGTEST.pubkey_hash_prefix, BITCOIN_TESTNET.pubkey_hash_prefix);
        assert_eq!(BITCOIN_REGTEST.private_key_prefix, 0xef);
        assert_eq!(BITCOIN_REGTEST.network_kind(), NetworkKind::Test);
        assert_eq!(RAVENCOIN.network_kind(), NetworkKind::Main);
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for chain in [
            Chain::Bitcoin,
            Chain::BitcoinTestnet,
            Chain::BitcoinRegtest,
            Chain::Litecoin,
            Chain::Dogecoin,
            Chain::Ravencoin,
        ] {
            assert_eq!(Chain::from_str(&chain.to_string()).unwrap(), chain);
        }
    }

    #[test]
    fn config_selects_chain() {
        let mut config = TxBuilderConfig::for_tests();
        assert_eq!(ChainParams::from_config(&config).unwrap(), BITCOIN_REGTEST);

        config.network = "litecoin".into();
        assert_eq!(ChainParams::from_config(&config).unwrap(), LITECOIN);
    }
}
