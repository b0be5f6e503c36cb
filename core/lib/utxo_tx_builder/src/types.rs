use std::collections::BTreeMap;

use bitcoin::{Amount, OutPoint, Txid};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TX_VERSION: i32 = 2;
/// Non-final sequence that keeps replace-by-fee possible.
pub const DEFAULT_SEQUENCE: u32 = 0xffff_fffd;
pub const DEFAULT_DUST_FLOOR: Amount = Amount::from_sat(546);
pub const DEFAULT_REVEAL_OUT_VALUE: Amount = Amount::from_sat(546);
pub const DEFAULT_MIN_CHANGE_VALUE: Amount = Amount::from_sat(546);

pub const WITNESS_SCALE_FACTOR: usize = 4;
pub const MAX_STANDARD_TX_WEIGHT: u64 = 4_000_000 / 10;

/// Where a locking script comes from: a human readable address or raw script hex.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptSource {
    Address(String),
    Script(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    pub txid: Txid,
    pub vout: u32,
    /// Must equal the value locked in the referenced output. It is trusted as given.
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub amount: Amount,
    pub source: ScriptSource,
    /// Hex scalar or WIF string.
    #[serde(default)]
    pub private_key: Option<String>,
}

impl InputSpec {
    pub fn from_address(
        txid: Txid,
        vout: u32,
        amount: Amount,
        address: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        Self {
            txid,
            vout,
            amount,
            source: ScriptSource::Address(address.into()),
            private_key: Some(private_key.into()),
        }
    }

    pub fn from_script(
        txid: Txid,
        vout: u32,
        amount: Amount,
        script_hex: impl Into<String>,
        private_key: Option<String>,
    ) -> Self {
        Self {
            txid,
            vout,
            amount,
            source: ScriptSource::Script(script_hex.into()),
            private_key,
        }
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub destination: ScriptSource,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub amount: Amount,
    /// Change outputs under the builder's dust floor are left out of the transaction.
    #[serde(default)]
    pub is_change: bool,
}

impl OutputSpec {
    pub fn to_address(address: impl Into<String>, amount: Amount) -> Self {
        Self {
            destination: ScriptSource::Address(address.into()),
            amount,
            is_change: false,
        }
    }

    pub fn to_script(script_hex: impl Into<String>, amount: Amount) -> Self {
        Self {
            destination: ScriptSource::Script(script_hex.into()),
            amount,
            is_change: false,
        }
    }

    pub fn change(address: impl Into<String>, amount: Amount) -> Self {
        Self {
            destination: ScriptSource::Address(address.into()),
            amount,
            is_change: true,
        }
    }
}

/// Transaction with placeholder signature scripts plus the digest each input has to sign.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnsignedTx {
    pub tx_hex: String,
    pub sighashes: BTreeMap<usize, String>,
}

#[derive(Debug, Error)]
pub enum TxBuilderError {
    #[error("Invalid address {address}: {reason}")]
    Address { address: String, reason: String },

    #[error("Script decode error: {0}")]
    ScriptDecode(String),

    #[error("Output {outpoint} referenced by input {input_index} is missing from the view")]
    MissingPrevOut {
        outpoint: OutPoint,
        input_index: usize,
    },

    #[error("Output {outpoint} referenced by input {input_index} is unknown to the lookup")]
    UnknownPrevOut {
        outpoint: OutPoint,
        input_index: usize,
    },

    #[error("Got {keys} keys for {inputs} inputs")]
    KeyCountMismatch { keys: usize, inputs: usize },

    #[error("Got {signatures} signatures for {inputs} inputs")]
    SignatureCountMismatch { signatures: usize, inputs: usize },

    #[error("Transaction needs at least one input and one output")]
    EmptyInputsOrOutputs,

    #[error("Insufficient balance: available {available}, required {required} (fee {required_fee})")]
    InsufficientBalance {
        available: Amount,
        required: Amount,
        required_fee: Amount,
    },

    #[error("Reveal transaction {index} weight {weight} is greater than {max} (MAX_STANDARD_TX_WEIGHT)")]
    StandardnessViolation { index: usize, weight: u64, max: u64 },

    #[error("Signing error: {0}")]
    SigningError(String),

    #[error("Unsupported script type for input {input_index}: {script}")]
    UnsupportedScriptType { input_index: usize, script: String },

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Invalid inscription: {0}")]
    InvalidInscription(String),

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    #[error("Amount overflow")]
    AmountOverflow,
}

pub type Result<T> = std::result::Result<T, TxBuilderError>;

impl From<bitcoin::consensus::encode::Error> for TxBuilderError {
    fn from(error: bitcoin::consensus::encode::Error) -> Self {
        TxBuilderError::InvalidTransaction(error.to_string())
    }
}

impl From<hex::FromHexError> for TxBuilderError {
    fn from(error: hex::FromHexError) -> Self {
        TxBuilderError::InvalidTransaction(error.to_string())
    }
}

impl From<secp256k1::Error> for TxBuilderError {
    fn from(error: secp256k1::Error) -> Self {
        TxBuilderError::SigningError(error.to_string())
    }
}
