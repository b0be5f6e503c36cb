use bitcoin::{Amount, OutPoint, Txid};
use serde::{Deserialize, Serialize};

/// Protocol tag pushed at the start of every envelope.
pub const INSCRIPTION_PROTOCOL: &str = "ord";
/// Largest single data push allowed in a script.
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;
/// Envelope field tag announcing the content type.
pub(crate) const CONTENT_TYPE_TAG: u8 = 0x01;

/// Output spent by the commit transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrevOutput {
    pub txid: Txid,
    pub vout: u32,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub amount: Amount,
    pub address: String,
    /// Hex scalar or WIF string.
    pub private_key: String,
}

impl PrevOutput {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InscriptionData {
    pub content_type: String,
    #[serde(with = "hex::serde")]
    pub body: Vec<u8>,
    pub reveal_address: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InscriptionRequest {
    pub commit_prev_outputs: Vec<PrevOutput>,
    /// Satoshis per virtual byte.
    pub commit_fee_rate: u64,
    /// Satoshis per virtual byte.
    pub reveal_fee_rate: u64,
    pub inscriptions: Vec<InscriptionData>,
    #[serde(default, with = "bitcoin::amount::serde::as_sat::opt")]
    pub reveal_out_value: Option<Amount>,
    pub change_address: String,
    #[serde(default, with = "bitcoin::amount::serde::as_sat::opt")]
    pub min_change_value: Option<Amount>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InscribeTxs {
    pub commit_tx: String,
    pub reveal_txs: Vec<String>,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub commit_tx_fee: Amount,
    pub reveal_tx_fees: Vec<u64>,
    pub commit_addresses: Vec<String>,
}
