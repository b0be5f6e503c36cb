use bitcoin::{
    consensus::{deserialize, serialize},
    Transaction,
};

use crate::types::Result;

pub fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

pub(crate) fn decode_hex(value: &str) -> std::result::Result<Vec<u8>, hex::FromHexError> {
    hex::decode(strip_hex_prefix(value))
}

pub fn serialize_tx_hex(tx: &Transaction) -> String {
    hex::encode(serialize(tx))
}

pub fn deserialize_tx_hex(raw: &str) -> Result<Transaction> {
    Ok(deserialize(&decode_hex(raw)?)?)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::types::TxBuilderError;

    #[test]
    fn prefix_is_optional() {
        assert_eq!(strip_hex_prefix("0xabcd"), "abcd");
        assert_eq!(strip_hex_prefix("0Xabcd"), "abcd");
        assert_eq!(strip_hex_prefix("abcd"), "abcd");
        assert_eq!(decode_hex("0x0102").unwrap(), vec![1, 2]);
    }

    #[test]
    fn garbage_is_not_a_transaction() {
        assert_matches!(
            deserialize_tx_hex("zz"),
            Err(TxBuilderError::InvalidTransaction(_))
        );
        assert_matches!(
            deserialize_tx_hex("0200"),
            Err(TxBuilderError::InvalidTransaction(_))
        );
    }
}
