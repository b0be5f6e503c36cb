pub use self::tx_builder::TxBuilderConfig;

pub mod tx_builder;
