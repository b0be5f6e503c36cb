pub mod traits;
pub mod types;

pub mod address;
pub mod builder;
pub mod inscriber;
pub mod metrics;
pub mod network;
pub mod signer;
pub mod utils;
pub mod weight;

pub use builder::TransactionBuilder;
pub use inscriber::{inscribe, InscriptionBuilder};
pub use network::{Chain, ChainParams};
pub use types::{InputSpec, OutputSpec, Result, ScriptSource, TxBuilderError, UnsignedTx};
