use vise::{Counter, EncodeLabelSet, EncodeLabelValue, Family, Metrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue, EncodeLabelSet)]
#[metrics(label = "path", rename_all = "snake_case")]
pub enum BuildPath {
    Signed,
    Single,
    Unsigned,
    Spliced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue, EncodeLabelSet)]
#[metrics(label = "script_kind", rename_all = "snake_case")]
pub enum ScriptKind {
    P2pkh,
    P2wpkh,
    P2shP2wpkh,
    TaprootKeyPath,
    TaprootScriptPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue, EncodeLabelSet)]
#[metrics(label = "error_type", rename_all = "snake_case")]
pub enum InscriptionErrorType {
    InsufficientBalance,
    Standardness,
    Other,
}

#[derive(Debug, Metrics)]
#[metrics(prefix = "utxo_tx_builder")]
pub struct UtxoTxBuilderMetrics {
    /// Number of transactions built, labeled by build path.
    pub transactions_built: Family<BuildPath, Counter>,

    /// Number of inputs signed, labeled by the spent script kind.
    pub inputs_signed: Family<ScriptKind, Counter>,

    /// Number of commit/reveal sets built.
    pub inscriptions_built: Counter,

    /// Number of failed commit/reveal builds, labeled by error type.
    pub inscription_errors: Family<InscriptionErrorType, Counter>,
}

#[vise::register]
pub static METRICS: vise::Global<UtxoTxBuilderMetrics> = vise::Global::new();
