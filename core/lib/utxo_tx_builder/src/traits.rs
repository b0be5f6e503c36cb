use std::collections::{BTreeMap, HashMap};

use bitcoin::{OutPoint, TxOut};

/// Source of the outputs a transaction spends, consulted while signing.
pub trait PrevOutLookup {
    fn fetch_prev_output(&self, outpoint: &OutPoint) -> Option<TxOut>;
}

impl PrevOutLookup for HashMap<OutPoint, TxOut> {
    fn fetch_prev_output(&self, outpoint: &OutPoint) -> Option<TxOut> {
        self.get(outpoint).cloned()
    }
}

impl PrevOutLookup for BTreeMap<OutPoint, TxOut> {
    fn fetch_prev_output(&self, outpoint: &OutPoint) -> Option<TxOut> {
        self.get(outpoint).cloned()
    }
}
