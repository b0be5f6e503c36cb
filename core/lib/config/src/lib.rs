#![allow(clippy::derive_partial_eq_without_eq)]

pub use crate::configs::TxBuilderConfig;

pub mod configs;
