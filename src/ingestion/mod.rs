//! Data ingestion module - functional pipeline for multi-format tabular data

pub mod fetch;
pub mod load;
pub mod parse;
pub mod publish;
pub mod reconcile;
pub mod transform;
pub mod types;

pub use types::*;
