//! nutrimatch-core
//!
//! Shared types, traits, errors, configuration and dataset ingestion for the
//! food-name matching engine.

pub mod config;
pub mod dataset;
pub mod error;
pub mod tokenize;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use tokenize::tokenize;
