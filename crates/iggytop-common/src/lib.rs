//! iggytop-common — Shared types, errors, and the HTTP client used across all iggytop crates.

pub mod error;
pub mod keys;
pub mod table;
pub mod sandbox;

// Re-export commonly used types
pub use error::{IggytopError, Result};
pub use keys::ChainType;
pub use table::Table;
