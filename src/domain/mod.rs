//! Shared domain types and policy configuration.

pub mod types;

pub use types::*;
