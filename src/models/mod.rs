//! Data models for db-pack.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{DatabaseType, DbConfig, TlsOptions, TlsVerify};
pub use query::{QueryParam, Row};
