//! db-pack library
//!
//! A connection pool registry and transaction helpers for SQL databases
//! (PostgreSQL, MySQL, SQLite). Pools are deduplicated by configuration,
//! resolved explicitly or through a default, and lend connections to
//! units of work that commit or roll back as a whole.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{Config, ConfigError, PoolOptions};
pub use db::{DbConnection, DbPool, Params, PoolRegistry, TransactionOutcome};
pub use error::{DbError, DbResult};
pub use models::{DatabaseType, DbConfig, QueryParam, Row, TlsOptions, TlsVerify};
