//! Database layer.
//!
//! - Backend pool and connection handles over `sqlx`
//! - Statement execution and row decoding
//! - The pool registry and unit-of-work helpers built on top of them

pub mod executor;
#[macro_use]
pub mod macros;
pub mod params;
pub mod pool;
pub mod registry;
pub mod types;
pub mod unit_of_work;

pub use params::Params;
pub use pool::{DbConnection, DbPool};
pub use registry::PoolRegistry;
pub use unit_of_work::{ClientLease, TransactionOutcome};
