//! Database dispatch macros for reducing code duplication.
//!
//! The pool and connection handles are enums with one variant per backend. Most
//! operations on them are the same generic `sqlx` call for every variant, which
//! this macro expands into a full match.

/// Apply the same expression to every backend variant of a handle enum.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(DbPool, self, pool => pool.close().await)
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($enum:ident, $value:expr, $inner:ident => $body:expr) => {
        match $value {
            $enum::MySql($inner) => $body,
            $enum::Postgres($inner) => $body,
            $enum::SQLite($inner) => $body,
        }
    };
}

pub use impl_db_dispatch;
