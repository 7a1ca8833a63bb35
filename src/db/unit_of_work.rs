//! Units of work over a lent connection.
//!
//! [`PoolRegistry::with_client`] lends one pooled connection to a caller's
//! async function and returns it afterwards. [`PoolRegistry::with_transaction`]
//! does the same inside `BEGIN` / `COMMIT` / `ROLLBACK` and reports the result
//! as a [`TransactionOutcome`].
//!
//! The connection is held by a [`ClientLease`], so it goes back to the pool on
//! every exit path, including panics and cancelled futures. A lease dropped
//! while its transaction is still open closes the connection instead of
//! returning it.
//!
//! ```ignore
//! let outcome = registry
//!     .with_transaction(Some(&config), |conn| {
//!         Box::pin(async move {
//!             conn.execute("INSERT INTO box (name) VALUES ($1)", &["a".into()]).await?;
//!             conn.execute("INSERT INTO box (name) VALUES ($1)", &["b".into()]).await?;
//!             Ok::<_, DbError>(())
//!         })
//!     })
//!     .await?;
//! ```
//!
//! Statement failures must be propagated with `?`. A failure the function
//! swallows does not roll the transaction back.

use crate::db::pool::{DbConnection, DbPool};
use crate::db::registry::PoolRegistry;
use crate::error::{DbError, DbResult};
use crate::models::DbConfig;
use futures_util::future::BoxFuture;
use tracing::{debug, warn};

/// Result of a transactional unit of work.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome<T, E> {
    /// The function succeeded and the transaction was committed.
    Success(T),
    /// The function, `BEGIN` or `COMMIT` failed; the transaction did not commit.
    Failure(E),
}

impl<T, E> TransactionOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Success(_) => None,
            Self::Failure(error) => Some(error),
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(error) => Err(error),
        }
    }
}

impl<T, E> From<TransactionOutcome<T, E>> for Result<T, E> {
    fn from(outcome: TransactionOutcome<T, E>) -> Self {
        outcome.into_result()
    }
}

/// A connection lent out for one unit of work.
///
/// Returned to its pool when dropped. If a transaction is still open at that
/// point, or a rollback failed, the connection is closed instead.
#[derive(Debug)]
pub struct ClientLease {
    connection: DbConnection,
    pool_key: String,
    id: String,
    transaction_open: bool,
    discard: bool,
}

impl ClientLease {
    async fn acquire(pool_key: String, pool: &DbPool) -> DbResult<Self> {
        let connection = pool.acquire().await?;
        let id = generate_lease_id();
        debug!(lease_id = %id, pool_key = %pool_key, "Connection lent");
        Ok(Self {
            connection,
            pool_key,
            id,
            transaction_open: false,
            discard: false,
        })
    }

    pub fn connection(&mut self) -> &mut DbConnection {
        &mut self.connection
    }

    async fn begin(&mut self) -> DbResult<()> {
        self.connection.execute_raw("BEGIN").await?;
        self.transaction_open = true;
        debug!(lease_id = %self.id, "Transaction started");
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        match self.connection.execute_raw("COMMIT").await {
            Ok(()) => {
                self.transaction_open = false;
                debug!(lease_id = %self.id, "Transaction committed");
                Ok(())
            }
            Err(e) => {
                // Server-side state is unknown after a failed COMMIT
                warn!(lease_id = %self.id, error = %e, "Commit failed");
                self.transaction_open = false;
                self.discard = true;
                Err(e)
            }
        }
    }

    async fn rollback(&mut self) {
        match self.connection.execute_raw("ROLLBACK").await {
            Ok(()) => debug!(lease_id = %self.id, "Transaction rolled back"),
            Err(e) => {
                warn!(
                    lease_id = %self.id,
                    pool_key = %self.pool_key,
                    error = %e,
                    "Rollback failed, closing connection"
                );
                self.discard = true;
            }
        }
        self.transaction_open = false;
    }

    /// Give the connection back to the pool.
    fn release(self) {
        debug!(lease_id = %self.id, "Connection released");
    }
}

impl Drop for ClientLease {
    fn drop(&mut self) {
        if self.transaction_open {
            warn!(
                lease_id = %self.id,
                pool_key = %self.pool_key,
                "Lease dropped with an open transaction, closing connection"
            );
            self.discard = true;
        }
        if self.discard {
            self.connection.close_on_drop();
        }
    }
}

fn generate_lease_id() -> String {
    format!("uow_{}", uuid::Uuid::new_v4().simple())
}

impl PoolRegistry {
    /// Borrow a connection from the pool resolved for `config`.
    ///
    /// Prefer [`with_client`](Self::with_client); a lease held across many
    /// await points keeps a pool slot busy.
    pub async fn lend(&self, config: Option<&DbConfig>) -> DbResult<ClientLease> {
        let (pool_key, pool) = self.resolve(config).await?;
        ClientLease::acquire(pool_key, &pool).await
    }

    /// Run `f` with one connection lent from the pool resolved for `config`.
    ///
    /// The connection is returned whatever `f` does. Resolution and acquire
    /// errors are converted into `E`; `f`'s own error is passed through.
    pub async fn with_client<F, T, E>(&self, config: Option<&DbConfig>, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut DbConnection) -> BoxFuture<'c, Result<T, E>>,
        E: From<DbError>,
    {
        let mut lease = self.lend(config).await?;
        let result = f(&mut lease.connection).await;
        lease.release();
        result
    }

    /// Run `f` inside a transaction on one lent connection.
    ///
    /// Commits when `f` succeeds and rolls back when it fails. Only a failure to
    /// resolve `config` to a registered pool is returned as `Err`; acquire,
    /// `BEGIN` and `COMMIT` failures are reported as
    /// [`TransactionOutcome::Failure`] like the function's own error.
    ///
    /// Nested calls lend a second, independent connection.
    pub async fn with_transaction<F, T, E>(
        &self,
        config: Option<&DbConfig>,
        f: F,
    ) -> DbResult<TransactionOutcome<T, E>>
    where
        F: for<'c> FnOnce(&'c mut DbConnection) -> BoxFuture<'c, Result<T, E>>,
        E: From<DbError>,
    {
        let (pool_key, pool) = self.resolve(config).await?;

        let mut lease = match ClientLease::acquire(pool_key, &pool).await {
            Ok(lease) => lease,
            Err(e) => return Ok(TransactionOutcome::Failure(E::from(e))),
        };

        if let Err(e) = lease.begin().await {
            lease.release();
            return Ok(TransactionOutcome::Failure(E::from(e)));
        }

        let outcome = match f(&mut lease.connection).await {
            Ok(value) => match lease.commit().await {
                Ok(()) => TransactionOutcome::Success(value),
                Err(e) => TransactionOutcome::Failure(E::from(e)),
            },
            Err(error) => {
                lease.rollback().await;
                TransactionOutcome::Failure(error)
            }
        };

        lease.release();
        Ok(outcome)
    }
}
