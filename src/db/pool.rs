//! Backend pool and connection handles.
//!
//! Uses database-specific pools (MySqlPool, PgPool, SqlitePool) rather than
//! `AnyPool`, so every backend keeps its full type support.

use crate::db::executor::{mysql, postgres, sqlite};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, DbConfig, QueryParam, Row, TlsVerify};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlSslMode};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{MySql, MySqlPool, PgPool, Postgres, Sqlite, SqlitePool};
use std::time::Duration;
use tracing::debug;

/// Database-specific connection pool.
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Build a pool for `config` without opening any connection.
    ///
    /// Connections are established on first acquire, so an unreachable server
    /// only surfaces once a unit of work runs.
    pub fn connect_lazy(config: &DbConfig) -> Self {
        let opts = &config.pool_options;
        let is_sqlite = config.db_type == DatabaseType::SQLite;
        let max_connections = opts.max_connections_or_default(is_sqlite);
        let min_connections = opts.min_connections_or_default();
        let acquire_timeout = opts.acquire_timeout_or_default();
        let idle_timeout = Some(opts.idle_timeout_or_default());
        let test_before_acquire = opts.test_before_acquire_or_default();

        debug!(
            db_type = %config.db_type,
            max_connections,
            min_connections,
            "Building lazy pool"
        );

        match config.db_type {
            DatabaseType::MySQL => {
                let options = mysql_connect_options(config);
                let pool = MySqlPoolOptions::new()
                    .max_connections(max_connections)
                    .min_connections(min_connections)
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .test_before_acquire(test_before_acquire)
                    .connect_lazy_with(options);
                DbPool::MySql(pool)
            }
            DatabaseType::PostgreSQL => {
                let options = pg_connect_options(config);
                let pool = PgPoolOptions::new()
                    .max_connections(max_connections)
                    .min_connections(min_connections)
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .test_before_acquire(test_before_acquire)
                    .connect_lazy_with(options);
                DbPool::Postgres(pool)
            }
            DatabaseType::SQLite => {
                let options = SqliteConnectOptions::new()
                    .filename(&config.database)
                    .create_if_missing(true);
                let pool = SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .min_connections(min_connections)
                    .acquire_timeout(acquire_timeout)
                    .idle_timeout(idle_timeout)
                    .test_before_acquire(test_before_acquire)
                    .connect_lazy_with(options);
                DbPool::SQLite(pool)
            }
        }
    }

    /// Borrow one connection from the pool. May wait up to the acquire timeout.
    pub async fn acquire(&self) -> DbResult<DbConnection> {
        let db_type = self.db_type();
        let acquire_timeout =
            impl_db_dispatch!(DbPool, self, pool => pool.options().get_acquire_timeout());
        let connection = match self {
            DbPool::MySql(pool) => pool.acquire().await.map(DbConnection::MySql),
            DbPool::Postgres(pool) => pool.acquire().await.map(DbConnection::Postgres),
            DbPool::SQLite(pool) => pool.acquire().await.map(DbConnection::SQLite),
        };
        connection.map_err(|e| acquire_error(db_type, acquire_timeout, e))
    }

    /// Close the pool, waiting for lent connections to come back.
    pub async fn close(&self) {
        impl_db_dispatch!(DbPool, self, pool => pool.close().await)
    }

    pub fn is_closed(&self) -> bool {
        impl_db_dispatch!(DbPool, self, pool => pool.is_closed())
    }

    /// Number of open connections, idle or lent.
    pub fn size(&self) -> u32 {
        impl_db_dispatch!(DbPool, self, pool => pool.size())
    }

    pub fn num_idle(&self) -> usize {
        impl_db_dispatch!(DbPool, self, pool => pool.num_idle())
    }

    /// Execute a statement on any pooled connection, returning rows affected.
    pub async fn execute(&self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        match self {
            DbPool::MySql(pool) => mysql::execute(pool, sql, params).await,
            DbPool::Postgres(pool) => postgres::execute(pool, sql, params).await,
            DbPool::SQLite(pool) => sqlite::execute(pool, sql, params).await,
        }
    }

    /// Run a query on any pooled connection, returning all rows.
    pub async fn fetch_all(&self, sql: &str, params: &[QueryParam]) -> DbResult<Vec<Row>> {
        match self {
            DbPool::MySql(pool) => mysql::fetch_all(pool, sql, params).await,
            DbPool::Postgres(pool) => postgres::fetch_all(pool, sql, params).await,
            DbPool::SQLite(pool) => sqlite::fetch_all(pool, sql, params).await,
        }
    }

    /// Get the database type for this pool.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::MySql(_) => DatabaseType::MySQL,
            DbPool::Postgres(_) => DatabaseType::PostgreSQL,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }
}

/// A single connection lent out of a [`DbPool`].
///
/// Dropping it returns the connection to its pool.
#[derive(Debug)]
pub enum DbConnection {
    MySql(PoolConnection<MySql>),
    Postgres(PoolConnection<Postgres>),
    SQLite(PoolConnection<Sqlite>),
}

impl DbConnection {
    /// Execute a statement, returning rows affected.
    pub async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        match self {
            DbConnection::MySql(conn) => mysql::execute(&mut **conn, sql, params).await,
            DbConnection::Postgres(conn) => postgres::execute(&mut **conn, sql, params).await,
            DbConnection::SQLite(conn) => sqlite::execute(&mut **conn, sql, params).await,
        }
    }

    /// Run a query, returning all rows in result order.
    pub async fn fetch_all(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<Vec<Row>> {
        match self {
            DbConnection::MySql(conn) => mysql::fetch_all(&mut **conn, sql, params).await,
            DbConnection::Postgres(conn) => postgres::fetch_all(&mut **conn, sql, params).await,
            DbConnection::SQLite(conn) => sqlite::fetch_all(&mut **conn, sql, params).await,
        }
    }

    /// Run a query expected to yield at most one row.
    pub async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Option<Row>> {
        Ok(self.fetch_all(sql, params).await?.into_iter().next())
    }

    /// Execute SQL over the simple query protocol, without parameters.
    pub async fn execute_raw(&mut self, sql: &str) -> DbResult<()> {
        match self {
            DbConnection::MySql(conn) => mysql::execute_raw(&mut **conn, sql).await,
            DbConnection::Postgres(conn) => postgres::execute_raw(&mut **conn, sql).await,
            DbConnection::SQLite(conn) => sqlite::execute_raw(&mut **conn, sql).await,
        }
    }

    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbConnection::MySql(_) => DatabaseType::MySQL,
            DbConnection::Postgres(_) => DatabaseType::PostgreSQL,
            DbConnection::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Detach from the pool so the connection is closed instead of reused.
    pub(crate) fn close_on_drop(&mut self) {
        impl_db_dispatch!(DbConnection, self, conn => conn.close_on_drop())
    }
}

fn mysql_connect_options(config: &DbConfig) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .database(&config.database)
        .charset("utf8mb4");
    if !config.password.is_empty() {
        options = options.password(&config.password);
    }
    if let Some(ssl) = config.ssl {
        options = options.ssl_mode(mysql_ssl_mode(ssl, config.tls.verify));
    }
    let tls = &config.tls;
    if let Some(path) = &tls.root_cert {
        options = options.ssl_ca(path);
    }
    if let Some(path) = &tls.client_cert {
        options = options.ssl_client_cert(path);
    }
    if let Some(path) = &tls.client_key {
        options = options.ssl_client_key(path);
    }
    options
}

fn pg_connect_options(config: &DbConfig) -> PgConnectOptions {
    let mut options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .database(&config.database);
    if !config.password.is_empty() {
        options = options.password(&config.password);
    }
    if let Some(ssl) = config.ssl {
        options = options.ssl_mode(pg_ssl_mode(ssl, config.tls.verify));
    }
    let tls = &config.tls;
    if let Some(path) = &tls.root_cert {
        options = options.ssl_root_cert(path);
    }
    if let Some(path) = &tls.client_cert {
        options = options.ssl_client_cert(path);
    }
    if let Some(path) = &tls.client_key {
        options = options.ssl_client_key(path);
    }
    options
}

fn mysql_ssl_mode(ssl: bool, verify: TlsVerify) -> MySqlSslMode {
    match (ssl, verify) {
        (false, _) => MySqlSslMode::Disabled,
        (true, TlsVerify::None) => MySqlSslMode::Required,
        (true, TlsVerify::Ca) => MySqlSslMode::VerifyCa,
        (true, TlsVerify::Full) => MySqlSslMode::VerifyIdentity,
    }
}

fn pg_ssl_mode(ssl: bool, verify: TlsVerify) -> PgSslMode {
    match (ssl, verify) {
        (false, _) => PgSslMode::Disable,
        (true, TlsVerify::None) => PgSslMode::Require,
        (true, TlsVerify::Ca) => PgSslMode::VerifyCa,
        (true, TlsVerify::Full) => PgSslMode::VerifyFull,
    }
}

fn acquire_error(db_type: DatabaseType, timeout: Duration, error: sqlx::Error) -> DbError {
    match error {
        sqlx::Error::PoolTimedOut => DbError::timeout("connection acquire", timeout.as_secs()),
        sqlx::Error::PoolClosed | sqlx::Error::Database(_) => DbError::from(error),
        other => {
            let suggestion = connection_suggestion(db_type, &other);
            DbError::connection(format!("Failed to connect: {}", other), suggestion)
        }
    }
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(db_type: DatabaseType, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return format!("Check that the {} server is running and accessible", db_type);
    }
    if error_str.contains("authentication") || error_str.contains("password") {
        return "Verify the user and password of the configuration".to_string();
    }
    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check the ssl flag of the configuration".to_string();
    }

    match db_type {
        DatabaseType::SQLite => "Verify the database file path is writable".to_string(),
        _ => format!(
            "Verify host and port point at a {} server",
            db_type.display_name()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolOptions;
    use tempfile::TempDir;

    fn sqlite_config(dir: &TempDir) -> DbConfig {
        DbConfig::sqlite(dir.path().join("pool.db").to_string_lossy().to_string())
    }

    #[tokio::test]
    async fn test_connect_lazy_postgres_does_not_connect() {
        // Nothing listens on this port; building the pool must still succeed.
        let config = DbConfig::postgres("127.0.0.1", 1, "nobody", "", "nothing");
        let pool = DbPool::connect_lazy(&config);
        assert_eq!(pool.db_type(), DatabaseType::PostgreSQL);
        assert_eq!(pool.size(), 0);
        pool.close().await;
        assert!(pool.is_closed());
    }

    #[test]
    fn test_ssl_mode_keeps_verification_level() {
        assert!(matches!(pg_ssl_mode(true, TlsVerify::Full), PgSslMode::VerifyFull));
        assert!(matches!(pg_ssl_mode(true, TlsVerify::Ca), PgSslMode::VerifyCa));
        assert!(matches!(pg_ssl_mode(true, TlsVerify::None), PgSslMode::Require));
        assert!(matches!(pg_ssl_mode(false, TlsVerify::None), PgSslMode::Disable));

        assert!(matches!(
            mysql_ssl_mode(true, TlsVerify::Full),
            MySqlSslMode::VerifyIdentity
        ));
        assert!(matches!(mysql_ssl_mode(true, TlsVerify::Ca), MySqlSslMode::VerifyCa));
        assert!(matches!(mysql_ssl_mode(true, TlsVerify::None), MySqlSslMode::Required));
    }

    #[test]
    fn test_pg_connect_options_from_verified_url() {
        let config = DbConfig::from_url(
            "postgres://u:p@db.example/app?sslmode=verify-full&sslrootcert=/etc/ca.pem",
        )
        .unwrap();
        let options = pg_connect_options(&config);
        assert!(matches!(options.get_ssl_mode(), PgSslMode::VerifyFull));
        assert_eq!(options.get_host(), "db.example");
    }

    #[tokio::test]
    async fn test_acquire_unreachable_fails_with_upstream_error() {
        let config = DbConfig::postgres("127.0.0.1", 1, "nobody", "", "nothing").with_pool_options(
            PoolOptions {
                acquire_timeout_secs: Some(1),
                ..Default::default()
            },
        );
        let pool = DbPool::connect_lazy(&config);
        let err = pool.acquire().await.unwrap_err();
        assert!(err.is_upstream(), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_sqlite_execute_and_fetch() {
        let dir = TempDir::new().unwrap();
        let pool = DbPool::connect_lazy(&sqlite_config(&dir));

        pool.execute("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)", &[])
            .await
            .unwrap();
        let affected = pool
            .execute(
                "INSERT INTO items (name) VALUES (?), (?)",
                &[QueryParam::from("a"), QueryParam::from("b")],
            )
            .await
            .unwrap();
        assert_eq!(affected, 2);

        let rows = pool
            .fetch_all("SELECT id, name FROM items ORDER BY id", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "a");
        assert_eq!(rows[1]["id"], 2);

        pool.close().await;
    }

    #[tokio::test]
    async fn test_connection_execute_raw_and_close_on_drop() {
        let dir = TempDir::new().unwrap();
        let pool = DbPool::connect_lazy(&sqlite_config(&dir));

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(conn.db_type(), DatabaseType::SQLite);
        conn.execute_raw("CREATE TABLE t (v INTEGER)").await.unwrap();
        conn.execute("INSERT INTO t (v) VALUES (?)", &[QueryParam::Int(7)])
            .await
            .unwrap();
        let row = conn
            .fetch_optional("SELECT v FROM t", &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["v"], 7);

        conn.close_on_drop();
        drop(conn);

        // The pool opens a fresh connection and the data is still there.
        let rows = pool.fetch_all("SELECT v FROM t", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        pool.close().await;
    }
}
