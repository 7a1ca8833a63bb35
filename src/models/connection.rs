//! Connection-related data models.
//!
//! This module defines the database configuration value and the canonical key
//! used to identify its pool.

use crate::config::PoolOptions;
use serde::{Deserialize, Serialize};

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::MySQL => Some(3306),
            Self::SQLite => None,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Server certificate verification requested for a TLS connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TlsVerify {
    /// Encrypt only; the certificate is not checked.
    #[default]
    None,
    /// Check the certificate chain against the root certificate.
    Ca,
    /// Check the chain and that the certificate matches the host name.
    Full,
}

impl TlsVerify {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Ca => "verify-ca",
            Self::Full => "verify-full",
        }
    }
}

/// Certificate settings used when transport security is on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsOptions {
    #[serde(default)]
    pub verify: TlsVerify,
    /// CA certificate file used to verify the server.
    pub root_cert: Option<String>,
    /// Client certificate file.
    pub client_cert: Option<String>,
    /// Client private key file.
    pub client_key: Option<String>,
}

impl TlsOptions {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// How to reach one database.
///
/// Two configurations are equivalent when their [`canonical_key`](Self::canonical_key)
/// matches; the registry pools by that key, never by value identity. The password,
/// the backend and the pool options do not take part in the key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    pub db_type: DatabaseType,
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Contains sensitive data - never log
    #[serde(skip_serializing, default)]
    pub password: String,
    /// Database name, or the file path for SQLite.
    pub database: String,
    /// Transport security. `None` leaves the driver default in place.
    #[serde(default)]
    pub ssl: Option<bool>,
    /// Certificate verification and files, applied when `ssl` is on.
    #[serde(default, skip_serializing_if = "TlsOptions::is_default")]
    pub tls: TlsOptions,
    #[serde(default)]
    pub pool_options: PoolOptions,
}

impl DbConfig {
    /// Create a PostgreSQL configuration.
    pub fn postgres(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self::server(DatabaseType::PostgreSQL, host, port, user, password, database)
    }

    /// Create a MySQL configuration.
    pub fn mysql(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self::server(DatabaseType::MySQL, host, port, user, password, database)
    }

    /// Create a SQLite configuration for a database file.
    ///
    /// Host, port and user are left empty; the file path is the database name.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            db_type: DatabaseType::SQLite,
            host: String::new(),
            port: 0,
            user: String::new(),
            password: String::new(),
            database: path.into(),
            ssl: None,
            tls: TlsOptions::default(),
            pool_options: PoolOptions::default(),
        }
    }

    fn server(
        db_type: DatabaseType,
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            db_type,
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            database: database.into(),
            ssl: None,
            tls: TlsOptions::default(),
            pool_options: PoolOptions::default(),
        }
    }

    /// Set the transport security flag.
    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = Some(ssl);
        self
    }

    /// Turn transport security on with the given certificate settings.
    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.ssl = Some(true);
        self.tls = tls;
        self
    }

    /// Set the pool sizing options.
    pub fn with_pool_options(mut self, pool_options: PoolOptions) -> Self {
        self.pool_options = pool_options;
        self
    }

    /// Identity of this configuration for pooling:
    /// `user:host:port:database[:ssl-<flag>[:<verify>]]`.
    ///
    /// The verification level is appended only when TLS is on and a certificate
    /// check was requested, so a verified configuration never reuses an
    /// unverified pool.
    pub fn canonical_key(&self) -> String {
        let mut key = format!(
            "{}:{}:{}:{}",
            self.user, self.host, self.port, self.database
        );
        if let Some(ssl) = self.ssl {
            key.push_str(&format!(":ssl-{}", ssl));
            if ssl && self.tls.verify != TlsVerify::None {
                key.push(':');
                key.push_str(self.tls.verify.as_str());
            }
        }
        key
    }

    /// Build the error reported when this configuration has no registered pool.
    pub(crate) fn not_found(&self) -> crate::error::DbError {
        crate::error::DbError::not_found(&self.user, &self.host, self.port, &self.database)
    }
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("db_type", &self.db_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"****")
            .field("database", &self.database)
            .field("ssl", &self.ssl)
            .field("tls", &self.tls)
            .field("pool_options", &self.pool_options)
            .finish()
    }
}

impl std::fmt::Display for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}
