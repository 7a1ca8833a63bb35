//! Parameter binding and SQL fragment utilities.
//!
//! The `bind_*_param` functions bind `QueryParam` values to database-specific
//! query objects. [`Params`] turns an ordered set of column/value pairs into the
//! column list, placeholder list and value list of a parameterized statement.

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryParam};
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, Postgres, Sqlite};

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Ordered column/value pairs for building INSERT and UPDATE statements.
///
/// The helper only formats fragments; it neither quotes identifiers nor
/// validates the resulting SQL.
///
/// ```ignore
/// let params = Params::new(DatabaseType::PostgreSQL)
///     .with("username", "jeswin")
///     .with("email", "jeswin@example.com");
/// let sql = format!(
///     "INSERT INTO account ({}) VALUES ({})",
///     params.columns(),
///     params.placeholders()
/// );
/// conn.execute(&sql, params.values()).await?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    dialect: DatabaseType,
    columns: Vec<String>,
    values: Vec<QueryParam>,
}

impl Params {
    /// Create an empty set of parameters for the given placeholder dialect.
    pub fn new(dialect: DatabaseType) -> Self {
        Self {
            dialect,
            columns: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Build from ordered pairs.
    pub fn from_pairs<I, K, V>(dialect: DatabaseType, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<QueryParam>,
    {
        pairs
            .into_iter()
            .fold(Self::new(dialect), |params, (k, v)| params.with(k, v))
    }

    /// Append a column and its value.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        self.columns.push(column.into());
        self.values.push(value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Comma-joined column names, e.g. `username, email`.
    pub fn columns(&self) -> String {
        self.columns.join(", ")
    }

    /// Comma-joined placeholders numbered from 1, e.g. `$1, $2` or `?, ?`.
    pub fn placeholders(&self) -> String {
        self.placeholders_from(1)
    }

    /// Comma-joined placeholders numbered from `start`.
    ///
    /// The numbering only shows up in the PostgreSQL dialect.
    pub fn placeholders_from(&self, start: usize) -> String {
        (0..self.columns.len())
            .map(|i| self.placeholder(start + i))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `column = placeholder` assignments for an UPDATE, numbered from `start`.
    pub fn assignments_from(&self, start: usize) -> String {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = {}", column, self.placeholder(start + i)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Values in placeholder order.
    pub fn values(&self) -> &[QueryParam] {
        &self.values
    }

    pub fn into_values(self) -> Vec<QueryParam> {
        self.values
    }

    /// Build `INSERT INTO <table> (<columns>) VALUES (<placeholders>)`.
    pub fn insert_sql(&self, table: &str) -> DbResult<String> {
        if self.is_empty() {
            return Err(DbError::invalid_input(format!(
                "No columns given for INSERT into '{}'",
                table
            )));
        }
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            self.columns(),
            self.placeholders()
        ))
    }

    fn placeholder(&self, index: usize) -> String {
        match self.dialect {
            DatabaseType::PostgreSQL => format!("${}", index),
            DatabaseType::MySQL | DatabaseType::SQLite => "?".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_placeholders() {
        let params = Params::new(DatabaseType::PostgreSQL)
            .with("username", "jeswin")
            .with("password", "secretive")
            .with("email", "jeswin@example.com");

        assert_eq!(params.columns(), "username, password, email");
        assert_eq!(params.placeholders(), "$1, $2, $3");
        assert_eq!(params.values().len(), 3);
        assert_eq!(params.values()[0], QueryParam::String("jeswin".into()));
    }

    #[test]
    fn test_question_mark_placeholders() {
        let params = Params::from_pairs(DatabaseType::SQLite, [("a", 1i64), ("b", 2i64)]);
        assert_eq!(params.placeholders(), "?, ?");
        assert_eq!(params.values(), &[QueryParam::Int(1), QueryParam::Int(2)]);
    }

    #[test]
    fn test_assignments_with_offset() {
        let params = Params::new(DatabaseType::PostgreSQL)
            .with("username", "x")
            .with("email", "y");
        assert_eq!(params.assignments_from(2), "username = $2, email = $3");
        assert_eq!(params.placeholders_from(5), "$5, $6");
    }

    #[test]
    fn test_insert_sql() {
        let params = Params::new(DatabaseType::MySQL).with("name", "x");
        assert_eq!(
            params.insert_sql("users").unwrap(),
            "INSERT INTO users (name) VALUES (?)"
        );
    }

    #[test]
    fn test_insert_sql_rejects_empty() {
        let params = Params::new(DatabaseType::PostgreSQL);
        assert!(params.is_empty());
        assert!(matches!(
            params.insert_sql("users"),
            Err(DbError::InvalidInput { .. })
        ));
    }
}
