//! Statement execution.
//!
//! Each backend submodule exposes the same three functions:
//! - `execute`: run a statement, return rows affected
//! - `fetch_all`: run a query, return rows as JSON maps
//! - `execute_raw`: run SQL over the simple query protocol (transaction control)
//!
//! `execute` and `fetch_all` are generic over any `sqlx::Executor` of the
//! backend, so a pool and a lent connection share one code path. `execute_raw`
//! only runs on a lent connection.
//!
//! Statements without parameters are sent unprepared. Timeouts are inherited
//! from the pool configuration.

use crate::db::params::{bind_mysql_param, bind_postgres_param, bind_sqlite_param};
use crate::db::types::RowToJson;
use crate::error::DbResult;
use crate::models::{QueryParam, Row};
use tracing::debug;

fn log_statement(db: &'static str, sql: &str, params: &[QueryParam]) {
    debug!(db_type = db, params = params.len(), sql = %sql, "Executing statement");
}

pub(crate) mod mysql {
    use super::*;
    use sqlx::{MySql, MySqlConnection};

    pub async fn execute<'e, E>(executor: E, sql: &'e str, params: &'e [QueryParam]) -> DbResult<u64>
    where
        E: sqlx::Executor<'e, Database = MySql>,
    {
        log_statement("mysql", sql, params);
        let result = if params.is_empty() {
            executor.execute(sql).await?
        } else {
            let query = params
                .iter()
                .fold(sqlx::query(sql), |query, param| bind_mysql_param(query, param));
            query.execute(executor).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn fetch_all<'e, E>(
        executor: E,
        sql: &'e str,
        params: &'e [QueryParam],
    ) -> DbResult<Vec<Row>>
    where
        E: sqlx::Executor<'e, Database = MySql>,
    {
        log_statement("mysql", sql, params);
        let rows = if params.is_empty() {
            executor.fetch_all(sql).await?
        } else {
            let query = params
                .iter()
                .fold(sqlx::query(sql), |query, param| bind_mysql_param(query, param));
            query.fetch_all(executor).await?
        };
        Ok(rows.iter().map(RowToJson::to_json_map).collect())
    }

    pub async fn execute_raw(conn: &mut MySqlConnection, sql: &str) -> DbResult<()> {
        sqlx::Executor::execute(conn, sql).await?;
        Ok(())
    }
}

pub(crate) mod postgres {
    use super::*;
    use sqlx::{PgConnection, Postgres};

    pub async fn execute<'e, E>(executor: E, sql: &'e str, params: &'e [QueryParam]) -> DbResult<u64>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        log_statement("postgres", sql, params);
        let result = if params.is_empty() {
            executor.execute(sql).await?
        } else {
            let query = params
                .iter()
                .fold(sqlx::query(sql), |query, param| bind_postgres_param(query, param));
            query.execute(executor).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn fetch_all<'e, E>(
        executor: E,
        sql: &'e str,
        params: &'e [QueryParam],
    ) -> DbResult<Vec<Row>>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        log_statement("postgres", sql, params);
        let rows = if params.is_empty() {
            executor.fetch_all(sql).await?
        } else {
            let query = params
                .iter()
                .fold(sqlx::query(sql), |query, param| bind_postgres_param(query, param));
            query.fetch_all(executor).await?
        };
        Ok(rows.iter().map(RowToJson::to_json_map).collect())
    }

    pub async fn execute_raw(conn: &mut PgConnection, sql: &str) -> DbResult<()> {
        sqlx::Executor::execute(conn, sql).await?;
        Ok(())
    }
}

pub(crate) mod sqlite {
    use super::*;
    use sqlx::{Sqlite, SqliteConnection};

    pub async fn execute<'e, E>(executor: E, sql: &'e str, params: &'e [QueryParam]) -> DbResult<u64>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        log_statement("sqlite", sql, params);
        let result = if params.is_empty() {
            executor.execute(sql).await?
        } else {
            let query = params
                .iter()
                .fold(sqlx::query(sql), |query, param| bind_sqlite_param(query, param));
            query.execute(executor).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn fetch_all<'e, E>(
        executor: E,
        sql: &'e str,
        params: &'e [QueryParam],
    ) -> DbResult<Vec<Row>>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        log_statement("sqlite", sql, params);
        let rows = if params.is_empty() {
            executor.fetch_all(sql).await?
        } else {
            let query = params
                .iter()
                .fold(sqlx::query(sql), |query, param| bind_sqlite_param(query, param));
            query.fetch_all(executor).await?
        };
        Ok(rows.iter().map(RowToJson::to_json_map).collect())
    }

    pub async fn execute_raw(conn: &mut SqliteConnection, sql: &str) -> DbResult<()> {
        sqlx::Executor::execute(conn, sql).await?;
        Ok(())
    }
}
