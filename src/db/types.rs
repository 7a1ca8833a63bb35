//! Row decoding into JSON maps.
//!
//! Query results are handed to callers as [`Row`] values (column name to
//! JSON value, in select order). Decoding is two-phase: [`categorize_type`]
//! maps a column type name to a [`TypeCategory`], then a backend decoder
//! extracts the value. Decoders that are identical for every backend are
//! generic over `sqlx::Row`.

use crate::models::{DatabaseType, Row};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, ColumnIndex, Decode, Type, TypeInfo};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Temporal,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite NUMERIC affinity holds plain floats
        if db == DatabaseType::SQLite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower.contains("timestamp")
        || lower.contains("datetime")
        || lower == "date"
        || lower == "time"
        || lower == "timetz"
    {
        return TypeCategory::Temporal;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if (lower.contains("int") && lower != "interval" && lower != "point")
        || lower.contains("serial")
    {
        return TypeCategory::Integer;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    TypeCategory::Text
}

/// Encode binary column data as a base64 JSON string.
pub fn encode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

/// Conversion of a backend row into a JSON [`Row`].
pub trait RowToJson {
    fn to_json_map(&self) -> Row;
}

impl RowToJson for MySqlRow {
    fn to_json_map(&self) -> Row {
        sqlx::Row::columns(self)
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), DatabaseType::MySQL);
                (col.name().to_string(), mysql::decode_column(self, idx, category))
            })
            .collect()
    }
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> Row {
        sqlx::Row::columns(self)
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), DatabaseType::PostgreSQL);
                (col.name().to_string(), postgres::decode_column(self, idx, category))
            })
            .collect()
    }
}

impl RowToJson for SqliteRow {
    fn to_json_map(&self) -> Row {
        sqlx::Row::columns(self)
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), DatabaseType::SQLite);
                (col.name().to_string(), sqlite::decode_column(self, idx, category))
            })
            .collect()
    }
}

// -----------------------------------------------------------------------------
// Shared decoders
// -----------------------------------------------------------------------------

fn decode_as<R, T>(row: &R, idx: usize) -> Option<Option<T>>
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    T: for<'r> Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<Option<T>, _>(idx).ok()
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

fn decode_boolean<R>(row: &R, idx: usize) -> JsonValue
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    bool: for<'r> Decode<'r, R::Database> + Type<R::Database>,
{
    decode_as::<R, bool>(row, idx)
        .flatten()
        .map(JsonValue::Bool)
        .unwrap_or(JsonValue::Null)
}

fn decode_float<R>(row: &R, idx: usize) -> JsonValue
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    f64: for<'r> Decode<'r, R::Database> + Type<R::Database>,
{
    decode_as::<R, f64>(row, idx)
        .flatten()
        .map(float_value)
        .unwrap_or(JsonValue::Null)
}

fn decode_binary<R>(row: &R, idx: usize) -> JsonValue
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    Vec<u8>: for<'r> Decode<'r, R::Database> + Type<R::Database>,
{
    decode_as::<R, Vec<u8>>(row, idx)
        .flatten()
        .map(|v| encode_binary_value(&v))
        .unwrap_or(JsonValue::Null)
}

/// Temporal values become strings: RFC 3339 for zoned timestamps, ISO 8601
/// otherwise. Columns that match none of the chrono types fall back to text.
fn decode_temporal<R>(row: &R, idx: usize) -> JsonValue
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    DateTime<Utc>: for<'r> Decode<'r, R::Database> + Type<R::Database>,
    NaiveDateTime: for<'r> Decode<'r, R::Database> + Type<R::Database>,
    NaiveDate: for<'r> Decode<'r, R::Database> + Type<R::Database>,
    NaiveTime: for<'r> Decode<'r, R::Database> + Type<R::Database>,
    String: for<'r> Decode<'r, R::Database> + Type<R::Database>,
{
    if let Some(v) = decode_as::<R, DateTime<Utc>>(row, idx) {
        return v.map(|t| JsonValue::String(t.to_rfc3339())).unwrap_or(JsonValue::Null);
    }
    if let Some(v) = decode_as::<R, NaiveDateTime>(row, idx) {
        return v
            .map(|t| JsonValue::String(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            .unwrap_or(JsonValue::Null);
    }
    if let Some(v) = decode_as::<R, NaiveDate>(row, idx) {
        return v.map(|d| JsonValue::String(d.to_string())).unwrap_or(JsonValue::Null);
    }
    if let Some(v) = decode_as::<R, NaiveTime>(row, idx) {
        return v.map(|t| JsonValue::String(t.to_string())).unwrap_or(JsonValue::Null);
    }
    decode_text(row, idx)
}

fn decode_text<R>(row: &R, idx: usize) -> JsonValue
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    String: for<'r> Decode<'r, R::Database> + Type<R::Database>,
{
    match row.try_get::<Option<String>, _>(idx) {
        Ok(Some(v)) => JsonValue::String(v),
        Ok(None) => JsonValue::Null,
        Err(e) => {
            tracing::debug!(column = idx, error = %e, "Column not decodable as text");
            JsonValue::Null
        }
    }
}

fn decode_json<R>(row: &R, idx: usize) -> JsonValue
where
    R: sqlx::Row,
    usize: ColumnIndex<R>,
    JsonValue: for<'r> Decode<'r, R::Database> + Type<R::Database>,
{
    decode_as::<R, JsonValue>(row, idx)
        .flatten()
        .unwrap_or(JsonValue::Null)
}

// -----------------------------------------------------------------------------
// Backend decoders
// -----------------------------------------------------------------------------

mod mysql {
    use super::*;
    use sqlx::Row as _;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx),
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Text | TypeCategory::Uuid => decode_text(row, idx),
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(|n| JsonValue::Number(n.into())).unwrap_or(JsonValue::Null);
        }
        if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
            return v.map(|n| JsonValue::Number(n.into())).unwrap_or(JsonValue::Null);
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }

    /// MySQL sends DECIMAL as text on both protocols.
    fn decode_decimal(row: &MySqlRow, idx: usize) -> JsonValue {
        match row.try_get_unchecked::<Option<String>, _>(idx) {
            Ok(Some(v)) => JsonValue::String(v),
            Ok(None) => JsonValue::Null,
            Err(e) => {
                tracing::error!(error = %e, "Failed to decode DECIMAL");
                JsonValue::Null
            }
        }
    }
}

mod postgres {
    use super::*;
    use sqlx::Row as _;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float_any(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx),
            TypeCategory::Uuid => decode_uuid(row, idx),
            TypeCategory::Decimal => decode_numeric(row, idx),
            TypeCategory::Text => decode_text(row, idx),
        }
    }

    /// NUMERIC as its exact decimal text, scale included (`12.50`).
    ///
    /// Values beyond 28 significant digits and `NaN` cannot be represented;
    /// cast those to text in SQL.
    fn decode_numeric(row: &PgRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<sqlx::types::Decimal>, _>(idx) {
            Ok(Some(v)) => JsonValue::String(v.to_string()),
            Ok(None) => JsonValue::Null,
            Err(e) => {
                tracing::warn!(column = idx, error = %e, "Failed to decode NUMERIC");
                JsonValue::Null
            }
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(|n| JsonValue::Number(n.into())).unwrap_or(JsonValue::Null);
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }

    fn decode_float_any(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return float_value(f64::from(v));
        }
        decode_float(row, idx)
    }

    fn decode_uuid(row: &PgRow, idx: usize) -> JsonValue {
        row.try_get::<Option<uuid::Uuid>, _>(idx)
            .ok()
            .flatten()
            .map(|v| JsonValue::String(v.to_string()))
            .unwrap_or(JsonValue::Null)
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float | TypeCategory::Decimal => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx),
            TypeCategory::Json => decode_json_text(row, idx),
            TypeCategory::Text | TypeCategory::Uuid => decode_dynamic(row, idx),
        }
    }

    fn decode_integer(row: &SqliteRow, idx: usize) -> JsonValue {
        decode_as::<SqliteRow, i64>(row, idx)
            .flatten()
            .map(|v| JsonValue::Number(v.into()))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_json_text(row: &SqliteRow, idx: usize) -> JsonValue {
        match decode_as::<SqliteRow, String>(row, idx).flatten() {
            Some(s) => serde_json::from_str(&s).unwrap_or(JsonValue::String(s)),
            None => JsonValue::Null,
        }
    }

    /// Expression columns carry no declared type; try the storage classes in turn.
    fn decode_dynamic(row: &SqliteRow, idx: usize) -> JsonValue {
        if let Some(v) = decode_as::<SqliteRow, String>(row, idx) {
            return v.map(JsonValue::String).unwrap_or(JsonValue::Null);
        }
        if let Some(Some(v)) = decode_as::<SqliteRow, i64>(row, idx) {
            return JsonValue::Number(v.into());
        }
        if let Some(Some(v)) = decode_as::<SqliteRow, f64>(row, idx) {
            return float_value(v);
        }
        decode_binary(row, idx)
    }
}
