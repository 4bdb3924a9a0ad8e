//! Query execution
//!
//! Runs generated SQL against the store and returns raw rows as JSON maps.
//! The statement is arbitrary text, so rows are decoded dynamically from the
//! reported column types rather than through a compile-time schema.
//! Execution errors are fatal and not retried.

use crate::error::{DatalensError, Result};
use serde_json::{Map, Value};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Column, Row as SqlxRow, TypeInfo};
use tracing::debug;

/// One result row: column name -> raw heterogeneous value.
pub type Row = Map<String, Value>;

pub struct QueryExecutor;

impl QueryExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Execute `sql` and return raw rows. Empty or whitespace-only input is
    /// rejected before the store is touched.
    pub async fn run_sql(&self, conn: &mut PgConnection, sql: &str) -> Result<Vec<Row>> {
        validate_sql_text(sql)?;

        let rows = sqlx::query(sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| DatalensError::Execution(format!("query failed: {}", e)))?;

        debug!("query returned {} rows", rows.len());
        rows.iter().map(row_to_json).collect()
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject empty statements before any store access.
pub fn validate_sql_text(sql: &str) -> Result<()> {
    if sql.trim().is_empty() {
        return Err(DatalensError::Validation("empty SQL".to_string()));
    }
    Ok(())
}

fn row_to_json(row: &PgRow) -> Result<Row> {
    let mut map = Map::new();
    for (index, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), decode_value(row, index)?);
    }
    Ok(map)
}

/// Decode one cell into a JSON value based on the reported Postgres type.
/// Unknown types degrade to their string form rather than failing the row.
fn decode_value(row: &PgRow, index: usize) -> Result<Value> {
    let type_name = row.columns()[index].type_info().name().to_uppercase();

    let value = match type_name.as_str() {
        "BOOL" => row
            .try_get::<Option<bool>, _>(index)?
            .map(Value::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)?
            .map(|v| Value::from(v as i64)),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)?
            .map(|v| Value::from(v as i64)),
        "INT8" => row
            .try_get::<Option<i64>, _>(index)?
            .map(Value::from),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)?
            .map(|v| Value::from(v as f64)),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(index)?
            .map(Value::from),
        // NUMERIC keeps its textual form; the normalizer decides how to
        // interpret it, mirroring how the store's wire format behaves.
        "NUMERIC" => row
            .try_get::<Option<sqlx::types::BigDecimal>, _>(index)?
            .map(|v| Value::String(v.to_string())),
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => row
            .try_get::<Option<String>, _>(index)?
            .map(Value::String),
        "UUID" => row
            .try_get::<Option<sqlx::types::Uuid>, _>(index)?
            .map(|v| Value::String(v.to_string())),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)?
            .map(|v| Value::String(v.to_string())),
        "TIME" => row
            .try_get::<Option<chrono::NaiveTime>, _>(index)?
            .map(|v| Value::String(v.to_string())),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)?
            .map(|v| Value::String(v.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)?
            .map(|v| Value::String(v.to_rfc3339())),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(index)?,
        _ => row
            .try_get::<Option<String>, _>(index)
            .unwrap_or(None)
            .map(Value::String),
    };

    Ok(value.unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sql_is_rejected() {
        assert!(matches!(
            validate_sql_text("").unwrap_err(),
            DatalensError::Validation(_)
        ));
    }

    #[test]
    fn whitespace_sql_is_rejected() {
        assert!(matches!(
            validate_sql_text("   \n\t ").unwrap_err(),
            DatalensError::Validation(_)
        ));
    }

    #[test]
    fn real_sql_passes_validation() {
        assert!(validate_sql_text("SELECT 1").is_ok());
    }
}
