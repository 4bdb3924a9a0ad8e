//! Schema introspection over the PostgreSQL catalog
//!
//! Produces two views of the target schema: a lightweight table -> column-name
//! map for clarification, and a richer per-table report with sampled distinct
//! values for text-like columns, which grounds SQL generation.

use crate::error::{DatalensError, Result};
use sqlx::postgres::PgConnection;
use sqlx::Row;
use std::collections::BTreeMap;
use tracing::debug;

/// One column as reported by `information_schema.columns`, with optional
/// sampled values for text-like declared types.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub sample_values: Vec<String>,
}

/// Lightweight table -> column-name map plus a flattened readable form.
#[derive(Debug, Clone)]
pub struct SchemaColumns {
    pub map: BTreeMap<String, Vec<String>>,
    pub readable: String,
}

const TEXT_LIKE_TYPES: &[&str] = &["text", "character varying", "varchar", "char"];

pub struct SchemaIntrospector;

impl SchemaIntrospector {
    pub fn new() -> Self {
        Self
    }

    /// Table -> column names for the public schema, with a human-readable
    /// one-line-per-table rendering. Used where value samples add no benefit.
    pub async fn resolve_columns(&self, conn: &mut PgConnection) -> Result<SchemaColumns> {
        let rows = sqlx::query(
            r#"
            SELECT table_name, column_name
            FROM information_schema.columns
            WHERE table_schema = 'public'
            ORDER BY table_name, ordinal_position
            "#,
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| DatalensError::Schema(format!("catalog query failed: {}", e)))?;

        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for row in rows {
            let table: String = row.try_get("table_name")?;
            let column: String = row.try_get("column_name")?;
            map.entry(table).or_default().push(column);
        }

        let readable = map
            .iter()
            .map(|(table, cols)| format!("- {}: {}", table, cols.join(", ")))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(SchemaColumns { map, readable })
    }

    /// Full per-table report: every column with its declared type, and for
    /// text-like columns up to `limit` sampled distinct non-null values.
    /// Sampling failures on individual columns are skipped, never fatal.
    pub async fn schema_with_values(
        &self,
        conn: &mut PgConnection,
        limit: usize,
    ) -> Result<String> {
        let rows = sqlx::query(
            r#"
            SELECT table_name, column_name, data_type
            FROM information_schema.columns
            WHERE table_schema = 'public'
            ORDER BY table_name, ordinal_position
            "#,
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| DatalensError::Schema(format!("catalog query failed: {}", e)))?;

        let mut tables: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
        for row in rows {
            let table: String = row.try_get("table_name")?;
            let column: String = row.try_get("column_name")?;
            let data_type: String = row.try_get("data_type")?;
            tables.entry(table).or_default().push((column, data_type));
        }

        let mut sections = Vec::new();
        for (table, columns) in &tables {
            let mut lines = vec![format!("TABLE: {}", table), "COLUMNS:".to_string()];
            for (column, data_type) in columns {
                let mut sample_text = String::new();
                if is_text_like(data_type) {
                    match sample_column(conn, table, column, limit).await {
                        Ok(samples) if !samples.is_empty() => {
                            let quoted: Vec<String> =
                                samples.iter().map(|v| format!("{:?}", v)).collect();
                            sample_text = format!("  Values: [{}]", quoted.join(", "));
                        }
                        Ok(_) => {}
                        Err(e) => {
                            debug!("sampling {}.{} failed, skipping: {}", table, column, e);
                        }
                    }
                }
                lines.push(format!("  - {} ({}){}", column, data_type, sample_text));
            }
            sections.push(lines.join("\n"));
        }

        Ok(sections.join("\n\n"))
    }
}

impl Default for SchemaIntrospector {
    fn default() -> Self {
        Self::new()
    }
}

fn is_text_like(data_type: &str) -> bool {
    TEXT_LIKE_TYPES.contains(&data_type.to_lowercase().as_str())
}

async fn sample_column(
    conn: &mut PgConnection,
    table: &str,
    column: &str,
    limit: usize,
) -> Result<Vec<String>> {
    // Identifiers come from the catalog, not user input, but quote them
    // anyway so mixed-case names survive.
    let sql = format!(
        r#"SELECT DISTINCT "{col}" FROM "{table}" WHERE "{col}" IS NOT NULL LIMIT {limit}"#,
        col = column,
        table = table,
        limit = limit
    );
    let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
    let mut values = Vec::with_capacity(rows.len());
    for row in rows {
        if let Ok(value) = row.try_get::<String, _>(0) {
            values.push(value);
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_like_detection_is_case_insensitive() {
        assert!(is_text_like("text"));
        assert!(is_text_like("Character Varying"));
        assert!(is_text_like("VARCHAR"));
        assert!(!is_text_like("integer"));
        assert!(!is_text_like("timestamp without time zone"));
    }
}
