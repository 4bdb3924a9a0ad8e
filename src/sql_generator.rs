//! SQL generation
//!
//! Turns the clarified question and the rich schema report into a PostgreSQL
//! statement plus a one-line summary. Unlike clarification there is no repair
//! tier: the pipeline cannot proceed without SQL, so missing or unparseable
//! output is fatal.

use crate::error::{DatalensError, Result};
use crate::extraction;
use crate::llm::{LlmClient, RetryPolicy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Generated statement and its human-readable intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlPlan {
    pub sql: String,
    pub summary: String,
}

pub struct SqlGenerator {
    llm: LlmClient,
}

impl SqlGenerator {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    pub async fn generate(&self, clarified: &str, schema_report: &str) -> Result<SqlPlan> {
        let prompt = build_prompt(clarified, schema_report);
        let text = self.llm.generate(&prompt, &RetryPolicy::GENERATE).await?;
        let plan = parse_plan(&text)?;
        debug!("generated SQL: {}", plan.sql);
        Ok(plan)
    }
}

fn build_prompt(clarified: &str, schema_report: &str) -> String {
    format!(
        r#"You are a PostgreSQL SQL expert.
Given the schema below—including sample values for each text column—generate a query to answer this question.

Schema & Sample Values:
{schema}

Question:
"{question}"

Return *only* a JSON object:
{{
  "sql": "<valid PostgreSQL SQL>",
  "summary": "<one-line description>"
}}
Use PostgreSQL functions (e.g., DATE_TRUNC). Do NOT perform string cleanup in SQL."#,
        schema = schema_report,
        question = clarified
    )
}

fn parse_plan(text: &str) -> Result<SqlPlan> {
    let value = extraction::extract_json(text)?;
    let sql = value
        .get("sql")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DatalensError::Generation("response is missing the sql field".to_string()))?
        .to_string();
    let summary = value
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(SqlPlan { sql, summary })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_plan() {
        let plan = parse_plan(
            "```json\n{\"sql\": \"SELECT 1\", \"summary\": \"probe\"}\n```",
        )
        .unwrap();
        assert_eq!(plan.sql, "SELECT 1");
        assert_eq!(plan.summary, "probe");
    }

    #[test]
    fn missing_sql_field_is_fatal() {
        let err = parse_plan(r#"{"summary": "no statement"}"#).unwrap_err();
        assert!(matches!(err, DatalensError::Generation(_)));
    }

    #[test]
    fn blank_sql_field_is_fatal() {
        let err = parse_plan(r#"{"sql": "   ", "summary": "blank"}"#).unwrap_err();
        assert!(matches!(err, DatalensError::Generation(_)));
    }

    #[test]
    fn summary_defaults_to_empty() {
        let plan = parse_plan(r#"{"sql": "SELECT 1"}"#).unwrap();
        assert!(plan.summary.is_empty());
    }
}
