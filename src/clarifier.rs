//! Prompt clarification
//!
//! Rewrites a vague business question into a clear, SQL-answerable one, with
//! the assumptions made and the source tables involved. This stage never
//! fails for a non-empty question: any upstream or parse trouble degrades to
//! a structurally valid fallback built from the original question.

use crate::extraction::{self, Tier};
use crate::llm::{LlmClient, RetryPolicy};
use crate::schema::SchemaIntrospector;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnection;
use tracing::{info, warn};

/// Clarified question plus the reasoning context behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClarificationResult {
    pub clarified_prompt: String,
    pub assumptions: Vec<String>,
    pub sources: Vec<String>,
}

impl ClarificationResult {
    /// Safe default when the generative service is unreachable or unusable.
    pub fn fallback(question: &str) -> Self {
        Self {
            clarified_prompt: question.to_string(),
            assumptions: vec!["Using original query due to processing error".to_string()],
            sources: Vec::new(),
        }
    }
}

pub struct PromptClarifier {
    llm: LlmClient,
    introspector: SchemaIntrospector,
}

impl PromptClarifier {
    pub fn new(llm: LlmClient) -> Self {
        Self {
            llm,
            introspector: SchemaIntrospector::new(),
        }
    }

    /// Clarify a vague question against the lightweight schema map.
    ///
    /// Infallible by contract: every failure path yields a well-formed
    /// [`ClarificationResult`].
    pub async fn clarify(&self, question: &str, conn: &mut PgConnection) -> ClarificationResult {
        let readable = match self.introspector.resolve_columns(conn).await {
            Ok(columns) => columns.readable,
            Err(e) => {
                warn!("schema resolution failed, clarifying blind: {}", e);
                "Schema unavailable".to_string()
            }
        };

        let prompt = build_prompt(question, &readable);
        let text = match self.llm.generate(&prompt, &RetryPolicy::CLARIFY).await {
            Ok(text) => text,
            Err(e) => {
                warn!("clarification call failed after retries: {}", e);
                return ClarificationResult::fallback(question);
            }
        };

        let fields = extraction::extract_clarification(&text);
        if fields.tier != Tier::Parsed {
            info!("clarification recovered via {:?} tier", fields.tier);
        }

        ClarificationResult {
            clarified_prompt: fields
                .clarified_prompt
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| question.to_string()),
            assumptions: fields
                .assumptions
                .unwrap_or_else(|| vec!["Using best interpretation of query".to_string()]),
            sources: fields.sources.unwrap_or_default(),
        }
    }
}

fn build_prompt(question: &str, schema_readable: &str) -> String {
    format!(
        r#"You are an expert data analyst and SQL professional. You'll receive a business question and database schema.
Your task:
1) Rewrite the question to be clear, specific, and answerable with SQL
2) List your assumptions that guided your clarification
3) List the tables (and key columns) you would use to answer this question

Very important: Respond ONLY with a JSON object in this format:
{{
  "clarifiedPrompt": "your clear, specific question",
  "assumptions": ["assumption 1", "assumption 2", ...],
  "sources": ["table1", "table2", ...]
}}

Even if the schema is incomplete or the question is very vague, make your best effort to provide a JSON response.

Schema:
{schema}

Question:
"{question}""#,
        schema = schema_readable,
        question = question
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_structurally_valid() {
        let result = ClarificationResult::fallback("show me sales");
        assert_eq!(result.clarified_prompt, "show me sales");
        assert_eq!(result.assumptions.len(), 1);
        assert!(result.sources.is_empty());
    }

    #[test]
    fn prompt_embeds_schema_and_question() {
        let prompt = build_prompt("top customers?", "- customers: id, name");
        assert!(prompt.contains("top customers?"));
        assert!(prompt.contains("- customers: id, name"));
        assert!(prompt.contains("clarifiedPrompt"));
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let result = ClarificationResult {
            clarified_prompt: "q".to_string(),
            assumptions: vec![],
            sources: vec![],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("clarifiedPrompt").is_some());
    }
}
