//! Defensive parsing of semi-structured model output
//!
//! Generative responses wrap JSON in prose and code fences, truncate arrays,
//! or drop closing braces. This module recovers structure in two tiers:
//! a strict fence-strip + first-brace-block extractor, then an independent
//! per-field regex recovery for the clarification shape. Callers see which
//! tier produced the value via [`Tier`].

use crate::error::{DatalensError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"```(?:json)?").unwrap();
    static ref BRACE_BLOCK: Regex = Regex::new(r"(?s)\{.*\}").unwrap();
    static ref CLARIFIED_FIELD: Regex =
        Regex::new(r#""clarifiedPrompt"\s*:\s*"([^"]+)""#).unwrap();
    static ref ASSUMPTIONS_FIELD: Regex =
        Regex::new(r#"(?s)"assumptions"\s*:\s*\[(.*?)\]"#).unwrap();
    static ref SOURCES_FIELD: Regex =
        Regex::new(r#"(?s)"sources"\s*:\s*\[(.*?)\]"#).unwrap();
}

/// Which tier produced a recovered value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Strict extraction succeeded and the block parsed as JSON.
    Parsed,
    /// Field-level regex recovery rebuilt the object from near-JSON text.
    Repaired,
    /// Nothing recoverable; a safe default object was synthesized.
    Fallback,
}

/// Strip code fences and return the first `{...}` block, parsed.
///
/// This is the only strategy available to stages without a repair tier
/// (SQL generation, visualization): no block or unparseable JSON is an error.
pub fn extract_json(text: &str) -> Result<Value> {
    let stripped = CODE_FENCE.replace_all(text, "");
    let block = BRACE_BLOCK
        .find(&stripped)
        .ok_or_else(|| DatalensError::Generation("no JSON object found in response".to_string()))?;
    let value: Value = serde_json::from_str(block.as_str())
        .map_err(|e| DatalensError::Generation(format!("malformed JSON in response: {}", e)))?;
    Ok(value)
}

/// Recovered clarification fields plus the tier that produced them.
#[derive(Debug, Clone)]
pub struct ClarificationFields {
    pub clarified_prompt: Option<String>,
    pub assumptions: Option<Vec<String>>,
    pub sources: Option<Vec<String>>,
    pub tier: Tier,
}

/// Extract clarification fields from raw model text, trying each tier.
///
/// Never fails: the terminal tier truncates the raw text into a usable
/// prompt so the caller can always build a structurally valid result.
pub fn extract_clarification(text: &str) -> ClarificationFields {
    if let Ok(value) = extract_json(text) {
        return ClarificationFields {
            clarified_prompt: value
                .get("clarifiedPrompt")
                .and_then(Value::as_str)
                .map(str::to_string),
            assumptions: string_list(value.get("assumptions")),
            sources: string_list(value.get("sources")),
            tier: Tier::Parsed,
        };
    }

    if let Some(fields) = repair_clarification(text) {
        return fields;
    }

    ClarificationFields {
        clarified_prompt: Some(truncate(text, 200)),
        assumptions: Some(vec!["Unable to parse response properly".to_string()]),
        sources: Some(Vec::new()),
        tier: Tier::Fallback,
    }
}

/// Field-by-field regex recovery for near-JSON output, e.g. an object with a
/// missing closing brace or stray trailing prose inside an array.
fn repair_clarification(text: &str) -> Option<ClarificationFields> {
    if !(text.contains("\"clarifiedPrompt\"")
        && text.contains("\"assumptions\"")
        && text.contains("\"sources\""))
    {
        return None;
    }

    let clarified_prompt = CLARIFIED_FIELD
        .captures(text)
        .map(|c| c[1].to_string())?;
    let assumptions = ASSUMPTIONS_FIELD
        .captures(text)
        .map(|c| split_quoted_items(&c[1]))
        .unwrap_or_default();
    let sources = SOURCES_FIELD
        .captures(text)
        .map(|c| split_quoted_items(&c[1]))
        .unwrap_or_default();

    Some(ClarificationFields {
        clarified_prompt: Some(clarified_prompt),
        assumptions: Some(assumptions),
        sources: Some(sources),
        tier: Tier::Repaired,
    })
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    value.and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

fn split_quoted_items(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().trim_matches('"').to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_is_idempotent_on_clean_input() {
        let value = extract_json(r#"{"a":1}"#).unwrap();
        assert_eq!(value, serde_json::json!({"a": 1}));
    }

    #[test]
    fn extract_json_strips_code_fences() {
        let value = extract_json("```json\n{\"a\":1}\n```").unwrap();
        assert_eq!(value, serde_json::json!({"a": 1}));
    }

    #[test]
    fn extract_json_ignores_surrounding_prose() {
        let value = extract_json("Sure! Here is the result: {\"sql\": \"SELECT 1\"} Enjoy.")
            .unwrap();
        assert_eq!(value["sql"], "SELECT 1");
    }

    #[test]
    fn extract_json_fails_without_a_block() {
        assert!(extract_json("no structure here").is_err());
    }

    #[test]
    fn clarification_parses_clean_json() {
        let fields = extract_clarification(
            r#"{"clarifiedPrompt":"Top 5 customers","assumptions":["fiscal year"],"sources":["orders"]}"#,
        );
        assert_eq!(fields.tier, Tier::Parsed);
        assert_eq!(fields.clarified_prompt.as_deref(), Some("Top 5 customers"));
        assert_eq!(fields.assumptions.unwrap(), vec!["fiscal year"]);
        assert_eq!(fields.sources.unwrap(), vec!["orders"]);
    }

    #[test]
    fn clarification_repairs_near_json() {
        // Missing closing brace: strict extraction fails, field recovery works.
        let text = r#"
            "clarifiedPrompt": "Monthly revenue by region",
            "assumptions": ["calendar months", "USD"],
            "sources": ["orders", "regions"]
        "#;
        let fields = extract_clarification(text);
        assert_eq!(fields.tier, Tier::Repaired);
        assert_eq!(
            fields.clarified_prompt.as_deref(),
            Some("Monthly revenue by region")
        );
        assert_eq!(
            fields.assumptions.unwrap(),
            vec!["calendar months", "USD"]
        );
        assert_eq!(fields.sources.unwrap(), vec!["orders", "regions"]);
    }

    #[test]
    fn clarification_falls_back_to_truncated_text() {
        let text = "The question is probably about revenue but I cannot be sure.";
        let fields = extract_clarification(text);
        assert_eq!(fields.tier, Tier::Fallback);
        assert_eq!(fields.clarified_prompt.as_deref(), Some(text));
        assert_eq!(
            fields.assumptions.unwrap(),
            vec!["Unable to parse response properly"]
        );
        assert!(fields.sources.unwrap().is_empty());
    }

    #[test]
    fn clarification_defaults_non_list_fields() {
        let fields = extract_clarification(
            r#"{"clarifiedPrompt":"Q","assumptions":"not a list","sources":42}"#,
        );
        assert_eq!(fields.tier, Tier::Parsed);
        assert_eq!(fields.clarified_prompt.as_deref(), Some("Q"));
        assert!(fields.assumptions.is_none());
        assert!(fields.sources.is_none());
    }
}
