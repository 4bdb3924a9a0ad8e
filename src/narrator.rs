//! Insight narration
//!
//! One generative call that turns the SQL summary plus the normalized data
//! into a free-text analytical narrative. Fatal after exhausted retries:
//! there is no meaningful fallback text.

use crate::error::Result;
use crate::executor::Row;
use crate::llm::{LlmClient, RetryPolicy};

pub struct InsightNarrator {
    llm: LlmClient,
}

impl InsightNarrator {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    pub async fn narrate(&self, summary: &str, data: &[Row]) -> Result<String> {
        let prompt = build_prompt(summary, data)?;
        let text = self.llm.generate(&prompt, &RetryPolicy::GENERATE).await?;
        Ok(text.trim().to_string())
    }
}

fn build_prompt(summary: &str, data: &[Row]) -> Result<String> {
    let data_json = serde_json::to_string(data)?;
    Ok(format!(
        r#"Provide a concise analytical narrative highlighting trends and anomalies based on:
Summary: {summary}
Data: {data}"#,
        summary = summary,
        data = data_json
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_embeds_summary_and_serialized_data() {
        let row: Row = serde_json::from_value(json!({"region": "EMEA", "total": 42})).unwrap();
        let prompt = build_prompt("totals by region", &[row]).unwrap();
        assert!(prompt.contains("totals by region"));
        assert!(prompt.contains("EMEA"));
    }
}
