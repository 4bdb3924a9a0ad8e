//! Visualization selection
//!
//! Recommends a chart from a fixed vocabulary with a field mapping whose
//! required keys depend on the chart type. Skipped entirely for empty result
//! sets; otherwise an unusable recommendation is fatal (same brace-block-only
//! extraction as SQL generation, no repair tier).

use crate::error::{DatalensError, Result};
use crate::executor::Row;
use crate::extraction;
use crate::llm::{LlmClient, RetryPolicy};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Radar,
}

/// Chart recommendation: type plus field mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizationSpec {
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub config: Map<String, Value>,
}

impl VisualizationSpec {
    /// Check the config carries the keys its chart type requires.
    pub fn validate(&self) -> Result<()> {
        let required: &[&str] = match self.chart_type {
            ChartType::Bar | ChartType::Line => &["xAxis", "yAxis"],
            ChartType::Pie => &["category", "value"],
            ChartType::Radar => &["metrics"],
        };
        for key in required {
            if !self.config.contains_key(*key) {
                return Err(DatalensError::Generation(format!(
                    "chart config is missing required key: {}",
                    key
                )));
            }
        }
        if self.chart_type == ChartType::Radar && !self.config["metrics"].is_array() {
            return Err(DatalensError::Generation(
                "radar chart metrics must be a list".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct VisualizationSelector {
    llm: LlmClient,
}

impl VisualizationSelector {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// Recommend a chart for non-empty data; `None` for an empty result set.
    pub async fn recommend(
        &self,
        summary: &str,
        data: &[Row],
    ) -> Result<Option<VisualizationSpec>> {
        if data.is_empty() {
            debug!("empty result set, skipping visualization");
            return Ok(None);
        }

        let prompt = build_prompt(summary, data)?;
        let text = self.llm.generate(&prompt, &RetryPolicy::GENERATE).await?;
        let spec = parse_spec(&text)?;
        Ok(Some(spec))
    }
}

fn build_prompt(summary: &str, data: &[Row]) -> Result<String> {
    let data_json = serde_json::to_string(data)?;
    Ok(format!(
        r#"Based on the summary and data below, recommend the best chart (bar, line, pie, or radar)
and return *only* JSON:

{{
  "type": "<chart type>",
  "config": {{
    // for bar/line: "xAxis":"<field>", "yAxis":"<field>"
    // for pie: "category":"<field>", "value":"<field>"
    // for radar: "metrics":["<field1>","<field2>",...]
  }}
}}

Summary: {summary}
Data: {data}"#,
        summary = summary,
        data = data_json
    ))
}

fn parse_spec(text: &str) -> Result<VisualizationSpec> {
    let value = extraction::extract_json(text)?;
    let spec: VisualizationSpec = serde_json::from_value(value)
        .map_err(|e| DatalensError::Generation(format!("unusable chart recommendation: {}", e)))?;
    spec.validate()?;
    Ok(spec)
}
