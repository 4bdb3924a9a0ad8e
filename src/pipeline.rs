//! Pipeline orchestration
//!
//! Sequences the stages per incoming question: validate, clarify, introspect
//! schema, generate SQL, execute, normalize, narrate, and (for non-empty
//! data) select a visualization. One pooled connection is acquired per
//! request and released unconditionally when the request scope ends.

use crate::clarifier::PromptClarifier;
use crate::error::{DatalensError, Result};
use crate::executor::{QueryExecutor, Row};
use crate::llm::LlmClient;
use crate::narrator::InsightNarrator;
use crate::normalizer::DataNormalizer;
use crate::schema::SchemaIntrospector;
use crate::sql_generator::SqlGenerator;
use crate::visualizer::{VisualizationSelector, VisualizationSpec};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

/// Inbound question. `explain` is accepted for wire compatibility but not
/// consumed by the pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub prompt: String,
    #[serde(default)]
    pub explain: bool,
}

/// Assembled response for one answered question.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub clarified_prompt: String,
    pub assumptions: Vec<String>,
    pub sources: Vec<String>,
    pub summary: String,
    pub narrative: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Row>>,
    pub visualization: Option<VisualizationSpec>,
}

/// Per-process pipeline: owns the stage components and the shared pool and
/// LLM handle, both constructed once at startup.
pub struct Pipeline {
    pool: PgPool,
    sample_limit: usize,
    clarifier: PromptClarifier,
    introspector: SchemaIntrospector,
    generator: SqlGenerator,
    executor: QueryExecutor,
    normalizer: DataNormalizer,
    narrator: InsightNarrator,
    visualizer: VisualizationSelector,
}

impl Pipeline {
    pub fn new(pool: PgPool, llm: LlmClient, sample_limit: usize) -> Self {
        Self {
            pool,
            sample_limit,
            clarifier: PromptClarifier::new(llm.clone()),
            introspector: SchemaIntrospector::new(),
            generator: SqlGenerator::new(llm.clone()),
            executor: QueryExecutor::new(),
            normalizer: DataNormalizer::new(llm.clone()),
            narrator: InsightNarrator::new(llm.clone()),
            visualizer: VisualizationSelector::new(llm),
        }
    }

    /// Answer one question end to end.
    pub async fn answer(&self, request: QueryRequest) -> Result<QueryResponse> {
        let question = request.prompt.trim();
        if question.is_empty() {
            return Err(DatalensError::Validation(
                "prompt must be a non-empty string".to_string(),
            ));
        }

        let request_id = Uuid::new_v4();
        info!("[{}] answering: {}", request_id, question);

        // Connection is scoped to this request; dropped (and returned to the
        // pool) on every exit path.
        let mut conn = self.pool.acquire().await?;

        let clarification = self.clarifier.clarify(question, &mut conn).await;
        info!("[{}] clarified: {}", request_id, clarification.clarified_prompt);

        let schema_report = self
            .introspector
            .schema_with_values(&mut conn, self.sample_limit)
            .await?;

        let plan = self
            .generator
            .generate(&clarification.clarified_prompt, &schema_report)
            .await?;
        info!("[{}] plan: {}", request_id, plan.summary);

        let raw_rows = self.executor.run_sql(&mut conn, &plan.sql).await?;
        let data = self.normalizer.clean_rows(raw_rows).await;

        let narrative = self.narrator.narrate(&plan.summary, &data).await?;
        let visualization = self.visualizer.recommend(&plan.summary, &data).await?;

        info!(
            "[{}] done: {} rows, visualization: {}",
            request_id,
            data.len(),
            visualization.is_some()
        );

        Ok(QueryResponse {
            clarified_prompt: clarification.clarified_prompt,
            assumptions: clarification.assumptions,
            sources: clarification.sources,
            summary: plan.summary,
            narrative,
            data: if data.is_empty() { None } else { Some(data) },
            visualization,
        })
    }
}
