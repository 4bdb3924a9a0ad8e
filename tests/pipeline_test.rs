//! End-to-end pipeline tests against a live PostgreSQL instance.
//!
//! Run with a scratch database:
//!   DATABASE_URL=postgres://... cargo test -- --ignored
//!
//! The generative service is replaced by a scripted backend that routes on
//! prompt markers, so only the store is real.

use async_trait::async_trait;
use datalens::error::{DatalensError, Result};
use datalens::llm::{GenerativeBackend, LlmClient};
use datalens::pipeline::{Pipeline, QueryRequest};
use datalens::visualizer::ChartType;
use std::sync::Arc;

/// Answers each stage's prompt by recognizing its distinctive instructions.
struct ScriptedBackend;

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if prompt.contains("clarifiedPrompt") {
            return Ok(r#"{
                "clarifiedPrompt": "Which 5 customers have the highest total order amount?",
                "assumptions": ["Revenue means the sum of order amounts"],
                "sources": ["customers", "orders"]
            }"#
            .to_string());
        }
        if prompt.contains("PostgreSQL SQL expert") {
            return Ok(r#"```json
{
  "sql": "SELECT c.name, SUM(o.amount)::text AS revenue FROM customers c JOIN orders o ON o.customer_id = c.id GROUP BY c.name ORDER BY SUM(o.amount) DESC LIMIT 5",
  "summary": "Top 5 customers by total order amount"
}
```"#
                .to_string());
        }
        if prompt.contains("analytical narrative") {
            return Ok("Acme leads revenue by a wide margin.".to_string());
        }
        if prompt.contains("recommend the best chart") {
            return Ok(r#"{"type": "bar", "config": {"xAxis": "name", "yAxis": "revenue"}}"#
                .to_string());
        }
        if prompt.contains("What data type") {
            return Ok("text".to_string());
        }
        Err(DatalensError::Llm(format!(
            "unexpected prompt: {}",
            &prompt[..prompt.len().min(80)]
        )))
    }
}

/// Every call fails, as if the service were unreachable.
struct UnreachableBackend;

#[async_trait]
impl GenerativeBackend for UnreachableBackend {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(DatalensError::Llm("connection refused".to_string()))
    }
}

async fn test_pool() -> sqlx::PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a scratch database");
    datalens::db::init_pool(&url).await.expect("pool init")
}

async fn seed_store(pool: &sqlx::PgPool) {
    sqlx::query("DROP TABLE IF EXISTS orders").execute(pool).await.unwrap();
    sqlx::query("DROP TABLE IF EXISTS customers").execute(pool).await.unwrap();
    sqlx::query("CREATE TABLE customers (id INT PRIMARY KEY, name TEXT)")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("CREATE TABLE orders (customer_id INT, amount NUMERIC)")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO customers (id, name) VALUES (1, 'Acme'), (2, 'Globex'), (3, 'Initech')",
    )
    .execute(pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO orders (customer_id, amount) VALUES (1, 120.50), (1, 80), (2, 99.99), (3, 10)",
    )
    .execute(pool)
    .await
    .unwrap();
}

#[tokio::test]
#[ignore = "requires a live PostgreSQL at DATABASE_URL"]
async fn answers_top_customers_question_end_to_end() {
    let pool = test_pool().await;
    seed_store(&pool).await;

    let llm = LlmClient::with_backend(Arc::new(ScriptedBackend));
    let pipeline = Pipeline::new(pool, llm, 5);

    let response = pipeline
        .answer(QueryRequest {
            prompt: "top 5 customers by revenue".to_string(),
            explain: false,
        })
        .await
        .unwrap();

    assert!(!response.clarified_prompt.trim().is_empty());
    assert_eq!(response.sources, vec!["customers", "orders"]);
    assert_eq!(response.summary, "Top 5 customers by total order amount");
    assert!(!response.narrative.is_empty());

    // NUMERIC comes back textual; the revenue column must normalize to a number.
    let data = response.data.expect("non-empty data");
    assert_eq!(data.len(), 3);
    assert!(data[0]["revenue"].is_number());
    assert_eq!(data[0]["revenue"], serde_json::json!(200.5));

    let viz = response.visualization.expect("non-empty data gets a chart");
    assert!(matches!(
        viz.chart_type,
        ChartType::Bar | ChartType::Line | ChartType::Pie | ChartType::Radar
    ));
}

#[tokio::test]
#[ignore = "requires a live PostgreSQL at DATABASE_URL"]
async fn clarification_degrades_when_service_is_unreachable() {
    let pool = test_pool().await;
    seed_store(&pool).await;

    let llm = LlmClient::with_backend(Arc::new(UnreachableBackend));
    let pipeline = Pipeline::new(pool.clone(), llm, 5);

    // The request as a whole fails at SQL generation, but clarification
    // itself must have degraded to a fallback, not raised.
    let err = pipeline
        .answer(QueryRequest {
            prompt: "how are sales doing".to_string(),
            explain: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DatalensError::Llm(_)));
}

#[tokio::test]
#[ignore = "requires a live PostgreSQL at DATABASE_URL"]
async fn empty_question_is_rejected_before_any_work() {
    let pool = test_pool().await;
    let llm = LlmClient::with_backend(Arc::new(UnreachableBackend));
    let pipeline = Pipeline::new(pool, llm, 5);

    let err = pipeline
        .answer(QueryRequest {
            prompt: "   ".to_string(),
            explain: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DatalensError::Validation(_)));
}
