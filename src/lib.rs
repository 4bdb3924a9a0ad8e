//! datalens - natural-language questions answered with SQL
//!
//! A multi-stage pipeline over PostgreSQL and the Gemini text API:
//! 1. Clarify a vague business question against the schema
//! 2. Generate a SQL statement for the clarified question
//! 3. Execute it and normalize the result set by inferred semantic types
//! 4. Narrate the findings and recommend a chart

pub mod clarifier;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod extraction;
pub mod llm;
pub mod narrator;
pub mod normalizer;
pub mod pipeline;
pub mod schema;
pub mod sql_generator;
pub mod visualizer;

pub use error::{DatalensError, Result};
pub use pipeline::{Pipeline, QueryRequest, QueryResponse};
