//! Runtime configuration loaded from the environment.

use crate::error::{DatalensError, Result};

pub const DEFAULT_GEMINI_BASE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_SAMPLE_LIMIT: usize = 5;

#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,

    /// Gemini API key.
    pub gemini_api_key: String,

    /// Gemini REST base URL (overridable for tests/proxies).
    pub gemini_base_url: String,

    /// Port for the HTTP front door.
    pub port: u16,

    /// Production mode masks detailed error text in responses.
    pub production: bool,

    /// Max distinct values sampled per text column for the schema report.
    pub sample_limit: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| DatalensError::Validation("DATABASE_URL is not set".to_string()))?;
        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| DatalensError::Validation("GEMINI_API_KEY is not set".to_string()))?;
        let gemini_base_url = std::env::var("GEMINI_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let production = std::env::var("DATALENS_ENV")
            .map(|e| e.eq_ignore_ascii_case("production"))
            .unwrap_or(false);
        let sample_limit = std::env::var("SCHEMA_SAMPLE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SAMPLE_LIMIT);

        Ok(Self {
            database_url,
            gemini_api_key,
            gemini_base_url,
            port,
            production,
            sample_limit,
        })
    }
}
