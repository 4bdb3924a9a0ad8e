//! HTTP front door for the datalens pipeline
//! Minimal HTTP handling over raw tokio; the pipeline does the real work.

use datalens::config::Config;
use datalens::llm::LlmClient;
use datalens::pipeline::{Pipeline, QueryRequest};
use datalens::DatalensError;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};

struct ServerState {
    pipeline: Pipeline,
    production: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let pool = datalens::db::init_pool(&config.database_url).await?;
    info!("connected to PostgreSQL");

    let llm = LlmClient::gemini(config.gemini_api_key.clone(), config.gemini_base_url.clone());
    let state = Arc::new(ServerState {
        pipeline: Pipeline::new(pool, llm, config.sample_limit),
        production: config.production,
    });

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("listening on port {}", config.port);

    loop {
        let (stream, addr) = listener.accept().await?;
        info!("connection from {}", addr);
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                error!("connection error: {}", e);
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, state: Arc<ServerState>) -> std::io::Result<()> {
    let request = match read_request(&mut stream).await? {
        Some(request) => request,
        None => {
            stream
                .write_all(http_response(400, r#"{"error":"bad request"}"#).as_bytes())
                .await?;
            return Ok(());
        }
    };

    let response = route(&request, &state).await;
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

struct HttpRequest {
    method: String,
    path: String,
    body: String,
}

/// Read one HTTP request: headers up to the blank line, then a
/// Content-Length-delimited body.
async fn read_request(stream: &mut TcpStream) -> std::io::Result<Option<HttpRequest>> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_header_end(&buffer) {
            break pos;
        }
        if buffer.len() > 64 * 1024 {
            return Ok(None);
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = match lines.next() {
        Some(line) => line,
        None => return Ok(None),
    };
    let mut parts = request_line.split_whitespace();
    let (method, path) = match (parts.next(), parts.next()) {
        (Some(m), Some(p)) => (m.to_string(), p.to_string()),
        _ => return Ok(None),
    };

    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = header_end + 4;
    let mut body = buffer[body_start.min(buffer.len())..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    let path = path.split('?').next().unwrap_or("/").trim_end_matches('/');
    let path = if path.is_empty() { "/" } else { path };

    Ok(Some(HttpRequest {
        method,
        path: path.to_string(),
        body: String::from_utf8_lossy(&body).to_string(),
    }))
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n")
}

async fn route(request: &HttpRequest, state: &ServerState) -> String {
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => http_response(200, r#"{"status":"ok","service":"datalens"}"#),
        ("POST", "/query") => handle_query(&request.body, state).await,
        _ => http_response(404, r#"{"error":"not found"}"#),
    }
}

async fn handle_query(body: &str, state: &ServerState) -> String {
    let request: QueryRequest = match serde_json::from_str(body) {
        Ok(request) => request,
        Err(_) => {
            return http_response(400, r#"{"error":"Provide a JSON body with a prompt field"}"#)
        }
    };

    match state.pipeline.answer(request).await {
        Ok(response) => match serde_json::to_string(&response) {
            Ok(json) => http_response(200, &json),
            Err(e) => {
                error!("failed to serialize response: {}", e);
                http_response(500, r#"{"error":"Internal server error"}"#)
            }
        },
        Err(e) => {
            error!("pipeline failed: {}", e);
            let status = match &e {
                DatalensError::Validation(_) => 400,
                _ => 500,
            };
            let message = if state.production && status == 500 {
                "Internal server error".to_string()
            } else {
                e.to_string()
            };
            let payload = serde_json::json!({ "error": message });
            http_response(status, &payload.to_string())
        }
    }
}

fn http_response(status: u16, body: &str) -> String {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Internal Server Error",
    };
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    )
}
