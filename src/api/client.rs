use crate::config;
use crate::error::{AppError, AppResult};
use crate::logging::{log, LogLevel};
use crate::model::entity::EntityId;
use crate::utils;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// One GET for one entity's submissions document, decoded as a JSON object.
///
/// Both `Transport` and `Decode` failures are retryable by the caller.
#[async_trait]
pub trait SubmissionFetcher: Send + Sync {
    async fn fetch(&self, id: &EntityId) -> AppResult<Value>;
}

#[derive(Clone)]
pub struct SubmissionsClient {
    client: Client,
    url_template: String,
}

impl SubmissionsClient {
    pub fn new(url_template: &str, user_agent: &str) -> AppResult<Self> {
        let client = Client::builder()
            .default_headers(config::request_headers(user_agent)?)
            .timeout(Duration::from_secs(config::HTTP_TIMEOUT_SECONDS))
            .connect_timeout(Duration::from_secs(config::HTTP_CONNECT_TIMEOUT))
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(SubmissionsClient {
            client,
            url_template: url_template.to_string(),
        })
    }

    pub fn url_for(&self, id: &EntityId) -> String {
        build_url(&self.url_template, id)
    }

    async fn handle_http_error(&self, resp: Response, status: StatusCode, id: &EntityId) -> AppError {
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN {
            log(
                LogLevel::Warning,
                &format!(
                    "API Req [{}] - {} suggests the request rate is too high.",
                    id, status
                ),
            );
        }

        let resp_text = resp
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error body".to_string());
        AppError::Transport(format!(
            "HTTP {} ({}). Body: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown Status"),
            utils::truncate_chars(resp_text.trim(), 150)
        ))
    }

    async fn fetch_raw(&self, id: &EntityId) -> AppResult<Bytes> {
        let url = self.url_for(id);
        log(LogLevel::Debug, &format!("API Req [{}] GET {}", id, url));

        let resp = self.client.get(&url).send().await.map_err(|e| {
            let context_str = if e.is_timeout() {
                "Timeout"
            } else if e.is_connect() {
                "Connection"
            } else {
                "Request"
            };
            AppError::Transport(format!("{} Error: {}", context_str, e))
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(self.handle_http_error(resp, status, id).await);
        }

        resp.bytes()
            .await
            .map_err(|e| AppError::Transport(format!("Error reading response body: {}", e)))
    }
}

#[async_trait]
impl SubmissionFetcher for SubmissionsClient {
    async fn fetch(&self, id: &EntityId) -> AppResult<Value> {
        let bytes = self.fetch_raw(id).await?;
        decode_payload(&bytes)
    }
}

pub fn build_url(template: &str, id: &EntityId) -> String {
    template.replace(config::URL_ID_PLACEHOLDER, id.as_str())
}

/// Parses a body into a JSON object. Anything else is a `Decode` error carrying a snippet.
pub fn decode_payload(bytes: &[u8]) -> AppResult<Value> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(AppError::Decode(format!(
            "Expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(AppError::Decode(format!(
            "{}. Snippet: '{}'",
            e,
            utils::snippet(bytes, 80)
        ))),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
