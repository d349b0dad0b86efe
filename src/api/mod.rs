//! HTTP handlers
//!
//! Every endpoint answers JSON. Failures are `{success: false, error}` with
//! a status derived from [`Error::status_code`] and a redacted message.

pub mod convert;
pub mod files;
pub mod image;
pub mod pdf;
pub mod system;

use crate::error::{Error, Result};
use crate::server::AppState;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt::Display;
use std::str::FromStr;

/// Error response
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl AppState {
    /// Log a failed operation and turn it into a client response.
    /// Both the log line and the response body are redacted.
    pub fn reject(&self, operation: &str, err: Error) -> ApiError {
        let status = err.status_code();
        let detail = self.redactor.redact(&err.to_string());

        if status.is_server_error() {
            tracing::error!(operation, error = %detail, "request failed");
        } else {
            tracing::warn!(operation, status = status.as_u16(), error = %detail, "request rejected");
        }

        ApiError::new(status, self.redactor.redact(&err.client_message()))
    }
}

/// Successful response: `{success: true, ...body}`
#[derive(Debug, Serialize)]
pub(crate) struct Success<T: Serialize> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

pub(crate) fn success<T: Serialize>(body: T) -> Result<Json<Value>> {
    Ok(Json(serde_json::to_value(Success {
        success: true,
        body,
    })?))
}

/// `?action=` on the transform endpoints
#[derive(Debug, Default, Deserialize)]
pub struct ActionQuery {
    pub action: Option<String>,
}

/// Parse a JSON request body; an empty body is an empty object
pub(crate) fn parse_body(bytes: &[u8]) -> Result<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| Error::validation(format!("Invalid JSON body: {}", e)))?;
    if !value.is_object() {
        return Err(Error::validation("Request body must be a JSON object"));
    }
    Ok(value)
}

/// Action from the query string, falling back to the body's `action` field
pub(crate) fn resolve_action(query: &ActionQuery, body: &Value) -> Option<String> {
    query
        .action
        .clone()
        .filter(|a| !a.is_empty())
        .or_else(|| body.get("action").and_then(Value::as_str).map(str::to_string))
}

/// Deserialize per-action parameters
pub(crate) fn params<T: DeserializeOwned>(body: Value) -> Result<T> {
    serde_json::from_value(body).map_err(|e| Error::validation(format!("Invalid parameters: {}", e)))
}

/// Required, non-blank string parameter
pub(crate) fn require(value: Option<String>, message: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::validation(message))
}

/// Numbers sent either as JSON numbers or as numeric strings.
/// Missing, null and blank values become `None`.
pub(crate) fn lenient_number<'de, D, T>(de: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    match Option::<Value>::deserialize(de)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.to_string().parse::<T>().map(Some).map_err(de::Error::custom),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse::<T>().map(Some).map_err(de::Error::custom)
            }
        }
        Some(other) => Err(de::Error::custom(format!("expected a number, got {}", other))),
    }
}

/// Run CPU-bound work on the blocking pool
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Task {
            reason: format!("Task join error: {}", e),
        })?
}

/// `12.3%` size reduction
pub(crate) fn savings(original: usize, compressed: usize) -> String {
    if original == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", (1.0 - compressed as f64 / original as f64) * 100.0)
}

/// Output file name: `{prefix}-{unix_millis}.{extension}`
pub(crate) fn output_name(prefix: &str, extension: &str) -> String {
    format!(
        "{}-{}.{}",
        prefix,
        chrono::Utc::now().timestamp_millis(),
        extension
    )
}

pub async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "Not found")
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Deserialize)]
    struct Numbers {
        #[serde(default, deserialize_with = "lenient_number")]
        quality: Option<u8>,
        #[serde(default, deserialize_with = "lenient_number")]
        opacity: Option<f32>,
    }

    #[test]
    fn test_lenient_number_accepts_strings() {
        let n: Numbers = params(json!({ "quality": "75", "opacity": 0.5 })).unwrap();
        assert_eq!(n.quality, Some(75));
        assert_eq!(n.opacity, Some(0.5));

        let n: Numbers = params(json!({ "quality": "", "opacity": null })).unwrap();
        assert_eq!(n.quality, None);
        assert_eq!(n.opacity, None);

        let n: Numbers = params(json!({})).unwrap();
        assert_eq!(n.quality, None);
    }

    #[test]
    fn test_lenient_number_rejects_garbage() {
        assert!(params::<Numbers>(json!({ "quality": "high" })).is_err());
        assert!(params::<Numbers>(json!({ "quality": [1] })).is_err());
        assert!(params::<Numbers>(json!({ "quality": 900 })).is_err());
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(b"").unwrap(), json!({}));
        assert_eq!(parse_body(b" {\"a\":1} ").unwrap(), json!({ "a": 1 }));
        assert!(parse_body(b"[1,2]").is_err());
        assert!(parse_body(b"{nope").is_err());
    }

    #[test]
    fn test_resolve_action_prefers_query() {
        let body = json!({ "action": "split" });
        let query = ActionQuery {
            action: Some("merge".into()),
        };
        assert_eq!(resolve_action(&query, &body).as_deref(), Some("merge"));
        assert_eq!(
            resolve_action(&ActionQuery::default(), &body).as_deref(),
            Some("split")
        );
        assert_eq!(resolve_action(&ActionQuery::default(), &json!({})), None);
    }

    #[test]
    fn test_savings() {
        assert_eq!(savings(1000, 877), "12.3%");
        assert_eq!(savings(100, 110), "-10.0%");
        assert_eq!(savings(0, 10), "0.0%");
    }

    #[test]
    fn test_require() {
        assert_eq!(require(Some(" x ".into()), "m").unwrap(), "x");
        assert!(require(Some("  ".into()), "m").is_err());
        assert!(require(None, "URL is required").is_err());
    }
}
