//! Upload intake and download proxy

use super::{require, success, ApiResult};
use crate::error::{Error, Result};
use crate::server::AppState;
use crate::storage::{content_type_for, original_name_from_key, sanitize_filename};
use axum::body::Body;
use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
struct UploadResult {
    url: String,
    pathname: String,
    filename: String,
    size: u64,
}

/// `POST /api/upload` (multipart/form-data)
pub async fn upload(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Value>> {
    let mut multipart = multipart.map_err(|rejection| {
        state.reject(
            "upload",
            Error::InvalidUpload {
                reason: format!(
                    "expected multipart/form-data ({})",
                    rejection.body_text()
                ),
            },
        )
    })?;

    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| state.reject("upload", multipart_error(e)))?
    {
        // First part carrying a file name is the upload
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let declared = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| state.reject("upload", multipart_error(e)))?;
        file = Some((name, declared, data));
        break;
    }

    let (name, declared, data) = file.ok_or_else(|| {
        state.reject("upload", Error::validation("No file uploaded"))
    })?;

    store_upload(&state, &name, declared, data.to_vec())
        .await
        .map_err(|e| state.reject("upload", e))
}

fn multipart_error(e: MultipartError) -> Error {
    let reason = e.body_text();
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::UploadTooLarge { reason }
    } else {
        Error::InvalidUpload { reason }
    }
}

async fn store_upload(
    state: &AppState,
    name: &str,
    declared: Option<String>,
    data: Vec<u8>,
) -> Result<Json<Value>> {
    let content_type = declared
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream")
        .unwrap_or_else(|| {
            let extension = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
            content_type_for(extension).to_string()
        });

    let stored = state.store.put(name, data, &content_type).await?;
    tracing::info!(key = %stored.key, size = stored.size, content_type = %content_type, "stored upload");

    success(UploadResult {
        url: stored.url,
        pathname: stored.key,
        filename: name.to_string(),
        size: stored.size,
    })
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    url: Option<String>,
    filename: Option<String>,
}

/// `GET /api/download?url=&filename=`
pub async fn download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    run_download(&state, query)
        .await
        .map_err(|e| state.reject("download", e))
}

async fn run_download(state: &AppState, query: DownloadQuery) -> Result<Response> {
    let url = require(query.url, "URL parameter is required")?;

    let source = state.fetcher.fetch(&url).await.map_err(|e| match e {
        Error::SourceFetch { reason } => Error::NotFound { what: reason },
        other => other,
    })?;

    let name = query
        .filename
        .filter(|f| !f.trim().is_empty())
        .or_else(|| {
            source.file_name().map(|segment| {
                original_name_from_key(&segment)
                    .map(str::to_string)
                    .unwrap_or(segment)
            })
        })
        .unwrap_or_else(|| "download".to_string());

    let size = source.data.len();
    let mut response = Body::from(source.data).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_DISPOSITION, content_disposition(&name));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    Ok(response)
}

/// `attachment; filename="…"` with quotes, backslashes and control characters removed
fn content_disposition(name: &str) -> HeaderValue {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '"' | '\\'))
        .collect();
    let cleaned = if cleaned.trim().is_empty() {
        "download".to_string()
    } else {
        cleaned
    };

    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", cleaned)).unwrap_or_else(|_| {
        HeaderValue::from_str(&format!(
            "attachment; filename=\"{}\"",
            sanitize_filename(&cleaned)
        ))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=\"download\""))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{ServerConfig, StorageKind};
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_content_disposition_strips_quotes_and_controls() {
        let value = content_disposition("re\"port\r\n.pdf");
        assert_eq!(value.to_str().unwrap(), "attachment; filename=\"report.pdf\"");
    }

    #[test]
    fn test_upload_errors_are_redacted() {
        let config = ServerConfig {
            gate_password: Some("hunter2-gate".to_string()),
            storage: StorageKind::Memory,
            ..Default::default()
        };
        let store = Arc::new(MemoryStore::new(&config.public_base_url));
        let state = AppState::new(config, store, None).unwrap();

        let err = state.reject(
            "upload",
            Error::InvalidUpload {
                reason: "field `hunter2-gate` is malformed".to_string(),
            },
        );
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.starts_with("Invalid upload"));
        assert!(!err.message.contains("hunter2-gate"));

        let err = state.reject(
            "upload",
            Error::UploadTooLarge {
                reason: "length limit exceeded".to_string(),
            },
        );
        assert_eq!(err.status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_content_disposition_empty_name() {
        let value = content_disposition("\"\"");
        assert_eq!(value.to_str().unwrap(), "attachment; filename=\"download\"");
    }
}
