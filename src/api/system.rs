//! Health check, password gate and cleanup trigger

use super::{params, parse_body, success, ApiResult};
use crate::cleanup::sweep;
use crate::error::{Error, Result};
use crate::server::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use subtle::ConstantTimeEq;

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn secure_eq(a: &str, b: &str) -> bool {
    bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

/// `GET /api/health`
pub async fn health() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "OptiNexus API is running",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": timestamp(),
    }))
}

#[derive(Debug, Deserialize)]
struct PasswordParams {
    password: Option<String>,
}

#[derive(Debug, Serialize)]
struct Verified {
    message: &'static str,
}

/// `POST /api/verify-password {password}`
pub async fn verify_password(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    check_password(&state, &body).map_err(|e| state.reject("verify-password", e))
}

fn check_password(state: &AppState, body: &[u8]) -> Result<Json<Value>> {
    let params: PasswordParams = params(parse_body(body)?)?;
    let password = params
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::validation("Password is required"))?;

    let expected = state
        .config
        .gate_password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| Error::NotConfigured {
            feature: "Password verification".to_string(),
        })?;

    if !secure_eq(&password, expected) {
        return Err(Error::IncorrectPassword);
    }
    success(Verified {
        message: "Password verified",
    })
}

#[derive(Debug, Serialize)]
struct CleanupStats {
    deleted: u64,
    errors: u64,
    scanned: u64,
    /// `123ms`
    duration: String,
    /// `30m`
    ttl: String,
}

#[derive(Debug, Serialize)]
struct CleanupResult {
    message: &'static str,
    stats: CleanupStats,
    timestamp: String,
}

/// `GET|POST /api/cleanup`
pub async fn cleanup(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    run_cleanup(&state, &headers)
        .await
        .map_err(|e| state.reject("cleanup", e))
}

async fn run_cleanup(state: &AppState, headers: &HeaderMap) -> Result<Json<Value>> {
    authorize_cron(state, headers)?;

    let ttl = state.config.file_ttl;
    tracing::info!(backend = state.store.name(), "starting cleanup");
    let report = sweep(state.store.as_ref(), ttl, Utc::now()).await?;
    tracing::info!(
        deleted = report.deleted,
        errors = report.errors,
        scanned = report.scanned,
        duration_ms = report.duration.as_millis() as u64,
        "cleanup finished"
    );

    success(CleanupResult {
        message: "Cleanup completed",
        stats: CleanupStats {
            deleted: report.deleted,
            errors: report.errors,
            scanned: report.scanned,
            duration: format!("{}ms", report.duration.as_millis()),
            ttl: humantime::format_duration(ttl).to_string(),
        },
        timestamp: timestamp(),
    })
}

/// With a cron secret configured, require `Authorization: Bearer <secret>`
/// or the scheduler header
fn authorize_cron(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let Some(secret) = state.config.cron_secret.as_deref().filter(|s| !s.is_empty()) else {
        return Ok(());
    };

    let bearer_ok = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| secure_eq(token, secret));
    let scheduler = headers.contains_key(state.config.cron_header.as_str());

    if bearer_ok || scheduler {
        Ok(())
    } else {
        Err(Error::Unauthorized)
    }
}
