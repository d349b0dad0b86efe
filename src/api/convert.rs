//! `POST /api/convert` and `GET /api/convert?jobId=`

use super::{output_name, params, parse_body, require, success, ApiResult};
use crate::convert::{validate_job_id, ConversionGateway, ConversionJob, ConversionType};
use crate::error::{Error, Result};
use crate::server::AppState;
use crate::storage::{content_type_for, original_name_from_key};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct StartParams {
    url: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default, rename = "async")]
    run_async: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConvertResult {
    download_url: String,
    filename: String,
    original_filename: String,
    #[serde(rename = "type")]
    kind: &'static str,
    input_format: &'static str,
    output_format: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartedJob {
    #[serde(flatten)]
    job: ConversionJob,
    #[serde(rename = "type")]
    kind: &'static str,
}

pub async fn start(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    run_start(&state, &body)
        .await
        .map_err(|e| state.reject("convert", e))
}

async fn run_start(state: &AppState, body: &[u8]) -> Result<Json<Value>> {
    let params: StartParams = params(parse_body(body)?)?;
    let url = require(params.url, "File URL is required")?;
    let kind = ConversionType::parse(&require(params.kind, "Conversion type is required")?)?;
    let gateway = gateway(state)?;

    if params.run_async {
        let job = gateway.create_url_job(&url, kind).await?;
        tracing::info!(job_id = %job.id, kind = kind.as_str(), "submitted conversion job");
        return success(StartedJob {
            job,
            kind: kind.as_str(),
        });
    }

    let source = state.fetcher.fetch(&url).await?;
    let original_filename = source
        .file_name()
        .map(|name| {
            original_name_from_key(&name)
                .map(str::to_string)
                .unwrap_or(name)
        })
        .unwrap_or_else(|| format!("file.{}", kind.input_format()));

    let converted = gateway
        .convert_bytes(source.data, &original_filename, kind)
        .await?;

    let filename = output_name("converted", kind.output_format());
    let stored = state
        .store
        .put(
            &filename,
            converted.data,
            content_type_for(kind.output_format()),
        )
        .await?;
    tracing::info!(
        kind = kind.as_str(),
        size = stored.size,
        key = %stored.key,
        "conversion complete"
    );

    success(ConvertResult {
        download_url: stored.url,
        filename,
        original_filename,
        kind: kind.as_str(),
        input_format: kind.input_format(),
        output_format: kind.output_format(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    job_id: Option<String>,
}

pub async fn status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<Value>> {
    run_status(&state, query)
        .await
        .map_err(|e| state.reject("convert status", e))
}

async fn run_status(state: &AppState, query: StatusQuery) -> Result<Json<Value>> {
    let job_id = require(query.job_id, "Job ID is required")?;
    validate_job_id(&job_id)?;
    let job = gateway(state)?.job_status(&job_id).await?;
    success(job)
}

fn gateway(state: &AppState) -> Result<&Arc<dyn ConversionGateway>> {
    state.gateway.as_ref().ok_or_else(|| Error::NotConfigured {
        feature: "CloudConvert API key".to_string(),
    })
}
