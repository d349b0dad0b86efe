//! `POST /api/image?action=compress|resize|convert|upscale`

use super::{
    lenient_number, output_name, params, parse_body, require, resolve_action, run_blocking,
    savings, success, ActionQuery, ApiResult,
};
use crate::error::{Error, Result};
use crate::imaging::{
    self, CompressOptions, FitMode, OutputFormat, ProcessedImage, ResizeOptions,
};
use crate::server::AppState;
use crate::storage::StoredObject;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const ACTIONS: &str = "compress, resize, convert, upscale";
const URL_REQUIRED: &str = "Image URL is required";

pub async fn handle(
    State(state): State<AppState>,
    Query(query): Query<ActionQuery>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let body = parse_body(&body).map_err(|e| state.reject("image", e))?;
    let action = resolve_action(&query, &body);

    let result = match action.as_deref() {
        Some("compress") => compress(&state, body).await,
        Some("resize") => resize(&state, body).await,
        Some("convert") => convert(&state, body).await,
        Some("upscale") => upscale(&state, body).await,
        other => Err(Error::validation(format!(
            "Invalid action: {}. Use: {}",
            other.unwrap_or("none"),
            ACTIONS
        ))),
    };

    result.map_err(|e| state.reject(&format!("image {}", action.as_deref().unwrap_or("-")), e))
}

async fn fetch_image(state: &AppState, url: &str) -> Result<Vec<u8>> {
    Ok(state.fetcher.fetch(url).await?.data)
}

async fn store(state: &AppState, filename: &str, image: ProcessedImage) -> Result<StoredObject> {
    state
        .store
        .put(filename, image.data, image.format.content_type())
        .await
}

// ============================================================================
// compress
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompressParams {
    url: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    quality: Option<u8>,
    format: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    max_width: Option<u32>,
    #[serde(default, deserialize_with = "lenient_number")]
    max_height: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompressResult {
    download_url: String,
    filename: String,
    original_size: usize,
    compressed_size: usize,
    savings: String,
    format: &'static str,
}

async fn compress(state: &AppState, body: Value) -> Result<Json<Value>> {
    let params: CompressParams = params(body)?;
    let url = require(params.url, URL_REQUIRED)?;

    let defaults = CompressOptions::default();
    let options = CompressOptions {
        quality: params.quality.unwrap_or(defaults.quality),
        format: match params.format {
            Some(name) => OutputFormat::parse(&name, OutputFormat::COMPRESSIBLE)?,
            None => defaults.format,
        },
        max_width: params.max_width,
        max_height: params.max_height,
    };

    let data = fetch_image(state, &url).await?;
    let original_size = data.len();
    let image = run_blocking(move || imaging::compress(&data, &options)).await?;

    let compressed_size = image.data.len();
    let format = image.format;
    let filename = output_name("compressed", format.extension());
    let stored = store(state, &filename, image).await?;

    success(CompressResult {
        download_url: stored.url,
        filename,
        original_size,
        compressed_size,
        savings: savings(original_size, compressed_size),
        format: format.name(),
    })
}

// ============================================================================
// resize
// ============================================================================

#[derive(Debug, Deserialize)]
struct ResizeParams {
    url: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    width: Option<u32>,
    #[serde(default, deserialize_with = "lenient_number")]
    height: Option<u32>,
    fit: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SizedResult {
    download_url: String,
    filename: String,
    width: u32,
    height: u32,
    format: &'static str,
}

async fn resize(state: &AppState, body: Value) -> Result<Json<Value>> {
    let params: ResizeParams = params(body)?;
    let url = require(params.url, URL_REQUIRED)?;

    let options = ResizeOptions {
        width: params.width,
        height: params.height,
        fit: match params.fit {
            Some(name) => FitMode::parse(&name)?,
            None => FitMode::default(),
        },
    };
    options.validate()?;

    let data = fetch_image(state, &url).await?;
    let image = run_blocking(move || imaging::resize(&data, &options)).await?;

    let (width, height, format) = (image.width, image.height, image.format);
    let filename = output_name(&format!("resized-{}x{}", width, height), format.extension());
    let stored = store(state, &filename, image).await?;

    success(SizedResult {
        download_url: stored.url,
        filename,
        width,
        height,
        format: format.name(),
    })
}

// ============================================================================
// convert
// ============================================================================

#[derive(Debug, Deserialize)]
struct ConvertParams {
    url: Option<String>,
    format: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    quality: Option<u8>,
}

async fn convert(state: &AppState, body: Value) -> Result<Json<Value>> {
    let params: ConvertParams = params(body)?;
    let url = require(params.url, URL_REQUIRED)?;
    let format = OutputFormat::parse(
        params.format.as_deref().unwrap_or("webp"),
        OutputFormat::CONVERTIBLE,
    )?;
    let quality = params.quality.unwrap_or(90);

    let data = fetch_image(state, &url).await?;
    let image = run_blocking(move || imaging::convert(&data, format, quality)).await?;

    let (width, height) = (image.width, image.height);
    let filename = output_name("converted", format.extension());
    let stored = store(state, &filename, image).await?;

    success(SizedResult {
        download_url: stored.url,
        filename,
        width,
        height,
        format: format.name(),
    })
}

// ============================================================================
// upscale
// ============================================================================

#[derive(Debug, Deserialize)]
struct UpscaleParams {
    url: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    scale: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpscaleResult {
    download_url: String,
    filename: String,
    /// `WxH`
    original_dimensions: String,
    new_dimensions: String,
    width: u32,
    height: u32,
    scale: u32,
    format: &'static str,
}

async fn upscale(state: &AppState, body: Value) -> Result<Json<Value>> {
    let params: UpscaleParams = params(body)?;
    let url = require(params.url, URL_REQUIRED)?;
    let scale = params.scale.unwrap_or(2);
    if !matches!(scale, 2 | 4) {
        return Err(Error::validation("Scale must be 2 or 4"));
    }

    let data = fetch_image(state, &url).await?;
    let image = run_blocking(move || imaging::upscale(&data, scale)).await?;

    let (width, height, format) = (image.width, image.height, image.format);
    let filename = output_name(&format!("upscaled-{}x", scale), format.extension());
    let stored = store(state, &filename, image).await?;

    success(UpscaleResult {
        download_url: stored.url,
        filename,
        original_dimensions: format!("{}x{}", width / scale, height / scale),
        new_dimensions: format!("{}x{}", width, height),
        width,
        height,
        scale,
        format: format.name(),
    })
}
