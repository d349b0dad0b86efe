//! `POST /api/pdf?action=merge|split|compress|rotate|watermark`

use super::{
    lenient_number, output_name, params, parse_body, require, resolve_action, run_blocking,
    savings, success, ActionQuery, ApiResult,
};
use crate::error::{Error, Result};
use crate::pdf::{
    add_watermark, format_page_range, parse_page_selection, parse_split_ranges, rotate_pages,
    QpdfWrapper, WatermarkOptions, VALID_ANGLES,
};
use crate::server::AppState;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const ACTIONS: &str = "merge, split, compress, rotate, watermark";
const PDF_CONTENT_TYPE: &str = "application/pdf";
const URL_REQUIRED: &str = "PDF URL is required";

pub async fn handle(
    State(state): State<AppState>,
    Query(query): Query<ActionQuery>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let body = parse_body(&body).map_err(|e| state.reject("pdf", e))?;
    let action = resolve_action(&query, &body);

    let result = match action.as_deref() {
        Some("merge") => merge(&state, body).await,
        Some("split") => split(&state, body).await,
        Some("compress") => compress(&state, body).await,
        Some("rotate") => rotate(&state, body).await,
        Some("watermark") => watermark(&state, body).await,
        other => Err(Error::validation(format!(
            "Invalid action: {}. Use: {}",
            other.unwrap_or("none"),
            ACTIONS
        ))),
    };

    result.map_err(|e| state.reject(&format!("pdf {}", action.as_deref().unwrap_or("-")), e))
}

// ============================================================================
// merge
// ============================================================================

#[derive(Debug, Deserialize)]
struct MergeParams {
    #[serde(default)]
    urls: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MergeResult {
    download_url: String,
    filename: String,
    /// Pages in the merged document
    page_count: u32,
    source_count: usize,
}

async fn merge(state: &AppState, body: Value) -> Result<Json<Value>> {
    let params: MergeParams = params(body)?;
    if params.urls.len() < 2 {
        return Err(Error::validation("At least 2 PDF URLs are required"));
    }

    let mut inputs = Vec::with_capacity(params.urls.len());
    for url in &params.urls {
        inputs.push(state.fetcher.fetch_pdf(url).await?.data);
    }

    let (output, page_count) = run_blocking(move || {
        let refs: Vec<&[u8]> = inputs.iter().map(Vec::as_slice).collect();
        let output = QpdfWrapper::merge(&refs)?;
        let page_count = QpdfWrapper::get_page_count(&output)?;
        Ok((output, page_count))
    })
    .await?;

    let filename = output_name("merged", "pdf");
    let stored = state.store.put(&filename, output, PDF_CONTENT_TYPE).await?;
    tracing::info!(sources = params.urls.len(), page_count, key = %stored.key, "merged PDFs");

    success(MergeResult {
        download_url: stored.url,
        filename,
        page_count,
        source_count: params.urls.len(),
    })
}

// ============================================================================
// split
// ============================================================================

#[derive(Debug, Deserialize)]
struct SplitParams {
    url: Option<String>,
    /// Comma-separated groups such as `1-3,5`; empty splits every page
    #[serde(default)]
    ranges: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SplitFile {
    download_url: String,
    filename: String,
    page_range: String,
    pages: Vec<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SplitResult {
    files: Vec<SplitFile>,
    count: usize,
    total_pages: u32,
}

async fn split(state: &AppState, body: Value) -> Result<Json<Value>> {
    let params: SplitParams = params(body)?;
    let url = require(params.url, URL_REQUIRED)?;
    let data = state.fetcher.fetch_pdf(&url).await?.data;

    let ranges = params.ranges;
    let (total_pages, parts) = run_blocking(move || {
        let total = QpdfWrapper::get_page_count(&data)?;
        let groups = parse_split_ranges(ranges.as_deref(), total)?;
        let parts = groups
            .into_iter()
            .map(|pages| Ok((QpdfWrapper::extract_pages(&data, &pages)?, pages)))
            .collect::<Result<Vec<_>>>()?;
        Ok((total, parts))
    })
    .await?;

    // Sequential; outputs stored before a failure are kept
    let mut files = Vec::with_capacity(parts.len());
    for (output, pages) in parts {
        let page_range = format_page_range(&pages);
        let filename = output_name(&format!("split-{}", page_range), "pdf");
        let stored = state.store.put(&filename, output, PDF_CONTENT_TYPE).await?;
        files.push(SplitFile {
            download_url: stored.url,
            filename,
            page_range,
            pages,
        });
    }

    tracing::info!(total_pages, outputs = files.len(), "split PDF");

    success(SplitResult {
        count: files.len(),
        files,
        total_pages,
    })
}

// ============================================================================
// compress
// ============================================================================

#[derive(Debug, Deserialize)]
struct UrlParams {
    url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompressResult {
    download_url: String,
    filename: String,
    original_size: usize,
    compressed_size: usize,
    savings: String,
}

async fn compress(state: &AppState, body: Value) -> Result<Json<Value>> {
    let params: UrlParams = params(body)?;
    let url = require(params.url, URL_REQUIRED)?;
    let data = state.fetcher.fetch_pdf(&url).await?.data;
    let original_size = data.len();

    let output = run_blocking(move || QpdfWrapper::compress(&data)).await?;
    let compressed_size = output.len();

    let filename = output_name("compressed", "pdf");
    let stored = state.store.put(&filename, output, PDF_CONTENT_TYPE).await?;

    success(CompressResult {
        download_url: stored.url,
        filename,
        original_size,
        compressed_size,
        savings: savings(original_size, compressed_size),
    })
}

// ============================================================================
// rotate
// ============================================================================

/// `"all"`, `"1,3"` or `[1, 3]`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
enum PageSelection {
    Text(String),
    List(Vec<u32>),
}

impl Default for PageSelection {
    fn default() -> Self {
        PageSelection::Text("all".to_string())
    }
}

impl PageSelection {
    fn as_text(&self) -> String {
        match self {
            PageSelection::Text(s) => s.clone(),
            PageSelection::List(pages) => pages
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RotateParams {
    url: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    angle: Option<i64>,
    #[serde(default)]
    pages: Option<PageSelection>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RotateResult {
    download_url: String,
    filename: String,
    angle: i64,
    pages: PageSelection,
}

async fn rotate(state: &AppState, body: Value) -> Result<Json<Value>> {
    let params: RotateParams = params(body)?;
    let url = require(params.url, URL_REQUIRED)?;
    let angle = params.angle.unwrap_or(90);
    if !VALID_ANGLES.contains(&angle) {
        return Err(Error::validation(format!(
            "Invalid angle {}. Use one of: 90, 180, 270, -90, -180, -270",
            angle
        )));
    }
    let pages = params.pages.unwrap_or_default();
    let selection = pages.as_text();

    let data = state.fetcher.fetch_pdf(&url).await?.data;
    let output = run_blocking(move || {
        let total = QpdfWrapper::get_page_count(&data)?;
        let selected = parse_page_selection(&selection, total)?;
        rotate_pages(&data, angle, selected.as_deref())
    })
    .await?;

    let filename = output_name("rotated", "pdf");
    let stored = state.store.put(&filename, output, PDF_CONTENT_TYPE).await?;

    success(RotateResult {
        download_url: stored.url,
        filename,
        angle,
        pages,
    })
}

// ============================================================================
// watermark
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WatermarkParams {
    url: Option<String>,
    text: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    opacity: Option<f32>,
    #[serde(default, deserialize_with = "lenient_number")]
    font_size: Option<f32>,
    color: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WatermarkResult {
    download_url: String,
    filename: String,
}

async fn watermark(state: &AppState, body: Value) -> Result<Json<Value>> {
    let params: WatermarkParams = params(body)?;
    let url = require(params.url, URL_REQUIRED)?;

    let defaults = WatermarkOptions::default();
    let options = WatermarkOptions {
        text: params.text.unwrap_or(defaults.text),
        opacity: params.opacity.unwrap_or(defaults.opacity),
        font_size: params.font_size.unwrap_or(defaults.font_size),
        color: params.color.unwrap_or(defaults.color),
    };
    options.validate()?;

    let data = state.fetcher.fetch_pdf(&url).await?.data;
    let output = run_blocking(move || add_watermark(&data, &options)).await?;

    let filename = output_name("watermarked", "pdf");
    let stored = state.store.put(&filename, output, PDF_CONTENT_TYPE).await?;

    success(WatermarkResult {
        download_url: stored.url,
        filename,
    })
}
