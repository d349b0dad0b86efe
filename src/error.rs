//! Error types for the OptiNexus service

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for the OptiNexus service
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the OptiNexus service
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid request parameter
    #[error("{message}")]
    Validation { message: String },

    /// Cleanup trigger without a valid bearer token or scheduler header
    #[error("Unauthorized")]
    Unauthorized,

    /// Password gate mismatch
    #[error("Incorrect password")]
    IncorrectPassword,

    /// Multipart body that could not be decoded
    #[error("Invalid upload: {reason}")]
    InvalidUpload { reason: String },

    /// Multipart body over the request size limit
    #[error("Upload too large: {reason}")]
    UploadTooLarge { reason: String },

    /// Stored object or remote file not found
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Input is not a readable PDF
    #[error("Not a readable PDF: {reason}")]
    InvalidPdf { reason: String },

    /// Input bytes could not be decoded as an image
    #[error("Invalid image: {reason}")]
    InvalidImage { reason: String },

    /// Malformed or out-of-bounds page selection
    #[error("Invalid page range: {range}")]
    InvalidPageRange { range: String },

    /// Source URL could not be fetched
    #[error("Failed to fetch source: {reason}")]
    SourceFetch { reason: String },

    /// Source host resolves to a private or reserved address
    #[error("Private address blocked: {url}")]
    SsrfBlocked { url: String },

    /// Source body over the download limit
    #[error("Source is {size} bytes, limit is {max_size}")]
    DownloadTooLarge { size: u64, max_size: u64 },

    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure inside qpdf after the input was accepted
    #[error("qpdf failed: {reason}")]
    QpdfError { reason: String },

    /// lopdf error while editing page dictionaries
    #[error("PDF edit error: {0}")]
    PdfEdit(#[from] lopdf::Error),

    /// Image codec or processing error
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Storage backend error
    #[error("Storage error: {reason}")]
    Storage { reason: String },

    /// External conversion service error
    #[error("Conversion service error: {reason}")]
    Conversion { reason: String },

    /// External conversion service refused the job for quota reasons
    #[error("Conversion quota exhausted: {reason}")]
    QuotaExhausted { reason: String },

    /// Conversion job did not reach a terminal state in time
    #[error("Conversion job {job_id} timed out after {seconds}s")]
    ConversionTimeout { job_id: String, seconds: u64 },

    /// A feature needs configuration that is missing
    #[error("{feature} is not configured")]
    NotConfigured { feature: String },

    /// Blocking worker panicked or was cancelled
    #[error("Task join error: {reason}")]
    Task { reason: String },
}

impl Error {
    /// Shorthand for a validation failure
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    /// HTTP status the error maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation { .. }
            | Error::InvalidPdf { .. }
            | Error::InvalidImage { .. }
            | Error::InvalidUpload { .. }
            | Error::InvalidPageRange { .. }
            | Error::SourceFetch { .. }
            | Error::SsrfBlocked { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthorized | Error::IncorrectPassword => StatusCode::UNAUTHORIZED,
            Error::QuotaExhausted { .. } => StatusCode::PAYMENT_REQUIRED,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::DownloadTooLarge { .. } | Error::UploadTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            Error::HttpRequest(_)
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::QpdfError { .. }
            | Error::PdfEdit(_)
            | Error::Image(_)
            | Error::Storage { .. }
            | Error::Conversion { .. }
            | Error::ConversionTimeout { .. }
            | Error::NotConfigured { .. }
            | Error::Task { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to clients; internal detail stays in the logs
    pub fn client_message(&self) -> String {
        match self {
            Error::Validation { message } => message.clone(),
            Error::Unauthorized => "Unauthorized".to_string(),
            Error::IncorrectPassword => "Incorrect password".to_string(),
            Error::NotFound { .. } => "File not found".to_string(),
            Error::InvalidPdf { .. } => "Invalid PDF file".to_string(),
            Error::InvalidImage { .. } => "Unsupported or corrupt image".to_string(),
            Error::InvalidUpload { reason } => format!("Invalid upload: {}", reason),
            Error::UploadTooLarge { .. } => "Upload exceeds the maximum request size".to_string(),
            Error::InvalidPageRange { range } => format!("Invalid page range: {}", range),
            Error::SourceFetch { .. } => "Failed to download file from URL".to_string(),
            Error::SsrfBlocked { .. } => "URL not allowed".to_string(),
            Error::DownloadTooLarge { max_size, .. } => {
                format!("Download exceeds maximum size of {} bytes", max_size)
            }
            Error::HttpRequest(_) => "HTTP request failed".to_string(),
            Error::Io(_) => "I/O error".to_string(),
            Error::Serialization(_) => "Serialization error".to_string(),
            Error::QpdfError { .. } | Error::PdfEdit(_) => "PDF processing error".to_string(),
            Error::Image(_) => "Image processing error".to_string(),
            Error::Storage { .. } => "Storage error".to_string(),
            Error::Conversion { reason } => format!("Conversion failed: {}", reason),
            Error::QuotaExhausted { .. } => "Free limit reached".to_string(),
            Error::ConversionTimeout { .. } => "Conversion timed out".to_string(),
            Error::NotConfigured { feature } => format!("{} is not configured", feature),
            Error::Task { .. } => "Internal server error".to_string(),
        }
    }
}
