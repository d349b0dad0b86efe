//! OptiNexus server library
//!
//! HTTP file-tools service:
//! - PDF merge, split, compress, rotate and watermark (`/api/pdf`)
//! - Image compress, resize, convert and upscale (`/api/image`)
//! - Office document conversion through an external service (`/api/convert`)
//! - Uploads, a download proxy and TTL cleanup over pluggable storage

pub mod api;
pub mod cleanup;
pub mod convert;
pub mod error;
pub mod imaging;
pub mod pdf;
pub mod redact;
pub mod server;
pub mod source;
pub mod storage;

pub use error::{Error, Result};
pub use server::{router, run_server_with_config, AppState, ServerConfig, StorageKind};
