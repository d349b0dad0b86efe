//! Object storage for uploads and transform outputs
//!
//! Every file the service hands out is a [`StoredObject`] living in one
//! [`BlobStore`] backend. Objects are addressed by URL: the URL returned from
//! [`BlobStore::put`] stays valid until the object is deleted.

mod local;
mod memory;
mod remote;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use remote::{RemoteBlobConfig, RemoteBlobStore};

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

/// A persisted file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Backend key (pathname)
    pub key: String,
    /// Stable public URL
    pub url: String,
    /// MIME type recorded at upload
    pub content_type: String,
    /// Size in bytes
    pub size: u64,
    /// Creation time, used for TTL expiry
    pub created_at: DateTime<Utc>,
}

/// One page of a listing
#[derive(Debug, Default)]
pub struct ObjectPage {
    pub objects: Vec<StoredObject>,
    /// Cursor for the next page, `None` on the last page
    pub cursor: Option<String>,
}

/// Storage backend
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Persist `data` under a fresh key derived from `filename`
    async fn put(&self, filename: &str, data: Vec<u8>, content_type: &str)
        -> Result<StoredObject>;

    /// Whether `url` points at an object of this store
    fn owns(&self, url: &str) -> bool;

    /// Read an object this store owns
    async fn get(&self, url: &str) -> Result<Vec<u8>>;

    /// Delete an object this store owns
    async fn delete(&self, url: &str) -> Result<()>;

    /// List objects, one page at a time
    async fn list(&self, cursor: Option<&str>) -> Result<ObjectPage>;
}

/// Build a collision-resistant key: `{unix_millis}-{8 hex}-{sanitized name}`
pub fn generate_key(filename: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", millis, &random[..8], sanitize_filename(filename))
}

/// Reduce a client-supplied file name to a safe single path component
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Creation time encoded in a generated key
pub fn created_at_from_key(key: &str) -> Option<DateTime<Utc>> {
    let millis: i64 = key.split('-').next()?.parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

/// Original file name embedded in a generated key
pub fn original_name_from_key(key: &str) -> Option<&str> {
    let mut parts = key.splitn(3, '-');
    let ts = parts.next()?;
    let _random = parts.next()?;
    let name = parts.next()?;
    if ts.chars().all(|c| c.is_ascii_digit()) && !name.is_empty() {
        Some(name)
    } else {
        None
    }
}

/// MIME type for a file extension
pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "doc" => "application/msword",
        "ppt" => "application/vnd.ms-powerpoint",
        "webp" => "image/webp",
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

/// URL layout shared by the local and memory backends:
/// `{base}/uploads/{key}`
#[derive(Debug, Clone)]
pub(crate) struct UploadsPath {
    prefix: String,
}

impl UploadsPath {
    pub(crate) fn new(public_base_url: &str) -> Self {
        Self {
            prefix: format!("{}/uploads/", public_base_url.trim_end_matches('/')),
        }
    }

    pub(crate) fn url_for(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Key for an owned URL. Query strings and fragments are ignored;
    /// keys that could escape the uploads directory are rejected.
    pub(crate) fn key_for(&self, url: &str) -> Option<String> {
        let rest = url.strip_prefix(&self.prefix)?;
        let key = rest.split(['?', '#']).next().unwrap_or_default();
        if is_safe_key(key) {
            Some(key.to_string())
        } else {
            None
        }
    }
}

fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && key != "."
        && key != ".."
        && !key.contains('/')
        && !key.contains('\\')
        && !key.contains('\0')
        && !key.starts_with('.')
}
