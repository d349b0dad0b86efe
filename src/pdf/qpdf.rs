//! Page extraction, merging, compression and page counting through the
//! vendored qpdf FFI

use crate::error::{Error, Result};
use qpdf::{ObjectStreamMode, QPdf, QPdfErrorCode};

/// Structural PDF operations backed by qpdf
pub struct QpdfWrapper;

/// A document that fails to load is the caller's fault
fn open(data: &[u8]) -> Result<QPdf> {
    QPdf::read_from_memory(data).map_err(|e| Error::InvalidPdf {
        reason: e.to_string(),
    })
}

fn map_qpdf_error(e: qpdf::QPdfError) -> Error {
    match e.error_code() {
        QPdfErrorCode::InvalidPassword => Error::InvalidPdf {
            reason: "PDF is password protected".to_string(),
        },
        _ => Error::QpdfError {
            reason: e.to_string(),
        },
    }
}

/// Serialize without carrying over any source encryption
fn write_plain(doc: &QPdf) -> Result<Vec<u8>> {
    let mut writer = doc.writer();
    writer.preserve_encryption(false);
    writer.write_to_memory().map_err(map_qpdf_error)
}

impl QpdfWrapper {
    /// New PDF holding `pages` (1-indexed) of `data`, in the given order
    pub fn extract_pages(data: &[u8], pages: &[u32]) -> Result<Vec<u8>> {
        let source = open(data)?;
        let total = source.get_num_pages().map_err(map_qpdf_error)?;
        let output = QPdf::empty();

        for &number in pages {
            let page = number
                .checked_sub(1)
                .and_then(|idx| source.get_page(idx))
                .ok_or_else(|| Error::InvalidPageRange {
                    range: format!("page {} out of range (1-{})", number, total),
                })?;
            output
                .add_page(&output.copy_from_foreign(&page), false)
                .map_err(map_qpdf_error)?;
        }

        write_plain(&output)
    }

    /// Concatenate every page of `inputs`, in input order
    pub fn merge(inputs: &[&[u8]]) -> Result<Vec<u8>> {
        if inputs.is_empty() {
            return Err(Error::validation("No input PDFs provided"));
        }

        let output = QPdf::empty();
        for (position, data) in inputs.iter().enumerate() {
            let source = QPdf::read_from_memory(data).map_err(|e| Error::InvalidPdf {
                reason: format!("input {} could not be read: {}", position + 1, e),
            })?;
            for page in source.get_pages().map_err(map_qpdf_error)? {
                output
                    .add_page(&output.copy_from_foreign(&page), false)
                    .map_err(map_qpdf_error)?;
            }
        }

        write_plain(&output)
    }

    /// Rewrite with generated object streams, compressed streams and
    /// unreferenced objects dropped
    pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
        let doc = open(data)?;
        let mut writer = doc.writer();
        writer
            .object_stream_mode(ObjectStreamMode::Generate)
            .compress_streams(true)
            .normalize_content(true)
            .preserve_unreferenced_objects(false)
            .preserve_encryption(false);
        writer.write_to_memory().map_err(map_qpdf_error)
    }

    pub fn get_page_count(data: &[u8]) -> Result<u32> {
        open(data)?.get_num_pages().map_err(map_qpdf_error)
    }
}
