//! Document conversion through an external job service

mod cloudconvert;

pub use cloudconvert::{CloudConvertConfig, CloudConvertGateway};

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;

/// Supported conversions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionType {
    PdfToDocx,
    PdfToPptx,
    DocxToPdf,
    PptxToPdf,
    DocToPdf,
    PptToPdf,
}

impl ConversionType {
    pub const ALL: [ConversionType; 6] = [
        Self::PdfToDocx,
        Self::PdfToPptx,
        Self::DocxToPdf,
        Self::PptxToPdf,
        Self::DocToPdf,
        Self::PptToPdf,
    ];

    pub fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == name)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(|t| t.as_str()).collect();
                Error::validation(format!(
                    "Invalid conversion type: {}. Valid types: {}",
                    name,
                    valid.join(", ")
                ))
            })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PdfToDocx => "pdf-to-docx",
            Self::PdfToPptx => "pdf-to-pptx",
            Self::DocxToPdf => "docx-to-pdf",
            Self::PptxToPdf => "pptx-to-pdf",
            Self::DocToPdf => "doc-to-pdf",
            Self::PptToPdf => "ppt-to-pdf",
        }
    }

    pub fn input_format(self) -> &'static str {
        match self {
            Self::PdfToDocx | Self::PdfToPptx => "pdf",
            Self::DocxToPdf => "docx",
            Self::PptxToPdf => "pptx",
            Self::DocToPdf => "doc",
            Self::PptToPdf => "ppt",
        }
    }

    pub fn output_format(self) -> &'static str {
        match self {
            Self::PdfToDocx => "docx",
            Self::PdfToPptx => "pptx",
            _ => "pdf",
        }
    }
}

/// Remote job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Waiting,
    Processing,
    Finished,
    Error,
}

impl JobStatus {
    pub fn from_remote(status: &str) -> Self {
        match status {
            "waiting" | "pending" => Self::Waiting,
            "finished" => Self::Finished,
            "error" => Self::Error,
            _ => Self::Processing,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Error)
    }
}

/// Snapshot of a remote conversion job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionJob {
    #[serde(rename = "jobId")]
    pub id: String,
    pub status: JobStatus,
    /// Percentage of finished tasks
    pub progress: u8,
    #[serde(rename = "downloadUrl", skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Output of a completed conversion
#[derive(Debug, Clone)]
pub struct ConvertedFile {
    pub data: Vec<u8>,
    /// File name reported by the service
    pub filename: Option<String>,
}

/// External conversion service
#[async_trait]
pub trait ConversionGateway: Send + Sync {
    /// Upload `data`, wait for the job to finish and download the result
    async fn convert_bytes(
        &self,
        data: Vec<u8>,
        filename: &str,
        kind: ConversionType,
    ) -> Result<ConvertedFile>;

    /// Submit a job that imports `url` itself; returns without waiting
    async fn create_url_job(&self, url: &str, kind: ConversionType) -> Result<ConversionJob>;

    /// Current state of a job
    async fn job_status(&self, job_id: &str) -> Result<ConversionJob>;
}

/// Job ids are path segments of the remote API; only `[A-Za-z0-9_-]` passes
pub fn validate_job_id(job_id: &str) -> Result<()> {
    let well_formed = !job_id.is_empty()
        && job_id.len() <= 64
        && job_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_'));
    if well_formed {
        Ok(())
    } else {
        Err(Error::validation("Invalid job ID"))
    }
}

/// Map a remote failure message to the right error kind
pub(crate) fn classify_failure(message: String, status: Option<u16>) -> Error {
    let lower = message.to_ascii_lowercase();
    if status == Some(402) || lower.contains("quota") || lower.contains("limit") {
        Error::QuotaExhausted { reason: message }
    } else {
        Error::Conversion { reason: message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("job-42", true)]
    #[case("8c2b6f3e-1d7a-4c1e-9f0b-2a6e5d4c3b21", true)]
    #[case("../users/me", false)]
    #[case("abc/def", false)]
    #[case("abc?x=1", false)]
    #[case("%2e%2e", false)]
    #[case("", false)]
    fn test_validate_job_id(#[case] job_id: &str, #[case] ok: bool) {
        assert_eq!(validate_job_id(job_id).is_ok(), ok);
    }

    #[rstest]
    #[case("pdf-to-docx", "pdf", "docx")]
    #[case("pdf-to-pptx", "pdf", "pptx")]
    #[case("docx-to-pdf", "docx", "pdf")]
    #[case("pptx-to-pdf", "pptx", "pdf")]
    #[case("doc-to-pdf", "doc", "pdf")]
    #[case("ppt-to-pdf", "ppt", "pdf")]
    fn test_conversion_formats(#[case] name: &str, #[case] input: &str, #[case] output: &str) {
        let kind = ConversionType::parse(name).unwrap();
        assert_eq!(kind.input_format(), input);
        assert_eq!(kind.output_format(), output);
        assert_eq!(kind.as_str(), name);
    }

    #[test]
    fn test_unknown_type_lists_valid() {
        let err = ConversionType::parse("pdf-to-xlsx").unwrap_err();
        assert!(err.client_message().contains("ppt-to-pdf"));
    }

    #[test]
    fn test_job_status_mapping() {
        assert_eq!(JobStatus::from_remote("pending"), JobStatus::Waiting);
        assert_eq!(JobStatus::from_remote("processing"), JobStatus::Processing);
        assert!(JobStatus::from_remote("finished").is_terminal());
        assert!(JobStatus::from_remote("error").is_terminal());
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure("Payment Required".into(), Some(402)),
            Error::QuotaExhausted { .. }
        ));
        assert!(matches!(
            classify_failure("Conversion minutes limit exceeded".into(), None),
            Error::QuotaExhausted { .. }
        ));
        assert!(matches!(
            classify_failure("engine crashed".into(), Some(500)),
            Error::Conversion { .. }
        ));
    }

    #[test]
    fn test_job_serializes_camel_case() {
        let job = ConversionJob {
            id: "j1".into(),
            status: JobStatus::Finished,
            progress: 100,
            result_url: Some("https://x/out.pdf".into()),
            error: None,
        };
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["jobId"], "j1");
        assert_eq!(value["status"], "finished");
        assert_eq!(value["downloadUrl"], "https://x/out.pdf");
        assert!(value.get("error").is_none());
    }
}
