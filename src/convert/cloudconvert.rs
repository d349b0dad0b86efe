//! CloudConvert v2 job API client

use super::{
    classify_failure, validate_job_id, ConversionGateway, ConversionJob, ConversionType, ConvertedFile, JobStatus,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

/// Gateway settings
#[derive(Debug, Clone)]
pub struct CloudConvertConfig {
    /// API base (default: `https://api.cloudconvert.com/v2`)
    pub api_url: String,
    pub api_key: String,
    /// Delay between job status polls
    pub poll_interval: Duration,
    /// Hard ceiling on waiting for a job
    pub timeout: Duration,
}

impl CloudConvertConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_url: "https://api.cloudconvert.com/v2".to_string(),
            api_key: api_key.into(),
            poll_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    data: JobData,
}

#[derive(Debug, Deserialize)]
struct JobData {
    id: String,
    status: String,
    #[serde(default)]
    tasks: Vec<TaskData>,
}

#[derive(Debug, Deserialize)]
struct TaskData {
    #[serde(default)]
    operation: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    result: Option<TaskResult>,
}

#[derive(Debug, Default, Deserialize)]
struct TaskResult {
    #[serde(default)]
    form: Option<UploadForm>,
    #[serde(default)]
    files: Vec<ResultFile>,
}

#[derive(Debug, Deserialize)]
struct UploadForm {
    url: String,
    #[serde(default)]
    parameters: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ResultFile {
    #[serde(default)]
    filename: Option<String>,
    url: String,
}

impl JobData {
    fn export_file(&self) -> Option<&ResultFile> {
        self.tasks
            .iter()
            .filter(|t| t.operation == "export/url" && t.status == "finished")
            .find_map(|t| t.result.as_ref()?.files.first())
    }

    fn failure_message(&self) -> String {
        self.tasks
            .iter()
            .find(|t| t.status == "error")
            .and_then(|t| t.message.clone())
            .unwrap_or_else(|| "Conversion failed".to_string())
    }

    fn snapshot(&self) -> ConversionJob {
        let status = JobStatus::from_remote(&self.status);
        let finished = self.tasks.iter().filter(|t| t.status == "finished").count();
        let progress = if status == JobStatus::Finished {
            100
        } else {
            ((finished as f64 / self.tasks.len().max(1) as f64) * 100.0).round() as u8
        };

        ConversionJob {
            id: self.id.clone(),
            status,
            progress,
            result_url: match status {
                JobStatus::Finished => self.export_file().map(|f| f.url.clone()),
                _ => None,
            },
            error: match status {
                JobStatus::Error => Some(self.failure_message()),
                _ => None,
            },
        }
    }
}

/// [`ConversionGateway`] backed by the CloudConvert REST API
pub struct CloudConvertGateway {
    client: reqwest::Client,
    config: CloudConvertConfig,
}

impl CloudConvertGateway {
    pub fn new(client: reqwest::Client, config: CloudConvertConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn read(response: reqwest::Response) -> Result<JobData> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(body);
            return Err(classify_failure(
                format!("{} ({})", message, status),
                Some(status.as_u16()),
            ));
        }
        Ok(response.json::<Envelope>().await?.data)
    }

    async fn create_job(&self, tasks: Value) -> Result<JobData> {
        let response = self
            .client
            .post(self.endpoint("jobs"))
            .bearer_auth(&self.config.api_key)
            .json(&json!({ "tasks": tasks }))
            .send()
            .await?;
        Self::read(response).await
    }

    async fn get_job(&self, job_id: &str) -> Result<JobData> {
        validate_job_id(job_id)?;
        let response = self
            .client
            .get(self.endpoint(&format!("jobs/{}", job_id)))
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;
        Self::read(response).await
    }

    async fn upload(&self, form: &UploadForm, data: Vec<u8>, filename: &str) -> Result<()> {
        let mut multipart = reqwest::multipart::Form::new();
        for (name, value) in &form.parameters {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            multipart = multipart.text(name.clone(), value);
        }
        multipart = multipart.part(
            "file",
            reqwest::multipart::Part::bytes(data).file_name(filename.to_string()),
        );

        let response = self.client.post(&form.url).multipart(multipart).send().await?;
        let status = response.status();
        if !status.is_success() && !status.is_redirection() {
            return Err(classify_failure(
                format!("upload rejected with status {}", status),
                Some(status.as_u16()),
            ));
        }
        Ok(())
    }

    /// Poll until the job is terminal or the timeout passes
    async fn wait(&self, job_id: &str) -> Result<JobData> {
        let started = tokio::time::Instant::now();
        loop {
            let job = self.get_job(job_id).await?;
            match JobStatus::from_remote(&job.status) {
                JobStatus::Finished => return Ok(job),
                JobStatus::Error => return Err(classify_failure(job.failure_message(), None)),
                status => {
                    tracing::debug!(job_id, ?status, "conversion job still running");
                }
            }

            if started.elapsed() >= self.config.timeout {
                return Err(Error::ConversionTimeout {
                    job_id: job_id.to_string(),
                    seconds: self.config.timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

fn job_tasks(import: Value, kind: ConversionType) -> Value {
    json!({
        "import-file": import,
        "convert-file": {
            "operation": "convert",
            "input": "import-file",
            "input_format": kind.input_format(),
            "output_format": kind.output_format(),
        },
        "export-file": {
            "operation": "export/url",
            "input": "convert-file",
        },
    })
}

#[async_trait]
impl ConversionGateway for CloudConvertGateway {
    async fn convert_bytes(
        &self,
        data: Vec<u8>,
        filename: &str,
        kind: ConversionType,
    ) -> Result<ConvertedFile> {
        let job = self
            .create_job(job_tasks(json!({ "operation": "import/upload" }), kind))
            .await?;
        tracing::info!(job_id = %job.id, kind = kind.as_str(), "created conversion job");

        let form = job
            .tasks
            .iter()
            .filter(|t| t.operation == "import/upload")
            .find_map(|t| t.result.as_ref()?.form.as_ref())
            .ok_or_else(|| Error::Conversion {
                reason: "Failed to get upload URL from conversion service".to_string(),
            })?;
        self.upload(form, data, filename).await?;

        let finished = self.wait(&job.id).await?;
        let file = finished.export_file().ok_or_else(|| Error::Conversion {
            reason: "Conversion failed - no output file".to_string(),
        })?;

        let response = self.client.get(&file.url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Conversion {
                reason: format!("result download returned status {}", response.status()),
            });
        }
        let data = response.bytes().await?.to_vec();

        tracing::info!(job_id = %job.id, size = data.len(), "conversion finished");

        Ok(ConvertedFile {
            data,
            filename: file.filename.clone(),
        })
    }

    async fn create_url_job(&self, url: &str, kind: ConversionType) -> Result<ConversionJob> {
        let job = self
            .create_job(job_tasks(
                json!({ "operation": "import/url", "url": url }),
                kind,
            ))
            .await?;
        tracing::info!(job_id = %job.id, kind = kind.as_str(), "created url conversion job");
        Ok(job.snapshot())
    }

    async fn job_status(&self, job_id: &str) -> Result<ConversionJob> {
        Ok(self.get_job(job_id).await?.snapshot())
    }
}
