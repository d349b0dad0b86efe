//! Managed blob store client (Vercel Blob HTTP API)

use super::{generate_key, BlobStore, ObjectPage, StoredObject};
use crate::error::{Error, Result};
use crate::source::resolver::read_capped;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

const API_VERSION: &str = "7";

/// Connection settings for the managed blob store
#[derive(Debug, Clone)]
pub struct RemoteBlobConfig {
    /// API endpoint (default: `https://blob.vercel-storage.com`)
    pub api_url: String,
    /// Read/write token
    pub token: String,
    /// Host suffix of public object URLs
    pub public_host_suffix: String,
    /// Objects per listing page
    pub page_limit: u32,
    /// Largest object [`BlobStore::get`] will read
    pub max_download_bytes: u64,
}

impl RemoteBlobConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            api_url: "https://blob.vercel-storage.com".to_string(),
            token: token.into(),
            public_host_suffix: "blob.vercel-storage.com".to_string(),
            page_limit: 1000,
            max_download_bytes: 100 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PutResponse {
    url: String,
    pathname: String,
    #[serde(default)]
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    blobs: Vec<ListedBlob>,
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedBlob {
    url: String,
    pathname: String,
    #[serde(default)]
    size: u64,
    uploaded_at: DateTime<Utc>,
    #[serde(default)]
    content_type: Option<String>,
}

/// Blob store reached over HTTP with a bearer token
pub struct RemoteBlobStore {
    client: reqwest::Client,
    config: RemoteBlobConfig,
}

impl RemoteBlobStore {
    pub fn new(client: reqwest::Client, config: RemoteBlobConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.config.token)
            .header("x-api-version", API_VERSION)
    }

    async fn check(op: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Storage {
            reason: format!("{} failed with status {}: {}", op, status, body),
        })
    }
}

#[async_trait]
impl BlobStore for RemoteBlobStore {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn put(
        &self,
        filename: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject> {
        let key = generate_key(filename);
        let size = data.len() as u64;

        let response = self
            .authed(self.client.put(self.endpoint(&key)))
            .header("x-content-type", content_type)
            .header("x-add-random-suffix", "0")
            .body(data)
            .send()
            .await?;
        let put: PutResponse = Self::check("blob put", response).await?.json().await?;

        tracing::debug!(pathname = %put.pathname, size, "stored object in blob store");

        Ok(StoredObject {
            key: put.pathname,
            url: put.url,
            content_type: put
                .content_type
                .unwrap_or_else(|| content_type.to_string()),
            size,
            created_at: Utc::now(),
        })
    }

    fn owns(&self, url: &str) -> bool {
        url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.ends_with(&self.config.public_host_suffix)))
            .unwrap_or(false)
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound {
                what: url.to_string(),
            });
        }
        let response = Self::check("blob get", response).await?;
        read_capped(response, self.config.max_download_bytes).await
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let response = self
            .authed(self.client.post(self.endpoint("delete")))
            .json(&serde_json::json!({ "urls": [url] }))
            .send()
            .await?;
        Self::check("blob delete", response).await?;
        Ok(())
    }

    async fn list(&self, cursor: Option<&str>) -> Result<ObjectPage> {
        let mut query: Vec<(&str, String)> = vec![("limit", self.config.page_limit.to_string())];
        if let Some(c) = cursor {
            query.push(("cursor", c.to_string()));
        }

        let response = self
            .authed(self.client.get(self.config.api_url.trim_end_matches('/')))
            .query(&query)
            .send()
            .await?;
        let listed: ListResponse = Self::check("blob list", response).await?.json().await?;

        let objects = listed
            .blobs
            .into_iter()
            .map(|b| {
                let content_type = b.content_type.unwrap_or_else(|| {
                    let ext = b.pathname.rsplit('.').next().unwrap_or_default();
                    super::content_type_for(ext).to_string()
                });
                StoredObject {
                    key: b.pathname,
                    url: b.url,
                    content_type,
                    size: b.size,
                    created_at: b.uploaded_at,
                }
            })
            .collect();

        Ok(ObjectPage {
            objects,
            cursor: if listed.has_more { listed.cursor } else { None },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> RemoteBlobStore {
        let mut config = RemoteBlobConfig::new("vercel_blob_rw_test");
        config.api_url = server.uri();
        config.public_host_suffix = "127.0.0.1".to_string();
        config.page_limit = 2;
        RemoteBlobStore::new(reqwest::Client::new(), config)
    }

    #[tokio::test]
    async fn test_put_sends_token_and_parses_url() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(header("authorization", "Bearer vercel_blob_rw_test"))
            .and(header("x-content-type", "application/pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "url": format!("{}/public/abc.pdf", server.uri()),
                "pathname": "abc.pdf",
                "contentType": "application/pdf"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server);
        let obj = store.put("abc.pdf", b"%PDF".to_vec(), "application/pdf").await.unwrap();
        assert_eq!(obj.key, "abc.pdf");
        assert!(store.owns(&obj.url));
        assert_eq!(obj.size, 4);
    }

    #[tokio::test]
    async fn test_list_follows_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("cursor", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "blobs": [
                    {"url": "https://x.public.blob.vercel-storage.com/c.png", "pathname": "c.png",
                     "size": 3, "uploadedAt": "2024-01-01T00:00:00Z"}
                ],
                "hasMore": false
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "blobs": [
                    {"url": "https://x.public.blob.vercel-storage.com/a.pdf", "pathname": "a.pdf",
                     "size": 1, "uploadedAt": "2024-01-01T00:00:00Z"},
                    {"url": "https://x.public.blob.vercel-storage.com/b.pdf", "pathname": "b.pdf",
                     "size": 2, "uploadedAt": "2024-01-02T00:00:00Z"}
                ],
                "cursor": "page2",
                "hasMore": true
            })))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let first = store.list(None).await.unwrap();
        assert_eq!(first.objects.len(), 2);
        assert_eq!(first.objects[0].content_type, "application/pdf");
        assert_eq!(first.cursor.as_deref(), Some("page2"));

        let second = store.list(first.cursor.as_deref()).await.unwrap();
        assert_eq!(second.objects.len(), 1);
        assert_eq!(second.objects[0].content_type, "image/png");
        assert!(second.cursor.is_none());
    }

    #[tokio::test]
    async fn test_delete_posts_url() {
        let server = MockServer::start().await;
        let target = "https://x.public.blob.vercel-storage.com/a.pdf";
        Mock::given(method("POST"))
            .and(path("/delete"))
            .and(body_json(serde_json::json!({ "urls": [target] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        store_for(&server).delete(target).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_respects_download_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/public/big.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/public/small.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF".to_vec()))
            .mount(&server)
            .await;

        let mut store = store_for(&server);
        store.config.max_download_bytes = 1024;

        let err = store
            .get(&format!("{}/public/big.pdf", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DownloadTooLarge { max_size: 1024, .. }));

        let data = store.get(&format!("{}/public/small.pdf", server.uri())).await.unwrap();
        assert_eq!(data, b"%PDF");
    }

    #[tokio::test]
    async fn test_error_status_is_storage_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let err = store_for(&server).delete("https://x/a.pdf").await.unwrap_err();
        assert!(matches!(err, Error::Storage { .. }));
    }
}
