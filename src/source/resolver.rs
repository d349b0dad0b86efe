//! Resolve a source URL to bytes

use crate::error::{Error, Result};
use crate::storage::BlobStore;
use futures_util::StreamExt;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

/// Redirect hops followed before giving up
const MAX_REDIRECTS: usize = 10;

/// Fetched source data
#[derive(Debug)]
pub struct FetchedSource {
    pub data: Vec<u8>,
    /// The URL the data came from
    pub source_name: String,
    /// Content type reported by the origin, when known
    pub content_type: Option<String>,
}

impl FetchedSource {
    /// Last path segment of the source URL, if any
    pub fn file_name(&self) -> Option<String> {
        url::Url::parse(&self.source_name)
            .ok()?
            .path_segments()?
            .filter(|s| !s.is_empty())
            .last()
            .map(|s| s.to_string())
    }
}

/// Resolves URLs to bytes: objects of the configured store are read directly,
/// anything else is downloaded with SSRF protection and a size limit
#[derive(Clone)]
pub struct SourceFetcher {
    client: reqwest::Client,
    store: Arc<dyn BlobStore>,
    allow_private_urls: bool,
    max_download_bytes: u64,
}

impl SourceFetcher {
    pub fn new(
        store: Arc<dyn BlobStore>,
        allow_private_urls: bool,
        max_download_bytes: u64,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(Error::HttpRequest)?;
        Ok(Self {
            client,
            store,
            allow_private_urls,
            max_download_bytes,
        })
    }

    /// Fetch any source
    pub async fn fetch(&self, url: &str) -> Result<FetchedSource> {
        if self.store.owns(url) {
            let data = self.store.get(url).await?;
            tracing::debug!(url, size = data.len(), "read source from store");
            return Ok(FetchedSource {
                data,
                source_name: url.to_string(),
                content_type: None,
            });
        }
        self.download(url).await
    }

    /// Fetch a source that must be a PDF
    pub async fn fetch_pdf(&self, url: &str) -> Result<FetchedSource> {
        let fetched = self.fetch(url).await?;
        if !is_pdf(&fetched.data) {
            return Err(Error::InvalidPdf {
                reason: format!("{} is not a PDF file", url),
            });
        }
        Ok(fetched)
    }

    async fn download(&self, url: &str) -> Result<FetchedSource> {
        let parsed = parse_http_url(url)?;
        let allow_private = self.allow_private_urls;
        let response = self
            .send_following_redirects(parsed, |hop| async move {
                if allow_private {
                    Ok(())
                } else {
                    ensure_public_host(&hop).await
                }
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::SourceFetch {
                reason: format!("{} returned status {}", url, status),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let data = read_capped(response, self.max_download_bytes)
            .await
            .map_err(|e| match e {
                Error::HttpRequest(e) => Error::SourceFetch {
                    reason: format!("{}: {}", url, e),
                },
                other => other,
            })?;

        tracing::debug!(url, size = data.len(), "downloaded source");
        Ok(FetchedSource {
            data,
            source_name: url.to_string(),
            content_type,
        })
    }

    /// GET `url`, following up to [`MAX_REDIRECTS`] redirects by hand so
    /// that `guard` vets every hop before it is requested
    async fn send_following_redirects<G, F>(
        &self,
        url: url::Url,
        guard: G,
    ) -> Result<reqwest::Response>
    where
        G: Fn(url::Url) -> F,
        F: Future<Output = Result<()>>,
    {
        let mut current = url;
        for _ in 0..=MAX_REDIRECTS {
            guard(current.clone()).await?;
            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| Error::SourceFetch {
                    reason: format!("{}: {}", current, e),
                })?;

            if !response.status().is_redirection() {
                return Ok(response);
            }
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| Error::SourceFetch {
                    reason: format!("{} redirected without a location", current),
                })?;
            let next = current
                .join(location)
                .map_err(|e| Error::validation(format!("Invalid redirect: {}", e)))?;
            tracing::debug!(from = %current, to = %next, "following redirect");
            current = parse_http_url(next.as_str())?;
        }

        Err(Error::SourceFetch {
            reason: format!("too many redirects fetching {}", current),
        })
    }
}

fn parse_http_url(url: &str) -> Result<url::Url> {
    let parsed =
        url::Url::parse(url).map_err(|e| Error::validation(format!("Invalid URL: {}", e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::validation("Only http and https URLs are supported"));
    }
    Ok(parsed)
}

/// Collect a response body, failing once it passes `limit` bytes
pub(crate) async fn read_capped(response: reqwest::Response, limit: u64) -> Result<Vec<u8>> {
    if let Some(declared) = response.content_length().filter(|&len| len > limit) {
        return Err(Error::DownloadTooLarge {
            size: declared,
            max_size: limit,
        });
    }

    let mut body = response.bytes_stream();
    let mut data = Vec::new();
    while let Some(chunk) = body.next().await {
        data.extend_from_slice(&chunk?);
        // Chunked bodies carry no length up front
        let received = data.len() as u64;
        if received > limit {
            return Err(Error::DownloadTooLarge {
                size: received,
                max_size: limit,
            });
        }
    }
    Ok(data)
}

/// `%PDF` magic check
pub fn is_pdf(data: &[u8]) -> bool {
    data.starts_with(b"%PDF")
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    let [first, second, ..] = ip.octets();
    let carrier_grade_nat = first == 100 && (64..128).contains(&second);
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_unspecified()
        || carrier_grade_nat
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    let head = ip.segments()[0];
    let unique_local = head & 0xfe00 == 0xfc00;
    let link_local = head & 0xffc0 == 0xfe80;
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_private_v4(mapped);
    }
    ip.is_loopback() || ip.is_unspecified() || unique_local || link_local
}

/// Loopback, private, link-local, CGNAT and unspecified addresses
fn is_private_ip(ip: &IpAddr) -> bool {
    match *ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => is_private_v6(v6),
    }
}

/// Every address the host resolves to must be public
async fn ensure_public_host(parsed: &url::Url) -> Result<()> {
    let host = parsed
        .host_str()
        .ok_or_else(|| Error::validation("URL has no host"))?
        .trim_start_matches('[')
        .trim_end_matches(']');
    let port = parsed.port_or_known_default().unwrap_or(80);

    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::SourceFetch {
            reason: format!("could not resolve {}: {}", host, e),
        })?;

    if addrs.any(|addr| is_private_ip(&addr.ip())) {
        return Err(Error::SsrfBlocked {
            url: parsed.to_string(),
        });
    }
    Ok(())
}
