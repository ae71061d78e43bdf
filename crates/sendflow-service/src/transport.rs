//! reqwest-backed transport adapter.
//!
//! Owns the connection pool and TLS context; the orchestrator only sees
//! the [`Transport`] trait. Responses are normalized: statuses in
//! `200..400` are successful, bodies are parsed by content type, and
//! connection errors or timeouts become failed results rather than
//! propagated errors.

use async_trait::async_trait;
use sendflow_core::descriptor::{BuiltRequest, HttpMethod};
use sendflow_core::transport::{
    ErrorKind, ResponseBody, ResponseMetadata, Transport, TransportResult,
};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;

/// Idle connections kept per host, matching the pool the system was tuned for
const POOL_MAX_IDLE_PER_HOST: usize = 30;

const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Options => reqwest::Method::OPTIONS,
    }
}

/// Production transport over a pooled reqwest client
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build the transport with its connection pool.
    ///
    /// # Errors
    ///
    /// Fails only when the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    async fn parse_response(
        &self,
        request: &BuiltRequest,
        response: reqwest::Response,
        started: Instant,
    ) -> TransportResult {
        let status = response.status();
        let success = status.as_u16() >= 200 && status.as_u16() < 400;
        let url = response.url().to_string();

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let content_type = headers
            .get("content-type")
            .cloned()
            .unwrap_or_default()
            .to_lowercase();
        let content_length = headers
            .get("content-length")
            .and_then(|v| v.parse::<u64>().ok());

        let body = match response.bytes().await {
            Ok(bytes) => Some(classify_body(&content_type, &bytes)),
            Err(err) => {
                warn!(%err, "Failed to read response body");
                None
            }
        };

        TransportResult {
            success,
            status_code: Some(status.as_u16()),
            headers: Some(headers),
            body,
            url,
            method: request.method.as_str().to_string(),
            duration: started.elapsed().as_secs_f64(),
            error: (!success).then(|| format!("HTTP {}", status.as_u16())),
            error_kind: None,
            metadata: Some(ResponseMetadata {
                content_length,
                content_type: Some(content_type),
            }),
            redirects: None,
        }
    }

    /// Stream a response body to a file.
    ///
    /// Auxiliary operation used by operator tooling; not part of the
    /// orchestrated pipeline.
    pub async fn download_file(&self, url: &str, path: &Path) -> DownloadReport {
        use futures::StreamExt;

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(err) => return DownloadReport::failed(err.to_string()),
        };
        if !response.status().is_success() {
            return DownloadReport::failed(format!("HTTP {}", response.status().as_u16()));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let file = match tokio::fs::File::create(path).await {
            Ok(file) => file,
            Err(err) => return DownloadReport::failed(err.to_string()),
        };
        let mut file = tokio::io::BufWriter::new(file);
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => return DownloadReport::failed(err.to_string()),
            };
            if let Err(err) = tokio::io::AsyncWriteExt::write_all(&mut file, &chunk).await {
                return DownloadReport::failed(err.to_string());
            }
            downloaded += chunk.len() as u64;
        }
        if let Err(err) = tokio::io::AsyncWriteExt::flush(&mut file).await {
            return DownloadReport::failed(err.to_string());
        }

        debug!(url, bytes = downloaded, "Download complete");
        DownloadReport {
            success: true,
            file_path: Some(path.display().to_string()),
            size: downloaded,
            content_type,
            error: None,
        }
    }

    /// Probe DNS resolution, TCP connect, and an HTTP HEAD for a URL.
    ///
    /// Auxiliary operation used by operator tooling.
    pub async fn test_connectivity(&self, url: &str) -> ConnectivityReport {
        let started = Instant::now();

        let parsed = match url::Url::parse(url) {
            Ok(parsed) => parsed,
            Err(err) => return ConnectivityReport::failed(format!("Invalid URL: {}", err)),
        };
        let host = match parsed.host_str() {
            Some(host) => host.to_string(),
            None => return ConnectivityReport::failed("URL has no host".to_string()),
        };
        let port = parsed
            .port()
            .unwrap_or(if parsed.scheme() == "https" { 443 } else { 80 });

        let dns_started = Instant::now();
        let addresses: Vec<std::net::SocketAddr> =
            match tokio::net::lookup_host((host.as_str(), port)).await {
                Ok(addresses) => addresses.collect(),
                Err(err) => {
                    return ConnectivityReport::failed(format!("DNS resolution failed: {}", err))
                }
            };
        let dns_seconds = dns_started.elapsed().as_secs_f64();

        let tcp_started = Instant::now();
        let mut connected = false;
        for address in &addresses {
            let attempt = tokio::time::timeout(
                std::time::Duration::from_secs(5),
                tokio::net::TcpStream::connect(address),
            )
            .await;
            if matches!(attempt, Ok(Ok(_))) {
                connected = true;
                break;
            }
        }
        if !connected {
            return ConnectivityReport {
                success: false,
                dns_seconds: Some(dns_seconds),
                error: Some("TCP connection failed to all addresses".to_string()),
                ..ConnectivityReport::default()
            };
        }
        let tcp_seconds = tcp_started.elapsed().as_secs_f64();

        let http_started = Instant::now();
        let probe = BuiltRequest {
            method: HttpMethod::Head,
            url: url.to_string(),
            headers: Default::default(),
            body: None,
            timeout_seconds: 10.0,
        };
        let result = self.send(&probe).await;

        ConnectivityReport {
            success: result.success,
            total_seconds: Some(started.elapsed().as_secs_f64()),
            dns_seconds: Some(dns_seconds),
            tcp_seconds: Some(tcp_seconds),
            http_seconds: Some(http_started.elapsed().as_secs_f64()),
            ip_addresses: addresses.iter().map(|a| a.ip().to_string()).collect(),
            status_code: result.status_code,
            error: result.error,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &BuiltRequest) -> TransportResult {
        let started = Instant::now();

        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), &request.url)
            .timeout(request.timeout());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        match builder.send().await {
            Ok(response) => self.parse_response(request, response, started).await,
            Err(err) => {
                let duration = started.elapsed().as_secs_f64();
                if err.is_timeout() {
                    TransportResult::failure(request, duration, "Request timeout", ErrorKind::Timeout)
                } else if err.is_connect() || err.is_request() {
                    TransportResult::failure(
                        request,
                        duration,
                        err.to_string(),
                        ErrorKind::ClientError,
                    )
                } else {
                    TransportResult::failure(request, duration, err.to_string(), ErrorKind::Unknown)
                }
            }
        }
    }
}

/// Classify a response payload by content type
fn classify_body(content_type: &str, bytes: &[u8]) -> ResponseBody {
    if content_type.contains("application/json") {
        match serde_json::from_slice(bytes) {
            Ok(value) => ResponseBody::Json(value),
            Err(_) => ResponseBody::Binary(bytes.to_vec()),
        }
    } else if content_type.starts_with("text/") || content_type.contains("xml") {
        match std::str::from_utf8(bytes) {
            Ok(text) => ResponseBody::Text(text.to_string()),
            Err(_) => ResponseBody::Binary(bytes.to_vec()),
        }
    } else {
        ResponseBody::Binary(bytes.to_vec())
    }
}

/// Outcome of a file download
#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub success: bool,
    pub file_path: Option<String>,
    pub size: u64,
    pub content_type: Option<String>,
    pub error: Option<String>,
}

impl DownloadReport {
    fn failed(error: String) -> Self {
        Self {
            success: false,
            file_path: None,
            size: 0,
            content_type: None,
            error: Some(error),
        }
    }
}

/// Outcome of a connectivity probe
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectivityReport {
    pub success: bool,
    pub total_seconds: Option<f64>,
    pub dns_seconds: Option<f64>,
    pub tcp_seconds: Option<f64>,
    pub http_seconds: Option<f64>,
    pub ip_addresses: Vec<String>,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

impl ConnectivityReport {
    fn failed(error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
            ..Self::default()
        }
    }
}
