//! One HTTP round trip per rendered query
//!
//! A [`Transport`] never retries, caches or paginates; it only classifies the
//! outcome so that retry policy stays with the paginator.

use async_trait::async_trait;
use log::{debug, trace};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use std::time::{Duration, Instant};

use crate::api::constants::DEFAULT_BASE_URL;
use crate::api::error::{OdaError, Result};
use crate::api::query::{Page, ResponseFormat, decode_page};

/// Classified result of a single request
#[derive(Debug, Clone, PartialEq)]
pub enum TransportOutcome {
    Success(Page),
    /// Timeout, connection failure, 5xx, 408 or 429: worth retrying
    RetryableFailure(String),
    /// Any other 4xx, or a body that cannot be decoded
    FatalFailure(String),
}

/// Executes one rendered query (relative to the service root)
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn execute(&self, request: &str, timeout: Duration) -> TransportOutcome;
}

/// reqwest-backed transport against the ODA service root
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| OdaError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, request: &str) -> String {
        format!("{}/{}", self.base_url, request.trim_start_matches('/'))
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::with_client(reqwest::Client::new(), DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &str, timeout: Duration) -> TransportOutcome {
        let url = self.url_for(request);
        let format = requested_format(request);
        let started = Instant::now();
        debug!("GET {}", url);

        let response = match self
            .client
            .get(&url)
            .header(ACCEPT, format.accept_header())
            .header(USER_AGENT, concat!("oda-cli/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return classify_request_error(&e),
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return classify_request_error(&e),
        };
        trace!(
            "{} {} in {:?} ({} bytes)",
            status.as_u16(),
            url,
            started.elapsed(),
            body.len()
        );

        if !status.is_success() {
            return classify_status(status, &body);
        }

        let format = content_type
            .as_deref()
            .and_then(format_from_content_type)
            .unwrap_or(format);
        match decode_page(&body, format) {
            Ok(page) => TransportOutcome::Success(page),
            Err(e) => TransportOutcome::FatalFailure(format!("malformed response: {}", e)),
        }
    }
}

/// Format asked for by the rendered `$format` parameter
fn requested_format(request: &str) -> ResponseFormat {
    if request.contains("%24format=atom") {
        ResponseFormat::Atom
    } else {
        ResponseFormat::Json
    }
}

fn format_from_content_type(content_type: &str) -> Option<ResponseFormat> {
    let mime = content_type.split(';').next()?.trim();
    if mime.ends_with("json") {
        Some(ResponseFormat::Json)
    } else if mime.ends_with("xml") {
        Some(ResponseFormat::Atom)
    } else {
        None
    }
}

/// Map a non-success HTTP status to an outcome
pub fn classify_status(status: StatusCode, body: &str) -> TransportOutcome {
    let snippet: String = body.chars().take(200).collect();
    let reason = if snippet.trim().is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, snippet.trim())
    };

    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        TransportOutcome::RetryableFailure(reason)
    } else {
        TransportOutcome::FatalFailure(reason)
    }
}

fn classify_request_error(error: &reqwest::Error) -> TransportOutcome {
    if error.is_timeout() {
        TransportOutcome::RetryableFailure(format!("request timed out: {}", error))
    } else if error.is_connect() || error.is_request() || error.is_body() {
        TransportOutcome::RetryableFailure(format!("connection error: {}", error))
    } else {
        TransportOutcome::FatalFailure(format!("request failed: {}", error))
    }
}
