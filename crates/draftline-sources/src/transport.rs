//! HTTP transport seam shared by every provider.
//!
//! Providers describe a request, the transport executes it and maps
//! failures into the typed error taxonomy. Auth-shaped statuses become
//! [`AppError::Auth`], 429 becomes [`AppError::RateLimited`], and
//! everything else non-2xx becomes a transport error carrying the
//! status and a truncated body.

use std::time::Duration;

use async_trait::async_trait;
use draftline_core::error::AppError;
use reqwest::Client;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Source the call is made on behalf of, for error attribution.
    pub source: String,
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// Form-encoded body, POST only.
    pub form: Vec<(String, String)>,
}

impl TransportRequest {
    pub fn get(source: &str, url: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            method: HttpMethod::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            form: Vec::new(),
        }
    }

    pub fn post_form(source: &str, url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            source: source.to_string(),
            method: HttpMethod::Post,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            form,
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, AppError>;
}

/// Maps a non-success status to its typed error. `None` means the
/// status is fine and the response should be returned as-is.
pub fn map_status(source: &str, code: u16, url: &str, body: &str) -> Option<AppError> {
    match code {
        200..=299 => None,
        401 | 403 => Some(AppError::Auth {
            source_name: source.to_string(),
            reason: format!("http {code}"),
        }),
        429 => Some(AppError::RateLimited {
            source_name: source.to_string(),
        }),
        _ => Some(AppError::Transport {
            source_name: source.to_string(),
            status: Some(code),
            message: format!("unexpected status {code} for {url}"),
            body: Some(truncate_body(body)),
        }),
    }
}

const MAX_ERROR_BODY: usize = 512;

fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}

/// Transport backed by a shared reqwest client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    timeout_secs: u64,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(concat!("draftline/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, AppError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if request.method == HttpMethod::Post && !request.form.is_empty() {
            builder = builder.form(&request.form);
        }

        let source = request.source.clone();
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout {
                    source_name: source.clone(),
                    seconds: self.timeout_secs,
                }
            } else if e.is_connect() {
                AppError::Transport {
                    source_name: source.clone(),
                    status: None,
                    message: format!("connection failed: {e}"),
                    body: None,
                }
            } else {
                AppError::Transport {
                    source_name: source.clone(),
                    status: None,
                    message: e.to_string(),
                    body: None,
                }
            }
        })?;

        let code = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(|e| AppError::Transport {
            source_name: source.clone(),
            status: Some(code),
            message: format!("failed to read response body: {e}"),
            body: None,
        })?;

        if let Some(err) = map_status(&source, code, &request.url, &body) {
            return Err(err);
        }
        Ok(TransportResponse {
            status: code,
            body,
            headers,
        })
    }
}
