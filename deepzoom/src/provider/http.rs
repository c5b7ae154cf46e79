//! HTTP client abstraction for testability

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, CACHE_CONTROL, CONTENT_LENGTH, EXPIRES, WWW_AUTHENTICATE};
use thiserror::Error;

use super::Credential;
use crate::cache::BoxFuture;
use crate::config::{DownloadConfig, RequestCachePolicy};

/// Transport-level failures. HTTP error statuses are not errors here; they
/// come back as an [`HttpResponse`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HttpError {
    #[error("Failed to create HTTP client: {0}")]
    Client(String),

    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Failed to read response body from {url}: {reason}")]
    Body { url: String, reason: String },
}

/// One GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub credential: Option<Credential>,
    pub cache_policy: RequestCachePolicy,
}

impl HttpRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            credential: None,
            cache_policy: RequestCachePolicy::default(),
        }
    }

    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    pub fn with_cache_policy(mut self, policy: RequestCachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }
}

/// Status, the headers the fetch path cares about, and the full body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Declared `Content-Length`, if the server sent one.
    pub content_length: Option<u64>,
    pub expires: Option<DateTime<Utc>>,
    pub www_authenticate: Option<String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// A response with just a status and body.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_length: None,
            expires: None,
            www_authenticate: None,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs HTTP GET requests.
pub trait HttpClient: Send + Sync {
    fn get(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, HttpError>>;
}

/// Parses an HTTP date such as `Wed, 21 Oct 2015 07:28:00 GMT`.
pub(crate) fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

fn header_str<'a>(headers: &'a HeaderMap, name: reqwest::header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Async client backed by reqwest.
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(config: &DownloadConfig) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent())
            .build()
            .map_err(|e| HttpError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let url = request.url;
        let mut builder = self.client.get(&url);
        if let Some(credential) = &request.credential {
            builder = builder.basic_auth(credential.username(), Some(credential.password()));
        }
        if let Some(value) = request.cache_policy.cache_control() {
            builder = builder.header(CACHE_CONTROL, value);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout { url: url.clone() }
            } else {
                HttpError::Request {
                    url: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        let headers = response.headers();
        let content_length =
            header_str(headers, CONTENT_LENGTH).and_then(|v| v.trim().parse::<u64>().ok());
        let expires = header_str(headers, EXPIRES).and_then(parse_http_date);
        let www_authenticate = header_str(headers, WWW_AUTHENTICATE).map(str::to_string);

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout { url: url.clone() }
            } else {
                HttpError::Body {
                    url: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        Ok(HttpResponse {
            status,
            content_length,
            expires,
            www_authenticate,
            body,
        })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, HttpError>> {
        Box::pin(self.fetch(request))
    }
}
