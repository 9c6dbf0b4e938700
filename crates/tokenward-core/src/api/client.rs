//! HTTP plumbing for the authentication service.
//!
//! `RequestExecutor` performs exactly one outbound call per `send` and
//! never interprets status codes; that is left to the session manager.
//! `HttpExecutor` is the reqwest-backed implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::auth::SessionError;

use super::TransportError;

// ============================================================================
// Constants
// ============================================================================

/// Default HTTP request timeout in seconds.
/// Applied to every call, including refresh and logout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("tokenward/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Request / Response
// ============================================================================

/// A single outbound call, relative to the executor's base URL.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub headers: header::HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: header::HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn header(mut self, name: header::HeaderName, value: header::HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Serialize `body` as the JSON request body
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, serde_json::Error> {
        self.body = Some(serde_json::to_vec(body)?);
        self.headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        Ok(self)
    }

    /// Copy of this request carrying `Authorization: Bearer <token>`.
    /// Any authorization header the caller set is replaced.
    pub fn with_bearer(&self, token: &str) -> Result<Self, SessionError> {
        let value = header::HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
            SessionError::InvalidRequest("access token is not a valid header value".to_string())
        })?;
        let mut request = self.clone();
        request.headers.insert(header::AUTHORIZATION, value);
        Ok(request)
    }
}

/// Status, headers and fully-read body of a completed call.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: header::HeaderMap,
    pub body: Vec<u8>,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: header::HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, SessionError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            SessionError::InvalidResponse(format!("{} (status {})", e, self.status.as_u16()))
        })
    }

    /// Service-supplied `{"detail": "..."}` message, when it is a plain string.
    /// Validation failures carry a list there; those yield `None`.
    pub fn detail(&self) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_slice(&self.body).ok()?;
        match parsed.detail? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    /// Turn a non-success status into `SessionError::Request`
    pub fn error_for_status(self) -> Result<Self, SessionError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(SessionError::Request {
                status: self.status.as_u16(),
                body: TransportError::truncate_body(&self.text()),
            })
        }
    }
}

// ============================================================================
// Executors
// ============================================================================

#[async_trait]
pub trait RequestExecutor: Send + Sync {
    /// Perform one call. Non-success statuses are returned, not raised.
    async fn send(&self, request: &Request) -> Result<Response, TransportError>;
}

/// reqwest-backed executor.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpExecutor {
    client: Client,
    base_url: String,
}

impl HttpExecutor {
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl RequestExecutor for HttpExecutor {
    async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let url = self.url_for(&request.path);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(request.headers.clone());
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            debug!(method = %request.method, path = %request.path, error = %e, "Request failed");
            TransportError::from(e)
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        debug!(method = %request.method, path = %request.path, status = status.as_u16(), "Response received");

        Ok(Response { status, headers, body })
    }
}
