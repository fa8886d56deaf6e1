//! Platform transport — the HTTP boundary behind a trait.
//!
//! The `Transport` trait abstracts the remote quant-research platform so the
//! session manager, catalog client, submitter, and poller never touch reqwest
//! directly, and tests can substitute a scripted stub.
//!
//! The real platform speaks a small REST dialect: basic-auth `POST
//! /authentication` establishes a session cookie, `GET /data-fields` is
//! paginated by offset/limit, `POST /simulations` answers 201 with a
//! `Location` header pointing at the job, and polling that location returns a
//! `Retry-After` header while the job is still running.

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::session::Credentials;

/// Default platform endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.worldquantbrain.com";

/// HTTP method subset the platform API uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

/// A single outbound request.
///
/// `path` is either server-relative (`/data-fields`) or an absolute URL —
/// job-status locations come back absolute and are polled as-is.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }
}

/// A decoded response: status line plus the two headers the protocol cares
/// about and the JSON body (Null when the body is empty or not JSON).
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub location: Option<String>,
    pub retry_after: Option<f64>,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body rendered for error messages, truncated so a huge HTML error page
    /// does not flood the logs.
    pub fn body_excerpt(&self) -> String {
        let mut s = match &self.body {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if s.len() > 200 {
            s.truncate(200);
            s.push('…');
        }
        s
    }
}

/// Errors below the HTTP status level.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("failed to read response body: {0}")]
    Body(String),
}

/// Trait for the remote platform boundary.
///
/// `authenticate` and `execute` are split because authentication carries
/// credentials while every other call rides on the session cookie the
/// transport holds internally.
pub trait Transport: Send + Sync {
    /// Establish (or re-establish) an authenticated session.
    fn authenticate(&self, credentials: &Credentials) -> Result<ApiResponse, TransportError>;

    /// Execute a request against the platform.
    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// Production transport: blocking reqwest client with a cookie store.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .cookie_store(true)
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    fn decode(resp: reqwest::blocking::Response) -> Result<ApiResponse, TransportError> {
        let status = resp.status().as_u16();
        let location = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);

        let text = resp.text().map_err(|e| TransportError::Body(e.to_string()))?;
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(ApiResponse {
            status,
            location,
            retry_after,
            body,
        })
    }
}

/// Decode a `Retry-After` header: either a number of seconds (possibly
/// fractional) or an HTTP-date, converted to seconds from now.
fn parse_retry_after(value: &str) -> Option<f64> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<f64>() {
        return Some(seconds);
    }
    let when = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = when.signed_duration_since(chrono::Utc::now());
    Some(delta.num_milliseconds() as f64 / 1000.0)
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn authenticate(&self, credentials: &Credentials) -> Result<ApiResponse, TransportError> {
        let url = self.url_for("/authentication");
        let resp = self
            .client
            .post(&url)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Self::decode(resp)
    }

    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url_for(&request.path);

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder
            .send()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Self::decode(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builders() {
        let req = ApiRequest::get("/data-fields")
            .with_query("limit", 50)
            .with_query("offset", 0);
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "/data-fields");
        assert_eq!(req.query.len(), 2);
        assert!(req.body.is_none());

        let req = ApiRequest::post("/simulations", serde_json::json!({"type": "REGULAR"}));
        assert_eq!(req.method, Method::Post);
        assert!(req.body.is_some());
    }

    #[test]
    fn absolute_urls_pass_through() {
        let t = HttpTransport::with_base_url("https://example.test");
        assert_eq!(
            t.url_for("https://example.test/simulations/abc123"),
            "https://example.test/simulations/abc123"
        );
        assert_eq!(t.url_for("/data-fields"), "https://example.test/data-fields");
    }

    #[test]
    fn retry_after_accepts_seconds_and_http_dates() {
        assert_eq!(parse_retry_after("2.5"), Some(2.5));
        assert_eq!(parse_retry_after(" 30 "), Some(30.0));
        assert_eq!(parse_retry_after("soon"), None);

        let future = chrono::Utc::now() + chrono::Duration::seconds(120);
        let seconds = parse_retry_after(&future.to_rfc2822()).unwrap();
        assert!((115.0..=121.0).contains(&seconds), "got {seconds}");

        // Past dates decode to a non-positive delay.
        let past = chrono::Utc::now() - chrono::Duration::seconds(60);
        assert!(parse_retry_after(&past.to_rfc2822()).unwrap() <= 0.0);
    }

    #[test]
    fn body_excerpt_truncates() {
        let resp = ApiResponse {
            status: 500,
            location: None,
            retry_after: None,
            body: Value::String("x".repeat(500)),
        };
        assert!(resp.body_excerpt().len() < 250);
    }
}
