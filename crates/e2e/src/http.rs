//! HTTP request/response collaborator
//!
//! The suite never touches sockets directly. It composes an [`ApiRequest`],
//! hands it to a [`Transport`] and inspects the structured [`ApiResponse`].
//! Like most REST test clients, executing a request never fails: transport
//! errors come back as an unsuccessful response with `error` set.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{E2eError, E2eResult};

/// Longest slice of a response body quoted in failure messages
const MAX_DETAIL_CHARS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A request relative to the transport's base URL
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Patch, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// `METHOD /path`, used as failure context
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Structured outcome of one request
#[derive(Debug, Clone, Default)]
pub struct ApiResponse {
    /// HTTP status, `None` when no response arrived
    pub status: Option<u16>,

    /// Raw body text
    pub text: String,

    /// Body parsed as JSON, when it parses
    pub body: Option<Value>,

    /// Transport error message, if any
    pub error: Option<String>,

    /// Time from send until the body was read
    pub elapsed: Duration,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && matches!(self.status, Some(200..=299))
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }

    /// Error message or a prefix of the body, for triage
    pub fn detail(&self) -> String {
        if let Some(error) = &self.error {
            return error.clone();
        }
        if self.text.is_empty() {
            return "empty body".to_string();
        }
        self.text.chars().take(MAX_DETAIL_CHARS).collect()
    }

    /// Build a `TransportFailure` for this response
    pub fn failure(&self, context: impl Into<String>) -> E2eError {
        E2eError::TransportFailure {
            context: context.into(),
            status: self.status,
            detail: self.detail(),
        }
    }

    /// Fail unless the call reported success
    pub fn require_success(&self, context: impl Into<String>) -> E2eResult<&Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.failure(context))
        }
    }

    /// The body as a JSON object
    pub fn json_object(&self, context: &str) -> E2eResult<&Map<String, Value>> {
        self.body
            .as_ref()
            .and_then(Value::as_object)
            .ok_or_else(|| E2eError::AssertionFailed(format!(
                "{}: expected a JSON object body, got: {}",
                context,
                self.detail()
            )))
    }

    /// The body as a JSON array
    pub fn json_array(&self, context: &str) -> E2eResult<&Vec<Value>> {
        self.body
            .as_ref()
            .and_then(Value::as_array)
            .ok_or_else(|| E2eError::AssertionFailed(format!(
                "{}: expected a JSON array body, got: {}",
                context,
                self.detail()
            )))
    }
}

/// Executes requests against one remote service
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> ApiResponse;
}

/// `reqwest`-backed transport bound to a base URL
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> E2eResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
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
impl Transport for ApiClient {
    async fn execute(&self, request: ApiRequest) -> ApiResponse {
        let url = self.url_for(&request.path);
        debug!("{} {}", request.method, url);

        let mut builder = self.client.request(request.method.into(), &url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let start = Instant::now();
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                return ApiResponse {
                    status: e.status().map(|s| s.as_u16()),
                    error: Some(e.to_string()),
                    elapsed: start.elapsed(),
                    ..Default::default()
                };
            }
        };

        let status = response.status().as_u16();
        let (text, error) = match response.text().await {
            Ok(text) => (text, None),
            Err(e) => (String::new(), Some(format!("failed to read body: {}", e))),
        };
        let elapsed = start.elapsed();
        let body = if text.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&text).ok()
        };

        debug!("{} {} -> {} in {:?}", request.method, url, status, elapsed);

        ApiResponse {
            status: Some(status),
            text,
            body,
            error,
            elapsed,
        }
    }
}
