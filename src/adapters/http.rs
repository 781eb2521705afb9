//! Retrying HTTP client.
//!
//! Every failure on an attempt (transport error, non-success status, body that
//! cannot be decoded, missing required key) is logged and retried after a
//! constant pause. Callers only ever see [`ReportError::RequestFailed`] once the
//! attempt budget is spent. Malformed caller headers are rejected before the
//! first attempt.

use crate::utils::error::{ReportError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Json,
    Binary,
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Binary(Vec<u8>),
    Text(String),
}

impl ResponseBody {
    pub fn into_json(self) -> Result<serde_json::Value> {
        match self {
            ResponseBody::Json(value) => Ok(value),
            other => Err(ReportError::protocol(format!(
                "expected a JSON body, got {:?}",
                other.mode()
            ))),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            ResponseBody::Json(value) => value.to_string().into_bytes(),
            ResponseBody::Binary(bytes) => bytes,
            ResponseBody::Text(text) => text.into_bytes(),
        }
    }

    fn mode(&self) -> ResponseMode {
        match self {
            ResponseBody::Json(_) => ResponseMode::Json,
            ResponseBody::Binary(_) => ResponseMode::Binary,
            ResponseBody::Text(_) => ResponseMode::Text,
        }
    }
}

/// Description of one logical call; rebuilt into a fresh request on every attempt.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    json: Option<serde_json::Value>,
    mode: ResponseMode,
    retries: Option<u32>,
    required_key: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
            json: None,
            mode: ResponseMode::Json,
            retries: None,
            required_key: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn json(mut self, json: serde_json::Value) -> Self {
        self.json = Some(json);
        self
    }

    pub fn mode(mut self, mode: ResponseMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Only meaningful in JSON mode: the top-level object must hold a non-null value here.
    pub fn require_key(mut self, key: impl Into<String>) -> Self {
        self.required_key = Some(key.into());
        self
    }

    /// Caller headers parsed up front; a bad name or value fails the call before any attempt.
    fn header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ReportError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                ReportError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            headers.append(header_name, header_value);
        }
        Ok(headers)
    }
}

#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(reqwest::StatusCode),
    #[error("response body is not valid JSON: {0}")]
    Decode(serde_json::Error),
    #[error("response body is not valid UTF-8")]
    Utf8,
    #[error("required key {0} not in API result or is null")]
    MissingKey(String),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub retries: u32,
    pub pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 5,
            pause: Duration::from_secs(5),
        }
    }
}

/// Shared session plus default headers and retry policy.
#[derive(Debug, Clone)]
pub struct RetryingClient {
    client: Client,
    headers: HeaderMap,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(client: Client, policy: RetryPolicy) -> Self {
        Self {
            client,
            headers: HeaderMap::new(),
            policy,
        }
    }

    /// Client sending `Authorization: Bearer <token>` with every request.
    pub fn with_bearer_token(
        token: &str,
        policy: RetryPolicy,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let mut this = Self::new(builder.build()?, policy);
        let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
            ReportError::InvalidConfigValueError {
                field: "api.token".to_string(),
                value: "<redacted>".to_string(),
                reason: e.to_string(),
            }
        })?;
        this.headers.insert(AUTHORIZATION, value);
        Ok(this)
    }

    pub async fn request(&self, request: &ApiRequest) -> Result<ResponseBody> {
        let mut headers = self.headers.clone();
        headers.extend(request.header_map()?);

        let tries = request.retries.unwrap_or(self.policy.retries);
        for attempt in 1..=tries {
            match self.attempt(request, &headers).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    if attempt < tries {
                        tracing::info!(
                            "HTTP request error: {}, waiting {:?} and retrying...",
                            e,
                            self.policy.pause
                        );
                        tokio::time::sleep(self.policy.pause).await;
                    } else {
                        tracing::info!("HTTP request error: {}, no attempts left", e);
                    }
                }
            }
        }

        Err(ReportError::RequestFailed {
            url: request.url.clone(),
            tries,
        })
    }

    /// JSON request decoded straight into `T`. Shape errors are not retried.
    pub async fn request_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        let value = self
            .request(&request.clone().mode(ResponseMode::Json))
            .await?
            .into_json()?;
        Ok(serde_json::from_value(value)?)
    }

    async fn attempt(
        &self,
        request: &ApiRequest,
        headers: &HeaderMap,
    ) -> std::result::Result<ResponseBody, AttemptError> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(headers.clone());

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(json) = &request.json {
            builder = builder.json(json);
        } else if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        tracing::debug!("{} {}", request.method, request.url);
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Status(status));
        }

        let bytes = response.bytes().await?;
        match request.mode {
            ResponseMode::Binary => Ok(ResponseBody::Binary(bytes.to_vec())),
            ResponseMode::Text => String::from_utf8(bytes.to_vec())
                .map(ResponseBody::Text)
                .map_err(|_| AttemptError::Utf8),
            ResponseMode::Json => {
                let value: serde_json::Value =
                    serde_json::from_slice(&bytes).map_err(AttemptError::Decode)?;
                if let Some(key) = &request.required_key {
                    if value.get(key).map_or(true, |v| v.is_null()) {
                        return Err(AttemptError::MissingKey(key.clone()));
                    }
                }
                Ok(ResponseBody::Json(value))
            }
        }
    }
}
