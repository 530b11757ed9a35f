//! HTTP transport for the console API.
//!
//! `Transport` is the seam between the session core and the network. The
//! production implementation wraps a shared `reqwest::Client`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method};
use tracing::debug;

use super::ApiError;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const REFRESH_PATH: &str = "/auth/refresh";

/// `path` without its query string and surrounding slashes, so `auth/login`,
/// `/auth/login/` and `/auth/login?x=1` compare equal.
pub(crate) fn endpoint_path(path: &str) -> &str {
    path.split('?')
        .next()
        .unwrap_or(path)
        .trim_matches('/')
}

/// Whether `path` names the same endpoint as the `/`-prefixed `endpoint`.
pub(crate) fn is_endpoint(path: &str, endpoint: &str) -> bool {
    endpoint_path(path) == endpoint_path(endpoint)
}

/// Login, register and refresh must never go through renewal themselves.
pub fn is_auth_endpoint(path: &str) -> bool {
    [LOGIN_PATH, REGISTER_PATH, REFRESH_PATH]
        .iter()
        .any(|endpoint| is_endpoint(path, endpoint))
}

/// An outbound API call, relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            bearer: None,
            body: None,
        }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

/// Raw status and body; envelope interpretation happens later.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send a request. Only transport failures are errors; any HTTP status is
    /// returned as a response.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// Transport over reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = self.url(&request.path);
        debug!(method = %request.method, url = %url, "Sending request");

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header(header::ACCEPT, "application/json");
        if let Some(ref token) = request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(ApiResponse { status, body })
    }
}
