//! Calls to the unauthenticated `/auth/*` endpoints.
//!
//! These never attach a bearer token and never trigger renewal, which keeps
//! the refresh call itself out of the renewal path.

use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::store::TokenPair;
use crate::api::envelope::parse_response;
use crate::api::transport::{LOGIN_PATH, REFRESH_PATH, REGISTER_PATH};
use crate::api::{ApiError, ApiRequest, Result, Transport};

#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// New account sign-up.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("organization_name", &self.organization_name)
            .finish()
    }
}

/// Account returned alongside tokens on login/register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Payload of a successful login or register.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthGrant {
    #[serde(flatten)]
    pub tokens: TokenPair,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Clone)]
pub struct AuthClient {
    transport: Arc<dyn Transport>,
}

impl AuthClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<AuthGrant> {
        debug!(email = %credentials.email, "Logging in");
        self.post(LOGIN_PATH, credentials, true).await
    }

    pub async fn register(&self, registration: &Registration) -> Result<AuthGrant> {
        debug!(email = %registration.email, "Registering account");
        self.post(REGISTER_PATH, registration, true).await
    }

    /// Exchange a refresh token for a new token pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        self.post(REFRESH_PATH, &RefreshRequest { refresh_token }, false)
            .await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        credential_endpoint: bool,
    ) -> Result<T> {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::invalid_request(format!("Failed to encode request: {}", e)))?;
        let request = ApiRequest::new(Method::POST, path).with_body(body);
        let response = self.transport.send(&request).await?;
        parse_response(response.status, &response.body, credential_endpoint)
    }
}
