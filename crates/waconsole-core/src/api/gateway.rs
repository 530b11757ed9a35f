//! Authenticated access to the console API.
//!
//! Every data operation of the console (devices, messages, usage, billing)
//! goes through [`RequestGateway`], which attaches the bearer token, renews it
//! when it is about to expire, and retries once after a 401.

use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::envelope::parse_response;
use super::transport::{is_auth_endpoint, is_endpoint, LOGIN_PATH, REGISTER_PATH};
use super::{ApiError, ApiRequest, Result, Transport};
use crate::auth::SessionCoordinator;

fn is_credential_endpoint(path: &str) -> bool {
    is_endpoint(path, LOGIN_PATH) || is_endpoint(path, REGISTER_PATH)
}

/// Clone is cheap - both fields are shared.
#[derive(Clone)]
pub struct RequestGateway {
    transport: Arc<dyn Transport>,
    coordinator: Arc<SessionCoordinator>,
}

impl RequestGateway {
    pub fn new(transport: Arc<dyn Transport>, coordinator: Arc<SessionCoordinator>) -> Self {
        Self {
            transport,
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &Arc<SessionCoordinator> {
        &self.coordinator
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.send(Method::POST, path, Some(Self::encode(body)?)).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.send(Method::PUT, path, Some(Self::encode(body)?)).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        self.send(Method::PATCH, path, Some(Self::encode(body)?)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(Method::DELETE, path, None).await
    }

    fn encode<B: Serialize>(body: &B) -> Result<serde_json::Value> {
        serde_json::to_value(body)
            .map_err(|e| ApiError::invalid_request(format!("Failed to encode request: {}", e)))
    }

    /// Issue a request and interpret the response envelope.
    ///
    /// Protected endpoints get a bearer token, renewed first if it is about to
    /// expire. A 401 triggers one renewal and one retry. `/auth/login`,
    /// `/auth/register` and `/auth/refresh` are sent as-is.
    pub async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let mut request = ApiRequest::new(method, path);
        request.body = body;

        if is_auth_endpoint(path) {
            let response = self.transport.send(&request).await?;
            return parse_response(response.status, &response.body, is_credential_endpoint(path));
        }

        request.bearer = Some(self.access_token_for_request().await?);
        let response = self.transport.send(&request).await?;
        if response.status != 401 {
            return parse_response(response.status, &response.body, false);
        }

        warn!(path = path, "Request unauthorized, renewing session and retrying once");
        let renewed = self.coordinator.renew_or_end_session().await?;
        request.bearer = Some(renewed.token);
        let retry = self.transport.send(&request).await?;
        if retry.status == 401 {
            warn!(path = path, "Request still unauthorized after renewal");
            self.coordinator.clear_session_if(renewed.epoch);
            return Err(ApiError::SessionExpired);
        }
        parse_response(retry.status, &retry.body, false)
    }

    async fn access_token_for_request(&self) -> Result<String> {
        match self.coordinator.fresh_access_token() {
            Some(token) => Ok(token),
            None => {
                debug!("Access token missing or expiring soon, renewing before request");
                Ok(self.coordinator.renew_or_end_session().await?.token)
            }
        }
    }
}
