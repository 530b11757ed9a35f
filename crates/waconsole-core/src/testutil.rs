//! Shared helpers for unit tests: unsigned JWTs and a scripted transport.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use serde_json::json;

use crate::api::{ApiError, ApiRequest, ApiResponse, Transport};

/// A JWT-shaped token with the given raw payload. The signature is a placeholder.
pub fn jwt_with_payload(payload: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(payload);
    format!("{}.{}.c2lnbmF0dXJl", header, payload)
}

pub fn jwt_with_exp(exp: i64) -> String {
    jwt_with_payload(&format!(r#"{{"sub":"user-1","exp":{}}}"#, exp))
}

/// A token expiring `secs` seconds from now (negative for the past).
/// `tag` keeps otherwise identical tokens distinguishable.
pub fn jwt_expiring_in(secs: i64, tag: &str) -> String {
    jwt_with_payload(&format!(
        r#"{{"sub":"user-1","jti":"{}","exp":{}}}"#,
        tag,
        Utc::now().timestamp() + secs
    ))
}

pub fn envelope_ok(data: serde_json::Value) -> String {
    json!({ "success": true, "data": data }).to_string()
}

pub fn envelope_err(code: &str, message: &str) -> String {
    json!({ "success": false, "error": { "code": code, "message": message } }).to_string()
}

pub fn token_pair_body(access: &str, refresh: &str) -> String {
    envelope_ok(json!({ "accessToken": access, "refreshToken": refresh }))
}

type Scripted = Result<ApiResponse, ApiError>;

/// Transport that replays queued responses per path and records every request.
///
/// The last queued response for a path is repeated once the queue drains.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<ApiRequest>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response, leaving a window for concurrent callers.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn respond(&self, path: &str, status: u16, body: impl Into<String>) -> &Self {
        self.push(path, Ok(ApiResponse { status, body: body.into() }))
    }

    pub fn fail(&self, path: &str, error: ApiError) -> &Self {
        self.push(path, Err(error))
    }

    fn push(&self, path: &str, scripted: Scripted) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(scripted);
        self
    }

    pub fn requests(&self, path: &str) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    pub fn calls(&self, path: &str) -> usize {
        self.requests(path).len()
    }

    pub fn total_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut routes = self.routes.lock().unwrap();
        let queue = match routes.get_mut(&request.path) {
            Some(q) if !q.is_empty() => q,
            _ => {
                return Ok(ApiResponse {
                    status: 404,
                    body: envelope_err("NOT_FOUND", "No scripted response"),
                })
            }
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        }
    }
}
