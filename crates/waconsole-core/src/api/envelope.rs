//! Interpretation of the `{ success, data, error }` response envelope.
//!
//! Every endpoint of the console API wraps its payload the same way:
//!
//! ```text
//! { "success": true,  "data": { ... } }
//! { "success": false, "error": { "code": "...", "message": "...", "details": ... } }
//! ```

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::error::{ApiError, ErrorDetail, INVALID_RESPONSE_CODE};

const UNKNOWN_ERROR_CODE: &str = "UNKNOWN_ERROR";
const DEFAULT_ERROR_MESSAGE: &str = "Request failed";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<Value>,
}

fn is_success_status(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Extract the `error` member of an envelope, if it carries anything.
fn error_detail(value: &Value, status: u16) -> Option<ErrorDetail> {
    match value.get("error")? {
        Value::Null => None,
        Value::String(message) => Some(ErrorDetail::new(UNKNOWN_ERROR_CODE, message.clone(), status)),
        other => {
            let body: ErrorBody = serde_json::from_value(other.clone()).ok()?;
            Some(
                ErrorDetail::new(
                    body.code.unwrap_or_else(|| UNKNOWN_ERROR_CODE.to_string()),
                    body.message.unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string()),
                    status,
                )
                .with_details(body.details),
            )
        }
    }
}

fn invalid_response(message: impl Into<String>, status: u16) -> ApiError {
    ApiError::Network(ErrorDetail::new(INVALID_RESPONSE_CODE, message, status))
}

/// Turn a raw HTTP status and body into the typed payload or a structured error.
///
/// A 2xx body only counts as successful when it declares `"success": true`
/// and carries no `error` member.
pub fn parse_response<T: DeserializeOwned>(
    status: u16,
    body: &str,
    credential_endpoint: bool,
) -> Result<T, ApiError> {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) if is_success_status(status) => {
            return Err(invalid_response("Response body is not valid JSON", status));
        }
        Err(_) => return Err(ApiError::from_unparsed(status, body)),
    };

    if !is_success_status(status) {
        return Err(match error_detail(&value, status) {
            Some(detail) => ApiError::from_detail(detail, credential_endpoint),
            None => ApiError::from_unparsed(status, body),
        });
    }

    match value.get("success").and_then(Value::as_bool) {
        None => Err(invalid_response(
            "Response does not declare a boolean success flag",
            status,
        )),
        Some(false) => {
            let detail = error_detail(&value, status)
                .unwrap_or_else(|| ErrorDetail::new(UNKNOWN_ERROR_CODE, DEFAULT_ERROR_MESSAGE, status));
            Err(ApiError::from_detail(detail, credential_endpoint))
        }
        Some(true) => {
            if let Some(detail) = error_detail(&value, status) {
                return Err(ApiError::from_detail(detail, credential_endpoint));
            }
            let data = value.get("data").cloned().unwrap_or(Value::Null);
            serde_json::from_value(data).map_err(|e| {
                invalid_response(format!("Failed to parse response data: {}", e), status)
            })
        }
    }
}
