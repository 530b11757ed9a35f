//! REST API access for the console.
//!
//! Responses use a `{ success, data, error }` envelope. Protected endpoints
//! take `Authorization: Bearer <accessToken>` and answer 401 once it lapses.

pub mod envelope;
pub mod error;
pub mod gateway;
pub mod transport;

pub use error::{ApiError, ErrorDetail};
pub use gateway::RequestGateway;
pub use transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport};

pub type Result<T> = std::result::Result<T, ApiError>;
