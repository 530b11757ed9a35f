//! Session and token lifecycle core for the WhatsApp Business admin console.
//!
//! Keeps a user's session valid across restarts, background timers and
//! concurrent API calls:
//!
//! - [`auth::TokenStore`] holds the access/refresh pair with independent lifetimes
//! - [`auth::TokenInspector`] decides locally whether a token is (nearly) expired
//! - [`auth::SessionCoordinator`] renews tokens, never more than one renewal at a time
//! - [`api::RequestGateway`] attaches credentials and retries once after a 401
//! - [`auth::SessionWatchdog`] renews proactively on a fixed interval
//!
//! [`SessionContext`] wires them together for an application shell.

pub mod api;
pub mod auth;
pub mod config;
pub mod context;

#[cfg(test)]
pub(crate) mod testutil;

pub use api::{ApiError, ErrorDetail, RequestGateway, Result};
pub use config::{SessionConfig, TokenStoreKind};
pub use context::SessionContext;
