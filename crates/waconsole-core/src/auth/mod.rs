//! Session and token lifecycle.
//!
//! This module provides:
//! - `TokenStore`: storage of the access/refresh token pair (memory, file, keychain)
//! - `TokenInspector`: local expiry checks on JWT `exp` claims
//! - `SessionCoordinator`: the renewal state machine with request coalescing
//! - `SessionWatchdog`: a background task renewing tokens before they lapse
//!
//! Access tokens live for 15 minutes and refresh tokens for 90 days.

pub mod client;
pub mod coordinator;
pub mod inspector;
pub mod keyring_store;
pub mod store;
pub mod watchdog;

pub use client::{AuthClient, AuthGrant, Credentials, Registration, UserProfile};
pub use coordinator::{RenewalState, SessionCoordinator, SessionState, SessionStatus, SessionToken};
pub use inspector::{decode_expiry, TokenInspector, EXPIRY_BUFFER_SECS};
pub use keyring_store::KeyringTokenStore;
pub use store::{FileTokenStore, MemoryTokenStore, TokenKind, TokenPair, TokenStore, TokenTtls};
pub use watchdog::{SessionWatchdog, WatchdogOutcome, DEFAULT_WATCHDOG_INTERVAL};
