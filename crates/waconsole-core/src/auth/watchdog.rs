//! Background task that renews the session before it lapses.
//!
//! Owned by whichever long-lived context starts the session. Dropping the
//! watchdog or calling [`SessionWatchdog::shutdown`] stops the task.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::coordinator::SessionCoordinator;

/// Default tick interval: 5 minutes.
pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// What a single watchdog tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogOutcome {
    /// Access token still outside the expiry buffer.
    Healthy,
    /// Access token was renewed (or joined an in-flight renewal).
    Renewed,
    /// Renewal was impossible or failed; the session was cleared.
    SessionCleared,
    /// Nothing stored, nothing to do.
    NoSession,
    /// A login or logout replaced the session while the tick ran; the new
    /// session was left alone.
    Superseded,
}

pub struct SessionWatchdog {
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SessionWatchdog {
    /// Spawn the watchdog. Must be called within a Tokio runtime context.
    pub fn start(coordinator: Arc<SessionCoordinator>, interval: Duration) -> Self {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; consume it so we start
            // with a full interval wait.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("Session watchdog shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let outcome = Self::tick(&coordinator).await;
                        debug!(?outcome, "Session watchdog tick");
                    }
                }
            }
        });

        info!(interval_secs = interval.as_secs(), "Session watchdog started");
        Self {
            cancel_token,
            handle: Some(handle),
        }
    }

    /// Run one check against the current tokens.
    pub async fn tick(coordinator: &SessionCoordinator) -> WatchdogOutcome {
        let epoch = coordinator.session_epoch();
        if !coordinator.has_valid_refresh_token() {
            if !coordinator.has_stored_tokens() {
                return WatchdogOutcome::NoSession;
            }
            info!("Refresh token no longer valid, ending session");
            return if coordinator.clear_session_if(epoch) {
                WatchdogOutcome::SessionCleared
            } else {
                WatchdogOutcome::Superseded
            };
        }

        if coordinator.fresh_access_token().is_some() {
            return WatchdogOutcome::Healthy;
        }

        match coordinator.renew_or_end_session().await {
            Ok(_) => WatchdogOutcome::Renewed,
            Err(e) => {
                warn!(error = %e, "Proactive renewal failed");
                // tokens left behind belong to a login that landed mid-renewal
                if coordinator.has_stored_tokens() {
                    WatchdogOutcome::Superseded
                } else {
                    WatchdogOutcome::SessionCleared
                }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Session watchdog task panicked");
            }
        }
    }
}

impl Drop for SessionWatchdog {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
