//! Session state machine and renewal coalescing.
//!
//! The coordinator is the only writer of the token store outside explicit
//! login and logout. Renewal runs in a spawned task so it completes even if
//! every caller awaiting it goes away; callers that arrive while it runs share
//! the same outcome through a [`Shared`] future.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::client::{AuthClient, Credentials, Registration, UserProfile};
use super::inspector::{decode_expiry, TokenInspector};
use super::store::{TokenKind, TokenPair, TokenStore, TokenTtls};
use crate::api::{ApiError, Result};

/// Whether a network renewal is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum RenewalState {
    Idle,
    Renewing,
}

/// Derived from the stored tokens, never set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum SessionState {
    Authenticated,
    Unauthenticated,
}

/// Point-in-time view of the session for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SessionStatus {
    pub state: SessionState,
    pub renewal: RenewalState,
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub access_expires_at: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

impl SessionStatus {
    /// Get minutes remaining until the access token expires (for display)
    pub fn minutes_until_access_expiry(&self) -> Option<i64> {
        self.access_expires_at
            .map(|exp| (exp - Utc::now()).num_minutes().max(0))
    }
}

/// A renewed access token and the session it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub token: String,
    pub epoch: u64,
}

/// Result of one renewal, tagged with the session epoch it ran under.
#[derive(Debug, Clone)]
struct RenewalOutcome {
    epoch: u64,
    result: Result<String>,
}

type RenewalFuture = Shared<BoxFuture<'static, RenewalOutcome>>;

struct InFlightRenewal {
    outcome: RenewalFuture,
    done: Arc<AtomicBool>,
}

pub struct SessionCoordinator {
    store: Arc<dyn TokenStore>,
    auth: AuthClient,
    inspector: TokenInspector,
    ttls: TokenTtls,
    in_flight: Mutex<Option<InFlightRenewal>>,
    /// Bumped on every login and clear. Guards store writes so a renewal that
    /// started before a logout cannot bring the old session back.
    epoch: Arc<Mutex<u64>>,
    renewals: AtomicU64,
}

impl SessionCoordinator {
    pub fn new(
        store: Arc<dyn TokenStore>,
        auth: AuthClient,
        inspector: TokenInspector,
        ttls: TokenTtls,
    ) -> Self {
        Self {
            store,
            auth,
            inspector,
            ttls,
            in_flight: Mutex::new(None),
            epoch: Arc::new(Mutex::new(0)),
            renewals: AtomicU64::new(0),
        }
    }

    pub fn inspector(&self) -> &TokenInspector {
        &self.inspector
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.get(TokenKind::Access)
    }

    /// The stored access token if it is usable without renewal.
    pub fn fresh_access_token(&self) -> Option<String> {
        self.access_token()
            .filter(|t| !self.inspector.is_expired_or_expiring_soon(Some(t)))
    }

    pub fn has_valid_refresh_token(&self) -> bool {
        self.inspector
            .is_valid(self.store.get(TokenKind::Refresh).as_deref())
    }

    /// Whether either slot holds a value, valid or not.
    pub fn has_stored_tokens(&self) -> bool {
        self.store.get(TokenKind::Access).is_some() || self.store.get(TokenKind::Refresh).is_some()
    }

    pub fn renewal_state(&self) -> RenewalState {
        let in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        match *in_flight {
            Some(ref r) if !r.done.load(Ordering::Acquire) => RenewalState::Renewing,
            _ => RenewalState::Idle,
        }
    }

    /// Authenticated iff a non-expired refresh token is stored. No side effects.
    pub fn session_state(&self) -> SessionState {
        if self.has_valid_refresh_token() {
            SessionState::Authenticated
        } else {
            SessionState::Unauthenticated
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.session_state(),
            renewal: self.renewal_state(),
            access_expires_at: self.access_token().as_deref().and_then(decode_expiry),
            refresh_expires_at: self
                .store
                .get(TokenKind::Refresh)
                .as_deref()
                .and_then(decode_expiry),
        }
    }

    /// Number of network renewals started since construction.
    pub fn renewal_count(&self) -> u64 {
        self.renewals.load(Ordering::Relaxed)
    }

    /// Whether the user should be treated as logged in.
    ///
    /// True with a valid refresh token, or with any access token the store
    /// still holds. A stored but unusable refresh token on its own is cleared.
    pub fn check_auth(&self) -> bool {
        let epoch = self.session_epoch();
        let refresh = self.store.get(TokenKind::Refresh);
        if self.inspector.is_valid(refresh.as_deref()) {
            return true;
        }

        if self.store.get(TokenKind::Access).is_some() {
            debug!("Refresh token unusable, access token still present");
            return true;
        }

        if refresh.is_some() {
            info!("Stored session is no longer valid, clearing it");
            self.clear_session_if(epoch);
        }
        false
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<Option<UserProfile>> {
        let grant = self.auth.login(credentials).await?;
        self.establish(&grant.tokens);
        info!(email = %credentials.email, "Login successful");
        Ok(grant.user)
    }

    pub async fn register(&self, registration: &Registration) -> Result<Option<UserProfile>> {
        let grant = self.auth.register(registration).await?;
        self.establish(&grant.tokens);
        info!(email = %registration.email, "Registration successful");
        Ok(grant.user)
    }

    /// Store a freshly issued pair as a new session.
    pub fn establish(&self, pair: &TokenPair) {
        let mut epoch = self.epoch.lock().unwrap_or_else(|p| p.into_inner());
        *epoch += 1;
        self.store.set_pair(pair, &self.ttls);
    }

    /// Remove both tokens. Safe to call at any time, including mid-renewal.
    pub fn clear_session(&self) {
        let mut epoch = self.epoch.lock().unwrap_or_else(|p| p.into_inner());
        *epoch += 1;
        self.store.clear();
        info!("Session cleared");
    }

    /// Identifies the current session. Changes on every login and clear.
    pub fn session_epoch(&self) -> u64 {
        *self.epoch.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Clear the session only if it is still the one identified by `epoch`.
    ///
    /// Returns whether the session was cleared. A login or logout since
    /// `epoch` was taken leaves the store untouched.
    pub fn clear_session_if(&self, epoch: u64) -> bool {
        let mut current = self.epoch.lock().unwrap_or_else(|p| p.into_inner());
        if *current != epoch {
            debug!("Session changed since it was observed, not clearing");
            return false;
        }
        *current += 1;
        self.store.clear();
        info!("Session cleared");
        true
    }

    /// Renew the access token, joining a renewal already in flight.
    ///
    /// # Errors
    ///
    /// [`ApiError::SessionExpired`] when no valid refresh token is stored (no
    /// network call is made) or when the renewal call fails.
    pub async fn ensure_valid_access_token(&self) -> Result<String> {
        self.renew_tracked().await.result
    }

    /// Renew like [`Self::ensure_valid_access_token`], ending the session on
    /// failure.
    ///
    /// The session is cleared only if it is still the one the renewal ran
    /// for, so a login that lands while a stale renewal is in flight survives.
    pub async fn renew_or_end_session(&self) -> Result<SessionToken> {
        let outcome = self.renew_tracked().await;
        match outcome.result {
            Ok(token) => Ok(SessionToken {
                token,
                epoch: outcome.epoch,
            }),
            Err(e) => {
                debug!(error = %e, "Renewal unavailable, ending session");
                self.clear_session_if(outcome.epoch);
                Err(ApiError::SessionExpired)
            }
        }
    }

    async fn renew_tracked(&self) -> RenewalOutcome {
        match self.join_or_start_renewal() {
            Ok(pending) => pending.await,
            Err(unavailable) => unavailable,
        }
    }

    fn join_or_start_renewal(&self) -> std::result::Result<RenewalFuture, RenewalOutcome> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());

        if let Some(ref renewal) = *in_flight {
            if !renewal.done.load(Ordering::Acquire) {
                debug!("Joining in-flight token renewal");
                return Ok(renewal.outcome.clone());
            }
        }

        // Login and clear write the store under the epoch lock, so the token
        // and the epoch read here always belong to the same session.
        let (start_epoch, refresh_token) = {
            let epoch = self.epoch.lock().unwrap_or_else(|p| p.into_inner());
            (*epoch, self.store.get(TokenKind::Refresh))
        };
        let refresh_token = match refresh_token {
            Some(t) if self.inspector.is_valid(Some(&t)) => t,
            _ => {
                debug!("No valid refresh token, cannot renew");
                return Err(RenewalOutcome {
                    epoch: start_epoch,
                    result: Err(ApiError::SessionExpired),
                });
            }
        };

        let count = self.renewals.fetch_add(1, Ordering::Relaxed) + 1;
        info!(renewal = count, "Starting token renewal");

        let done = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(Self::renew(
            self.auth.clone(),
            Arc::clone(&self.store),
            self.ttls,
            Arc::clone(&self.epoch),
            start_epoch,
            refresh_token,
            Arc::clone(&done),
        ));

        let outcome = async move {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "Token renewal task failed");
                    Err(ApiError::SessionExpired)
                }
            };
            RenewalOutcome {
                epoch: start_epoch,
                result,
            }
        }
        .boxed()
        .shared();

        *in_flight = Some(InFlightRenewal {
            outcome: outcome.clone(),
            done,
        });
        Ok(outcome)
    }

    async fn renew(
        auth: AuthClient,
        store: Arc<dyn TokenStore>,
        ttls: TokenTtls,
        epoch: Arc<Mutex<u64>>,
        start_epoch: u64,
        refresh_token: String,
        done: Arc<AtomicBool>,
    ) -> Result<String> {
        let result = match auth.refresh(&refresh_token).await {
            Ok(pair) => {
                let current = epoch.lock().unwrap_or_else(|p| p.into_inner());
                if *current == start_epoch {
                    store.set_pair(&pair, &ttls);
                    info!("Token renewal succeeded");
                    Ok(pair.access_token)
                } else {
                    warn!("Session changed during renewal, discarding renewed tokens");
                    Err(ApiError::SessionExpired)
                }
            }
            Err(e) => {
                warn!(error = %e, "Token renewal failed");
                Err(ApiError::SessionExpired)
            }
        };
        done.store(true, Ordering::Release);
        result
    }
}
