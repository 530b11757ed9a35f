//! Wiring of the session components for one API endpoint.
//!
//! The application shell builds a single `SessionContext` and hands out the
//! gateway and coordinator; nothing in the crate is a global.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::api::{ReqwestTransport, RequestGateway, Transport};
use crate::auth::{
    AuthClient, FileTokenStore, KeyringTokenStore, MemoryTokenStore, SessionCoordinator,
    SessionWatchdog, TokenStore,
};
use crate::config::{SessionConfig, TokenStoreKind};

pub struct SessionContext {
    config: SessionConfig,
    coordinator: Arc<SessionCoordinator>,
    gateway: RequestGateway,
}

impl SessionContext {
    /// Build the production stack: reqwest transport and the configured store.
    pub fn from_config(config: SessionConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config.api_base_url, config.request_timeout())
            .context("Failed to create HTTP client")?;

        let store: Arc<dyn TokenStore> = match config.token_store {
            TokenStoreKind::File => {
                let store = FileTokenStore::in_dir(&config.cache_dir()?);
                debug!(path = ?store.path(), "Using file token store");
                Arc::new(store)
            }
            TokenStoreKind::Memory => Arc::new(MemoryTokenStore::new()),
            TokenStoreKind::Keyring => Arc::new(
                KeyringTokenStore::new(&config.api_base_url)
                    .context("Failed to create keyring entries")?,
            ),
        };

        Ok(Self::with_parts(config, Arc::new(transport), store))
    }

    pub fn with_parts(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        let coordinator = Arc::new(SessionCoordinator::new(
            store,
            AuthClient::new(Arc::clone(&transport)),
            config.inspector(),
            config.token_ttls(),
        ));
        let gateway = RequestGateway::new(transport, Arc::clone(&coordinator));
        Self {
            config,
            coordinator,
            gateway,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<SessionCoordinator> {
        &self.coordinator
    }

    pub fn gateway(&self) -> &RequestGateway {
        &self.gateway
    }

    /// Start the proactive renewal task. The caller owns the returned guard.
    pub fn start_watchdog(&self) -> SessionWatchdog {
        SessionWatchdog::start(Arc::clone(&self.coordinator), self.config.watchdog_interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::{LOGIN_PATH, REFRESH_PATH};
    use crate::auth::Credentials;
    use crate::testutil::{envelope_ok, jwt_expiring_in, token_pair_body, ScriptedTransport};
    use serde_json::json;

    fn context(transport: &Arc<ScriptedTransport>) -> SessionContext {
        SessionContext::with_parts(
            SessionConfig::default(),
            Arc::clone(transport) as Arc<dyn Transport>,
            Arc::new(MemoryTokenStore::new()),
        )
    }

    #[tokio::test]
    async fn test_login_then_protected_call_then_logout() {
        let transport = Arc::new(ScriptedTransport::new());
        let access = jwt_expiring_in(900, "a1");
        transport
            .respond(LOGIN_PATH, 200, token_pair_body(&access, &jwt_expiring_in(7_776_000, "r1")))
            .respond("/usage", 200, envelope_ok(json!({ "messagesSent": 42 })));

        let ctx = context(&transport);
        assert!(!ctx.coordinator().check_auth());

        ctx.coordinator()
            .login(&Credentials::new("ops@example.com", "pw"))
            .await
            .unwrap();
        assert!(ctx.coordinator().check_auth());

        let usage: serde_json::Value = ctx.gateway().get("/usage").await.unwrap();
        assert_eq!(usage["messagesSent"], 42);
        assert_eq!(transport.requests("/usage")[0].bearer, Some(access));
        assert_eq!(transport.calls(REFRESH_PATH), 0);

        ctx.coordinator().clear_session();
        assert!(!ctx.coordinator().check_auth());
        assert!(ctx.gateway().get::<serde_json::Value>("/usage").await.unwrap_err().is_session_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_guard_shutdown() {
        let transport = Arc::new(ScriptedTransport::new());
        let ctx = context(&transport);
        let watchdog = ctx.start_watchdog();
        assert!(watchdog.is_running());
        watchdog.shutdown().await;
        assert_eq!(transport.total_calls(), 0);
    }

    #[test]
    fn test_memory_context_from_config() {
        let config = SessionConfig {
            token_store: TokenStoreKind::Memory,
            ..SessionConfig::default()
        };
        let ctx = SessionContext::from_config(config).unwrap();
        assert!(!ctx.coordinator().check_auth());
        assert_eq!(ctx.config().token_store, TokenStoreKind::Memory);
    }
}
