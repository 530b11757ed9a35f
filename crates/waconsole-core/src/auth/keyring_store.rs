//! OS keychain backend for the token pair.
//!
//! One entry per slot; the secret is the JSON slot record with its expiry.

use chrono::{Duration, Utc};
use keyring::Entry;
use tracing::{debug, warn};

use super::store::{StoredToken, TokenKind, TokenStore};

pub const SERVICE_NAME: &str = "waconsole";

/// Token slots kept in the OS keychain, one entry per slot.
pub struct KeyringTokenStore {
    access: Entry,
    refresh: Entry,
}

impl KeyringTokenStore {
    /// Create entries for `account` (typically the API base URL or user email).
    pub fn new(account: &str) -> keyring::Result<Self> {
        Ok(Self {
            access: Entry::new(SERVICE_NAME, &format!("{}:{}", account, TokenKind::Access.slot_name()))?,
            refresh: Entry::new(SERVICE_NAME, &format!("{}:{}", account, TokenKind::Refresh.slot_name()))?,
        })
    }

    fn entry(&self, kind: TokenKind) -> &Entry {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn delete(&self, kind: TokenKind) {
        match self.entry(kind).delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {}
            Err(e) => warn!(error = %e, slot = kind.slot_name(), "Failed to delete keychain entry"),
        }
    }
}

impl TokenStore for KeyringTokenStore {
    fn get(&self, kind: TokenKind) -> Option<String> {
        let secret = match self.entry(kind).get_password() {
            Ok(s) => s,
            Err(keyring::Error::NoEntry) => return None,
            Err(e) => {
                warn!(error = %e, slot = kind.slot_name(), "Failed to read keychain entry");
                return None;
            }
        };
        let stored: StoredToken = match serde_json::from_str(&secret) {
            Ok(t) => t,
            Err(e) => {
                debug!(error = %e, slot = kind.slot_name(), "Unreadable keychain entry");
                return None;
            }
        };
        stored.is_live(Utc::now()).then_some(stored.value)
    }

    fn set(&self, kind: TokenKind, value: &str, ttl: Duration) {
        let stored = StoredToken::new(value, ttl, Utc::now());
        let secret = match serde_json::to_string(&stored) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Failed to serialize token");
                return;
            }
        };
        if let Err(e) = self.entry(kind).set_password(&secret) {
            warn!(error = %e, slot = kind.slot_name(), "Failed to store token in keychain");
        }
    }

    fn clear(&self) {
        self.delete(TokenKind::Access);
        self.delete(TokenKind::Refresh);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_store() -> KeyringTokenStore {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        KeyringTokenStore::new("https://console.example.com").unwrap()
    }

    #[test]
    fn test_keyring_store_roundtrip_and_clear() {
        let store = mock_store();
        assert_eq!(store.get(TokenKind::Access), None);

        store.set(TokenKind::Access, "a1", Duration::minutes(15));
        store.set(TokenKind::Refresh, "r1", Duration::days(90));
        assert_eq!(store.get(TokenKind::Access).as_deref(), Some("a1"));
        assert_eq!(store.get(TokenKind::Refresh).as_deref(), Some("r1"));

        store.clear();
        store.clear();
        assert_eq!(store.get(TokenKind::Access), None);
        assert_eq!(store.get(TokenKind::Refresh), None);
    }

    #[test]
    fn test_keyring_store_expired_entry() {
        let store = mock_store();
        store.set(TokenKind::Access, "a1", Duration::seconds(-5));
        assert_eq!(store.get(TokenKind::Access), None);
    }
}
