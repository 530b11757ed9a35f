//! Storage of the access/refresh token pair.
//!
//! Each slot carries its own expiry and reads as absent once it lapses.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Access tokens live for 15 minutes.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;

/// Refresh tokens live for 90 days.
pub const REFRESH_TOKEN_TTL_SECS: i64 = 90 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn slot_name(&self) -> &'static str {
        match self {
            TokenKind::Access => "access-token",
            TokenKind::Refresh => "refresh-token",
        }
    }
}

/// Both credentials as issued by login, register or renewal.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Storage lifetimes for each slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTtls {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenTtls {
    fn default() -> Self {
        Self {
            access: Duration::seconds(ACCESS_TOKEN_TTL_SECS),
            refresh: Duration::seconds(REFRESH_TOKEN_TTL_SECS),
        }
    }
}

/// A slot value together with the instant the storage medium drops it.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    pub fn new(value: &str, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            value: value.to_string(),
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Storage of the two credential slots.
///
/// Implementations never fail outward: read problems are reported as an
/// absent token and write problems are logged.
pub trait TokenStore: Send + Sync {
    fn get(&self, kind: TokenKind) -> Option<String>;

    /// Persist `value`, replacing any previous value of `kind`. The slot reads
    /// as absent once `ttl` has elapsed.
    fn set(&self, kind: TokenKind, value: &str, ttl: Duration);

    /// Remove both slots. Idempotent.
    fn clear(&self);

    /// Replace both slots together.
    fn set_pair(&self, pair: &TokenPair, ttls: &TokenTtls) {
        self.set(TokenKind::Access, &pair.access_token, ttls.access);
        self.set(TokenKind::Refresh, &pair.refresh_token, ttls.refresh);
    }
}

/// The two slots as held in memory and serialized to disk.
#[derive(Clone, Default, Serialize, Deserialize)]
struct Slots {
    access: Option<StoredToken>,
    refresh: Option<StoredToken>,
}

impl Slots {
    fn slot(&self, kind: TokenKind) -> &Option<StoredToken> {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn slot_mut(&mut self, kind: TokenKind) -> &mut Option<StoredToken> {
        match kind {
            TokenKind::Access => &mut self.access,
            TokenKind::Refresh => &mut self.refresh,
        }
    }

    fn live_value(&self, kind: TokenKind, now: DateTime<Utc>) -> Option<String> {
        self.slot(kind)
            .as_ref()
            .filter(|t| t.is_live(now))
            .map(|t| t.value.clone())
    }
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Default)]
pub struct MemoryTokenStore {
    slots: RwLock<Slots>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, kind: TokenKind) -> Option<String> {
        let slots = self.slots.read().unwrap_or_else(|p| p.into_inner());
        slots.live_value(kind, Utc::now())
    }

    fn set(&self, kind: TokenKind, value: &str, ttl: Duration) {
        let mut slots = self.slots.write().unwrap_or_else(|p| p.into_inner());
        *slots.slot_mut(kind) = Some(StoredToken::new(value, ttl, Utc::now()));
    }

    fn clear(&self) {
        let mut slots = self.slots.write().unwrap_or_else(|p| p.into_inner());
        *slots = Slots::default();
    }

    fn set_pair(&self, pair: &TokenPair, ttls: &TokenTtls) {
        let now = Utc::now();
        let mut slots = self.slots.write().unwrap_or_else(|p| p.into_inner());
        slots.access = Some(StoredToken::new(&pair.access_token, ttls.access, now));
        slots.refresh = Some(StoredToken::new(&pair.refresh_token, ttls.refresh, now));
    }
}

// ============================================================================
// File-backed store
// ============================================================================

/// Token file name in cache directory
pub const TOKEN_FILE: &str = "tokens.json";

/// Tokens persisted as JSON so a session survives process restarts.
///
/// The in-memory copy is authoritative within the process; every write is
/// flushed to disk immediately.
pub struct FileTokenStore {
    path: PathBuf,
    slots: RwLock<Slots>,
}

impl FileTokenStore {
    /// Open the store at `path`, loading any previously saved tokens.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let slots = Self::load(&path);
        Self {
            path,
            slots: RwLock::new(slots),
        }
    }

    /// Open the store in the standard location under `cache_dir`.
    pub fn in_dir(cache_dir: &Path) -> Self {
        Self::open(cache_dir.join(TOKEN_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Slots {
        if !path.exists() {
            return Slots::default();
        }
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, path = ?path, "Failed to read token file");
                return Slots::default();
            }
        };
        match serde_json::from_str(&contents) {
            Ok(slots) => {
                debug!(path = ?path, "Token file loaded");
                slots
            }
            Err(e) => {
                warn!(error = %e, path = ?path, "Failed to parse token file, ignoring it");
                Slots::default()
            }
        }
    }

    fn save(&self, slots: &Slots) {
        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(slots)?;
            std::fs::write(&self.path, contents)
        })();
        if let Err(e) = result {
            warn!(error = %e, path = ?self.path, "Failed to save token file");
        }
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, kind: TokenKind) -> Option<String> {
        let slots = self.slots.read().unwrap_or_else(|p| p.into_inner());
        slots.live_value(kind, Utc::now())
    }

    fn set(&self, kind: TokenKind, value: &str, ttl: Duration) {
        let mut slots = self.slots.write().unwrap_or_else(|p| p.into_inner());
        *slots.slot_mut(kind) = Some(StoredToken::new(value, ttl, Utc::now()));
        self.save(&slots);
    }

    fn clear(&self) {
        let mut slots = self.slots.write().unwrap_or_else(|p| p.into_inner());
        *slots = Slots::default();
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = ?self.path, "Token file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, path = ?self.path, "Failed to remove token file"),
        }
    }

    fn set_pair(&self, pair: &TokenPair, ttls: &TokenTtls) {
        let now = Utc::now();
        let mut slots = self.slots.write().unwrap_or_else(|p| p.into_inner());
        slots.access = Some(StoredToken::new(&pair.access_token, ttls.access, now));
        slots.refresh = Some(StoredToken::new(&pair.refresh_token, ttls.refresh, now));
        self.save(&slots);
    }
}
