//! Credential storage across two lifetimes
//!
//! The store keeps the current token pair, the authenticated principal, the
//! "remember me" choice, and a single pending-redirect slot. Values live in
//! one of two media: a durable one that survives process restarts (JSON
//! files under the platform config directory) and an ephemeral in-process
//! one. Reads check the durable medium first, so a remembered session always
//! wins if both exist.
//!
//! Storage failures never propagate - a medium that cannot be read or
//! written logs a warning and behaves as if the value were absent, which the
//! rest of the layer treats as "not authenticated".

use crate::config::SessionConfig;
use crate::types::{PersistenceScope, Principal, TokenPair};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const TOKENS_KEY: &str = "tokens";
const PRINCIPAL_KEY: &str = "user";
const REMEMBER_KEY: &str = "remember";
const REDIRECT_KEY: &str = "redirect_url";

/// A single key-value storage medium
///
/// Implementations must degrade internally: failed reads return `None`,
/// failed writes are logged and dropped.
pub trait StorageMedium: Send + Sync + fmt::Debug {
    /// Read the raw value stored under `key`, if any
    fn load(&self, key: &str) -> Option<String>;

    /// Replace the value stored under `key` (whole-object write)
    fn store(&self, key: &str, value: &str);

    /// Remove the value stored under `key`; absent keys are not an error
    fn remove(&self, key: &str);
}

/// Durable medium: one JSON file per key under a directory
///
/// Files are written with user-only permissions on unix.
#[derive(Debug, Clone)]
pub struct FileMedium {
    dir: PathBuf,
}

impl FileMedium {
    /// Medium rooted at the given directory (created lazily on first write)
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Medium at the platform default location (`<config dir>/hivefund`)
    #[must_use]
    pub fn default_location() -> Self {
        let dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hivefund");
        Self::new(dir)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StorageMedium for FileMedium {
    fn load(&self, key: &str) -> Option<String> {
        let path = self.path_for(key);
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}", path.display());
                None
            }
        }
    }

    fn store(&self, key: &str, value: &str) {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            tracing::warn!("Failed to create {}: {e}", self.dir.display());
            return;
        }
        let path = self.path_for(key);
        if let Err(e) = std::fs::write(&path, value) {
            tracing::warn!("Failed to write {}: {e}", path.display());
            return;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = std::fs::set_permissions(&path, perms) {
                tracing::warn!("Failed to set permissions on {}: {e}", path.display());
            }
        }
    }

    fn remove(&self, key: &str) {
        let path = self.path_for(key);
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!("Failed to remove {}: {e}", path.display());
            }
        }
    }
}

/// Ephemeral medium: in-process map, shared by clone
#[derive(Debug, Clone, Default)]
pub struct MemoryMedium {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryMedium {
    /// Empty medium
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageMedium for MemoryMedium {
    fn load(&self, key: &str) -> Option<String> {
        match self.entries.lock() {
            Ok(entries) => entries.get(key).cloned(),
            Err(_) => None,
        }
    }

    fn store(&self, key: &str, value: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }
}

/// Two-tier storage of the current credentials
///
/// Cheap to clone; clones share the same underlying media.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    durable: Arc<dyn StorageMedium>,
    ephemeral: Arc<dyn StorageMedium>,
    prefix: String,
}

impl CredentialStore {
    /// Store with a file-backed durable medium at the platform default
    /// location and an in-process ephemeral medium
    #[must_use]
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_media(
            Arc::new(FileMedium::default_location()),
            Arc::new(MemoryMedium::new()),
            config.storage_prefix.clone(),
        )
    }

    /// Store over explicit media (custom locations, tests)
    pub fn with_media(
        durable: Arc<dyn StorageMedium>,
        ephemeral: Arc<dyn StorageMedium>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            durable,
            ephemeral,
            prefix: prefix.into(),
        }
    }

    /// Fully in-memory store (both tiers ephemeral); used by tests and
    /// embedders that manage persistence themselves
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_media(
            Arc::new(MemoryMedium::new()),
            Arc::new(MemoryMedium::new()),
            "hivefund_",
        )
    }

    fn key(&self, name: &str) -> String {
        format!("{}{name}", self.prefix)
    }

    fn medium(&self, scope: PersistenceScope) -> &Arc<dyn StorageMedium> {
        match scope {
            PersistenceScope::Durable => &self.durable,
            PersistenceScope::Ephemeral => &self.ephemeral,
        }
    }

    /// Read a value checking the durable tier first, then the ephemeral one
    fn read_tiered<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let key = self.key(name);
        for medium in [&self.durable, &self.ephemeral] {
            if let Some(raw) = medium.load(&key) {
                match serde_json::from_str(&raw) {
                    Ok(value) => return Some(value),
                    Err(e) => tracing::warn!("Discarding unparsable stored {name}: {e}"),
                }
            }
        }
        None
    }

    fn write_scoped<T: Serialize>(&self, name: &str, value: &T, scope: PersistenceScope) {
        match serde_json::to_string(value) {
            Ok(raw) => self.medium(scope).store(&self.key(name), &raw),
            Err(e) => tracing::warn!("Failed to serialize {name}: {e}"),
        }
    }

    fn remove_everywhere(&self, name: &str) {
        let key = self.key(name);
        self.durable.remove(&key);
        self.ephemeral.remove(&key);
    }

    // ------------------------------------------------------------------
    // Token pair
    // ------------------------------------------------------------------

    /// Persist both tokens atomically into the medium selected by `scope`
    ///
    /// The scope choice itself is recorded in a durable flag so later reads
    /// and refreshes know where the session lives.
    pub fn save_token_pair(&self, pair: &TokenPair, scope: PersistenceScope) {
        self.write_scoped(TOKENS_KEY, pair, scope);
        self.write_scoped(REMEMBER_KEY, &scope.remembered(), PersistenceScope::Durable);
    }

    /// Current token pair: durable tier first, then ephemeral, else absent
    #[must_use]
    pub fn token_pair(&self) -> Option<TokenPair> {
        self.read_tiered(TOKENS_KEY)
    }

    /// Access token projection of [`token_pair`](Self::token_pair)
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.token_pair().map(|pair| pair.access_token)
    }

    /// Refresh token projection of [`token_pair`](Self::token_pair)
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.token_pair().map(|pair| pair.refresh_token)
    }

    /// Scope recorded at the last [`save_token_pair`](Self::save_token_pair)
    ///
    /// Defaults to [`PersistenceScope::Ephemeral`] when nothing was recorded.
    #[must_use]
    pub fn remembered_scope(&self) -> PersistenceScope {
        let remembered: bool = self.read_tiered(REMEMBER_KEY).unwrap_or(false);
        PersistenceScope::from_remember_me(remembered)
    }

    // ------------------------------------------------------------------
    // Principal
    // ------------------------------------------------------------------

    /// Persist the principal into the medium selected by `scope`
    pub fn save_principal(&self, principal: &Principal, scope: PersistenceScope) {
        self.write_scoped(PRINCIPAL_KEY, principal, scope);
    }

    /// Stored principal, independent of token presence
    ///
    /// May still return a value after tokens were cleared; callers that need
    /// an authenticated identity must go through the session coordinator.
    #[must_use]
    pub fn principal(&self) -> Option<Principal> {
        self.read_tiered(PRINCIPAL_KEY)
    }

    // ------------------------------------------------------------------
    // Pending redirect
    // ------------------------------------------------------------------

    /// Record where to resume navigation after the next successful login
    pub fn set_pending_redirect(&self, url: &str) {
        self.write_scoped(REDIRECT_KEY, &url, PersistenceScope::Durable);
    }

    /// Stored post-login redirect target, if any
    #[must_use]
    pub fn pending_redirect(&self) -> Option<String> {
        self.read_tiered(REDIRECT_KEY)
    }

    /// Clear the post-login redirect target
    pub fn clear_pending_redirect(&self) {
        self.remove_everywhere(REDIRECT_KEY);
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Remove tokens, principal, and pending redirect from both media
    ///
    /// Idempotent; the remembered-scope flag is left in place so the next
    /// login defaults to the user's previous choice.
    pub fn clear_all(&self) {
        self.remove_everywhere(TOKENS_KEY);
        self.remove_everywhere(PRINCIPAL_KEY);
        self.remove_everywhere(REDIRECT_KEY);
    }
}
