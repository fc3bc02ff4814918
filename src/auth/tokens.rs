//! Token storage and management

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::models::AuthResponse;

/// Seconds of remaining lifetime below which a token counts as expired.
const EXPIRY_SKEW_SECS: u64 = 300;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Absolute expiry (unix seconds) for a token valid for `expires_in_secs`.
pub fn expires_at(expires_in_secs: u64) -> u64 {
    now_secs() + expires_in_secs
}

pub fn is_expired(expires_on: Option<u64>) -> bool {
    match expires_on {
        // Consider expired if less than 5 minutes remaining
        Some(exp) => now_secs() + EXPIRY_SKEW_SECS >= exp,
        None => false,
    }
}

/// State of a redirect sign-in that left the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRedirect {
    pub state: String,
    pub pkce_verifier: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    #[serde(default)]
    pub extra_query_parameters: BTreeMap<String, String>,
}

/// Token store trait for different storage backends
pub trait TokenStore {
    /// Unexpired access token whose scopes cover `scopes` (case-insensitive).
    fn find_access_token(&self, scopes: &[String]) -> Option<AuthResponse>;
    fn store_access_token(&mut self, response: AuthResponse);
    fn get_refresh_token(&self) -> Option<String>;
    fn set_refresh_token(&mut self, token: String);
    fn set_pending_redirect(&mut self, pending: PendingRedirect);
    fn take_pending_redirect(&mut self) -> Option<PendingRedirect>;
    fn clear_tokens(&mut self);
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheData {
    refresh_token: Option<String>,
    #[serde(default)]
    access_tokens: Vec<AuthResponse>,
    pending_redirect: Option<PendingRedirect>,
}

/// Per-application token cache, optionally backed by a TOML file.
#[derive(Debug, Default)]
pub struct TokenCache {
    path: Option<PathBuf>,
    data: CacheData,
}

impl TokenCache {
    /// Cache that never touches disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Default on-disk location for an application's cache
    pub fn default_path(client_id: &str) -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "ms-login", "ms-login")
            .context("Could not determine cache directory")?;
        Ok(proj_dirs
            .cache_dir()
            .join(format!("tokens-{}.toml", client_id)))
    }

    /// Load the cache stored at `path`; a missing file is an empty cache.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let content = fs::read_to_string(&path).context("Failed to read token cache")?;
            toml::from_str(&content).context("Failed to parse token cache")?
        } else {
            CacheData::default()
        };
        Ok(Self {
            path: Some(path),
            data,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the cache back to disk. No-op for in-memory caches.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create cache directory")?;
        }

        let content = toml::to_string_pretty(&self.data).context("Failed to serialize token cache")?;
        fs::write(path, content).context("Failed to write token cache")?;

        // Set restrictive permissions on cache file (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(path, perms).context("Failed to set cache permissions")?;
        }

        Ok(())
    }

    pub fn access_tokens(&self) -> &[AuthResponse] {
        &self.data.access_tokens
    }

    pub fn has_pending_redirect(&self) -> bool {
        self.data.pending_redirect.is_some()
    }
}

fn covers(granted: &[String], requested: &[String]) -> bool {
    requested
        .iter()
        .all(|want| granted.iter().any(|have| have.eq_ignore_ascii_case(want)))
}

impl TokenStore for TokenCache {
    fn find_access_token(&self, scopes: &[String]) -> Option<AuthResponse> {
        self.data
            .access_tokens
            .iter()
            .find(|t| !is_expired(t.expires_on) && covers(&t.scopes, scopes))
            .cloned()
    }

    fn store_access_token(&mut self, response: AuthResponse) {
        // A newer token for the same scope set replaces the old one.
        self.data.access_tokens.retain(|t| {
            !is_expired(t.expires_on)
                && !(covers(&t.scopes, &response.scopes) && covers(&response.scopes, &t.scopes))
        });
        self.data.access_tokens.push(response);
    }

    fn get_refresh_token(&self) -> Option<String> {
        self.data.refresh_token.clone()
    }

    fn set_refresh_token(&mut self, token: String) {
        self.data.refresh_token = Some(token);
    }

    fn set_pending_redirect(&mut self, pending: PendingRedirect) {
        self.data.pending_redirect = Some(pending);
    }

    fn take_pending_redirect(&mut self) -> Option<PendingRedirect> {
        self.data.pending_redirect.take()
    }

    fn clear_tokens(&mut self) {
        self.data = CacheData::default();
    }
}
