//! Credential storage for protected calls
//!
//! The store is the only owner of the current user's credentials. Readers get
//! a fresh copy on every [`CredentialStore::get`], never a shared reference.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::KeyValueStore;
use crate::Result;

/// Key written by the current client
pub const CREDENTIALS_KEY: &str = "wayfarer.credentials";
/// Legacy key holding a `{username, password}` object
pub const LEGACY_USER_KEY: &str = "user";
/// Legacy key holding a base64 `principal:secret` token
pub const LEGACY_BASIC_KEY: &str = "basicAuth";

/// Transport credentials of the signed-in user
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(alias = "username")]
    pub principal: String,
    #[serde(alias = "password")]
    pub secret: String,
}

impl Credentials {
    pub fn new(principal: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            secret: secret.into(),
        }
    }

    /// Encode as a Basic `Authorization` header value
    pub fn basic_header_value(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.principal, self.secret));
        format!("Basic {}", token)
    }

    /// Decode a base64 `principal:secret` token (with or without `Basic ` prefix)
    pub fn from_basic_token(token: &str) -> Option<Self> {
        let token = token.trim();
        let token = token.strip_prefix("Basic ").unwrap_or(token);
        let decoded = STANDARD.decode(token).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (principal, secret) = decoded.split_once(':')?;
        if principal.is_empty() {
            return None;
        }
        Some(Self::new(principal, secret))
    }

    fn is_usable(&self) -> bool {
        !self.principal.is_empty() && !self.secret.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("principal", &self.principal)
            .field("secret", &"***")
            .finish()
    }
}

/// How a stored value under one key is encoded
#[derive(Debug, Clone, Copy)]
enum KeyFormat {
    Json,
    BasicToken,
}

/// Keys probed by [`CredentialStore::get`], highest priority first
const LOOKUP_ORDER: &[(&str, KeyFormat)] = &[
    (CREDENTIALS_KEY, KeyFormat::Json),
    (LEGACY_USER_KEY, KeyFormat::Json),
    (LEGACY_BASIC_KEY, KeyFormat::BasicToken),
];

/// Process-wide holder of the current credentials
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// First parseable credentials across the known keys
    pub fn get(&self) -> Option<Credentials> {
        for (key, format) in LOOKUP_ORDER {
            let Some(raw) = self.store.get(key) else {
                continue;
            };
            let parsed = match format {
                KeyFormat::Json => serde_json::from_str::<Credentials>(&raw).ok(),
                KeyFormat::BasicToken => Credentials::from_basic_token(&raw),
            };
            match parsed {
                Some(credentials) if credentials.is_usable() => {
                    debug!(key = %key, "Loaded credentials");
                    return Some(credentials);
                }
                _ => warn!(key = %key, "Ignoring unparseable stored credentials"),
            }
        }
        None
    }

    /// Persist credentials under the primary key
    pub fn set(&self, credentials: &Credentials) -> Result<()> {
        let encoded = serde_json::to_string(credentials)?;
        self.store.set(CREDENTIALS_KEY, &encoded)
    }

    /// Forget credentials under every known key
    pub fn clear(&self) -> Result<()> {
        for (key, _) in LOOKUP_ORDER {
            self.store.remove(key)?;
        }
        Ok(())
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}
