//! Public/protected classification of outgoing calls
//!
//! Rules are evaluated in order and the first match wins:
//! 1. always-public path fragments (sign-in, sign-up, health, `/public/`)
//! 2. protected sub-resources nested under a collection (comments, likes, ...)
//! 3. GET on a collection, its search, by-owner or by-category listing
//! 4. everything else is protected
//!
//! Rule 2 is checked before rule 3 so a nested protected path never rides on
//! the public collection rule.

use regex::Regex;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Rule table inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Path fragments that are public for every method
    pub public_fragments: Vec<String>,
    /// Collections whose listing endpoints are publicly readable
    pub public_collections: Vec<String>,
    /// Sub-resources that stay protected even under a public collection
    pub protected_subresources: Vec<String>,
    /// Path segments addressing the per-user cart/session resource
    pub session_segments: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        Self {
            public_fragments: strings(&[
                "/auth/login",
                "/auth/signin",
                "/auth/register",
                "/auth/signup",
                "/users/login",
                "/users/register",
                "/health",
                "/status",
                "/actuator/health",
                "/public/",
            ]),
            public_collections: strings(&[
                "posts",
                "marketplace",
                "products",
                "listings",
                "itineraries",
                "trips",
            ]),
            protected_subresources: strings(&[
                "comments",
                "likes",
                "reactions",
                "bookmarks",
                "saves",
            ]),
            session_segments: strings(&["cart", "carts"]),
        }
    }
}

/// Why a call was classified the way it was
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    AlwaysPublic,
    ProtectedSubresource,
    PublicCollection,
    Protected,
}

impl Visibility {
    pub fn is_public(&self) -> bool {
        matches!(self, Visibility::AlwaysPublic | Visibility::PublicCollection)
    }
}

/// Pure classifier over `(method, path)`
#[derive(Debug, Clone)]
pub struct EndpointClassifier {
    public_fragments: Vec<String>,
    protected_subresource: Option<Regex>,
    public_collection: Option<Regex>,
    session: Option<Regex>,
}

impl Default for EndpointClassifier {
    fn default() -> Self {
        // Plain-word table
        Self::from_config(&ClassifierConfig::default()).unwrap_or_else(|_| Self {
            public_fragments: Vec::new(),
            protected_subresource: None,
            public_collection: None,
            session: None,
        })
    }
}

impl EndpointClassifier {
    /// Compile the rule table
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let collections = alternation(&config.public_collections);
        let subresources = alternation(&config.protected_subresources);
        let sessions = alternation(&config.session_segments);

        let protected_subresource = match (&collections, &subresources) {
            (Some(c), Some(s)) => Some(compile(&format!(r"^/(?:{c})/.+/(?:{s})(?:/.*)?$"))?),
            _ => None,
        };
        let public_collection = match &collections {
            Some(c) => Some(compile(&format!(
                r"^/(?:{c})(?:/search|/(?:user|users|owner|author|by-owner|category|categories|by-category)/[^/]+)?$"
            ))?),
            None => None,
        };
        let session = match &sessions {
            Some(s) => Some(compile(&format!(r"(?:^|/)(?:{s})(?:/|$)"))?),
            None => None,
        };

        Ok(Self {
            public_fragments: config
                .public_fragments
                .iter()
                .map(|f| f.to_ascii_lowercase())
                .collect(),
            protected_subresource,
            public_collection,
            session,
        })
    }

    /// Apply the rule table
    pub fn classify(&self, method: &Method, path: &str) -> Visibility {
        let path = normalize_path(path);

        if self
            .public_fragments
            .iter()
            .any(|fragment| path.contains(fragment.as_str()) || format!("{path}/") == *fragment)
        {
            return Visibility::AlwaysPublic;
        }

        if self
            .protected_subresource
            .as_ref()
            .is_some_and(|re| re.is_match(&path))
        {
            return Visibility::ProtectedSubresource;
        }

        if *method == Method::GET
            && self
                .public_collection
                .as_ref()
                .is_some_and(|re| re.is_match(&path))
        {
            return Visibility::PublicCollection;
        }

        Visibility::Protected
    }

    pub fn is_public(&self, method: &Method, path: &str) -> bool {
        self.classify(method, path).is_public()
    }

    /// Whether the path addresses the cart/session resource
    pub fn is_session_resource(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.session.as_ref().is_some_and(|re| re.is_match(&path))
    }
}

/// Lowercase, drop query/fragment, an `/api` prefix and trailing slashes
fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let mut path = path.trim().to_ascii_lowercase();
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    if path == "/api" {
        path = "/".to_string();
    } else if let Some(rest) = path.strip_prefix("/api/") {
        path = format!("/{rest}");
    }
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    path
}

fn alternation(words: &[String]) -> Option<String> {
    let escaped: Vec<String> = words
        .iter()
        .map(|w| w.trim().trim_matches('/').to_ascii_lowercase())
        .filter(|w| !w.is_empty())
        .map(|w| regex::escape(&w))
        .collect();
    if escaped.is_empty() {
        None
    } else {
        Some(escaped.join("|"))
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::Configuration {
        message: format!("Invalid classifier rule {pattern}: {e}"),
        source: Some(e.into()),
    })
}
