//! Server references
//!
//! A [`ServerDetails`] describes one Artifactory instance and the
//! credentials used to reach it. Servers are configured in
//! `<home>/servers.toml`:
//!
//! ```toml
//! default = "main"
//!
//! [servers.main]
//! url = "https://acme.jfrog.io/"
//! access_token = "..."
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// One Artifactory instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDetails {
    /// Identifier in `servers.toml`
    #[serde(skip)]
    pub server_id: String,
    /// Platform base URL
    #[serde(default)]
    pub url: String,
    /// Artifactory base URL, derived from `url` when empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub artifactory_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert_key_path: Option<PathBuf>,
}

/// The single authentication mode in effect for a server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode<'a> {
    /// Access token, optionally tied to a known user
    Token { user: Option<&'a str>, token: &'a str },
    /// Username and password
    Basic { user: &'a str, password: &'a str },
    Anonymous,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

impl ServerDetails {
    /// Server addressed by URL only
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_basic(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// Select the auth mode: token, then basic, then anonymous
    pub fn auth_mode(&self) -> AuthMode<'_> {
        let user = non_empty(self.user.as_ref());
        if let Some(token) = non_empty(self.access_token.as_ref()) {
            return AuthMode::Token { user, token };
        }
        match (user, non_empty(self.password.as_ref())) {
            (Some(user), Some(password)) => AuthMode::Basic { user, password },
            _ => AuthMode::Anonymous,
        }
    }

    /// Platform URL with a trailing slash
    pub fn platform_url(&self) -> String {
        if self.url.is_empty() {
            let rt = with_trailing_slash(&self.artifactory_url);
            return rt
                .strip_suffix("artifactory/")
                .map_or(rt.clone(), str::to_string);
        }
        with_trailing_slash(&self.url)
    }

    /// Artifactory URL with a trailing slash
    ///
    /// A URL that already points at `/artifactory` is used as is.
    pub fn artifactory_url(&self) -> String {
        if !self.artifactory_url.is_empty() {
            return with_trailing_slash(&self.artifactory_url);
        }
        let base = with_trailing_slash(&self.url);
        if base.ends_with("/artifactory/") {
            base
        } else {
            format!("{base}artifactory/")
        }
    }

    /// npm API URL of a repository, `<artifactory>/api/npm/<repo>`
    pub fn npm_repository_url(&self, repo: &str) -> String {
        format!("{}api/npm/{repo}", self.artifactory_url())
    }

    /// Reject a server without a usable URL
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.url.is_empty() && self.artifactory_url.is_empty() {
            let id = if self.server_id.is_empty() {
                "<unnamed>"
            } else {
                &self.server_id
            };
            return Err(BridgeError::ConfigInvalid(format!(
                "server '{id}' has no URL configured"
            )));
        }
        Ok(())
    }
}

/// Contents of `servers.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServersConfig {
    /// Server used when none is named
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default)]
    pub servers: BTreeMap<String, ServerDetails>,
}

impl ServersConfig {
    /// Load from a path; a missing file yields an empty configuration
    pub fn load_from_path(path: &Path) -> Result<Self, BridgeError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::ConfigInvalid(format!("failed to read '{}': {e}", path.display()))
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|e| {
            BridgeError::ConfigInvalid(format!("failed to parse '{}': {e}", path.display()))
        })?;
        for (id, server) in &mut config.servers {
            server.server_id.clone_from(id);
        }
        Ok(config)
    }

    /// Look up a server by id, or the default server when `id` is `None`
    pub fn get(&self, id: Option<&str>) -> Result<ServerDetails, BridgeError> {
        let id = match id.or(self.default.as_deref()) {
            Some(id) => id,
            None if self.servers.len() == 1 => {
                return self
                    .servers
                    .values()
                    .next()
                    .cloned()
                    .ok_or_else(|| BridgeError::ConfigInvalid("no servers configured".to_string()));
            }
            None => {
                return Err(BridgeError::ConfigInvalid(
                    "no server id given and no default server configured".to_string(),
                ))
            }
        };
        self.servers
            .get(id)
            .cloned()
            .ok_or_else(|| BridgeError::ConfigInvalid(format!("server '{id}' is not configured")))
    }
}
