//! npm package identity
//!
//! Reads `{name, version}` from `package.json` and derives the scope,
//! build-info module id and deploy path.

use std::path::Path;

use semver::Version;
use serde::Deserialize;

use crate::config::defaults::NPM_STRICT_VERSION_MAJOR;
use crate::error::BridgeError;
use crate::infra::filesystem::read_file;

/// Name, version and scope of an npm package
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackageInfo {
    /// Name without the scope
    pub name: String,
    pub version: String,
    /// `@scope`, empty when unscoped
    pub scope: String,
}

#[derive(Debug, Deserialize)]
struct PackageJson {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
}

impl PackageInfo {
    /// Parse `package.json` content
    ///
    /// npm before 7 strips a leading `v` or `=` from versions; so do we for
    /// those clients, keeping deploy paths in line with what npm publishes.
    pub fn from_json(content: &[u8], npm_version: Option<&Version>) -> Result<Self, BridgeError> {
        let parsed: PackageJson = serde_json::from_slice(content)
            .map_err(|e| BridgeError::ConfigInvalid(format!("invalid package.json: {e}")))?;

        let mut version = parsed.version;
        if npm_version.map_or(true, |v| v.major < NPM_STRICT_VERSION_MAJOR) {
            version = version.trim_start_matches(['v', '=']).to_string();
        }

        let (scope, name) = split_scope(&parsed.name);
        Ok(Self {
            name: name.to_string(),
            version,
            scope: scope.to_string(),
        })
    }

    /// Read `<dir>/package.json`
    pub fn from_dir(dir: &Path, npm_version: Option<&Version>) -> Result<Self, BridgeError> {
        let path = dir.join("package.json");
        let content = read_file(&path)?;
        Self::from_json(content.as_bytes(), npm_version)
    }

    /// Like [`Self::from_dir`], but a missing file yields `None`
    pub fn from_dir_if_exists(dir: &Path, npm_version: Option<&Version>) -> Result<Option<Self>, BridgeError> {
        if !dir.join("package.json").exists() {
            return Ok(None);
        }
        Self::from_dir(dir, npm_version).map(Some)
    }

    /// `@scope/name`, or `name` when unscoped
    pub fn full_name(&self) -> String {
        if self.scope.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.scope, self.name)
        }
    }

    /// Build-info module id, `[scope/]name:version`
    pub fn module_id(&self) -> String {
        format!("{}:{}", self.full_name(), self.version)
    }

    /// `[scope/]name/-/name-version.tgz`
    pub fn deploy_path(&self) -> String {
        format!("{}/-/{}-{}.tgz", self.full_name(), self.name, self.version)
    }
}

/// Split `@scope/name` into (`@scope`, `name`)
pub fn split_scope(full_name: &str) -> (&str, &str) {
    if full_name.starts_with('@') {
        if let Some((scope, name)) = full_name.split_once('/') {
            return (scope, name);
        }
    }
    ("", full_name)
}
