//! Wire types exchanged with Artifactory and the Access service

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Full repository configuration as returned by `GET api/repositories/<key>`
///
/// Kept as an attribute map so unknown fields survive a round trip to the
/// target instance.
pub type RepoParams = Map<String, Value>;

/// Summary record from `GET api/repositories`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RepositoryDetails {
    pub key: String,
    #[serde(rename = "type", default)]
    pub repo_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "packageType", default)]
    pub package_type: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Project administration privileges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AdminPrivileges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manage_members: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manage_resources: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_resources: Option<bool>,
}

/// A JFrog project as exposed by the Access service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Project {
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_privileges: Option<AdminPrivileges>,
    #[serde(default)]
    pub storage_quota_bytes: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soft_limit: Option<bool>,
    pub project_key: String,
}

/// `GET api/system/version`
#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    #[serde(default)]
    pub revision: String,
}

/// One row of an AQL `items.find` result
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct AqlItem {
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub actual_sha1: String,
    #[serde(default)]
    pub actual_md5: String,
    #[serde(default)]
    pub sha256: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AqlResponse {
    #[serde(default)]
    pub results: Vec<AqlItem>,
}

/// Checksums reported by the server for a stored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FileChecksums {
    #[serde(default)]
    pub sha1: String,
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub md5: String,
}

/// A file stored by an upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DeployedFile {
    pub repo: String,
    pub path: String,
    #[serde(rename = "downloadUri", default)]
    pub download_uri: String,
    #[serde(default)]
    pub checksums: FileChecksums,
}

impl DeployedFile {
    /// File name, the last path segment
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Result of one upload call
#[derive(Debug, Clone, Default)]
pub struct UploadOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub files: Vec<DeployedFile>,
}

impl UploadOutcome {
    /// Fold another outcome into this one
    pub fn merge(&mut self, other: UploadOutcome) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.files.extend(other.files);
    }
}

/// A dependency recorded in a published build
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct PublishedDependency {
    pub id: String,
    #[serde(rename = "type", default)]
    pub file_type: String,
    #[serde(default)]
    pub sha1: String,
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub md5: String,
}

/// A module of a published build
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct PublishedModule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub dependencies: Vec<PublishedDependency>,
}

/// The subset of a published build-info the reconciler needs
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct PublishedBuild {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub modules: Vec<PublishedModule>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PublishedBuildResponse {
    #[serde(rename = "buildInfo")]
    pub build_info: PublishedBuild,
}

/// Raw response of a user plugin execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginResponse {
    pub status: u16,
    pub body: String,
}
