//! Shared npm plumbing
//!
//! Locating the npm client and preparing the registry and auth every
//! Artifactory-bound npm command needs.

use std::path::PathBuf;

use semver::Version;
use tracing::debug;

use crate::artifactory::ArtifactoryService;
use crate::core::npmrc::{npm_auth_lines, validate_npm_version};
use crate::error::BridgeError;
use crate::infra::process::{detect_version, find_executable, ToolRunner};

/// The npm client in use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpmTool {
    pub executable: PathBuf,
    pub version: Version,
}

impl NpmTool {
    /// Find npm in PATH, read its version and check the supported minimum
    pub async fn detect(runner: &dyn ToolRunner) -> Result<Self, BridgeError> {
        let executable = find_executable("npm")?;
        Self::at(runner, executable).await
    }

    /// Use a known npm executable
    pub async fn at(runner: &dyn ToolRunner, executable: PathBuf) -> Result<Self, BridgeError> {
        let version = detect_version(runner, &executable).await?;
        debug!("Using npm {version} at {}", executable.display());
        validate_npm_version(&version)?;
        Ok(Self { executable, version })
    }
}

/// Registry URL and rc auth lines for one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryAccess {
    pub registry: String,
    pub auth: String,
}

/// Fail with *RepoNotFound* unless `repo` exists
pub async fn ensure_repo_exists(service: &dyn ArtifactoryService, repo: &str) -> Result<(), BridgeError> {
    if service.repository_exists(repo).await? {
        Ok(())
    } else {
        Err(BridgeError::RepoNotFound(repo.to_string()))
    }
}

/// Check the server and repository, then fetch auth for npm
pub async fn registry_access(service: &dyn ArtifactoryService, repo: &str) -> Result<RegistryAccess, BridgeError> {
    let auth = npm_auth_lines(service).await?;
    ensure_repo_exists(service, repo).await?;
    Ok(RegistryAccess {
        registry: service.server().npm_repository_url(repo),
        auth,
    })
}
