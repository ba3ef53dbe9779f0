//! Project configuration (`.jfrog/projects/<tool>.yaml`)
//!
//! Names the server and repositories a tool resolves from and deploys to.
//! The file is searched from the working directory upward; the home
//! directory's `projects/` folder is the fallback.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::server::{ServerDetails, ServersConfig};
use crate::error::{BridgeError, ProjectConfigError};

const PROJECT_DIR: &str = ".jfrog";
const PROJECTS_SUBDIR: &str = "projects";

/// Which side of a project a repository serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Resolver,
    Deployer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resolver => "resolver",
            Self::Deployer => "deployer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `resolver` or `deployer` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_repo: Option<String>,
    #[serde(default, rename = "deployMavenDescriptors")]
    pub deploy_maven_descriptors: bool,
    #[serde(default, rename = "deployIvyDescriptors")]
    pub deploy_ivy_descriptors: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ivy_pattern: Option<String>,
    #[serde(default, rename = "artifactPattern", skip_serializing_if = "Option::is_none")]
    pub artifact_pattern: Option<String>,
    #[serde(default)]
    pub use_plugin: bool,
    #[serde(default)]
    pub use_wrapper: bool,
    #[serde(default)]
    pub nuget_v2: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_patterns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_patterns: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl RepositoryConfig {
    /// Repository the tool talks to: `repo`, else `releaseRepo`
    pub fn target_repo(&self) -> Option<&str> {
        non_empty(&self.repo).or_else(|| non_empty(&self.release_repo))
    }
}

/// A parsed project configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub version: u32,
    #[serde(default, rename = "type")]
    pub config_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver: Option<RepositoryConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployer: Option<RepositoryConfig>,
    /// File the configuration was read from
    #[serde(skip)]
    pub path: PathBuf,
}

/// Target repository and server of one role
#[derive(Debug, Clone)]
pub struct RepoTarget {
    pub repo: String,
    pub server: ServerDetails,
}

impl ProjectConfig {
    /// Locate `<tool>.yaml` for a project rooted at or above `start`
    pub fn find(tool: &str, start: &Path, home_projects_dir: &Path) -> Result<PathBuf, ProjectConfigError> {
        let file_name = format!("{tool}.yaml");
        for dir in start.ancestors() {
            let candidate = dir.join(PROJECT_DIR).join(PROJECTS_SUBDIR).join(&file_name);
            if candidate.is_file() {
                debug!("Found project configuration {}", candidate.display());
                return Ok(candidate);
            }
        }
        let fallback = home_projects_dir.join(&file_name);
        if fallback.is_file() {
            debug!("Using project configuration from home: {}", fallback.display());
            return Ok(fallback);
        }
        Err(ProjectConfigError::NotFound {
            tool: tool.to_string(),
            searched: start.to_path_buf(),
        })
    }

    /// Read and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, ProjectConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ProjectConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let mut config = Self::from_yaml(&content).map_err(|e| ProjectConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        config.path = path.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Find and load the configuration of `tool`
    pub fn load_for(tool: &str, start: &Path, home_projects_dir: &Path) -> Result<Self, ProjectConfigError> {
        Self::load(&Self::find(tool, start, home_projects_dir)?)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Check the release/snapshot pairing of every present role
    pub fn validate(&self) -> Result<(), ProjectConfigError> {
        for (role, section) in [(Role::Resolver, &self.resolver), (Role::Deployer, &self.deployer)] {
            let Some(section) = section else { continue };
            let release = non_empty(&section.release_repo).is_some();
            let snapshot = non_empty(&section.snapshot_repo).is_some();
            if release != snapshot {
                return Err(ProjectConfigError::Invalid {
                    role: role.to_string(),
                    path: self.path.clone(),
                    reason: "releaseRepo and snapshotRepo must be set together".to_string(),
                });
            }
        }
        Ok(())
    }

    /// The section of `role`
    pub fn section(&self, role: Role) -> Option<&RepositoryConfig> {
        match role {
            Role::Resolver => self.resolver.as_ref(),
            Role::Deployer => self.deployer.as_ref(),
        }
    }

    /// Resolve the repository and server of `role`
    ///
    /// A section without `serverId` uses the default server.
    pub fn target(&self, role: Role, servers: &ServersConfig) -> Result<RepoTarget, BridgeError> {
        let section = self.section(role).ok_or_else(|| ProjectConfigError::MissingRole {
            role: role.to_string(),
            path: self.path.clone(),
        })?;
        let repo = section.target_repo().ok_or_else(|| ProjectConfigError::Invalid {
            role: role.to_string(),
            path: self.path.clone(),
            reason: "missing repository".to_string(),
        })?;
        let server = servers.get(non_empty(&section.server_id))?;
        Ok(RepoTarget {
            repo: repo.to_string(),
            server,
        })
    }

    /// Deployer target, falling back to the resolver
    pub fn deployer_or_resolver(&self, servers: &ServersConfig) -> Result<RepoTarget, BridgeError> {
        if self.deployer.is_some() {
            self.target(Role::Deployer, servers)
        } else {
            self.target(Role::Resolver, servers)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const NPM_YAML: &str = r"
version: 1
type: npm
resolver:
  serverId: main
  repo: npm-virtual
deployer:
  serverId: main
  repo: npm-local
";

    fn servers() -> ServersConfig {
        let mut config = ServersConfig::default();
        config
            .servers
            .insert("main".to_string(), ServerDetails::new("https://main.example.com").with_token("t"));
        config.default = Some("main".to_string());
        config
    }

    fn write_config(root: &Path, tool: &str, content: &str) -> PathBuf {
        let dir = root.join(".jfrog/projects");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{tool}.yaml"));
        std::fs::write(&path, content).unwrap();
        path
    }

    // ============ Unit Tests - Discovery ============

    #[test]
    fn test_find_walks_upward() {
        let temp = TempDir::new().unwrap();
        let expected = write_config(temp.path(), "npm", NPM_YAML);
        let nested = temp.path().join("packages/app/src");
        std::fs::create_dir_all(&nested).unwrap();

        let found = ProjectConfig::find("npm", &nested, &temp.path().join("home")).unwrap();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_find_falls_back_to_home() {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join("home/projects");
        std::fs::create_dir_all(&home).unwrap();
        std::fs::write(home.join("yarn.yaml"), NPM_YAML).unwrap();
        let work = temp.path().join("work");
        std::fs::create_dir_all(&work).unwrap();

        assert_eq!(ProjectConfig::find("yarn", &work, &home).unwrap(), home.join("yarn.yaml"));
        assert!(matches!(
            ProjectConfig::find("terraform", &work, &home),
            Err(ProjectConfigError::NotFound { .. })
        ));
    }

    // ============ Unit Tests - Roles ============

    #[test]
    fn test_targets() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "npm", NPM_YAML);
        let config = ProjectConfig::load(&path).unwrap();
        assert_eq!(config.config_type, "npm");

        let resolver = config.target(Role::Resolver, &servers()).unwrap();
        assert_eq!(resolver.repo, "npm-virtual");
        assert_eq!(resolver.server.url, "https://main.example.com");
        assert_eq!(config.deployer_or_resolver(&servers()).unwrap().repo, "npm-local");
    }

    #[test]
    fn test_release_repo_is_target() {
        let config = ProjectConfig::from_yaml(
            "version: 1\ntype: maven\nresolver:\n  releaseRepo: libs-release\n  snapshotRepo: libs-snapshot\n",
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.resolver.unwrap().target_repo(), Some("libs-release"));
    }

    #[test]
    fn test_unpaired_release_repo_rejected() {
        let config =
            ProjectConfig::from_yaml("version: 1\ntype: npm\ndeployer:\n  releaseRepo: only-release\n").unwrap();
        assert!(matches!(config.validate(), Err(ProjectConfigError::Invalid { .. })));
    }

    #[test]
    fn test_missing_role_and_repo() {
        let config = ProjectConfig::from_yaml("version: 1\ntype: npm\nresolver:\n  serverId: main\n").unwrap();
        assert!(matches!(
            config.target(Role::Deployer, &servers()),
            Err(BridgeError::ProjectConfig(ProjectConfigError::MissingRole { .. }))
        ));
        assert!(matches!(
            config.target(Role::Resolver, &servers()),
            Err(BridgeError::ProjectConfig(ProjectConfigError::Invalid { .. }))
        ));
        // No deployer: the resolver is used
        assert!(config.deployer_or_resolver(&servers()).is_err());
    }

    #[test]
    fn test_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "npm", "resolver: [unclosed");
        assert!(matches!(ProjectConfig::load(&path), Err(ProjectConfigError::Parse { .. })));
    }
}
