//! `npm login` / `yarn login`
//!
//! Points the user-level rc of npm or yarn at an Artifactory npm repository
//! with the configured server's credentials.

use std::path::PathBuf;

use tracing::info;

use crate::artifactory::ArtifactoryService;
use crate::core::npm::ensure_repo_exists;
use crate::core::rc::{BuildTool, RcManager};
use crate::error::BridgeError;
use crate::infra::process::ToolRunner;

pub struct LoginCommand<'a> {
    pub tool: BuildTool,
    pub executable: PathBuf,
    pub repo: &'a str,
    pub service: &'a dyn ArtifactoryService,
    pub runner: &'a dyn ToolRunner,
}

impl LoginCommand<'_> {
    pub async fn run(&self) -> Result<(), BridgeError> {
        if self.repo.is_empty() {
            return Err(BridgeError::ConfigInvalid(format!(
                "a repository is required to configure {}, use --repo",
                self.tool
            )));
        }
        ensure_repo_exists(self.service, self.repo).await?;

        let manager = RcManager::new(
            self.tool,
            self.executable.clone(),
            self.repo,
            self.service.server(),
            self.runner,
        );
        manager.run().await?;
        info!(
            "Successfully configured {} to use JFrog Artifactory repository '{}'.",
            self.tool, self.repo
        );
        Ok(())
    }
}
