//! Any other npm command
//!
//! Runs `npm <cmd> <args>` against the deployer repository (or the resolver
//! when no deployer is configured) inside a temporary project rc. The
//! tool's stdout goes to our stderr and no build info is collected.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::artifactory::ArtifactoryService;
use crate::core::npm::{registry_access, NpmTool};
use crate::core::npmrc::TempRc;
use crate::core::package_info::PackageInfo;
use crate::error::{join_cleanup, BridgeError};
use crate::infra::process::{ToolCommand, ToolRunner};

/// A pass-through npm run
pub struct NativeCommand<'a> {
    /// Subcommand followed by its arguments
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub repo: String,
    pub tool: NpmTool,
    pub runner: &'a dyn ToolRunner,
    pub service: Arc<dyn ArtifactoryService>,
}

impl NativeCommand<'_> {
    pub async fn run(&self) -> Result<(), BridgeError> {
        let access = registry_access(self.service.as_ref(), &self.repo).await?;
        let scope = PackageInfo::from_dir_if_exists(&self.working_dir, Some(&self.tool.version))?
            .map(|p| p.scope)
            .filter(|s| !s.is_empty());

        let (rc, _) = TempRc::create(
            self.runner,
            &self.tool.executable,
            &self.working_dir,
            &self.args,
            &access.registry,
            &access.auth,
            &self.tool.version,
            scope,
        )
        .await?;

        let command = ToolCommand::new(&self.tool.executable, self.args.clone())
            .in_dir(&self.working_dir)
            .stdout_to_stderr();
        debug!("Running {}", command.display());
        let result = self.runner.run(&command).await.map(|_| ()).map_err(BridgeError::from);
        join_cleanup(result, rc.release())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifactory::testing::FakeArtifactory;
    use crate::error::ToolError;
    use crate::infra::process::testing::ScriptedRunner;
    use crate::infra::process::OutputSink;
    use semver::Version;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_stdout_redirected_and_exit_code_kept() {
        let temp = TempDir::new().unwrap();
        let fake = Arc::new(FakeArtifactory::new("https://rt.example.com"));
        fake.add_repository("npm-local", "local", "npm", json!({}));

        let runner = ScriptedRunner::new();
        runner.push_stdout("false\n");
        runner.push_stdout("");
        runner.push_error(ToolError::ExitCode {
            command: "npm view".to_string(),
            exit_code: 3,
            stderr: String::new(),
            stdout: String::new(),
        });

        let cmd = NativeCommand {
            args: vec!["view".to_string(), "lodash".to_string()],
            working_dir: temp.path().to_path_buf(),
            repo: "npm-local".to_string(),
            tool: NpmTool {
                executable: PathBuf::from("npm"),
                version: Version::new(9, 0, 0),
            },
            runner: &runner,
            service: fake,
        };
        let err = cmd.run().await.unwrap_err();
        assert_eq!(err.exit_code(), 3);

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[2].args, vec!["view", "lodash"]);
        assert_eq!(calls[2].stdout, OutputSink::Stderr);
        assert!(!temp.path().join(".npmrc").exists());
    }
}
