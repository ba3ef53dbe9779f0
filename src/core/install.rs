//! npm install and ci
//!
//! Runs the install against the resolver repository through a temporary
//! project rc, then optionally records the installed dependency graph as a
//! build-info module.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::artifactory::ArtifactoryService;
use crate::core::build_info::{BuildInfoRecorder, ModuleType};
use crate::core::checksums::{previous_build_checksums, reconcile};
use crate::core::dependencies::{resolve, TypeRestriction};
use crate::core::npm::{registry_access, NpmTool};
use crate::core::npmrc::TempRc;
use crate::core::options::NpmOptions;
use crate::core::package_info::PackageInfo;
use crate::error::{join_cleanup, BridgeError};
use crate::infra::process::{ToolCommand, ToolRunner};

/// Which install flavor to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallKind {
    Install,
    Ci,
}

impl InstallKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Ci => "ci",
        }
    }
}

/// An `npm install` or `npm ci` run
pub struct InstallCommand<'a> {
    pub kind: InstallKind,
    pub options: NpmOptions,
    pub working_dir: PathBuf,
    /// Resolver repository
    pub repo: String,
    pub tool: NpmTool,
    pub runner: &'a dyn ToolRunner,
    pub service: Arc<dyn ArtifactoryService>,
    /// Root of persisted build-info records
    pub builds_root: PathBuf,
    pub cancel: CancellationToken,
}

/// What an install produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSummary {
    pub resolved: usize,
    pub missing: usize,
    /// Partial written for the module, when build info was collected
    pub partial: Option<PathBuf>,
}

impl InstallCommand<'_> {
    pub async fn run(&self) -> Result<InstallSummary, BridgeError> {
        let cmd = self.kind.as_str();
        info!("Running npm {cmd}.");
        self.options.build_configuration.validate()?;

        let access = registry_access(self.service.as_ref(), &self.repo).await?;
        let package = PackageInfo::from_dir_if_exists(&self.working_dir, Some(&self.tool.version))?;

        let (rc, restriction) = TempRc::create(
            self.runner,
            &self.tool.executable,
            &self.working_dir,
            &self.options.clean_args,
            &access.registry,
            &access.auth,
            &self.tool.version,
            package.as_ref().map(|p| p.scope.clone()).filter(|s| !s.is_empty()),
        )
        .await?;

        let result = self.run_tool().await;
        join_cleanup(result, rc.release())?;

        let mut collect = self.options.build_configuration.is_collect_build_info();
        if collect && self.options.clean_args.iter().any(|a| !a.starts_with('-')) {
            debug!(
                "Build-info dependencies collection is not supported for installations of single packages. Build-info creation is skipped."
            );
            collect = false;
        }

        let summary = if collect {
            self.collect_build_info(restriction, package.as_ref()).await?
        } else {
            InstallSummary::default()
        };
        info!("npm {cmd} finished successfully.");
        Ok(summary)
    }

    async fn run_tool(&self) -> Result<(), BridgeError> {
        let mut args = vec![self.kind.as_str().to_string()];
        args.extend(self.options.clean_args.iter().cloned());
        let command = ToolCommand::new(&self.tool.executable, args).in_dir(&self.working_dir);
        self.runner.run(&command).await?;
        Ok(())
    }

    async fn collect_build_info(
        &self,
        restriction: TypeRestriction,
        package: Option<&PackageInfo>,
    ) -> Result<InstallSummary, BridgeError> {
        let build = &self.options.build_configuration;
        let Some(recorder) = BuildInfoRecorder::for_build(&self.builds_root, build) else {
            return Ok(InstallSummary::default());
        };
        let module_id = match (&build.module, package) {
            (Some(module), _) => module.clone(),
            (None, Some(package)) => package.module_id(),
            (None, None) => PackageInfo::from_dir(&self.working_dir, Some(&self.tool.version))?.module_id(),
        };

        let deps = resolve(
            restriction,
            &self.options.clean_args,
            self.runner,
            &self.tool.executable,
            &self.working_dir,
            &module_id,
        )
        .await?;

        info!(
            "Collecting dependencies information... For the first run of the build, this may take a few minutes. Subsequent runs should be faster."
        );
        let build_name = build.build_name.as_deref().unwrap_or_default();
        let previous = previous_build_checksums(self.service.as_ref(), build_name, build.project()).await?;
        let outcome = reconcile(
            deps,
            &previous,
            self.service.clone(),
            self.options.threads,
            self.cancel.clone(),
        )
        .await?;

        let partial = recorder.record_dependencies(&module_id, ModuleType::Npm, &outcome.resolved, &outcome.missing)?;
        Ok(InstallSummary {
            resolved: outcome.resolved.len(),
            missing: outcome.missing.len(),
            partial: Some(partial),
        })
    }
}
