//! npm publish
//!
//! Packs the project (or takes a ready tarball), reads the package identity
//! from the tarball itself, optionally gates on a security scan, and uploads
//! the tarball to `<repo>/<deploy path>`. A tarball created by the pack step
//! is always deleted afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::artifactory::{ArtifactoryService, DeployedFile};
use crate::config::defaults::{DIST_TAG_PROP_KEY, NPM_PACK_DESTINATION_VERSION};
use crate::core::build_info::{artifacts_from_deployed, BuildInfoRecorder, ModuleType};
use crate::core::npm::{ensure_repo_exists, NpmTool};
use crate::core::options::{take_value_flag, NpmOptions, ScanOutputFormat};
use crate::core::package_info::PackageInfo;
use crate::core::server::ServerDetails;
use crate::core::version::at_least;
use crate::error::{join_cleanup, BridgeError};
use crate::infra::archive::read_tgz_entry;
use crate::infra::dirs::expand_tilde;
use crate::infra::filesystem::remove_file_if_exists;
use crate::infra::process::{ToolCommand, ToolRunner};

const PACK_DESTINATION_FLAG: &str = "--pack-destination";
const TARBALL_PACKAGE_JSON: &str = "package/package.json";

/// What a scan gate is asked to check
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub tarball: PathBuf,
    /// Upload prefix, `<repo>/`
    pub target: String,
    pub server: ServerDetails,
    pub format: ScanOutputFormat,
}

/// Security scan gate run before upload
///
/// Returning an error aborts the publish; nothing is uploaded.
pub type ScanFn = Arc<dyn Fn(ScanRequest) -> BoxFuture<'static, Result<(), BridgeError>> + Send + Sync>;

/// An `npm publish` run
pub struct PublishCommand<'a> {
    pub options: NpmOptions,
    pub working_dir: PathBuf,
    /// Deployer repository
    pub repo: String,
    pub tool: NpmTool,
    pub runner: &'a dyn ToolRunner,
    pub service: Arc<dyn ArtifactoryService>,
    pub builds_root: PathBuf,
    /// Required when `--scan` was given
    pub scan: Option<ScanFn>,
}

/// Result of a publish
#[derive(Debug, Clone, Default)]
pub struct PublishSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Uploaded files, kept when a detailed summary was requested
    pub files: Vec<DeployedFile>,
    pub package: PackageInfo,
    pub partial: Option<PathBuf>,
}

/// Where the package to publish comes from
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    /// A project directory to pack
    Directory(PathBuf),
    /// A tarball given on the command line
    Tarball(PathBuf),
}

/// Read the package identity from a packed tarball
pub fn package_info_from_tarball(tarball: &Path, npm_version: &semver::Version) -> Result<PackageInfo, BridgeError> {
    debug!("Extracting info from npm package: {}", tarball.display());
    let content = read_tgz_entry(tarball, TARBALL_PACKAGE_JSON)?
        .ok_or_else(|| BridgeError::MissingPackageJson(tarball.to_path_buf()))?;
    PackageInfo::from_json(&content, Some(npm_version))
}

/// Tarball file name printed by `npm pack`: its last non-blank line
pub fn packed_file_name(pack_output: &str) -> Option<&str> {
    pack_output.lines().map(str::trim).rev().find(|l| !l.is_empty())
}

impl PublishCommand<'_> {
    pub async fn run(&self) -> Result<PublishSummary, BridgeError> {
        info!("Running npm Publish");
        let build = &self.options.build_configuration;
        build.validate()?;

        let mut args = self.options.clean_args.clone();
        let dist_tag = take_value_flag(&mut args, "--tag")?;

        let source = self.publish_source(&args)?;
        ensure_repo_exists(self.service.as_ref(), &self.repo).await?;

        let (tarball, created) = match &source {
            Source::Tarball(path) => {
                debug!("The provided path is not a directory, we assume this is a compressed npm package");
                (path.clone(), false)
            }
            Source::Directory(dir) => {
                // package.json must be readable before packing
                PackageInfo::from_dir_if_exists(dir, Some(&self.tool.version))?;
                (self.pack(&args).await?, true)
            }
        };

        let result = self.deploy(&tarball, dist_tag.as_deref()).await;
        let cleanup = if created {
            remove_file_if_exists(&tarball)
                .map(|()| debug!("Successfully deleted the created npm package: {}", tarball.display()))
                .map_err(BridgeError::from)
        } else {
            Ok(())
        };
        let mut summary = join_cleanup(result, cleanup)?;

        if let Some(recorder) = BuildInfoRecorder::for_build(&self.builds_root, build) {
            let module_id = build.module.clone().unwrap_or_else(|| summary.package.module_id());
            let artifacts = artifacts_from_deployed(&summary.files, "tgz");
            summary.partial = Some(recorder.record_artifacts(&module_id, ModuleType::Npm, artifacts)?);
        }
        if !self.options.detailed_summary {
            summary.files.clear();
        }
        info!("npm publish finished successfully.");
        Ok(summary)
    }

    /// The first positional argument, resolved against the working dir
    fn publish_source(&self, args: &[String]) -> Result<Source, BridgeError> {
        let path = match args.first().map(|a| a.trim()) {
            Some(first) if !first.starts_with('-') => {
                let path = expand_tilde(first);
                if path.is_absolute() {
                    path
                } else {
                    self.working_dir.join(path)
                }
            }
            _ => self.working_dir.clone(),
        };
        let metadata = std::fs::metadata(&path)
            .map_err(|e| BridgeError::ConfigInvalid(format!("cannot access '{}': {e}", path.display())))?;
        Ok(if metadata.is_dir() {
            Source::Directory(path)
        } else {
            Source::Tarball(path)
        })
    }

    async fn pack(&self, args: &[String]) -> Result<PathBuf, BridgeError> {
        debug!("Creating npm package.");
        let mut pack_args = args.to_vec();
        let destination = if at_least(&self.tool.version.to_string(), NPM_PACK_DESTINATION_VERSION) {
            let mut scratch = pack_args.clone();
            take_value_flag(&mut scratch, PACK_DESTINATION_FLAG)?
        } else {
            if take_value_flag(&mut pack_args, PACK_DESTINATION_FLAG)?.is_some() {
                warn!(
                    "{PACK_DESTINATION_FLAG} requires npm {NPM_PACK_DESTINATION_VERSION} or higher and is ignored"
                );
            }
            None
        };

        let mut cmd_args = vec!["pack".to_string()];
        cmd_args.extend(pack_args);
        let output = self
            .runner
            .run(
                &ToolCommand::new(&self.tool.executable, cmd_args)
                    .in_dir(&self.working_dir)
                    .capture_stdout(),
            )
            .await?;
        let file_name = packed_file_name(&output.stdout)
            .ok_or_else(|| BridgeError::ConfigInvalid("npm pack did not report a tarball".to_string()))?;

        let dir = match destination {
            Some(dest) => self.working_dir.join(expand_tilde(&dest)),
            None => self.working_dir.clone(),
        };
        Ok(dir.join(file_name))
    }

    async fn deploy(&self, tarball: &Path, dist_tag: Option<&str>) -> Result<PublishSummary, BridgeError> {
        let package = package_info_from_tarball(tarball, &self.tool.version)?;
        let target = format!("{}/{}", self.repo, package.deploy_path());

        if self.options.xray_scan {
            let scan = self.scan.as_ref().ok_or_else(|| {
                BridgeError::ConfigInvalid("a security scan was requested but no scanner is available".to_string())
            })?;
            scan(ScanRequest {
                tarball: tarball.to_path_buf(),
                target: format!("{}/", self.repo),
                server: self.service.server().clone(),
                format: self.options.scan_output_format,
            })
            .await?;
        }

        let mut props = BTreeMap::new();
        if let Some(tag) = dist_tag {
            props.insert(DIST_TAG_PROP_KEY.to_string(), tag.to_string());
        }
        if let Some(recorder) = BuildInfoRecorder::for_build(&self.builds_root, &self.options.build_configuration) {
            props.extend(recorder.build_props()?);
        }

        debug!("Deploying npm package to {target}");
        let outcome = self.service.upload(tarball, &target, &props).await?;
        if outcome.failed > 0 {
            return Err(BridgeError::UploadFailed(
                "the npm package to Artifactory. See Artifactory logs for more details.".to_string(),
            ));
        }
        Ok(PublishSummary {
            succeeded: outcome.succeeded,
            failed: outcome.failed,
            files: outcome.files,
            package,
            partial: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifactory::testing::FakeArtifactory;
    use crate::core::build_info::read_partials;
    use crate::core::options::extract_npm_options;
    use crate::infra::archive::testing::write_tgz;
    use crate::infra::process::testing::ScriptedRunner;
    use semver::Version;
    use serde_json::json;
    use tempfile::TempDir;

    const PACKAGE_JSON: &str = r#"{"name":"@jfrog/pkg","version":"1.2.0"}"#;

    fn fake() -> Arc<FakeArtifactory> {
        let fake = Arc::new(FakeArtifactory::new("https://rt.example.com"));
        fake.add_repository("npm-local", "local", "npm", json!({}));
        fake
    }

    fn command<'a>(
        temp: &TempDir,
        runner: &'a ScriptedRunner,
        service: Arc<FakeArtifactory>,
        args: &[&str],
        npm: Version,
    ) -> PublishCommand<'a> {
        let args: Vec<String> = args.iter().map(|a| (*a).to_string()).collect();
        PublishCommand {
            options: extract_npm_options(&args).unwrap(),
            working_dir: temp.path().to_path_buf(),
            repo: "npm-local".to_string(),
            tool: NpmTool {
                executable: PathBuf::from("npm"),
                version: npm,
            },
            runner,
            service,
            builds_root: temp.path().join("builds"),
            scan: None,
        }
    }

    /// Project whose `npm pack` output names a tarball we create up front
    fn packed_project(temp: &TempDir) -> ScriptedRunner {
        std::fs::write(temp.path().join("package.json"), PACKAGE_JSON).unwrap();
        write_tgz(
            &temp.path().join("jfrog-pkg-1.2.0.tgz"),
            &[("package/package.json", PACKAGE_JSON)],
        );
        let runner = ScriptedRunner::new();
        runner.push_stdout("npm notice\n\njfrog-pkg-1.2.0.tgz\n");
        runner
    }

    // ============ Unit Tests - Tarball Identity ============

    #[test]
    fn test_packed_file_name() {
        assert_eq!(packed_file_name("notice\npkg-1.0.0.tgz\n\n"), Some("pkg-1.0.0.tgz"));
        assert_eq!(packed_file_name("\n  \n"), None);
    }

    #[test]
    fn test_tarball_without_package_json() {
        let temp = TempDir::new().unwrap();
        let tarball = temp.path().join("broken.tgz");
        write_tgz(&tarball, &[("package/index.js", "module.exports = 1")]);
        let err = package_info_from_tarball(&tarball, &Version::new(10, 0, 0)).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Could not find 'package.json' in the compressed npm package: {}", tarball.display())
        );
    }

    // ============ Unit Tests - Publish Flow ============

    #[tokio::test]
    async fn test_publish_packs_uploads_and_deletes_tarball() {
        let temp = TempDir::new().unwrap();
        let runner = packed_project(&temp);
        let service = fake();
        let cmd = command(
            &temp,
            &runner,
            service.clone(),
            &["--tag", "beta", "--build-name=b", "--build-number=3"],
            Version::new(10, 0, 0),
        );
        let summary = cmd.run().await.unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.package.full_name(), "@jfrog/pkg");

        let uploads = service.state.lock().unwrap().uploads.clone();
        assert_eq!(uploads[0].0, "npm-local/@jfrog/pkg/-/pkg-1.2.0.tgz");
        assert_eq!(uploads[0].1["npm.disttag"], "beta");
        assert_eq!(uploads[0].1["build.name"], "b");
        assert!(!temp.path().join("jfrog-pkg-1.2.0.tgz").exists());
        assert_eq!(runner.args(), vec![vec!["pack"]]);

        let partials = read_partials(&temp.path().join("builds/b_3")).unwrap();
        let artifacts = partials[0].artifacts.as_ref().unwrap();
        assert_eq!(partials[0].module_id, "@jfrog/pkg:1.2.0");
        assert_eq!(artifacts[0].file_type, "tgz");
    }

    #[tokio::test]
    async fn test_rejected_upload_still_deletes_tarball() {
        let temp = TempDir::new().unwrap();
        let runner = packed_project(&temp);
        let service = fake();
        service
            .state
            .lock()
            .unwrap()
            .rejected_uploads
            .push("npm-local/@jfrog/pkg/-/pkg-1.2.0.tgz".to_string());

        let err = command(&temp, &runner, service, &[], Version::new(10, 0, 0))
            .run()
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to upload the npm package to Artifactory. See Artifactory logs for more details."
        );
        assert!(!temp.path().join("jfrog-pkg-1.2.0.tgz").exists());
    }

    #[tokio::test]
    async fn test_provided_tarball_is_kept() {
        let temp = TempDir::new().unwrap();
        let tarball = temp.path().join("given.tgz");
        write_tgz(&tarball, &[("package/package.json", r#"{"name":"given","version":"0.1.0"}"#)]);
        let runner = ScriptedRunner::new();
        let service = fake();

        let summary = command(&temp, &runner, service.clone(), &["given.tgz"], Version::new(10, 0, 0))
            .run()
            .await
            .unwrap();
        assert_eq!(summary.package.deploy_path(), "given/-/given-0.1.0.tgz");
        assert!(tarball.exists());
        assert!(runner.args().is_empty());
    }

    #[tokio::test]
    async fn test_scan_violation_blocks_upload() {
        let temp = TempDir::new().unwrap();
        let runner = packed_project(&temp);
        let service = fake();
        let mut cmd = command(&temp, &runner, service.clone(), &["--scan"], Version::new(10, 0, 0));
        cmd.scan = Some(Arc::new(|req: ScanRequest| -> BoxFuture<'static, Result<(), BridgeError>> {
            Box::pin(async move { Err(BridgeError::ScanViolation(req.tarball.display().to_string())) })
        }));

        let err = cmd.run().await.unwrap_err();
        assert!(matches!(err, BridgeError::ScanViolation(_)));
        assert!(service.state.lock().unwrap().uploads.is_empty());
        assert!(!temp.path().join("jfrog-pkg-1.2.0.tgz").exists());
    }

    #[tokio::test]
    async fn test_pack_destination_on_old_npm() {
        let temp = TempDir::new().unwrap();
        let runner = packed_project(&temp);
        let cmd = command(
            &temp,
            &runner,
            fake(),
            &["--pack-destination", "out"],
            Version::new(7, 17, 0),
        );
        cmd.run().await.unwrap();
        assert_eq!(runner.args(), vec![vec!["pack"]]);
    }

    #[tokio::test]
    async fn test_pack_destination_honored() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("package.json"), PACKAGE_JSON).unwrap();
        std::fs::create_dir_all(temp.path().join("out")).unwrap();
        write_tgz(
            &temp.path().join("out/jfrog-pkg-1.2.0.tgz"),
            &[("package/package.json", PACKAGE_JSON)],
        );
        let runner = ScriptedRunner::new();
        runner.push_stdout("jfrog-pkg-1.2.0.tgz\n");

        command(&temp, &runner, fake(), &["--pack-destination=out"], Version::new(9, 0, 0))
            .run()
            .await
            .unwrap();
        assert_eq!(runner.args(), vec![vec!["pack", "--pack-destination=out"]]);
        assert!(!temp.path().join("out/jfrog-pkg-1.2.0.tgz").exists());
    }
}
