//! Terraform module publishing
//!
//! Every directory that directly holds a `.tf` file is a module. Modules
//! are zipped and uploaded to `<repo>/<namespace>/<module>/<provider>/<tag>.zip`
//! by a small pool of upload tasks.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::artifactory::{ArtifactoryService, UploadOutcome};
use crate::config::defaults::{TERRAFORM_DEFAULT_EXCLUSIONS, TERRAFORM_THREADS};
use crate::core::build_info::{artifacts_from_deployed, BuildInfoRecorder, ModuleType};
use crate::core::npm::ensure_repo_exists;
use crate::core::options::{extract_build_configuration, take_value_flag, BuildConfiguration};
use crate::error::{BridgeError, FilesystemError};
use crate::infra::archive::{zip_directory, Exclusions};
use crate::infra::filesystem::remove_file_if_exists;

/// Arguments of `terraform publish`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerraformPublishArgs {
    pub namespace: String,
    pub provider: String,
    pub tag: String,
    /// User exclusions followed by the defaults
    pub exclusions: Vec<String>,
    pub build_configuration: BuildConfiguration,
}

impl TerraformPublishArgs {
    /// Parse the raw arguments; anything unrecognized is an error
    pub fn parse(args: &[String]) -> Result<Self, BridgeError> {
        let mut args = args.to_vec();
        let namespace = take_value_flag(&mut args, "--namespace")?.unwrap_or_default();
        let provider = take_value_flag(&mut args, "--provider")?.unwrap_or_default();
        let tag = take_value_flag(&mut args, "--tag")?.unwrap_or_default();
        let mut exclusions: Vec<String> = take_value_flag(&mut args, "--exclusions")?
            .map(|raw| raw.split(';').filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        let build_configuration = extract_build_configuration(&mut args)?;

        if let Some(first) = args.first() {
            let flag = first.split('=').next().unwrap_or(first);
            return Err(BridgeError::ConfigInvalid(format!(
                "Unknown flag: {flag}. for a terraform publish command please provide --namespace, --provider, --tag and optionally --exclusions."
            )));
        }
        if namespace.is_empty() || provider.is_empty() || tag.is_empty() {
            return Err(BridgeError::ConfigInvalid(
                "the --namespace, --provider and --tag options are mandatory".to_string(),
            ));
        }

        exclusions.extend(TERRAFORM_DEFAULT_EXCLUSIONS.iter().map(|s| (*s).to_string()));
        Ok(Self {
            namespace,
            provider,
            tag,
            exclusions,
            build_configuration,
        })
    }

    /// Upload target of one module, repository included
    pub fn target(&self, repo: &str, module_name: &str) -> String {
        format!(
            "{repo}/{}/{module_name}/{}/{}.zip",
            self.namespace, self.provider, self.tag
        )
    }
}

/// A directory to publish as a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerraformModule {
    pub name: String,
    pub dir: PathBuf,
}

/// Whether `dir` directly contains a regular `*.tf` file
pub fn is_terraform_module(dir: &Path) -> Result<bool, FilesystemError> {
    let entries = std::fs::read_dir(dir).map_err(|e| FilesystemError::ReadFile {
        path: dir.to_path_buf(),
        error: e.to_string(),
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| FilesystemError::ReadFile {
            path: dir.to_path_buf(),
            error: e.to_string(),
        })?;
        let is_file = entry.file_type().is_ok_and(|t| t.is_file());
        if is_file && entry.path().extension().is_some_and(|ext| ext == "tf") {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Find modules under `root` without descending into a module
pub fn discover_modules(root: &Path) -> Result<Vec<TerraformModule>, FilesystemError> {
    let mut modules = Vec::new();
    let mut walker = WalkDir::new(root).follow_links(false).sort_by_file_name().into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| FilesystemError::ReadFile {
            path: root.to_path_buf(),
            error: e.to_string(),
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if is_terraform_module(entry.path())? {
            modules.push(TerraformModule {
                name: entry.file_name().to_string_lossy().into_owned(),
                dir: entry.path().to_path_buf(),
            });
            walker.skip_current_dir();
        }
    }
    Ok(modules)
}

/// Result of a terraform publish
#[derive(Debug, Clone, Default)]
pub struct TerraformSummary {
    pub modules: usize,
    pub outcome: UploadOutcome,
    pub partial: Option<PathBuf>,
}

/// `terraform publish` against a deployer repository
pub struct TerraformPublishCommand {
    pub args: TerraformPublishArgs,
    pub working_dir: PathBuf,
    pub repo: String,
    pub service: Arc<dyn ArtifactoryService>,
    pub builds_root: PathBuf,
    /// Where module archives are staged before upload
    pub staging_dir: PathBuf,
    pub cancel: CancellationToken,
}

impl TerraformPublishCommand {
    pub async fn run(&self) -> Result<TerraformSummary, BridgeError> {
        info!("Running Terraform publish");
        ensure_repo_exists(self.service.as_ref(), &self.repo).await?;

        let recorder = BuildInfoRecorder::for_build(&self.builds_root, &self.args.build_configuration);
        let props = match &recorder {
            Some(recorder) => recorder.build_props()?,
            None => BTreeMap::new(),
        };

        debug!("Deploying terraform module...");
        let modules = discover_modules(&self.working_dir)?;
        let outcome = self.upload_modules(&modules, props).await?;

        let partial = match &recorder {
            Some(recorder) => {
                let module_id = self
                    .args
                    .build_configuration
                    .module
                    .clone()
                    .unwrap_or_else(|| format!("{}/{}", self.args.namespace, self.args.provider));
                let artifacts = artifacts_from_deployed(&outcome.files, "zip");
                Some(recorder.record_artifacts(&module_id, ModuleType::Terraform, artifacts)?)
            }
            None => None,
        };

        if outcome.failed > 0 {
            return Err(BridgeError::UploadFailed(format!(
                "{} terraform modules. See Artifactory logs for more details.",
                outcome.failed
            )));
        }
        info!("Terraform publish finished successfully.");
        Ok(TerraformSummary {
            modules: modules.len(),
            outcome,
            partial,
        })
    }

    async fn upload_modules(
        &self,
        modules: &[TerraformModule],
        props: BTreeMap<String, String>,
    ) -> Result<UploadOutcome, BridgeError> {
        let exclusions = Arc::new(Exclusions::new(&self.args.exclusions)?);
        let semaphore = Arc::new(Semaphore::new(TERRAFORM_THREADS));
        let props = Arc::new(props);
        let total = Arc::new(Mutex::new(UploadOutcome::default()));
        let first_error: Arc<Mutex<Option<BridgeError>>> = Arc::new(Mutex::new(None));
        let stop = Arc::new(AtomicBool::new(false));

        std::fs::create_dir_all(&self.staging_dir).map_err(|e| FilesystemError::CreateDir {
            path: self.staging_dir.clone(),
            error: e.to_string(),
        })?;

        let mut handles = Vec::with_capacity(modules.len());
        for (index, module) in modules.iter().enumerate() {
            let semaphore = semaphore.clone();
            let exclusions = exclusions.clone();
            let props = props.clone();
            let total = total.clone();
            let first_error = first_error.clone();
            let stop = stop.clone();
            let service = self.service.clone();
            let cancel = self.cancel.clone();
            let module = module.clone();
            let target = self.args.target(&self.repo, &module.name);
            let archive = self.staging_dir.join(format!("{index}-{}.zip", module.name));

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                if stop.load(Ordering::SeqCst) {
                    return;
                }
                let result = tokio::select! {
                    biased;
                    () = cancel.cancelled() => Err(BridgeError::Canceled),
                    r = upload_module(service.as_ref(), &module, &archive, &target, &exclusions, &props) => r,
                };
                match result {
                    Ok(outcome) => {
                        if let Ok(mut total) = total.lock() {
                            total.merge(outcome);
                        }
                    }
                    Err(e) => {
                        stop.store(true, Ordering::SeqCst);
                        if let Ok(mut slot) = first_error.lock() {
                            slot.get_or_insert(e);
                        }
                    }
                }
                if let Err(e) = remove_file_if_exists(&archive) {
                    warn!("Failed to remove the staged archive {}: {e}", archive.display());
                }
            }));
        }
        join_uploads(handles, &first_error).await?;
        let outcome = total.lock().map(|t| t.clone()).unwrap_or_default();
        Ok(outcome)
    }
}

/// Wait for every upload task and surface the first failure
///
/// A task that panicked or was aborted counts as a failure.
async fn join_uploads(
    handles: Vec<JoinHandle<()>>,
    first_error: &Mutex<Option<BridgeError>>,
) -> Result<(), BridgeError> {
    for handle in handles {
        if let Err(e) = handle.await {
            let mut slot = first_error.lock().map_err(|_| BridgeError::Canceled)?;
            slot.get_or_insert(BridgeError::UploadFailed(format!("upload task failed: {e}")));
        }
    }
    match first_error.lock().map_err(|_| BridgeError::Canceled)?.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn upload_module(
    service: &dyn ArtifactoryService,
    module: &TerraformModule,
    archive: &Path,
    target: &str,
    exclusions: &Exclusions,
    props: &BTreeMap<String, String>,
) -> Result<UploadOutcome, BridgeError> {
    let files = zip_directory(&module.dir, archive, exclusions)?;
    debug!("Zipped {files} files of module '{}'", module.name);
    Ok(service.upload(archive, target, props).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifactory::testing::FakeArtifactory;
    use crate::core::build_info::read_partials;
    use serde_json::json;
    use tempfile::TempDir;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    // ============ Unit Tests - Arguments ============

    #[test]
    fn test_parse_arguments() {
        let parsed = TerraformPublishArgs::parse(&args(&[
            "--namespace=name",
            "--provider=aws",
            "--tag=v0.1.2",
            "--exclusions=*test*;*ignore*",
        ]))
        .unwrap();
        assert_eq!(parsed.namespace, "name");
        assert_eq!(parsed.provider, "aws");
        assert_eq!(parsed.tag, "v0.1.2");
        assert_eq!(parsed.exclusions, args(&["*test*", "*ignore*", "*.git", "*.DS_Store"]));
        assert_eq!(parsed.target("tf-local", "vpc"), "tf-local/name/vpc/aws/v0.1.2.zip");
    }

    #[test]
    fn test_unknown_flag() {
        let err = TerraformPublishArgs::parse(&args(&[
            "--namespace=name",
            "--provider=aws",
            "--tag=v0.1.2",
            "--unknown-flag=value",
        ]))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: Unknown flag: --unknown-flag. for a terraform publish command please provide --namespace, --provider, --tag and optionally --exclusions."
        );
    }

    #[test]
    fn test_mandatory_flags() {
        let err = TerraformPublishArgs::parse(&args(&["--namespace=name", "--tag=1"])).unwrap_err();
        assert!(err.to_string().contains("mandatory"));
    }

    // ============ Unit Tests - Module Discovery ============

    #[test]
    fn test_discover_stops_at_module_root() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("vpc/main.tf"), "");
        write(&temp.path().join("vpc/nested/inner.tf"), "");
        write(&temp.path().join("modules/db/variables.tf"), "");
        write(&temp.path().join("docs/readme.md"), "");

        let modules = discover_modules(temp.path()).unwrap();
        let names: Vec<_> = modules.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["db", "vpc"]);
        assert!(!is_terraform_module(&temp.path().join("docs")).unwrap());
    }

    // ============ Unit Tests - Publish ============

    #[tokio::test]
    async fn test_publish_uploads_modules_and_records_build() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        write(&work.join("vpc/main.tf"), "resource {}");
        write(&work.join("vpc/.git/HEAD"), "ref");
        write(&work.join("s3/main.tf"), "resource {}");

        let fake = Arc::new(FakeArtifactory::new("https://rt.example.com"));
        fake.add_repository("tf-local", "local", "terraform", json!({}));

        let cmd = TerraformPublishCommand {
            args: TerraformPublishArgs::parse(&args(&[
                "--namespace=acme",
                "--provider=aws",
                "--tag=1.0.0",
                "--build-name=tf",
                "--build-number=7",
            ]))
            .unwrap(),
            working_dir: work,
            repo: "tf-local".to_string(),
            service: fake.clone(),
            builds_root: temp.path().join("builds"),
            staging_dir: temp.path().join("staging"),
            cancel: CancellationToken::new(),
        };
        let summary = cmd.run().await.unwrap();
        assert_eq!(summary.modules, 2);
        assert_eq!(summary.outcome.succeeded, 2);

        let mut targets: Vec<_> = fake.state.lock().unwrap().uploads.iter().map(|(t, _)| t.clone()).collect();
        targets.sort();
        assert_eq!(
            targets,
            vec!["tf-local/acme/s3/aws/1.0.0.zip", "tf-local/acme/vpc/aws/1.0.0.zip"]
        );
        assert_eq!(fake.state.lock().unwrap().uploads[0].1["build.name"], "tf");

        let partials = read_partials(&temp.path().join("builds/tf_7")).unwrap();
        assert_eq!(partials[0].module_type, ModuleType::Terraform);
        assert_eq!(partials[0].artifacts.as_ref().unwrap().len(), 2);
        assert_eq!(std::fs::read_dir(temp.path().join("staging")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_publish_to_missing_repository() {
        let temp = TempDir::new().unwrap();
        let fake = Arc::new(FakeArtifactory::new("https://rt.example.com"));
        let cmd = TerraformPublishCommand {
            args: TerraformPublishArgs::parse(&args(&["--namespace=a", "--provider=b", "--tag=c"])).unwrap(),
            working_dir: temp.path().to_path_buf(),
            repo: "tf-local".to_string(),
            service: fake,
            builds_root: temp.path().join("builds"),
            staging_dir: temp.path().join("staging"),
            cancel: CancellationToken::new(),
        };
        assert!(matches!(cmd.run().await.unwrap_err(), BridgeError::RepoNotFound(_)));
    }

    #[tokio::test]
    async fn test_panicked_upload_task_fails_publish() {
        let first_error = Mutex::new(None);
        let handles = vec![
            tokio::spawn(async {}),
            tokio::spawn(async { panic!("upload task blew up") }),
        ];

        let err = join_uploads(handles, &first_error).await.unwrap_err();
        assert!(matches!(err, BridgeError::UploadFailed(ref msg) if msg.contains("upload task failed")));
    }

    #[tokio::test]
    async fn test_join_uploads_keeps_first_recorded_error() {
        let first_error = Mutex::new(Some(BridgeError::Canceled));
        let handles = vec![tokio::spawn(async { panic!("later failure") })];

        assert!(matches!(join_uploads(handles, &first_error).await, Err(BridgeError::Canceled)));
    }
}
