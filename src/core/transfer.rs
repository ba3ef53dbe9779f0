//! Transfer-config-merge
//!
//! Copies the projects and repositories that exist only on a source
//! Artifactory instance to a target instance, after reporting every entity
//! that exists on both sides with different settings.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::artifactory::{ArtifactoryService, Project, RepoParams};
use crate::config::defaults::{
    CONFLICTS_CSV_PREFIX, DEFAULT_ADMIN_PASSWORD, DEFAULT_ADMIN_USERNAME, MIN_PROJECTS_ARTIFACTORY_VERSION,
    MIN_TRANSFER_CONFIG_ARTIFACTORY_VERSION,
};
use crate::core::merge::{log_title, IncludeExcludeFilter, MergePlan, Merger, RepoKind};
use crate::core::precheck::{PreCheckRunner, ProgressFn, RunArguments, RunStatus};
use crate::core::remote_url_check::RemoteRepositoryCheck;
use crate::core::server::ServerDetails;
use crate::core::version::{at_least, require_artifactory_version};
use crate::error::{join_cleanup, BridgeError};
use crate::infra::csv::write_report;

/// Opens a client for an arbitrary server (used for the default-admin login check)
pub type ConnectFn = Arc<dyn Fn(&ServerDetails) -> Result<Arc<dyn ArtifactoryService>, BridgeError> + Send + Sync>;

const FEATURE: &str = "Transfer config merge";
const PROJECTS_FEATURE: &str = "JFrog Projects";
const FEDERATED_ADVISORY: &str = "Your Federated repositories have been transferred to your target instance, \
but their members have been removed on the target.\nYou should add members to your Federated repositories on \
your target instance as described here: https://jfrog.com/help/r/jfrog-artifactory-documentation/federated-repositories";

/// Include and exclude wildcard patterns for both entity axes
#[derive(Debug, Clone, Default)]
pub struct TransferFilters {
    pub include_repos: Vec<String>,
    pub exclude_repos: Vec<String>,
    pub include_projects: Vec<String>,
    pub exclude_projects: Vec<String>,
}

/// What a run did
#[derive(Debug, Clone, Default)]
pub struct TransferOutcome {
    /// Conflict report, when conflicts were found
    pub csv_path: Option<PathBuf>,
    pub projects_transferred: usize,
    pub repositories_transferred: usize,
    pub federated_members_removed: bool,
    /// Tally of the pre-checks, in pre-checks mode
    pub prechecks: Option<RunStatus>,
}

pub struct TransferConfigMerge {
    pub source: Arc<dyn ArtifactoryService>,
    pub target: Arc<dyn ArtifactoryService>,
    pub connect: ConnectFn,
    pub filters: TransferFilters,
    /// Directory for CSV reports
    pub report_dir: PathBuf,
    /// Only run the pre-checks against the target, transfer nothing
    pub prechecks_only: bool,
    pub progress: Option<ProgressFn>,
    pub cancel: CancellationToken,
}

impl TransferConfigMerge {
    pub async fn run(&self) -> Result<TransferOutcome, BridgeError> {
        log_title("Preparations");
        let projects_supported = self.validate_servers().await?;
        self.check_default_credentials().await?;
        self.ensure_not_canceled()?;

        let merger = Merger {
            source: self.source.as_ref(),
            target: self.target.as_ref(),
            repo_filter: IncludeExcludeFilter::new(&self.filters.include_repos, &self.filters.exclude_repos)?
                .for_repositories(),
            project_filter: IncludeExcludeFilter::new(&self.filters.include_projects, &self.filters.exclude_projects)?,
        };
        let plan = merger.plan(projects_supported).await?;
        debug!(
            "Planned {} project(s) and {} repositories, {} conflict(s)",
            plan.projects.len(),
            plan.repository_count(),
            plan.conflicts.len()
        );
        let mut outcome = TransferOutcome {
            csv_path: self.report_conflicts(&plan)?,
            ..TransferOutcome::default()
        };
        self.ensure_not_canceled()?;

        if self.prechecks_only {
            outcome.prechecks = Some(self.run_prechecks(&plan).await?);
            return Ok(outcome);
        }

        self.transfer(&plan, &mut outcome).await?;
        info!("Config transfer merge completed successfully!");
        if outcome.federated_members_removed {
            info!("{FEDERATED_ADVISORY}");
        }
        Ok(outcome)
    }

    fn ensure_not_canceled(&self) -> Result<(), BridgeError> {
        if self.cancel.is_cancelled() {
            Err(BridgeError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Returns whether the project axis is part of the run
    async fn validate_servers(&self) -> Result<bool, BridgeError> {
        info!("Verifying source and target servers are different...");
        if self.source.server().artifactory_url() == self.target.server().artifactory_url() {
            return Err(BridgeError::SameServer);
        }

        let source_version = self.source.version().await?;
        require_artifactory_version(FEATURE, &source_version, MIN_TRANSFER_CONFIG_ARTIFACTORY_VERSION)?;
        let target_version = self.target.version().await?;
        require_artifactory_version(FEATURE, &target_version, &source_version)?;

        if !at_least(&source_version, MIN_PROJECTS_ARTIFACTORY_VERSION) {
            info!(
                "{PROJECTS_FEATURE} require Artifactory {MIN_PROJECTS_ARTIFACTORY_VERSION}, \
                 the source runs {source_version}. Skipping projects."
            );
            return Ok(false);
        }
        validate_access(self.source.as_ref()).await?;
        validate_access(self.target.as_ref()).await?;
        Ok(true)
    }

    /// Warn when the source still accepts `admin:password`, otherwise unlock `admin`
    async fn check_default_credentials(&self) -> Result<bool, BridgeError> {
        let locked = self.source.locked_users().await?;
        if locked.iter().any(|u| u == DEFAULT_ADMIN_USERNAME) {
            return Ok(false);
        }

        let source = self.source.server();
        let mut admin = ServerDetails::new(source.url.clone()).with_basic(DEFAULT_ADMIN_USERNAME, DEFAULT_ADMIN_PASSWORD);
        admin.artifactory_url = source.artifactory_url();
        let client = (self.connect)(&admin)?;
        if client.ping().await.is_ok() {
            warn!(
                "The default 'admin:password' credentials are used by a configured user in your source platform.\n\
                 Those credentials will be transferred to your target platform."
            );
            return Ok(true);
        }

        // resets the failed login counter the admin login just bumped
        self.source.unlock_user(DEFAULT_ADMIN_USERNAME).await?;
        Ok(false)
    }

    fn report_conflicts(&self, plan: &MergePlan) -> Result<Option<PathBuf>, BridgeError> {
        if plan.conflicts.is_empty() {
            info!("No Merge conflicts were found while comparing the source and target instances.");
            return Ok(None);
        }
        let path = write_report(&self.report_dir, CONFLICTS_CSV_PREFIX, &plan.conflicts, Local::now())?;
        info!(
            "We found {} conflicts when comparing the projects and repositories configuration between the source and \
             target instances.\nPlease review the report available at {}\nYou can either resolve the conflicts by \
             manually modifying the configuration on the source or the target,\nor exclude the transfer of the \
             conflicting projects or repositories by adding options to this command.",
            plan.conflicts.len(),
            path.display()
        );
        Ok(Some(path))
    }

    async fn run_prechecks(&self, plan: &MergePlan) -> Result<RunStatus, BridgeError> {
        log_title("Running config transfer pre-checks");
        let remotes = self.fetch_remotes(plan.repositories.get(&RepoKind::Remote)).await?;

        let mut runner = PreCheckRunner::new();
        runner.add_check(Box::new(RemoteRepositoryCheck::new(
            Arc::clone(&self.target),
            remotes.into_values().collect(),
            self.report_dir.clone(),
        )));
        let args = RunArguments {
            cancel: self.cancel.clone(),
            server: self.target.server().clone(),
            progress: self.progress.clone(),
        };
        runner.run(&args).await?;
        Ok(runner.status().clone())
    }

    async fn transfer(&self, plan: &MergePlan, outcome: &mut TransferOutcome) -> Result<(), BridgeError> {
        if !plan.projects.is_empty() {
            log_title("Transferring projects");
            for project in &plan.projects {
                self.transfer_project(project).await?;
                outcome.projects_transferred += 1;
            }
        }

        log_title("Transferring repositories");
        let mut remotes = self.fetch_remotes(plan.repositories.get(&RepoKind::Remote)).await?;

        let mut virtuals = Vec::new();
        for (kind, keys) in &plan.repositories {
            for key in keys {
                self.ensure_not_canceled()?;
                match kind {
                    RepoKind::Remote => {
                        let params = remotes
                            .remove(key)
                            .ok_or_else(|| BridgeError::RepoNotFound(key.clone()))?;
                        self.create_and_assign(key, params).await?;
                    }
                    RepoKind::Virtual => {
                        let params = self.source.get_repository(key).await?;
                        let mut stripped = params.clone();
                        stripped.remove("repositories");
                        self.create_and_assign(key, stripped).await?;
                        virtuals.push((key, params));
                    }
                    RepoKind::Federated => {
                        let mut params = self.source.get_repository(key).await?;
                        if params.remove("members").is_some() {
                            outcome.federated_members_removed = true;
                        }
                        self.create_and_assign(key, params).await?;
                    }
                    RepoKind::Local | RepoKind::Unknown => {
                        let params = self.source.get_repository(key).await?;
                        self.create_and_assign(key, params).await?;
                    }
                }
                outcome.repositories_transferred += 1;
            }
        }

        // virtuals may include each other, so members are set once all exist
        for (key, params) in virtuals {
            self.target.update_repository(key, &params).await?;
        }
        Ok(())
    }

    async fn transfer_project(&self, project: &Project) -> Result<(), BridgeError> {
        info!("Transferring project '{}' ...", project.display_name);
        self.target.create_project(project).await?;
        Ok(())
    }

    /// Full parameters of the remote repositories, read with key encryption off
    ///
    /// Encryption is switched back on afterwards when it was on before, also
    /// when a read fails.
    async fn fetch_remotes(&self, keys: Option<&Vec<String>>) -> Result<BTreeMap<String, RepoParams>, BridgeError> {
        let Some(keys) = keys.filter(|k| !k.is_empty()) else {
            return Ok(BTreeMap::new());
        };

        let was_encrypted = self.source.deactivate_key_encryption().await?;
        let mut remotes = BTreeMap::new();
        let mut result = Ok(());
        for key in keys {
            match self.source.get_repository(key).await {
                Ok(params) => {
                    remotes.insert(key.clone(), params);
                }
                Err(e) => {
                    result = Err(BridgeError::from(e));
                    break;
                }
            }
        }
        let restore = if was_encrypted {
            self.source.activate_key_encryption().await.map_err(BridgeError::from)
        } else {
            Ok(())
        };
        join_cleanup(result, restore)?;
        Ok(remotes)
    }

    async fn create_and_assign(&self, key: &str, mut params: RepoParams) -> Result<(), BridgeError> {
        let project_key = detach_project_key(key, &mut params)?;
        if project_key.is_some() {
            // the repo may already be bound through the access bootstrap
            if let Err(e) = self.target.unassign_repo_from_project(key).await {
                debug!("Unassigning '{key}' from its project failed: {e}");
            }
        }
        self.target.create_repository(key, &params).await?;
        if let Some(project_key) = project_key {
            self.target.assign_repo_to_project(key, &project_key).await?;
        }
        Ok(())
    }
}

/// Reject password-configured servers and verify the access token works
async fn validate_access(service: &dyn ArtifactoryService) -> Result<(), BridgeError> {
    let server = service.server();
    if server.password.as_deref().is_some_and(|p| !p.is_empty()) {
        return Err(BridgeError::AuthFailed(format!(
            "it looks like you configured the '{id}' instance with username and password.\n\
             This command can be used with admin Access Token only.\n\
             Please configure an Access Token for '{id}' and re-run the command",
            id = server.server_id
        )));
    }
    service.access_ping().await.map_err(|e| {
        BridgeError::AuthFailed(format!(
            "the '{}' instance Access Token is not valid: {e}",
            server.server_id
        ))
    })
}

/// Remove a `projectKey` the target cannot take on creation
///
/// The key stays when it is `default` or the repository key already starts
/// with `<projectKey>-`. Otherwise it is removed and returned so the
/// repository can be assigned after creation.
pub fn detach_project_key(repo_key: &str, params: &mut RepoParams) -> Result<Option<String>, BridgeError> {
    let project_key = match params.get("projectKey") {
        None => return Ok(None),
        Some(Value::String(value)) => value.clone(),
        Some(other) => {
            return Err(BridgeError::ConfigInvalid(format!(
                "couldn't parse the 'projectKey' value '{other}' of repository '{repo_key}'"
            )))
        }
    };
    if project_key == "default" || repo_key.starts_with(&format!("{project_key}-")) {
        return Ok(None);
    }
    params.remove("projectKey");
    Ok(Some(project_key))
}
