//! Remote repositories URL connectivity check
//!
//! Asks the target instance (through the `remoteRepositoriesCheck` user
//! plugin) to test the URL of every remote repository about to be
//! transferred, then polls `remoteRepositoriesCheckStatus` until the check
//! finishes. Unreachable repositories are written to a CSV report.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::artifactory::{ArtifactoryService, PluginResponse, RepoParams};
use crate::config::defaults::{
    INACCESSIBLE_REPOS_CSV_PREFIX, REMOTE_CHECK_MAX_RETRIES, REMOTE_CHECK_POLL_INTERVAL, REMOTE_CHECK_POLL_TIMEOUT,
    REMOTE_CHECK_RETRY_INTERVAL,
};
use crate::config::endpoints::{REMOTE_CHECK_PLUGIN, REMOTE_CHECK_STATUS_PLUGIN};
use crate::core::precheck::{PreCheck, RunArguments};
use crate::error::BridgeError;
use crate::infra::csv::{write_report, CsvRecord};

const CHECK_NAME: &str = "Remote repositories URL connectivity";

/// One remote repository as sent to the plugin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoteRepoSettings {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub repo_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub query_params: String,
}

impl RemoteRepoSettings {
    /// Pick the check settings out of full remote repository parameters
    pub fn from_params(params: &RepoParams) -> Self {
        let field = |key: &str| params.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
        Self {
            key: field("key"),
            url: field("url"),
            repo_type: field("packageType"),
            username: field("username"),
            password: field("password"),
            query_params: field("queryParams"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InaccessibleRepository {
    #[serde(default)]
    pub repo_key: String,
    #[serde(default)]
    pub status_code: i64,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub url: String,
}

impl CsvRecord for InaccessibleRepository {
    fn headers() -> &'static [&'static str] {
        &["repo_key", "status_code", "reason", "url"]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.repo_key.clone(),
            self.status_code.to_string(),
            self.reason.clone(),
            self.url.clone(),
        ]
    }
}

/// Plugin response body, for both the start call and status polls
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RemoteUrlResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub inaccessible_repositories: Vec<InaccessibleRepository>,
    #[serde(default)]
    pub checked_repositories: u64,
    #[serde(default)]
    pub total_repositories: u64,
}

impl RemoteUrlResponse {
    fn parse(body: &str) -> Result<Self, BridgeError> {
        debug!("Response from Artifactory:\n{body}");
        serde_json::from_str(body)
            .map_err(|e| BridgeError::RemoteUnavailable(format!("unexpected remote repositories check response: {e}")))
    }
}

/// Polling and retry timings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckTimings {
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    /// Extra POSTs after the first one fails
    pub start_retries: u32,
    pub retry_interval: Duration,
}

impl Default for CheckTimings {
    fn default() -> Self {
        Self {
            poll_interval: REMOTE_CHECK_POLL_INTERVAL,
            poll_timeout: REMOTE_CHECK_POLL_TIMEOUT,
            start_retries: REMOTE_CHECK_MAX_RETRIES,
            retry_interval: REMOTE_CHECK_RETRY_INTERVAL,
        }
    }
}

pub struct RemoteRepositoryCheck {
    target: Arc<dyn ArtifactoryService>,
    remote_repositories: Vec<RepoParams>,
    /// Where the CSV report goes
    report_dir: PathBuf,
    timings: CheckTimings,
}

impl RemoteRepositoryCheck {
    pub fn new(target: Arc<dyn ArtifactoryService>, remote_repositories: Vec<RepoParams>, report_dir: PathBuf) -> Self {
        Self {
            target,
            remote_repositories,
            report_dir,
            timings: CheckTimings::default(),
        }
    }

    #[must_use]
    pub fn with_timings(mut self, timings: CheckTimings) -> Self {
        self.timings = timings;
        self
    }

    async fn start(&self, args: &RunArguments, body: &Value) -> Result<RemoteUrlResponse, BridgeError> {
        let url = self.target.server().artifactory_url();
        let mut last = None;
        for attempt in 0..=self.timings.start_retries {
            if attempt > 0 {
                debug!("[Config import] Attempt {attempt} to start the remote repositories check");
                tokio::select! {
                    biased;
                    () = args.cancel.cancelled() => return Err(BridgeError::Canceled),
                    () = tokio::time::sleep(self.timings.retry_interval) => {}
                }
            }
            // The plugin intermittently answers 404 right after installation
            let PluginResponse { status, body: response } = self.target.plugin_post(REMOTE_CHECK_PLUGIN, body).await?;
            if status == 200 {
                return RemoteUrlResponse::parse(&response);
            }
            warn!("[Config import] Remote repositories check returned status {status}");
            last = Some(status);
        }
        Err(BridgeError::RemoteUnavailable(format!(
            "Failed to start the remote repositories check in {url} (last status {})",
            last.unwrap_or_default()
        )))
    }

    async fn wait_for_completion(&self, args: &RunArguments, total: u64) -> Result<RemoteUrlResponse, BridgeError> {
        let url = self.target.server().artifactory_url();
        info!("Waiting for remote repositories check completion in Artifactory server at {url}");
        let deadline = Instant::now() + self.timings.poll_timeout;
        loop {
            let PluginResponse { status, body } = tokio::select! {
                biased;
                () = args.cancel.cancelled() => return Err(BridgeError::Canceled),
                r = self.target.plugin_get(REMOTE_CHECK_STATUS_PLUGIN) => r?,
            };
            match status {
                200 => return RemoteUrlResponse::parse(&body),
                202 => {
                    let progress = RemoteUrlResponse::parse(&body)?;
                    if let Some(report) = &args.progress {
                        report(progress.checked_repositories, total.max(progress.total_repositories));
                    }
                }
                other => {
                    return Err(BridgeError::RemoteUnavailable(format!(
                        "remote repositories check status returned {other}: {body}"
                    )))
                }
            }
            if Instant::now() + self.timings.poll_interval > deadline {
                return Err(BridgeError::RemoteUnavailable(format!(
                    "timed out waiting for the remote repositories check in {url}"
                )));
            }
            tokio::select! {
                biased;
                () = args.cancel.cancelled() => return Err(BridgeError::Canceled),
                () = tokio::time::sleep(self.timings.poll_interval) => {}
            }
        }
    }
}

#[async_trait]
impl PreCheck for RemoteRepositoryCheck {
    fn name(&self) -> &str {
        CHECK_NAME
    }

    async fn execute(&self, args: &RunArguments) -> Result<bool, BridgeError> {
        let request: Vec<RemoteRepoSettings> = self
            .remote_repositories
            .iter()
            .map(RemoteRepoSettings::from_params)
            .collect();
        let body = serde_json::to_value(&request)
            .map_err(|e| BridgeError::ConfigInvalid(format!("remote repositories check request: {e}")))?;

        let started = self.start(args, &body).await?;
        let finished = self.wait_for_completion(args, started.total_repositories).await?;
        if finished.inaccessible_repositories.is_empty() {
            return Ok(true);
        }

        let path = write_report(
            &self.report_dir,
            INACCESSIBLE_REPOS_CSV_PREFIX,
            &finished.inaccessible_repositories,
            Local::now(),
        )?;
        info!(
            "Found {} inaccessible remote repository URLs. Check the summary CSV file in: {}",
            finished.inaccessible_repositories.len(),
            path.display()
        );
        Ok(false)
    }
}
