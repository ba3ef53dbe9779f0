//! The Artifactory operations rtbridge consumes
//!
//! Business logic depends on this trait only. [`super::ArtifactoryClient`]
//! implements it over HTTP; tests substitute in-memory fakes.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use super::types::{
    AqlItem, PluginResponse, Project, PublishedBuild, RepoParams, RepositoryDetails, UploadOutcome,
};
use crate::core::server::ServerDetails;
use crate::error::ArtifactoryError;

/// Typed Artifactory and Access operations
#[async_trait]
pub trait ArtifactoryService: Send + Sync {
    /// Details of the server this service talks to
    fn server(&self) -> &ServerDetails;

    /// `GET api/system/version`
    async fn version(&self) -> Result<String, ArtifactoryError>;

    /// `GET api/system/ping`
    async fn ping(&self) -> Result<(), ArtifactoryError>;

    /// Whether `GET api/repositories/<key>` succeeds
    async fn repository_exists(&self, key: &str) -> Result<bool, ArtifactoryError>;

    /// `GET api/repositories`
    async fn get_all_repositories(&self) -> Result<Vec<RepositoryDetails>, ArtifactoryError>;

    /// `GET api/repositories/<key>`
    async fn get_repository(&self, key: &str) -> Result<RepoParams, ArtifactoryError>;

    /// `PUT api/repositories/<key>`
    async fn create_repository(&self, key: &str, params: &RepoParams) -> Result<(), ArtifactoryError>;

    /// `POST api/repositories/<key>`
    async fn update_repository(&self, key: &str, params: &RepoParams) -> Result<(), ArtifactoryError>;

    /// `POST api/system/decrypt`; returns whether the instance was encrypted
    async fn deactivate_key_encryption(&self) -> Result<bool, ArtifactoryError>;

    /// `POST api/system/encrypt`
    async fn activate_key_encryption(&self) -> Result<(), ArtifactoryError>;

    /// `GET api/security/lockedUsers`
    async fn locked_users(&self) -> Result<Vec<String>, ArtifactoryError>;

    /// `POST api/security/unlockUsers/<user>`
    async fn unlock_user(&self, user: &str) -> Result<(), ArtifactoryError>;

    /// `GET api/npm/auth`; returns the rc lines the server generated
    async fn npm_auth(&self) -> Result<String, ArtifactoryError>;

    /// `POST api/search/aql`
    async fn aql(&self, query: &str) -> Result<Vec<AqlItem>, ArtifactoryError>;

    /// Latest published build of `name`, `None` if there is none
    async fn latest_build(
        &self,
        name: &str,
        project: Option<&str>,
    ) -> Result<Option<PublishedBuild>, ArtifactoryError>;

    /// Upload `file` to `<repo>/<path>` with the given properties
    ///
    /// A rejected upload is reported in [`UploadOutcome::failed`]; only
    /// transport and local IO problems are errors.
    async fn upload(
        &self,
        file: &Path,
        target: &str,
        props: &BTreeMap<String, String>,
    ) -> Result<UploadOutcome, ArtifactoryError>;

    /// `POST api/plugins/execute/<name>` with a JSON body
    async fn plugin_post(&self, name: &str, body: &Value) -> Result<PluginResponse, ArtifactoryError>;

    /// `GET api/plugins/execute/<name>`
    async fn plugin_get(&self, name: &str) -> Result<PluginResponse, ArtifactoryError>;

    /// `GET access/api/v1/system/ping`
    async fn access_ping(&self) -> Result<(), ArtifactoryError>;

    /// `GET access/api/v1/projects`
    async fn get_all_projects(&self) -> Result<Vec<Project>, ArtifactoryError>;

    /// `POST access/api/v1/projects`
    async fn create_project(&self, project: &Project) -> Result<(), ArtifactoryError>;

    /// Attach a repository to a project
    async fn assign_repo_to_project(&self, repo: &str, project: &str) -> Result<(), ArtifactoryError>;

    /// Detach a repository from whatever project owns it
    async fn unassign_repo_from_project(&self, repo: &str) -> Result<(), ArtifactoryError>;
}
