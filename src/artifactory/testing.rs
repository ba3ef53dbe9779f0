//! In-memory Artifactory for tests

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::service::ArtifactoryService;
use super::types::{
    AqlItem, DeployedFile, FileChecksums, PluginResponse, Project, PublishedBuild, RepoParams,
    RepositoryDetails, UploadOutcome,
};
use crate::core::server::ServerDetails;
use crate::error::ArtifactoryError;

fn not_found(what: &str) -> ArtifactoryError {
    ArtifactoryError::Status {
        url: what.to_string(),
        status: 404,
        body: String::new(),
    }
}

/// Mutable state behind [`FakeArtifactory`]
#[derive(Default)]
pub struct FakeState {
    pub version: String,
    /// Summary records, in listing order
    pub repositories: Vec<RepositoryDetails>,
    /// Full parameters by key
    pub repository_params: BTreeMap<String, RepoParams>,
    pub projects: Vec<Project>,
    pub encrypted: bool,
    pub locked_users: Vec<String>,
    pub npm_auth: String,
    /// AQL results keyed by a substring of the query
    pub aql_results: Vec<(String, Vec<AqlItem>)>,
    pub aql_queries: Vec<String>,
    /// Query substrings whose AQL call fails
    pub failing_aql: Vec<String>,
    pub aql_in_flight: usize,
    pub aql_max_in_flight: usize,
    pub latest_build: Option<PublishedBuild>,
    /// Targets whose upload is rejected
    pub rejected_uploads: Vec<String>,
    pub uploads: Vec<(String, BTreeMap<String, String>)>,
    /// Queued plugin responses by plugin name
    pub plugin_responses: HashMap<String, VecDeque<PluginResponse>>,
    pub plugin_bodies: Vec<(String, Value)>,
    /// Mutating calls in issue order, e.g. `PUT repo-key`
    pub calls: Vec<String>,
    /// Repository keys whose creation fails
    pub failing_creates: Vec<String>,
    /// Repository keys whose full parameters cannot be read
    pub failing_reads: Vec<String>,
    pub access_ping_fails: bool,
    pub unassign_fails: bool,
    pub ping_fails: bool,
}

/// An [`ArtifactoryService`] backed by [`FakeState`]
pub struct FakeArtifactory {
    server: ServerDetails,
    pub state: Mutex<FakeState>,
}

impl FakeArtifactory {
    pub fn new(url: &str) -> Self {
        Self {
            server: ServerDetails::new(url).with_token("fake-token"),
            state: Mutex::new(FakeState {
                version: "7.77.0".to_string(),
                ..FakeState::default()
            }),
        }
    }

    pub fn with_server(server: ServerDetails) -> Self {
        let fake = Self::new("");
        Self {
            server,
            state: fake.state,
        }
    }

    /// Register a repository with its summary and full parameters
    pub fn add_repository(&self, key: &str, repo_type: &str, package_type: &str, params: Value) {
        let mut state = self.state.lock().unwrap();
        state.repositories.push(RepositoryDetails {
            key: key.to_string(),
            repo_type: repo_type.to_string(),
            package_type: package_type.to_string(),
            ..RepositoryDetails::default()
        });
        let mut full = params.as_object().cloned().unwrap_or_default();
        full.insert("key".to_string(), Value::String(key.to_string()));
        full.insert("rclass".to_string(), Value::String(repo_type.to_lowercase()));
        full.insert("packageType".to_string(), Value::String(package_type.to_string()));
        state.repository_params.insert(key.to_string(), full);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl ArtifactoryService for FakeArtifactory {
    fn server(&self) -> &ServerDetails {
        &self.server
    }

    async fn version(&self) -> Result<String, ArtifactoryError> {
        Ok(self.state.lock().unwrap().version.clone())
    }

    async fn ping(&self) -> Result<(), ArtifactoryError> {
        if self.state.lock().unwrap().ping_fails {
            return Err(ArtifactoryError::Status {
                url: "api/system/ping".to_string(),
                status: 401,
                body: String::new(),
            });
        }
        Ok(())
    }

    async fn repository_exists(&self, key: &str) -> Result<bool, ArtifactoryError> {
        Ok(self.state.lock().unwrap().repository_params.contains_key(key))
    }

    async fn get_all_repositories(&self) -> Result<Vec<RepositoryDetails>, ArtifactoryError> {
        Ok(self.state.lock().unwrap().repositories.clone())
    }

    async fn get_repository(&self, key: &str) -> Result<RepoParams, ArtifactoryError> {
        let state = self.state.lock().unwrap();
        if state.failing_reads.iter().any(|k| k == key) {
            return Err(ArtifactoryError::Status {
                url: key.to_string(),
                status: 500,
                body: "read failed".to_string(),
            });
        }
        state
            .repository_params
            .get(key)
            .cloned()
            .ok_or_else(|| not_found(key))
    }

    async fn create_repository(&self, key: &str, params: &RepoParams) -> Result<(), ArtifactoryError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("PUT {key}"));
        if state.failing_creates.iter().any(|k| k == key) {
            return Err(ArtifactoryError::Status {
                url: key.to_string(),
                status: 400,
                body: "rejected".to_string(),
            });
        }
        state.repository_params.insert(key.to_string(), params.clone());
        Ok(())
    }

    async fn update_repository(&self, key: &str, params: &RepoParams) -> Result<(), ArtifactoryError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("POST {key}"));
        state.repository_params.insert(key.to_string(), params.clone());
        Ok(())
    }

    async fn deactivate_key_encryption(&self) -> Result<bool, ArtifactoryError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("DECRYPT".to_string());
        let was = state.encrypted;
        state.encrypted = false;
        Ok(was)
    }

    async fn activate_key_encryption(&self) -> Result<(), ArtifactoryError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("ENCRYPT".to_string());
        state.encrypted = true;
        Ok(())
    }

    async fn locked_users(&self) -> Result<Vec<String>, ArtifactoryError> {
        Ok(self.state.lock().unwrap().locked_users.clone())
    }

    async fn unlock_user(&self, user: &str) -> Result<(), ArtifactoryError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("UNLOCK {user}"));
        state.locked_users.retain(|u| u != user);
        Ok(())
    }

    async fn npm_auth(&self) -> Result<String, ArtifactoryError> {
        Ok(self.state.lock().unwrap().npm_auth.clone())
    }

    async fn aql(&self, query: &str) -> Result<Vec<AqlItem>, ArtifactoryError> {
        let invalid = |reason: String| ArtifactoryError::Status {
            url: "api/search/aql".to_string(),
            status: 400,
            body: reason,
        };
        let criteria = query
            .strip_prefix("items.find(")
            .and_then(|rest| rest.split_once(").include("))
            .map(|(criteria, _)| criteria)
            .ok_or_else(|| invalid(format!("malformed query {query}")))?;
        serde_json::from_str::<Value>(criteria).map_err(|e| invalid(e.to_string()))?;

        {
            let mut state = self.state.lock().unwrap();
            state.aql_queries.push(query.to_string());
            state.aql_in_flight += 1;
            state.aql_max_in_flight = state.aql_max_in_flight.max(state.aql_in_flight);
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let mut state = self.state.lock().unwrap();
        state.aql_in_flight -= 1;
        if state.failing_aql.iter().any(|needle| query.contains(needle.as_str())) {
            return Err(ArtifactoryError::Status {
                url: "api/search/aql".to_string(),
                status: 500,
                body: "aql failed".to_string(),
            });
        }
        Ok(state
            .aql_results
            .iter()
            .find(|(needle, _)| query.contains(needle.as_str()))
            .map(|(_, items)| items.clone())
            .unwrap_or_default())
    }

    async fn latest_build(
        &self,
        _name: &str,
        _project: Option<&str>,
    ) -> Result<Option<PublishedBuild>, ArtifactoryError> {
        Ok(self.state.lock().unwrap().latest_build.clone())
    }

    async fn upload(
        &self,
        file: &Path,
        target: &str,
        props: &BTreeMap<String, String>,
    ) -> Result<UploadOutcome, ArtifactoryError> {
        let content = std::fs::read(file).map_err(|e| ArtifactoryError::Io {
            path: file.to_path_buf(),
            error: e.to_string(),
        })?;
        let mut state = self.state.lock().unwrap();
        state.uploads.push((target.to_string(), props.clone()));
        if state.rejected_uploads.iter().any(|t| t == target) {
            return Ok(UploadOutcome {
                succeeded: 0,
                failed: 1,
                files: Vec::new(),
            });
        }
        let (repo, path) = target.split_once('/').unwrap_or((target, ""));
        Ok(UploadOutcome {
            succeeded: 1,
            failed: 0,
            files: vec![DeployedFile {
                repo: repo.to_string(),
                path: path.to_string(),
                download_uri: format!("{}{target}", self.server.artifactory_url()),
                checksums: FileChecksums {
                    sha1: format!("sha1-{}", content.len()),
                    sha256: format!("sha256-{}", content.len()),
                    md5: format!("md5-{}", content.len()),
                },
            }],
        })
    }

    async fn plugin_post(&self, name: &str, body: &Value) -> Result<PluginResponse, ArtifactoryError> {
        let mut state = self.state.lock().unwrap();
        state.plugin_bodies.push((name.to_string(), body.clone()));
        Ok(state
            .plugin_responses
            .get_mut(name)
            .and_then(VecDeque::pop_front)
            .unwrap_or(PluginResponse {
                status: 404,
                body: String::new(),
            }))
    }

    async fn plugin_get(&self, name: &str) -> Result<PluginResponse, ArtifactoryError> {
        let mut state = self.state.lock().unwrap();
        Ok(state
            .plugin_responses
            .get_mut(name)
            .and_then(VecDeque::pop_front)
            .unwrap_or(PluginResponse {
                status: 404,
                body: String::new(),
            }))
    }

    async fn access_ping(&self) -> Result<(), ArtifactoryError> {
        if self.state.lock().unwrap().access_ping_fails {
            return Err(ArtifactoryError::Status {
                url: "access".to_string(),
                status: 401,
                body: String::new(),
            });
        }
        Ok(())
    }

    async fn get_all_projects(&self) -> Result<Vec<Project>, ArtifactoryError> {
        Ok(self.state.lock().unwrap().projects.clone())
    }

    async fn create_project(&self, project: &Project) -> Result<(), ArtifactoryError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("PROJECT {}", project.project_key));
        state.projects.push(project.clone());
        Ok(())
    }

    async fn assign_repo_to_project(&self, repo: &str, project: &str) -> Result<(), ArtifactoryError> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(format!("ASSIGN {repo} {project}"));
        Ok(())
    }

    async fn unassign_repo_from_project(&self, repo: &str) -> Result<(), ArtifactoryError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("UNASSIGN {repo}"));
        if state.unassign_fails {
            return Err(not_found(repo));
        }
        Ok(())
    }
}
