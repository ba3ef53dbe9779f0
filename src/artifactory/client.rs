//! Artifactory REST client
//!
//! A thin struct around `reqwest::Client` that knows the server's base URLs
//! and credentials.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use super::service::ArtifactoryService;
use super::types::{
    AqlItem, AqlResponse, DeployedFile, PluginResponse, Project, PublishedBuild,
    PublishedBuildResponse, RepoParams, RepositoryDetails, UploadOutcome, VersionInfo,
};
use crate::config::endpoints;
use crate::core::server::{AuthMode, ServerDetails};
use crate::core::version::user_agent;
use crate::error::ArtifactoryError;

/// HTTP implementation of [`ArtifactoryService`]
#[derive(Debug, Clone)]
pub struct ArtifactoryClient {
    /// HTTP client
    client: reqwest::Client,
    server: ServerDetails,
    artifactory_url: String,
    platform_url: String,
}

impl ArtifactoryClient {
    /// Create a client for a server
    pub fn new(server: ServerDetails) -> Self {
        if server.client_cert_path.is_some() {
            warn!(
                "Client certificate configured for '{}' is not used by this client",
                server.server_id
            );
        }
        Self {
            client: reqwest::Client::builder()
                .user_agent(user_agent())
                .build()
                .unwrap_or_default(),
            artifactory_url: server.artifactory_url(),
            platform_url: server.platform_url(),
            server,
        }
    }

    fn rt_url(&self, path: &str) -> String {
        format!("{}{path}", self.artifactory_url)
    }

    fn platform(&self, path: &str) -> String {
        format!("{}{path}", self.platform_url)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match self.server.auth_mode() {
            AuthMode::Token { token, .. } => builder.bearer_auth(token),
            AuthMode::Basic { user, password } => builder.basic_auth(user, Some(password)),
            AuthMode::Anonymous => builder,
        }
    }

    async fn send(&self, url: &str, builder: RequestBuilder) -> Result<(StatusCode, String), ArtifactoryError> {
        debug!("Sending request to {url}");
        let response = builder.send().await.map_err(|e| ArtifactoryError::Network {
            url: url.to_string(),
            error: e.to_string(),
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| ArtifactoryError::Network {
            url: url.to_string(),
            error: e.to_string(),
        })?;
        Ok((status, body))
    }

    /// Send and require a 2xx status
    async fn send_ok(&self, url: &str, builder: RequestBuilder) -> Result<String, ArtifactoryError> {
        let (status, body) = self.send(url, builder).await?;
        if !status.is_success() {
            return Err(ArtifactoryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ArtifactoryError> {
        let body = self.send_ok(url, self.request(Method::GET, url)).await?;
        parse_json(url, &body)
    }
}

fn parse_json<T: DeserializeOwned>(url: &str, body: &str) -> Result<T, ArtifactoryError> {
    serde_json::from_str(body).map_err(|e| ArtifactoryError::Parse {
        url: url.to_string(),
        error: e.to_string(),
    })
}

/// Percent-encode a matrix parameter key or value
fn encode_matrix(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(byte));
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Render `;key=value` matrix parameters in key order
pub fn matrix_params(props: &BTreeMap<String, String>) -> String {
    props
        .iter()
        .map(|(k, v)| format!(";{}={}", encode_matrix(k), encode_matrix(v)))
        .collect()
}

async fn sha256_file(path: &Path) -> Result<String, ArtifactoryError> {
    let io_err = |e: std::io::Error| ArtifactoryError::Io {
        path: path.to_path_buf(),
        error: e.to_string(),
    };
    let mut file = tokio::fs::File::open(path).await.map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await.map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[async_trait]
impl ArtifactoryService for ArtifactoryClient {
    fn server(&self) -> &ServerDetails {
        &self.server
    }

    async fn version(&self) -> Result<String, ArtifactoryError> {
        let info: VersionInfo = self.get_json(&self.rt_url(endpoints::SYSTEM_VERSION)).await?;
        Ok(info.version)
    }

    async fn ping(&self) -> Result<(), ArtifactoryError> {
        let url = self.rt_url(endpoints::SYSTEM_PING);
        self.send_ok(&url, self.request(Method::GET, &url)).await.map(|_| ())
    }

    async fn repository_exists(&self, key: &str) -> Result<bool, ArtifactoryError> {
        let url = self.rt_url(&format!("{}/{key}", endpoints::REPOSITORIES));
        let (status, body) = self.send(&url, self.request(Method::GET, &url)).await?;
        match status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => Ok(false),
            s => Err(ArtifactoryError::Status {
                url,
                status: s.as_u16(),
                body,
            }),
        }
    }

    async fn get_all_repositories(&self) -> Result<Vec<RepositoryDetails>, ArtifactoryError> {
        self.get_json(&self.rt_url(endpoints::REPOSITORIES)).await
    }

    async fn get_repository(&self, key: &str) -> Result<RepoParams, ArtifactoryError> {
        self.get_json(&self.rt_url(&format!("{}/{key}", endpoints::REPOSITORIES)))
            .await
    }

    async fn create_repository(&self, key: &str, params: &RepoParams) -> Result<(), ArtifactoryError> {
        let url = self.rt_url(&format!("{}/{key}", endpoints::REPOSITORIES));
        self.send_ok(&url, self.request(Method::PUT, &url).json(params))
            .await
            .map(|_| ())
    }

    async fn update_repository(&self, key: &str, params: &RepoParams) -> Result<(), ArtifactoryError> {
        let url = self.rt_url(&format!("{}/{key}", endpoints::REPOSITORIES));
        self.send_ok(&url, self.request(Method::POST, &url).json(params))
            .await
            .map(|_| ())
    }

    async fn deactivate_key_encryption(&self) -> Result<bool, ArtifactoryError> {
        let url = self.rt_url(endpoints::SYSTEM_DECRYPT);
        let (status, body) = self.send(&url, self.request(Method::POST, &url)).await?;
        match status {
            s if s.is_success() => Ok(true),
            // Already decrypted
            StatusCode::CONFLICT => Ok(false),
            s => Err(ArtifactoryError::Status {
                url,
                status: s.as_u16(),
                body,
            }),
        }
    }

    async fn activate_key_encryption(&self) -> Result<(), ArtifactoryError> {
        let url = self.rt_url(endpoints::SYSTEM_ENCRYPT);
        self.send_ok(&url, self.request(Method::POST, &url)).await.map(|_| ())
    }

    async fn locked_users(&self) -> Result<Vec<String>, ArtifactoryError> {
        self.get_json(&self.rt_url(endpoints::LOCKED_USERS)).await
    }

    async fn unlock_user(&self, user: &str) -> Result<(), ArtifactoryError> {
        let url = self.rt_url(&format!("{}/{user}", endpoints::UNLOCK_USERS));
        self.send_ok(&url, self.request(Method::POST, &url)).await.map(|_| ())
    }

    async fn npm_auth(&self) -> Result<String, ArtifactoryError> {
        let url = self.rt_url(endpoints::NPM_AUTH);
        self.send_ok(&url, self.request(Method::GET, &url)).await
    }

    async fn aql(&self, query: &str) -> Result<Vec<AqlItem>, ArtifactoryError> {
        let url = self.rt_url(endpoints::AQL_SEARCH);
        let body = self
            .send_ok(
                &url,
                self.request(Method::POST, &url)
                    .header(reqwest::header::CONTENT_TYPE, "text/plain")
                    .body(query.to_string()),
            )
            .await?;
        let response: AqlResponse = parse_json(&url, &body)?;
        Ok(response.results)
    }

    async fn latest_build(
        &self,
        name: &str,
        project: Option<&str>,
    ) -> Result<Option<PublishedBuild>, ArtifactoryError> {
        let mut url = self.rt_url(&format!(
            "{}/{}/LATEST",
            endpoints::BUILD,
            encode_matrix(name)
        ));
        if let Some(project) = project.filter(|p| !p.is_empty()) {
            url.push_str(&format!("?project={}", encode_matrix(project)));
        }
        let (status, body) = self.send(&url, self.request(Method::GET, &url)).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ArtifactoryError::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }
        let response: PublishedBuildResponse = parse_json(&url, &body)?;
        Ok(Some(response.build_info))
    }

    async fn upload(
        &self,
        file: &Path,
        target: &str,
        props: &BTreeMap<String, String>,
    ) -> Result<UploadOutcome, ArtifactoryError> {
        let url = format!("{}{}", self.rt_url(target.trim_start_matches('/')), matrix_params(props));
        let checksum = sha256_file(file).await?;
        let handle = tokio::fs::File::open(file).await.map_err(|e| ArtifactoryError::Io {
            path: file.to_path_buf(),
            error: e.to_string(),
        })?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(handle));

        let (status, text) = self
            .send(
                &url,
                self.request(Method::PUT, &url)
                    .header("X-Checksum-Sha256", checksum)
                    .body(body),
            )
            .await?;

        if !status.is_success() {
            warn!("Upload of '{}' to '{target}' failed with {status}: {text}", file.display());
            return Ok(UploadOutcome {
                succeeded: 0,
                failed: 1,
                files: Vec::new(),
            });
        }
        let deployed: DeployedFile = parse_json(&url, &text)?;
        Ok(UploadOutcome {
            succeeded: 1,
            failed: 0,
            files: vec![deployed],
        })
    }

    async fn plugin_post(&self, name: &str, body: &Value) -> Result<PluginResponse, ArtifactoryError> {
        let url = self.rt_url(&format!("{}/{name}", endpoints::PLUGIN_EXECUTE));
        let (status, text) = self.send(&url, self.request(Method::POST, &url).json(body)).await?;
        Ok(PluginResponse {
            status: status.as_u16(),
            body: text,
        })
    }

    async fn plugin_get(&self, name: &str) -> Result<PluginResponse, ArtifactoryError> {
        let url = self.rt_url(&format!("{}/{name}", endpoints::PLUGIN_EXECUTE));
        let (status, text) = self.send(&url, self.request(Method::GET, &url)).await?;
        Ok(PluginResponse {
            status: status.as_u16(),
            body: text,
        })
    }

    async fn access_ping(&self) -> Result<(), ArtifactoryError> {
        let url = self.platform(endpoints::ACCESS_PING);
        self.send_ok(&url, self.request(Method::GET, &url)).await.map(|_| ())
    }

    async fn get_all_projects(&self) -> Result<Vec<Project>, ArtifactoryError> {
        self.get_json(&self.platform(endpoints::ACCESS_PROJECTS)).await
    }

    async fn create_project(&self, project: &Project) -> Result<(), ArtifactoryError> {
        let url = self.platform(endpoints::ACCESS_PROJECTS);
        self.send_ok(&url, self.request(Method::POST, &url).json(project))
            .await
            .map(|_| ())
    }

    async fn assign_repo_to_project(&self, repo: &str, project: &str) -> Result<(), ArtifactoryError> {
        let url = self.platform(&format!(
            "{}/_/attach/repositories/{repo}/{project}?force=true",
            endpoints::ACCESS_PROJECTS
        ));
        self.send_ok(&url, self.request(Method::PUT, &url)).await.map(|_| ())
    }

    async fn unassign_repo_from_project(&self, repo: &str) -> Result<(), ArtifactoryError> {
        let url = self.platform(&format!(
            "{}/_/attach/repositories/{repo}",
            endpoints::ACCESS_PROJECTS
        ));
        self.send_ok(&url, self.request(Method::DELETE, &url)).await.map(|_| ())
    }
}
