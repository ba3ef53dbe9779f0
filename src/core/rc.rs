//! Registry rc manager
//!
//! Points the user-level npm or yarn configuration at an Artifactory npm
//! repository. All writes go through the tool's own `config` subcommand so
//! the tool stays in charge of its rc file.
//!
//! Host-bound auth keys come in pairs (`:_auth` and `:_authToken`); writing
//! one always deletes the other, and anonymous access deletes both.

use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tracing::debug;

use crate::core::server::{AuthMode, ServerDetails};
use crate::error::BridgeError;
use crate::infra::process::{ToolCommand, ToolRunner};

/// rc key holding the registry URL
pub const REGISTRY_KEY: &str = "registry";
/// Suffix of the basic-auth key
pub const AUTH_SUFFIX: &str = "_auth";
/// Suffix of the token key
pub const AUTH_TOKEN_SUFFIX: &str = "_authToken";

/// Package manager whose rc file is being configured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTool {
    Npm,
    Yarn,
}

impl BuildTool {
    pub fn executable_name(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Yarn => "yarn",
        }
    }

    fn delete_subcommand(self) -> &'static str {
        match self {
            Self::Npm => "delete",
            Self::Yarn => "unset",
        }
    }
}

impl std::fmt::Display for BuildTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.executable_name())
    }
}

/// Strip the URL scheme, leaving `host/path`
pub fn strip_scheme(url: &str) -> &str {
    url.split_once("://").map_or(url, |(_, rest)| rest)
}

/// Build a host-bound auth key: `//host/path:<suffix>`
pub fn auth_key(repo_url: &str, suffix: &str) -> String {
    format!("//{}:{suffix}", strip_scheme(repo_url))
}

/// Base64 of `user:password` with standard padding
pub fn basic_auth_value(user: &str, password: &str) -> String {
    BASE64.encode(format!("{user}:{password}"))
}

/// Writes registry and auth entries through `<tool> config`
pub struct RcManager<'a> {
    tool: BuildTool,
    executable: PathBuf,
    repo_url: String,
    server: &'a ServerDetails,
    runner: &'a dyn ToolRunner,
}

impl<'a> RcManager<'a> {
    pub fn new(
        tool: BuildTool,
        executable: PathBuf,
        repo: &str,
        server: &'a ServerDetails,
        runner: &'a dyn ToolRunner,
    ) -> Self {
        Self {
            tool,
            executable,
            repo_url: server.npm_repository_url(repo),
            server,
            runner,
        }
    }

    pub fn repo_url(&self) -> &str {
        &self.repo_url
    }

    /// Configure registry then auth
    pub async fn run(&self) -> Result<(), BridgeError> {
        self.configure_registry().await?;
        self.configure_auth().await
    }

    pub async fn configure_registry(&self) -> Result<(), BridgeError> {
        self.config_set(REGISTRY_KEY, &self.repo_url).await
    }

    /// Configure auth from the server's credentials
    pub async fn configure_auth(&self) -> Result<(), BridgeError> {
        match self.server.auth_mode() {
            AuthMode::Token { token, .. } => {
                self.config_set(&auth_key(&self.repo_url, AUTH_TOKEN_SUFFIX), token)
                    .await?;
                self.config_delete(&auth_key(&self.repo_url, AUTH_SUFFIX)).await
            }
            AuthMode::Basic { user, password } => {
                self.config_set(
                    &auth_key(&self.repo_url, AUTH_SUFFIX),
                    &basic_auth_value(user, password),
                )
                .await?;
                self.config_delete(&auth_key(&self.repo_url, AUTH_TOKEN_SUFFIX))
                    .await
            }
            AuthMode::Anonymous => {
                self.config_delete(&auth_key(&self.repo_url, AUTH_SUFFIX)).await?;
                self.config_delete(&auth_key(&self.repo_url, AUTH_TOKEN_SUFFIX))
                    .await
            }
        }
    }

    async fn config_set(&self, key: &str, value: &str) -> Result<(), BridgeError> {
        debug!("Setting {} config '{key}'", self.tool);
        let cmd = ToolCommand::new(&self.executable, ["config", "set", key, value])
            .capture_stdout()
            .capture_stderr();
        self.runner.run(&cmd).await?;
        Ok(())
    }

    /// Deleting a key that is not set is not an error for either tool
    async fn config_delete(&self, key: &str) -> Result<(), BridgeError> {
        debug!("Deleting {} config '{key}'", self.tool);
        let cmd = ToolCommand::new(
            &self.executable,
            ["config", self.tool.delete_subcommand(), key],
        )
        .capture_stdout()
        .capture_stderr();
        self.runner.run(&cmd).await?;
        Ok(())
    }
}
