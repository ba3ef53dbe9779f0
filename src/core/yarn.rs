//! Yarn (Berry) against Artifactory
//!
//! Yarn reads its registry and credentials from `YARN_NPM_*` variables, so
//! a run sets those for its duration instead of writing an rc file. Scoped
//! registries can only live in `.yarnrc.yml`; that file is backed up,
//! rewritten through `yarn config set`, and restored afterwards.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::artifactory::ArtifactoryService;
use crate::core::npm::registry_access;
use crate::core::options::extract_npm_options;
use crate::core::rc::{AUTH_SUFFIX, AUTH_TOKEN_SUFFIX};
use crate::error::{join_cleanup, BridgeError};
use crate::infra::env::EnvGuard;
use crate::infra::filesystem::FileBackup;
use crate::infra::process::{ToolCommand, ToolRunner};

pub const YARNRC_FILE_NAME: &str = ".yarnrc.yml";
pub const YARNRC_BACKUP_FILE_NAME: &str = "jfrog.yarnrc.backup";

const NPM_SCOPES_CONFIG: &str = "npmScopes";
const ENV_REGISTRY: &str = "YARN_NPM_REGISTRY_SERVER";
const ENV_AUTH_IDENT: &str = "YARN_NPM_AUTH_IDENT";
const ENV_AUTH_TOKEN: &str = "YARN_NPM_AUTH_TOKEN";
const ENV_ALWAYS_AUTH: &str = "YARN_NPM_ALWAYS_AUTH";

/// `yarn npm` subcommands that work against Artifactory
const SUPPORTED_NPM_SUBCOMMANDS: &[&str] = &["info", "whoami"];

/// Reject `yarn npm publish` and the other unsupported `yarn npm` commands
pub fn validate_supported_command(args: &[String]) -> Result<(), BridgeError> {
    let Some(index) = args.iter().position(|a| a == "npm") else {
        return Ok(());
    };
    match args.get(index + 1).map(String::as_str) {
        Some("publish") => Err(BridgeError::UnsupportedTool(
            "The command 'rtbridge yarn npm publish' is not supported. Use 'rtbridge npm publish' instead.".to_string(),
        )),
        Some(cmd) if !SUPPORTED_NPM_SUBCOMMANDS.contains(&cmd) => Err(BridgeError::UnsupportedTool(format!(
            "The command 'rtbridge yarn npm {cmd}' is not supported."
        ))),
        _ => Ok(()),
    }
}

/// Credentials in the form yarn takes them
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YarnAuth {
    /// Base64 `user:secret`
    Ident(String),
    Token(String),
    Anonymous,
}

impl YarnAuth {
    /// Pick the credential out of npm rc auth lines
    pub fn from_rc_lines(auth: &str) -> Self {
        let mut token = None;
        for line in auth.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key.trim() {
                AUTH_SUFFIX => return Self::Ident(value.trim().to_string()),
                AUTH_TOKEN_SUFFIX => token = Some(value.trim().to_string()),
                _ => {}
            }
        }
        token.map_or(Self::Anonymous, Self::Token)
    }
}

/// Environment a yarn run gets
pub fn auth_env(registry: &str, auth: &YarnAuth) -> Vec<(&'static str, String)> {
    let mut env = vec![(ENV_REGISTRY, registry.to_string())];
    match auth {
        YarnAuth::Ident(ident) => env.push((ENV_AUTH_IDENT, ident.clone())),
        YarnAuth::Token(token) => env.push((ENV_AUTH_TOKEN, token.clone())),
        YarnAuth::Anonymous => {}
    }
    env.push((ENV_ALWAYS_AUTH, "true".to_string()));
    env
}

/// One entry of the `npmScopes` setting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YarnNpmScope {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub npm_always_auth: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npm_auth_ident: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npm_auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npm_registry_server: Option<String>,
}

/// Point every configured scope at Artifactory
pub fn redirect_scopes(
    scopes: &BTreeMap<String, YarnNpmScope>,
    registry: &str,
    auth: &YarnAuth,
) -> BTreeMap<String, YarnNpmScope> {
    let scope = YarnNpmScope {
        npm_always_auth: true,
        npm_auth_ident: match auth {
            YarnAuth::Ident(ident) => Some(ident.clone()),
            _ => None,
        },
        npm_auth_token: match auth {
            YarnAuth::Token(token) => Some(token.clone()),
            _ => None,
        },
        npm_registry_server: Some(registry.to_string()),
    };
    scopes.keys().map(|name| (name.clone(), scope.clone())).collect()
}

/// A yarn run routed to Artifactory
pub struct YarnCommand<'a> {
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Resolver repository
    pub repo: String,
    pub executable: PathBuf,
    pub runner: &'a dyn ToolRunner,
    pub service: Arc<dyn ArtifactoryService>,
}

impl YarnCommand<'_> {
    pub async fn run(&self) -> Result<(), BridgeError> {
        info!("Running Yarn...");
        validate_supported_command(&self.args)?;
        let options = extract_npm_options(&self.args)?;
        if options.build_configuration.is_collect_build_info() {
            warn!("Build-info collection is not supported for yarn commands and is skipped.");
        }

        let access = registry_access(self.service.as_ref(), &self.repo).await?;
        let auth = YarnAuth::from_rc_lines(&access.auth);

        let mut env = EnvGuard::new();
        for (key, value) in auth_env(&access.registry, &auth) {
            env.set(key, &value);
        }
        let backup = FileBackup::create(
            &self.working_dir.join(YARNRC_FILE_NAME),
            &self.working_dir.join(YARNRC_BACKUP_FILE_NAME),
        )?;
        // The backup moved the file away; work on a copy so scopes survive
        if backup.existed() {
            std::fs::copy(
                self.working_dir.join(YARNRC_BACKUP_FILE_NAME),
                self.working_dir.join(YARNRC_FILE_NAME),
            )
            .map_err(|e| BridgeError::ConfigInvalid(format!("failed to prepare {YARNRC_FILE_NAME}: {e}")))?;
        }

        let result = match self.update_scopes(&access.registry, &auth).await {
            Ok(()) => self.run_tool(&options.clean_args).await,
            Err(e) => Err(e),
        };

        env.restore();
        let restored = backup.restore().map_err(BridgeError::from);
        join_cleanup(result, restored)?;
        info!("Yarn finished successfully.");
        Ok(())
    }

    async fn update_scopes(&self, registry: &str, auth: &YarnAuth) -> Result<(), BridgeError> {
        let output = self
            .runner
            .run(
                &ToolCommand::new(&self.executable, ["config", "get", NPM_SCOPES_CONFIG, "--json"])
                    .in_dir(&self.working_dir)
                    .capture_stdout()
                    .capture_stderr(),
            )
            .await?;
        let raw = output.stdout.trim();
        let scopes: BTreeMap<String, YarnNpmScope> = if raw.is_empty() || raw == "null" {
            BTreeMap::new()
        } else {
            serde_json::from_str(raw)
                .map_err(|e| BridgeError::ConfigInvalid(format!("unexpected {NPM_SCOPES_CONFIG} value: {e}")))?
        };
        if scopes.is_empty() {
            return Ok(());
        }

        let updated = serde_json::to_string(&redirect_scopes(&scopes, registry, auth))
            .map_err(|e| BridgeError::ConfigInvalid(e.to_string()))?;
        debug!("Redirecting {} yarn npm scopes", scopes.len());
        self.runner
            .run(
                &ToolCommand::new(
                    &self.executable,
                    ["config", "set", NPM_SCOPES_CONFIG, "--json", updated.as_str()],
                )
                .in_dir(&self.working_dir)
                .capture_stdout()
                .capture_stderr(),
            )
            .await?;
        Ok(())
    }

    async fn run_tool(&self, args: &[String]) -> Result<(), BridgeError> {
        let command = ToolCommand::new(&self.executable, args.to_vec()).in_dir(&self.working_dir);
        self.runner.run(&command).await?;
        Ok(())
    }
}
