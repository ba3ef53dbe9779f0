//! Temporary project rc
//!
//! Wraps a package-manager run with a project-local `.npmrc` that routes all
//! traffic to Artifactory. The effective configuration is read with
//! `npm config list`, stripped of registry and auth entries, and rewritten
//! with the Artifactory registry. The auth secret never touches the disk: it
//! is handed to npm through an environment variable.
//!
//! A pre-existing `.npmrc` is moved aside to `jfrog.npmrc.backup` and put
//! back on release; the environment is restored at the same time.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use semver::Version;
use tracing::{debug, warn};

use crate::artifactory::ArtifactoryService;
use crate::config::defaults::{
    MIN_ARTIFACTORY_NPM_VERSION, MIN_NPM_VERSION, NPMRC_BACKUP_FILE_NAME, NPMRC_FILE_NAME,
    NPM_SCOPED_AUTH_ENV_VERSION,
};
use crate::core::dependencies::TypeRestriction;
use crate::core::rc::{strip_scheme, AUTH_SUFFIX, AUTH_TOKEN_SUFFIX};
use crate::core::server::AuthMode;
use crate::core::version::{at_least, require_artifactory_version, require_tool_version};
use crate::error::{BridgeError, FilesystemError};
use crate::infra::env::EnvGuard;
use crate::infra::filesystem::{write_file, FileBackup};
use crate::infra::process::{ToolCommand, ToolRunner};

/// Refuse npm clients older than the supported minimum
pub fn validate_npm_version(version: &Version) -> Result<(), BridgeError> {
    require_tool_version("npm", version, MIN_NPM_VERSION)
}

/// Extract the user name from the `sub` claim of an access token
///
/// Artifactory tokens carry `sub = jfrt@<id>/users/<name>`.
pub fn username_from_access_token(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    let sub = claims.get("sub")?.as_str()?;
    let user = sub.rsplit_once("/users/").map_or(sub, |(_, user)| user);
    (!user.is_empty()).then(|| user.to_string())
}

/// Build the auth lines for the temporary rc
///
/// A token becomes `_auth` when its user is known, otherwise `_authToken`.
/// Basic credentials are exchanged through Artifactory's npm auth API.
pub async fn npm_auth_lines(service: &dyn ArtifactoryService) -> Result<String, BridgeError> {
    let version = service.version().await?;
    require_artifactory_version("npm commands", &version, MIN_ARTIFACTORY_NPM_VERSION)?;

    match service.server().auth_mode() {
        AuthMode::Token { user, token } => {
            let user = username_from_access_token(token).or_else(|| user.map(str::to_string));
            Ok(match user {
                Some(user) => format!(
                    "{AUTH_SUFFIX} = {}\nalways-auth = true",
                    BASE64.encode(format!("{user}:{token}"))
                ),
                None => format!("{AUTH_TOKEN_SUFFIX} = {token}"),
            })
        }
        AuthMode::Basic { .. } => {
            debug!("Sending npm auth request");
            Ok(service.npm_auth().await?)
        }
        AuthMode::Anonymous => Ok(String::new()),
    }
}

/// Environment variable npm reads an auth `key` from
///
/// From 9.3.1 npm honors host-scoped variables; older clients only read the
/// global `npm_config_<key>`.
pub fn auth_env_name(npm_version: &Version, registry: &str, key: &str) -> String {
    if at_least(&npm_version.to_string(), NPM_SCOPED_AUTH_ENV_VERSION) {
        format!("npm_config_//{}:{key}", strip_scheme(registry))
    } else {
        format!("npm_config_{key}")
    }
}

/// Inputs of the rc rewrite
#[derive(Debug, Clone)]
pub struct RcContext {
    /// Artifactory npm registry URL
    pub registry: String,
    /// Auth lines, `key = value` per line
    pub auth: String,
    /// Value for the `json` key
    pub json_output: bool,
    pub npm_version: Version,
    /// `@scope` of the current project, if any
    pub scope: Option<String>,
}

/// Rewritten rc content and the auth variables that go with it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigData {
    pub content: String,
    pub auth_env: Vec<(String, String)>,
    pub type_restriction: TypeRestriction,
}

/// Keys the rewrite owns or never carries over
fn is_valid_key(key: &str) -> bool {
    !key.starts_with("//")
        && !key.starts_with(';')
        && !key.starts_with('@')
        && key != "registry"
        && key != "metrics-registry"
        && key != "json"
}

/// `key = [a,b]` becomes one `key[] = v` line per element
fn push_array_config(out: &mut String, key: &str, array: &str) {
    let inner = array.trim_start_matches('[').trim_end_matches(']');
    for value in inner.split(',').map(str::trim).filter(|v| !v.is_empty()) {
        out.push_str(&format!("{key}[] = {value}\n"));
    }
}

/// Turn `npm config list` output into the temporary rc
pub fn prepare_config_data(config_list: &str, ctx: &RcContext) -> ConfigData {
    let mut content = String::new();
    let mut type_restriction = TypeRestriction::Default;
    let mut scoped_registry_written = false;

    for line in config_list.lines().filter(|l| !l.trim().is_empty()) {
        let Some((raw_key, raw_value)) = line.split_once('=') else {
            continue;
        };
        let key = raw_key.trim();
        let value = raw_value.trim();
        if is_valid_key(key) {
            if value.starts_with('[') && value.ends_with(']') {
                push_array_config(&mut content, key, value);
            } else {
                content.push_str(line);
                content.push('\n');
            }
            type_restriction.observe(key, value);
        } else if key.starts_with('@') {
            // Scoped registries are redirected too
            content.push_str(&format!("{key} = {}\n", ctx.registry));
            if ctx.scope.as_deref().is_some_and(|s| key == format!("{s}:registry")) {
                scoped_registry_written = true;
            }
        }
    }

    if let Some(scope) = ctx.scope.as_deref().filter(|s| !s.is_empty()) {
        if !scoped_registry_written {
            content.push_str(&format!("{scope}:registry = {}\n", ctx.registry));
        }
    }
    content.push_str(&format!("json = {}\n", ctx.json_output));
    content.push_str(&format!("registry = {}\n", ctx.registry));

    let mut auth_env = Vec::new();
    for line in ctx.auth.lines().filter(|l| !l.trim().is_empty()) {
        let (key, value) = line
            .split_once('=')
            .map_or((line.trim(), ""), |(k, v)| (k.trim(), v.trim()));
        if key == AUTH_SUFFIX || key == AUTH_TOKEN_SUFFIX {
            auth_env.push((auth_env_name(&ctx.npm_version, &ctx.registry, key), value.to_string()));
        } else {
            content.push_str(&format!("{key} = {value}\n"));
        }
    }

    ConfigData {
        content,
        auth_env,
        type_restriction,
    }
}

/// Only flags are forwarded to `npm config`
fn flag_args(args: &[String]) -> impl Iterator<Item = &String> {
    args.iter().filter(|a| a.starts_with('-'))
}

/// Ask npm whether `--json` output is in effect for these arguments
pub async fn json_output(runner: &dyn ToolRunner, executable: &Path, dir: &Path, args: &[String]) -> Result<bool, BridgeError> {
    let mut cmd_args = vec!["config".to_string(), "get".to_string(), "json".to_string()];
    cmd_args.extend(flag_args(args).cloned());
    let output = runner
        .run(&ToolCommand::new(executable, cmd_args).in_dir(dir).capture_stdout().capture_stderr())
        .await?;
    // `--json=<not a boolean>` still means json
    Ok(output.stdout.trim() != "false")
}

/// Read the effective configuration as `key = value` lines
pub async fn config_list(runner: &dyn ToolRunner, executable: &Path, dir: &Path, args: &[String]) -> Result<String, BridgeError> {
    let mut cmd_args = vec!["config".to_string(), "list".to_string(), "--json=false".to_string()];
    cmd_args.extend(flag_args(args).cloned());
    let output = runner
        .run(&ToolCommand::new(executable, cmd_args).in_dir(dir).capture_stdout().capture_stderr())
        .await?;
    Ok(output.stdout)
}

fn restore_error(dir: &Path, cause: &FilesystemError) -> BridgeError {
    BridgeError::RestoreFailed(format!(
        "Error occurred while restoring project .npmrc file. Delete '{}' and move '{}' (if exists) to '{}' in order to restore the project. Failure cause: {cause}",
        dir.join(NPMRC_FILE_NAME).display(),
        dir.join(NPMRC_BACKUP_FILE_NAME).display(),
        dir.join(NPMRC_FILE_NAME).display(),
    ))
}

/// A live temporary `.npmrc`
///
/// Call [`TempRc::release`] to restore and learn about restore failures;
/// dropping an unreleased guard restores on a best-effort basis.
#[derive(Debug)]
pub struct TempRc {
    dir: PathBuf,
    backup: Option<FileBackup>,
    env: EnvGuard,
}

impl TempRc {
    /// Write `data` as the project `.npmrc` and export its auth variables
    pub fn install(dir: &Path, data: &ConfigData) -> Result<Self, BridgeError> {
        let rc_path = dir.join(NPMRC_FILE_NAME);
        let backup = FileBackup::create(&rc_path, &dir.join(NPMRC_BACKUP_FILE_NAME))?;
        if backup.existed() {
            debug!("Backed up project .npmrc to {NPMRC_BACKUP_FILE_NAME}");
        }
        let mut guard = Self {
            dir: dir.to_path_buf(),
            backup: Some(backup),
            env: EnvGuard::new(),
        };
        // On failure the guard drops here and puts the original back
        write_file(&rc_path, &data.content)?;
        for (key, value) in &data.auth_env {
            guard.env.set(key, value);
        }
        debug!("Created temporary project .npmrc");
        Ok(guard)
    }

    /// Read the effective config, rewrite it and install it
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        runner: &dyn ToolRunner,
        executable: &Path,
        dir: &Path,
        args: &[String],
        registry: &str,
        auth: &str,
        npm_version: &Version,
        scope: Option<String>,
    ) -> Result<(Self, TypeRestriction), BridgeError> {
        let json_output = json_output(runner, executable, dir, args).await?;
        let list = config_list(runner, executable, dir, args).await?;
        let ctx = RcContext {
            registry: registry.to_string(),
            auth: auth.to_string(),
            json_output,
            npm_version: npm_version.clone(),
            scope,
        };
        let data = prepare_config_data(&list, &ctx);
        let restriction = data.type_restriction;
        Ok((Self::install(dir, &data)?, restriction))
    }

    /// Restore the original `.npmrc` and environment
    pub fn release(mut self) -> Result<(), BridgeError> {
        self.restore()
    }

    fn restore(&mut self) -> Result<(), BridgeError> {
        self.env.restore();
        let Some(backup) = self.backup.take() else {
            return Ok(());
        };
        backup.restore().map_err(|e| restore_error(&self.dir, &e))?;
        debug!("Restored project .npmrc");
        Ok(())
    }
}

impl Drop for TempRc {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!("{e}");
        }
    }
}
