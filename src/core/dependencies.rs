//! Dependency resolver
//!
//! Runs `npm ls` once per dependency scope and flattens the returned tree
//! into a map keyed by `name:version`. The tree is a graph with repeated
//! visits: a dependency reached along several routes keeps every route in
//! [`Dependency::path_to_root`], innermost parent first, in discovery order.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{BridgeError, ToolError};
use crate::infra::process::{ToolCommand, ToolRunner};

/// Which dependency scopes an install pulls in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeRestriction {
    /// Nothing configured; both scopes are resolved
    #[default]
    Default,
    All,
    DevOnly,
    ProdOnly,
}

impl TypeRestriction {
    /// Fold one effective config entry into the restriction
    ///
    /// `omit` always wins. The deprecated `only` and `production` keys only
    /// apply while nothing has been decided yet, since older npm lists its
    /// config by descending priority.
    pub fn observe(&mut self, key: &str, value: &str) {
        match key {
            "omit" => {
                *self = if value.contains("dev") {
                    Self::ProdOnly
                } else {
                    Self::All
                };
            }
            _ if *self != Self::Default => {}
            "only" if value.contains("prod") => *self = Self::ProdOnly,
            "only" if value.contains("dev") => *self = Self::DevOnly,
            "production" if value.contains("true") => *self = Self::ProdOnly,
            "production" if value.contains("false") => *self = Self::All,
            "dev" if value.contains("true") => *self = Self::All,
            _ => {}
        }
    }

    /// The `npm ls` passes this restriction requires
    pub fn scopes(self) -> Vec<DependencyScope> {
        match self {
            Self::DevOnly => vec![DependencyScope::Dev],
            Self::ProdOnly => vec![DependencyScope::Prod],
            Self::Default | Self::All => vec![DependencyScope::Dev, DependencyScope::Prod],
        }
    }
}

/// Scope tag of a dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyScope {
    Dev,
    Prod,
}

impl DependencyScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }
}

/// Checksum triple of a stored artifact
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Checksum {
    pub sha1: String,
    pub sha256: String,
    pub md5: String,
}

/// One resolved dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Package name, including any `@scope/` prefix
    pub name: String,
    pub version: String,
    pub scopes: Vec<DependencyScope>,
    /// Routes back to the module, innermost parent first
    pub path_to_root: Vec<Vec<String>>,
    /// Tarball extension, set by the checksum reconciler
    pub file_type: Option<String>,
    pub checksum: Option<Checksum>,
}

impl Dependency {
    pub fn key(&self) -> String {
        dependency_key(&self.name, &self.version)
    }
}

/// Dependencies keyed by `name:version`
pub type DependencyMap = BTreeMap<String, Dependency>;

pub fn dependency_key(name: &str, version: &str) -> String {
    format!("{name}:{version}")
}

/// Walk a `dependencies` object, recording every observation
///
/// `path` is the route from the current node to the module, innermost first.
pub fn walk(
    dependencies: &Map<String, Value>,
    scope: DependencyScope,
    path: &[String],
    deps: &mut DependencyMap,
) {
    for (name, node) in dependencies {
        let children = node.get("dependencies").and_then(Value::as_object);
        let Some(version) = node.get("version").and_then(Value::as_str) else {
            debug!(dependency = %name, "SkippedPeerDependency: '{name}' has no version and is not recorded");
            if let Some(children) = children {
                walk(children, scope, path, deps);
            }
            continue;
        };

        let key = dependency_key(name, version);
        let entry = deps.entry(key.clone()).or_insert_with(|| Dependency {
            name: name.clone(),
            version: version.to_string(),
            scopes: Vec::new(),
            path_to_root: Vec::new(),
            file_type: None,
            checksum: None,
        });
        if !entry.scopes.contains(&scope) {
            entry.scopes.push(scope);
        }
        entry.path_to_root.push(path.to_vec());

        if let Some(children) = children {
            let mut child_path = Vec::with_capacity(path.len() + 1);
            child_path.push(key);
            child_path.extend_from_slice(path);
            walk(children, scope, &child_path, deps);
        }
    }
}

/// Parse `npm ls --json` output and fold it into `deps`
pub fn parse_dependencies(
    json: &str,
    scope: DependencyScope,
    module_id: &str,
    deps: &mut DependencyMap,
) -> Result<(), BridgeError> {
    let tree: Value = serde_json::from_str(json)
        .map_err(|e| BridgeError::ConfigInvalid(format!("failed to parse npm ls output: {e}")))?;
    if let Some(dependencies) = tree.get("dependencies").and_then(Value::as_object) {
        walk(dependencies, scope, &[module_id.to_string()], deps);
    }
    Ok(())
}

/// Run `npm ls` for the scopes `restriction` requires and build the map
///
/// Only flag arguments of the wrapped command are forwarded to `npm ls`.
pub async fn resolve(
    restriction: TypeRestriction,
    args: &[String],
    runner: &dyn ToolRunner,
    executable: &Path,
    dir: &Path,
    module_id: &str,
) -> Result<DependencyMap, BridgeError> {
    let mut deps = DependencyMap::new();
    let flags: Vec<&String> = args.iter().filter(|a| a.starts_with('-')).collect();

    for scope in restriction.scopes() {
        let mut ls_args = vec![
            "ls".to_string(),
            "--json".to_string(),
            "--all".to_string(),
            format!("--{}", scope.as_str()),
        ];
        ls_args.extend(flags.iter().map(|f| (*f).clone()));

        let cmd = ToolCommand::new(executable, ls_args)
            .in_dir(dir)
            .capture_stdout()
            .capture_stderr();
        let stdout = match runner.run(&cmd).await {
            Ok(output) => output.stdout,
            // npm ls exits non-zero on peer problems but still prints the tree
            Err(ToolError::ExitCode { stdout, stderr, .. }) if !stdout.trim().is_empty() => {
                warn!("npm ls reported problems: {stderr}");
                stdout
            }
            Err(e) => return Err(e.into()),
        };
        parse_dependencies(&stdout, scope, module_id, &mut deps)?;
    }
    Ok(deps)
}
