//! Build-info recorder
//!
//! Modules produced by install, publish and terraform runs are persisted as
//! partial records under
//! `<home>/builds/<name>_<number>[_<project>]/partials/partial-<nanos>.json`.
//! A later `build-publish` step (outside rtbridge) assembles them.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::artifactory::DeployedFile;
use crate::core::dependencies::Dependency;
use crate::core::options::BuildConfiguration;
use crate::error::BuildInfoError;

const PARTIALS_DIR: &str = "partials";
const DETAILS_FILE: &str = "details";

/// Kind of module a partial describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    Npm,
    Terraform,
}

/// An artifact produced by the build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifact {
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub path: String,
    pub sha1: String,
    pub sha256: String,
    pub md5: String,
}

/// A dependency consumed by the build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildDependency {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub file_type: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub requested_by: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sha1: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sha256: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub md5: String,
}

impl From<&Dependency> for BuildDependency {
    fn from(dep: &Dependency) -> Self {
        let checksum = dep.checksum.clone().unwrap_or_default();
        Self {
            id: dep.key(),
            file_type: dep.file_type.clone().unwrap_or_default(),
            scopes: dep.scopes.iter().map(|s| s.as_str().to_string()).collect(),
            requested_by: dep.path_to_root.clone(),
            sha1: checksum.sha1,
            sha256: checksum.sha256,
            md5: checksum.md5,
        }
    }
}

/// One persisted partial build-info record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partial {
    /// Milliseconds since the epoch
    pub timestamp: i64,
    pub module_type: ModuleType,
    pub module_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<BuildArtifact>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<BuildDependency>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_dependencies: Option<Vec<BuildDependency>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildDetails {
    start_time: DateTime<Utc>,
}

/// Convert upload results into build artifacts of the given type
pub fn artifacts_from_deployed(files: &[DeployedFile], file_type: &str) -> Vec<BuildArtifact> {
    files
        .iter()
        .map(|f| BuildArtifact {
            name: f.name().to_string(),
            file_type: file_type.to_string(),
            path: f.path.clone(),
            sha1: f.checksums.sha1.clone(),
            sha256: f.checksums.sha256.clone(),
            md5: f.checksums.md5.clone(),
        })
        .collect()
}

/// Replace characters that may not appear in a directory name
fn sanitize(component: &str) -> String {
    component.replace(['/', '\\', ':'], "_")
}

/// Directory of one build's records
pub fn build_dir(builds_root: &Path, name: &str, number: &str, project: Option<&str>) -> PathBuf {
    let mut dir_name = format!("{}_{}", sanitize(name), sanitize(number));
    if let Some(project) = project.filter(|p| !p.is_empty()) {
        dir_name.push('_');
        dir_name.push_str(&sanitize(project));
    }
    builds_root.join(dir_name)
}

fn io_error(path: &Path, error: impl ToString) -> BuildInfoError {
    BuildInfoError::Io {
        path: path.to_path_buf(),
        error: error.to_string(),
    }
}

/// Read every partial of a build, oldest first
pub fn read_partials(build_dir: &Path) -> Result<Vec<Partial>, BuildInfoError> {
    let dir = build_dir.join(PARTIALS_DIR);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)
        .map_err(|e| io_error(&dir, e))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    paths
        .iter()
        .map(|path| {
            let content = std::fs::read(path).map_err(|e| io_error(path, e))?;
            serde_json::from_slice(&content).map_err(|e| BuildInfoError::Serde {
                path: path.clone(),
                error: e.to_string(),
            })
        })
        .collect()
}

/// Writes partial records for one build
///
/// Recording the same module id again in the same process replaces its
/// earlier partial instead of adding another one.
#[derive(Debug)]
pub struct BuildInfoRecorder {
    dir: PathBuf,
    name: String,
    number: String,
    project: Option<String>,
    written: Mutex<HashMap<String, PathBuf>>,
}

impl BuildInfoRecorder {
    /// Recorder for the build named in `config`
    ///
    /// Returns `None` when build info is not being collected.
    pub fn for_build(builds_root: &Path, config: &BuildConfiguration) -> Option<Self> {
        let (Some(name), Some(number)) = (&config.build_name, &config.build_number) else {
            return None;
        };
        let project = config.project().map(str::to_string);
        Some(Self {
            dir: build_dir(builds_root, name, number, project.as_deref()),
            name: name.clone(),
            number: number.clone(),
            project,
            written: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Start time of the build, recorded on first use
    pub fn start_time(&self) -> Result<DateTime<Utc>, BuildInfoError> {
        let path = self.dir.join(DETAILS_FILE);
        if path.exists() {
            let content = std::fs::read(&path).map_err(|e| io_error(&path, e))?;
            let details: BuildDetails = serde_json::from_slice(&content).map_err(|e| BuildInfoError::Serde {
                path: path.clone(),
                error: e.to_string(),
            })?;
            return Ok(details.start_time);
        }

        std::fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        let details = BuildDetails { start_time: Utc::now() };
        let content = serde_json::to_vec(&details).map_err(|e| BuildInfoError::Serde {
            path: path.clone(),
            error: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| io_error(&path, e))?;
        debug!("Created build details for {} #{}", self.name, self.number);
        Ok(details.start_time)
    }

    /// Properties attached to every artifact uploaded as part of the build
    pub fn build_props(&self) -> Result<BTreeMap<String, String>, BuildInfoError> {
        let start = self.start_time()?;
        let mut props = BTreeMap::new();
        props.insert("build.name".to_string(), self.name.clone());
        props.insert("build.number".to_string(), self.number.clone());
        props.insert("build.timestamp".to_string(), start.timestamp_millis().to_string());
        if let Some(project) = &self.project {
            props.insert("build.project".to_string(), project.clone());
        }
        Ok(props)
    }

    /// Persist the dependencies of a module
    pub fn record_dependencies(
        &self,
        module_id: &str,
        module_type: ModuleType,
        resolved: &[Dependency],
        missing: &[Dependency],
    ) -> Result<PathBuf, BuildInfoError> {
        self.write(Partial {
            timestamp: Utc::now().timestamp_millis(),
            module_type,
            module_id: module_id.to_string(),
            artifacts: None,
            dependencies: Some(resolved.iter().map(BuildDependency::from).collect()),
            missing_dependencies: (!missing.is_empty())
                .then(|| missing.iter().map(BuildDependency::from).collect()),
        })
    }

    /// Persist the artifacts of a module
    pub fn record_artifacts(
        &self,
        module_id: &str,
        module_type: ModuleType,
        artifacts: Vec<BuildArtifact>,
    ) -> Result<PathBuf, BuildInfoError> {
        self.write(Partial {
            timestamp: Utc::now().timestamp_millis(),
            module_type,
            module_id: module_id.to_string(),
            artifacts: Some(artifacts),
            dependencies: None,
            missing_dependencies: None,
        })
    }

    fn write(&self, partial: Partial) -> Result<PathBuf, BuildInfoError> {
        self.start_time()?;
        let partials = self.dir.join(PARTIALS_DIR);
        std::fs::create_dir_all(&partials).map_err(|e| io_error(&partials, e))?;

        let mut written = self.written.lock().map_err(|e| io_error(&partials, e))?;
        let path = match written.get(&partial.module_id) {
            Some(path) => path.clone(),
            None => {
                let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
                partials.join(format!("partial-{nanos}.json"))
            }
        };

        let content = serde_json::to_vec_pretty(&partial).map_err(|e| BuildInfoError::Serde {
            path: path.clone(),
            error: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| io_error(&path, e))?;
        debug!("Saved build-info partial for module '{}'", partial.module_id);
        written.insert(partial.module_id, path.clone());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifactory::FileChecksums;
    use crate::core::dependencies::{Checksum, DependencyScope};
    use tempfile::TempDir;

    fn config(project: Option<&str>) -> BuildConfiguration {
        BuildConfiguration {
            build_name: Some("my/build".to_string()),
            build_number: Some("7".to_string()),
            project: project.map(str::to_string),
            module: None,
        }
    }

    fn dependency(name: &str, checksum: Option<Checksum>) -> Dependency {
        Dependency {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            scopes: vec![DependencyScope::Prod],
            path_to_root: vec![vec!["root:1.0.0".to_string()]],
            file_type: checksum.as_ref().map(|_| "tgz".to_string()),
            checksum,
        }
    }

    // ============ Unit Tests - Build Directory ============

    #[test]
    fn test_build_dir_layout() {
        let root = Path::new("/home/builds");
        assert_eq!(build_dir(root, "a/b", "1:2", None), root.join("a_b_1_2"));
        assert_eq!(build_dir(root, "a", "1", Some("proj")), root.join("a_1_proj"));
        assert_eq!(build_dir(root, "a", "1", Some("")), root.join("a_1"));
    }

    #[test]
    fn test_recorder_requires_build_info() {
        let temp = TempDir::new().unwrap();
        assert!(BuildInfoRecorder::for_build(temp.path(), &BuildConfiguration::default()).is_none());
        assert!(BuildInfoRecorder::for_build(temp.path(), &config(None)).is_some());
    }

    // ============ Unit Tests - Partials ============

    #[test]
    fn test_record_dependencies_round_trip() {
        let temp = TempDir::new().unwrap();
        let recorder = BuildInfoRecorder::for_build(temp.path(), &config(Some("proj"))).unwrap();
        let resolved = dependency(
            "lodash",
            Some(Checksum {
                sha1: "s1".to_string(),
                sha256: "s256".to_string(),
                md5: "m5".to_string(),
            }),
        );
        let missing = dependency("ghost", None);
        recorder
            .record_dependencies("app:1.0.0", ModuleType::Npm, &[resolved], &[missing])
            .unwrap();

        let partials = read_partials(recorder.dir()).unwrap();
        assert_eq!(partials.len(), 1);
        let partial = &partials[0];
        assert_eq!(partial.module_id, "app:1.0.0");
        assert_eq!(partial.module_type, ModuleType::Npm);
        let deps = partial.dependencies.as_ref().unwrap();
        assert_eq!(deps[0].id, "lodash:1.0.0");
        assert_eq!(deps[0].file_type, "tgz");
        assert_eq!(deps[0].sha256, "s256");
        assert_eq!(deps[0].scopes, vec!["prod"]);
        assert_eq!(partial.missing_dependencies.as_ref().unwrap()[0].id, "ghost:1.0.0");
        assert!(recorder.dir().join("details").exists());
    }

    #[test]
    fn test_same_module_recorded_once() {
        let temp = TempDir::new().unwrap();
        let recorder = BuildInfoRecorder::for_build(temp.path(), &config(None)).unwrap();
        recorder.record_artifacts("m", ModuleType::Terraform, Vec::new()).unwrap();
        recorder.record_artifacts("m", ModuleType::Terraform, Vec::new()).unwrap();
        recorder.record_artifacts("other", ModuleType::Terraform, Vec::new()).unwrap();
        assert_eq!(read_partials(recorder.dir()).unwrap().len(), 2);
    }

    #[test]
    fn test_partial_json_shape() {
        let temp = TempDir::new().unwrap();
        let recorder = BuildInfoRecorder::for_build(temp.path(), &config(None)).unwrap();
        let path = recorder.record_artifacts("m", ModuleType::Npm, Vec::new()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(value["moduleType"], "npm");
        assert_eq!(value["moduleId"], "m");
        assert!(value.get("dependencies").is_none());
    }

    #[test]
    fn test_build_props_stable_timestamp() {
        let temp = TempDir::new().unwrap();
        let recorder = BuildInfoRecorder::for_build(temp.path(), &config(Some("p1"))).unwrap();
        let first = recorder.build_props().unwrap();
        let second = recorder.build_props().unwrap();
        assert_eq!(first, second);
        assert_eq!(first["build.name"], "my/build");
        assert_eq!(first["build.number"], "7");
        assert_eq!(first["build.project"], "p1");
    }

    #[test]
    fn test_artifacts_from_deployed() {
        let files = vec![DeployedFile {
            repo: "npm-local".to_string(),
            path: "@s/pkg/-/pkg-1.0.0.tgz".to_string(),
            download_uri: String::new(),
            checksums: FileChecksums {
                sha1: "a".to_string(),
                sha256: "b".to_string(),
                md5: "c".to_string(),
            },
        }];
        let artifacts = artifacts_from_deployed(&files, "tgz");
        assert_eq!(artifacts[0].name, "pkg-1.0.0.tgz");
        assert_eq!(artifacts[0].file_type, "tgz");
        assert_eq!(artifacts[0].sha256, "b");
    }

    #[test]
    fn test_read_partials_missing_dir() {
        let temp = TempDir::new().unwrap();
        assert!(read_partials(&temp.path().join("nothing")).unwrap().is_empty());
    }
}
