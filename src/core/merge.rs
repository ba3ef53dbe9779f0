//! Config-merge classification
//!
//! Compares projects and repositories of a source and a target instance.
//! Each source entity that passes the include/exclude filter ends up
//! transferable, already equal, or conflicting.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::artifactory::{ArtifactoryService, Project, RepositoryDetails};
use crate::config::defaults::{BLACKLISTED_REPOSITORIES, FILTERED_REPO_KEYS};
use crate::error::BridgeError;
use crate::infra::csv::CsvRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    Repository,
    Project,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repository => write!(f, "Repository"),
            Self::Project => write!(f, "Project"),
        }
    }
}

/// A source entity that differs from its counterpart on the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub source_name: String,
    pub target_name: String,
    /// Differing attribute names joined by `; `
    pub different_properties: String,
}

impl CsvRecord for Conflict {
    fn headers() -> &'static [&'static str] {
        &["type", "source_name", "target_name", "different_properties"]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.kind.to_string(),
            self.source_name.clone(),
            self.target_name.clone(),
            self.different_properties.clone(),
        ]
    }
}

/// Marshal a value into an attribute map
pub fn to_attribute_map<T: Serialize>(value: &T) -> Result<Map<String, Value>, BridgeError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(BridgeError::ConfigInvalid(format!("expected an object, got {other}"))),
        Err(e) => Err(BridgeError::ConfigInvalid(e.to_string())),
    }
}

/// Names of attributes present on both sides with different values
///
/// Keys found on one side only are ignored, as are keys whose lowercase
/// form is in `filtered`. The result is sorted and joined by `; `.
pub fn diff_attributes(first: &Map<String, Value>, second: &Map<String, Value>, filtered: &[&str]) -> String {
    let mut diff: Vec<&str> = first
        .iter()
        .filter(|(key, _)| !filtered.contains(&key.to_lowercase().as_str()))
        .filter(|(key, value)| second.get(*key).is_some_and(|other| other != *value))
        .map(|(key, _)| key.as_str())
        .collect();
    diff.sort_unstable();
    diff.join("; ")
}

/// Shell-style include and exclude patterns
///
/// Excludes win; an empty include list includes everything.
#[derive(Debug, Clone, Default)]
pub struct IncludeExcludeFilter {
    include: Vec<glob::Pattern>,
    exclude: Vec<glob::Pattern>,
    skip_system_repositories: bool,
}

impl IncludeExcludeFilter {
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self, BridgeError> {
        let compile = |patterns: &[S]| {
            patterns
                .iter()
                .map(AsRef::as_ref)
                .filter(|p| !p.is_empty())
                .map(|p| {
                    glob::Pattern::new(p)
                        .map_err(|e| BridgeError::ConfigInvalid(format!("invalid pattern '{p}': {e}")))
                })
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
            skip_system_repositories: false,
        })
    }

    /// Same filter, also rejecting the built-in system repositories
    #[must_use]
    pub fn for_repositories(mut self) -> Self {
        self.skip_system_repositories = true;
        self
    }

    pub fn should_include(&self, name: &str) -> bool {
        if self.skip_system_repositories && BLACKLISTED_REPOSITORIES.contains(&name) {
            return false;
        }
        if self.exclude.iter().any(|p| p.matches(name)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.matches(name))
    }
}

/// Repository class, in transfer order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RepoKind {
    Remote,
    Local,
    Federated,
    Unknown,
    Virtual,
}

impl RepoKind {
    pub fn from_type(repo_type: &str) -> Self {
        match repo_type.to_lowercase().as_str() {
            "local" => Self::Local,
            "remote" => Self::Remote,
            "federated" => Self::Federated,
            "virtual" => Self::Virtual,
            _ => Self::Unknown,
        }
    }
}

/// How a source entity relates to the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Transferable,
    Equal,
    Conflicting,
}

/// The outcome of comparing source and target
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    pub projects: Vec<Project>,
    /// Repository keys to create, by kind
    pub repositories: BTreeMap<RepoKind, Vec<String>>,
    pub conflicts: Vec<Conflict>,
}

impl MergePlan {
    pub fn repository_count(&self) -> usize {
        self.repositories.values().map(Vec::len).sum()
    }
}

fn project_label(project: &Project) -> String {
    format!("{}({})", project.display_name, project.project_key)
}

fn compare_projects(source: &Project, target: &Project) -> Result<Option<Conflict>, BridgeError> {
    let diff = diff_attributes(&to_attribute_map(source)?, &to_attribute_map(target)?, &[]);
    Ok((!diff.is_empty()).then(|| Conflict {
        kind: ConflictKind::Project,
        source_name: project_label(source),
        target_name: project_label(target),
        different_properties: diff,
    }))
}

/// Classify each filtered source project against the target projects
///
/// Returns the per-project classification in source order, plus the
/// conflict records. A project can conflict twice: with the target
/// project of the same key and with a different one of the same name.
pub fn classify_projects(
    source: &[Project],
    target: &[Project],
    filter: &IncludeExcludeFilter,
) -> Result<(Vec<(Project, Classification)>, Vec<Conflict>), BridgeError> {
    let by_key: HashMap<&str, &Project> = target.iter().map(|p| (p.project_key.as_str(), p)).collect();
    let by_name: HashMap<&str, &Project> = target.iter().map(|p| (p.display_name.as_str(), p)).collect();

    let mut classified = Vec::new();
    let mut conflicts = Vec::new();
    for project in source.iter().filter(|p| filter.should_include(&p.project_key)) {
        let same_key = by_key.get(project.project_key.as_str()).copied();
        let same_name = by_name.get(project.display_name.as_str()).copied();

        if same_key.is_none() && same_name.is_none() {
            classified.push((project.clone(), Classification::Transferable));
            continue;
        }

        let before = conflicts.len();
        if let Some(target) = same_key {
            conflicts.extend(compare_projects(project, target)?);
        }
        if let Some(target) = same_name {
            if same_key.map_or(true, |k| k.project_key != target.project_key) {
                conflicts.extend(compare_projects(project, target)?);
            }
        }
        let class = if conflicts.len() > before {
            Classification::Conflicting
        } else {
            Classification::Equal
        };
        classified.push((project.clone(), class));
    }
    Ok((classified, conflicts))
}

/// Compare two repositories, summary first and full parameters after
///
/// Returns the differing attribute names, empty when equal.
pub async fn compare_repositories(
    source: &dyn ArtifactoryService,
    target: &dyn ArtifactoryService,
    source_details: &RepositoryDetails,
    target_details: &RepositoryDetails,
) -> Result<String, BridgeError> {
    let diff = diff_attributes(
        &to_attribute_map(source_details)?,
        &to_attribute_map(target_details)?,
        FILTERED_REPO_KEYS,
    );
    if !diff.is_empty() {
        return Ok(diff);
    }
    let source_full = source.get_repository(&source_details.key).await?;
    let target_full = target.get_repository(&target_details.key).await?;
    Ok(diff_attributes(&source_full, &target_full, FILTERED_REPO_KEYS))
}

/// Build the merge plan for projects and repositories
pub struct Merger<'a> {
    pub source: &'a dyn ArtifactoryService,
    pub target: &'a dyn ArtifactoryService,
    pub repo_filter: IncludeExcludeFilter,
    pub project_filter: IncludeExcludeFilter,
}

impl Merger<'_> {
    pub async fn plan(&self, include_projects: bool) -> Result<MergePlan, BridgeError> {
        let mut plan = MergePlan::default();
        if include_projects {
            log_title("Merging projects config");
            self.merge_projects(&mut plan).await?;
        }
        log_title("Merging repositories config");
        self.merge_repositories(&mut plan).await?;
        Ok(plan)
    }

    async fn merge_projects(&self, plan: &mut MergePlan) -> Result<(), BridgeError> {
        info!("Getting all Projects from the source ...");
        let source = self.source.get_all_projects().await?;
        info!("Getting all Projects from the target ...");
        let target = self.target.get_all_projects().await?;

        let (classified, conflicts) = classify_projects(&source, &target, &self.project_filter)?;
        plan.projects.extend(
            classified
                .into_iter()
                .filter(|(_, class)| *class == Classification::Transferable)
                .map(|(project, _)| project),
        );
        plan.conflicts.extend(conflicts);
        Ok(())
    }

    async fn merge_repositories(&self, plan: &mut MergePlan) -> Result<(), BridgeError> {
        let source = self.source.get_all_repositories().await?;
        let target = self.target.get_all_repositories().await?;
        let target_by_key: HashMap<&str, &RepositoryDetails> = target.iter().map(|r| (r.key.as_str(), r)).collect();

        for repo in source.iter().filter(|r| self.repo_filter.should_include(&r.key)) {
            match target_by_key.get(repo.key.as_str()) {
                Some(existing) => {
                    let diff = compare_repositories(self.source, self.target, repo, existing).await?;
                    if !diff.is_empty() {
                        plan.conflicts.push(Conflict {
                            kind: ConflictKind::Repository,
                            source_name: repo.key.clone(),
                            target_name: repo.key.clone(),
                            different_properties: diff,
                        });
                    }
                }
                None => plan
                    .repositories
                    .entry(RepoKind::from_type(&repo.repo_type))
                    .or_default()
                    .push(repo.key.clone()),
            }
        }
        Ok(())
    }
}

/// Section title in the run log
pub fn log_title(title: &str) {
    info!("========== {title} ==========");
}
