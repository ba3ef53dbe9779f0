//! Checksum reconciler
//!
//! Fills in the checksum and file type of every resolved dependency. A
//! dependency already recorded by the previous build of the same name reuses
//! that record; the rest are looked up in Artifactory with one AQL query
//! each, on a bounded pool of workers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::artifactory::{AqlItem, ArtifactoryService, PublishedBuild};
use crate::core::dependencies::{Checksum, Dependency, DependencyMap};
use crate::core::package_info::split_scope;
use crate::error::BridgeError;

/// Checksum and file type known for a dependency key
pub type KnownChecksums = HashMap<String, (Checksum, String)>;

/// Outcome of a reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Dependencies with a checksum
    pub resolved: Vec<Dependency>,
    /// Dependencies Artifactory has no tarball for
    pub missing: Vec<Dependency>,
}

/// AQL locating the tarball of `name@version`
pub fn aql_query(name: &str, version: &str) -> String {
    let (_, bare_name) = split_scope(name);
    format!(
        r#"items.find({{"$or":[{{"$and":[{{"path":{{"$match":"{name}/-"}}}},{{"name":{{"$match":"{bare_name}-{version}.tgz"}}}}]}}]}}).include("name","repo","path","actual_sha1","actual_md5","sha256")"#
    )
}

/// File type of a stored artifact: the text after the last dot
fn file_type(item_name: &str) -> String {
    item_name.rsplit('.').next().unwrap_or_default().to_string()
}

/// Index the dependencies of a published build by key
pub fn known_checksums(build: Option<&PublishedBuild>) -> KnownChecksums {
    build
        .into_iter()
        .flat_map(|b| &b.modules)
        .flat_map(|m| &m.dependencies)
        .map(|d| {
            (
                d.id.clone(),
                (
                    Checksum {
                        sha1: d.sha1.clone(),
                        sha256: d.sha256.clone(),
                        md5: d.md5.clone(),
                    },
                    d.file_type.clone(),
                ),
            )
        })
        .collect()
}

/// Checksums recorded by the latest published build of `build_name`
pub async fn previous_build_checksums(
    service: &dyn ArtifactoryService,
    build_name: &str,
    project: Option<&str>,
) -> Result<KnownChecksums, BridgeError> {
    let build = service.latest_build(build_name, project).await?;
    if build.is_none() {
        debug!("No previous build found for '{build_name}'");
    }
    Ok(known_checksums(build.as_ref()))
}

enum Lookup {
    Found(Checksum, String),
    Missing,
    Skipped,
}

fn lookup_from_items(items: &[AqlItem]) -> Lookup {
    match items.first() {
        Some(item) => Lookup::Found(
            Checksum {
                sha1: item.actual_sha1.clone(),
                sha256: item.sha256.clone(),
                md5: item.actual_md5.clone(),
            },
            file_type(&item.name),
        ),
        None => Lookup::Missing,
    }
}

/// Fill checksums for `dependencies`
///
/// Runs at most `threads` AQL queries at a time. The first failure stops
/// further queries and is returned once in-flight work has finished.
pub async fn reconcile(
    mut dependencies: DependencyMap,
    previous: &KnownChecksums,
    service: Arc<dyn ArtifactoryService>,
    threads: usize,
    cancel: CancellationToken,
) -> Result<Reconciliation, BridgeError> {
    let semaphore = Arc::new(Semaphore::new(threads.max(1)));
    let stop = Arc::new(AtomicBool::new(false));
    let first_error: Arc<Mutex<Option<BridgeError>>> = Arc::new(Mutex::new(None));

    let mut handles = Vec::new();
    for (key, dep) in &mut dependencies {
        if let Some((checksum, file_type)) = previous.get(key) {
            dep.checksum = Some(checksum.clone());
            dep.file_type = Some(file_type.clone());
            continue;
        }
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let key = key.clone();
        let query = aql_query(&dep.name, &dep.version);
        let sem = semaphore.clone();
        let svc = service.clone();
        let stop = stop.clone();
        let first_error = first_error.clone();
        let cancel = cancel.clone();

        handles.push(tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return (key, Lookup::Skipped);
            };
            if stop.load(Ordering::SeqCst) {
                return (key, Lookup::Skipped);
            }
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(BridgeError::Canceled),
                r = svc.aql(&query) => r.map_err(BridgeError::from),
            };
            match result {
                Ok(items) => (key, lookup_from_items(&items)),
                Err(e) => {
                    stop.store(true, Ordering::SeqCst);
                    if let Ok(mut slot) = first_error.lock() {
                        slot.get_or_insert(e);
                    }
                    (key, Lookup::Skipped)
                }
            }
        }));
    }

    let mut found = HashMap::new();
    for handle in handles {
        match handle.await {
            Ok((key, Lookup::Found(checksum, file_type))) => {
                found.insert(key, (checksum, file_type));
            }
            Ok(_) => {}
            Err(e) => {
                let mut slot = first_error.lock().map_err(|_| BridgeError::Canceled)?;
                slot.get_or_insert(BridgeError::RemoteUnavailable(e.to_string()));
            }
        }
    }

    if let Some(e) = first_error.lock().map_err(|_| BridgeError::Canceled)?.take() {
        return Err(e);
    }

    let mut outcome = Reconciliation::default();
    for (key, mut dep) in dependencies {
        if let Some((checksum, file_type)) = found.remove(&key) {
            dep.checksum = Some(checksum);
            dep.file_type = Some(file_type);
        }
        if dep.checksum.is_some() {
            outcome.resolved.push(dep);
        } else {
            outcome.missing.push(dep);
        }
    }

    if !outcome.missing.is_empty() {
        let keys: Vec<String> = outcome.missing.iter().map(Dependency::key).collect();
        warn!(
            "The following dependencies could not be found in Artifactory and will not be included in the build-info: {}",
            keys.join(", ")
        );
    }
    Ok(outcome)
}
