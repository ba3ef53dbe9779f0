//! CLI implementation for `rtbridge rt transfer-config-merge`

use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde_json::json;

use super::Context;
use crate::artifactory::ArtifactoryService;
use crate::cli::output::{create_check_bar, print_result, progress_reporter, status};
use crate::core::server::ServerDetails;
use crate::core::transfer::{ConnectFn, TransferConfigMerge, TransferFilters};
use crate::error::BridgeError;

/// Parsed command options
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    pub source_server_id: String,
    pub target_server_id: String,
    pub include_repos: Vec<String>,
    pub exclude_repos: Vec<String>,
    pub include_projects: Vec<String>,
    pub exclude_projects: Vec<String>,
    pub prechecks: bool,
}

/// Split `a;b;c` into patterns, dropping empty entries
pub fn split_patterns(raw: Option<&str>) -> Vec<String> {
    raw.map(|r| {
        r.split(';')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Execute the transfer
pub async fn execute(ctx: &Context, options: TransferOptions) -> Result<()> {
    let servers = ctx.servers()?;
    let source = servers
        .get(Some(&options.source_server_id))
        .context("Failed to read the source server")?;
    let target = servers
        .get(Some(&options.target_server_id))
        .context("Failed to read the target server")?;

    let connect: ConnectFn =
        Arc::new(|server: &ServerDetails| -> Result<Arc<dyn ArtifactoryService>, BridgeError> {
            Ok(Context::service(server.clone()))
        });
    let bar = options.prechecks.then(create_check_bar);

    let outcome = TransferConfigMerge {
        source: Context::service(source),
        target: Context::service(target),
        connect,
        filters: TransferFilters {
            include_repos: options.include_repos,
            exclude_repos: options.exclude_repos,
            include_projects: options.include_projects,
            exclude_projects: options.exclude_projects,
        },
        report_dir: ctx.working_dir.clone(),
        prechecks_only: options.prechecks,
        progress: bar.clone().map(progress_reporter),
        cancel: ctx.cancel.clone(),
    }
    .run()
    .await
    .context("Config transfer merge failed")?;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let mut lines = Vec::new();
    if let Some(checks) = &outcome.prechecks {
        lines.push(format!(
            "{} {} pre-check(s) passed, {} failed",
            if checks.failures == 0 { status::SUCCESS } else { status::WARNING },
            checks.successes,
            checks.failures
        ));
    } else {
        lines.push(format!(
            "{} Transferred {} project(s) and {} repositories",
            status::SUCCESS,
            outcome.projects_transferred,
            outcome.repositories_transferred
        ));
    }
    if let Some(csv) = &outcome.csv_path {
        lines.push(format!("{} Conflicts were found, see {}", status::WARNING, csv.display()));
    }
    print_result(
        &json!({
            "projects_transferred": outcome.projects_transferred,
            "repositories_transferred": outcome.repositories_transferred,
            "federated_members_removed": outcome.federated_members_removed,
            "conflicts_csv": outcome.csv_path,
            "prechecks": outcome.prechecks.as_ref().map(|s| json!({
                "successes": s.successes,
                "failures": s.failures,
            })),
        }),
        &lines,
    );
    Ok(())
}
