//! CLI implementation for `rtbridge terraform`

use anyhow::{bail, Context as _, Result};
use serde_json::json;

use super::Context;
use crate::cli::output::{create_spinner, print_result, status};
use crate::core::project_config::Role;
use crate::core::terraform::{TerraformPublishArgs, TerraformPublishCommand};

/// Execute a terraform command
pub async fn execute(ctx: &Context, args: Vec<String>) -> Result<()> {
    match args.split_first() {
        Some((subcommand, rest)) if subcommand == "publish" => publish(ctx, rest).await,
        Some((subcommand, _)) => bail!("Unsupported terraform command '{subcommand}'. Supported: publish"),
        None => bail!("A terraform command is required, for example 'rtbridge terraform publish'"),
    }
}

async fn publish(ctx: &Context, args: &[String]) -> Result<()> {
    let args = TerraformPublishArgs::parse(args)?;
    let target = ctx.project_target("terraform", Some(Role::Deployer))?;
    let staging = tempfile::TempDir::new().context("Failed to create a staging directory")?;

    let spinner = create_spinner("Publishing terraform modules...");
    let result = TerraformPublishCommand {
        args,
        working_dir: ctx.working_dir.clone(),
        repo: target.repo.clone(),
        service: Context::service(target.server),
        builds_root: ctx.dirs.builds_dir(),
        staging_dir: staging.path().to_path_buf(),
        cancel: ctx.cancel.clone(),
    }
    .run()
    .await;
    spinner.finish_and_clear();
    let summary = result.context("terraform publish failed")?;

    print_result(
        &json!({
            "status": "success",
            "modules": summary.modules,
            "totals": {"success": summary.outcome.succeeded, "failure": summary.outcome.failed},
            "partial": summary.partial,
        }),
        &[format!(
            "{} Published {} terraform module(s) to {}",
            status::SUCCESS,
            summary.modules,
            target.repo
        )],
    );
    Ok(())
}
