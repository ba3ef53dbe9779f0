//! CLI implementation for `rtbridge npm`
//!
//! Dispatches on the npm subcommand: `install`/`ci` and `publish` run the
//! build-info pipelines, `login` configures the user rc, anything else is
//! passed through to npm.

use anyhow::{bail, Context as _, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::json;
use std::sync::Arc;

use super::Context;
use crate::cli::output::{create_spinner, print_result, print_success, print_warning};
use crate::core::install::{InstallCommand, InstallKind};
use crate::core::login::LoginCommand;
use crate::core::native::NativeCommand;
use crate::core::npm::NpmTool;
use crate::core::options::{extract_npm_options, take_value_flag, ScanOutputFormat};
use crate::core::project_config::Role;
use crate::core::publish::{PublishCommand, ScanFn, ScanRequest};
use crate::core::rc::BuildTool;
use crate::error::{BridgeError, ToolError};
use crate::infra::process::{find_executable, ProcessRunner, ToolCommand, ToolRunner};

const TOOL: &str = "npm";

/// Execute an npm command
pub async fn execute(ctx: &Context, args: Vec<String>) -> Result<()> {
    let Some((subcommand, rest)) = args.split_first() else {
        bail!("An npm command is required, for example 'rtbridge npm install'");
    };
    match subcommand.as_str() {
        "install" | "i" | "isntall" | "add" => install(ctx, InstallKind::Install, rest).await,
        "ci" => install(ctx, InstallKind::Ci, rest).await,
        "publish" | "p" => publish(ctx, rest).await,
        "login" => login(ctx, BuildTool::Npm, rest).await,
        _ => native(ctx, args).await,
    }
}

async fn install(ctx: &Context, kind: InstallKind, args: &[String]) -> Result<()> {
    let options = extract_npm_options(args)?;
    let target = ctx.project_target(TOOL, Some(Role::Resolver))?;
    let runner = ProcessRunner::new();
    let tool = NpmTool::detect(&runner).await?;

    let summary = InstallCommand {
        kind,
        options,
        working_dir: ctx.working_dir.clone(),
        repo: target.repo.clone(),
        tool,
        runner: &runner,
        service: Context::service(target.server),
        builds_root: ctx.dirs.builds_dir(),
        cancel: ctx.cancel.clone(),
    }
    .run()
    .await
    .with_context(|| format!("npm {} failed", kind.as_str()))?;

    let mut lines = vec![format!("{} npm {} completed", crate::cli::output::status::SUCCESS, kind.as_str())];
    if let Some(partial) = &summary.partial {
        lines.push(format!(
            "  Recorded {} dependencies ({} without checksums) in {}",
            summary.resolved + summary.missing,
            summary.missing,
            partial.display()
        ));
    }
    print_result(
        &json!({
            "command": kind.as_str(),
            "repository": target.repo,
            "dependencies": summary.resolved,
            "missing": summary.missing,
            "partial": summary.partial,
        }),
        &lines,
    );
    Ok(())
}

async fn publish(ctx: &Context, args: &[String]) -> Result<()> {
    let options = extract_npm_options(args)?;
    let target = ctx.project_target(TOOL, Some(Role::Deployer))?;
    let runner = ProcessRunner::new();
    let tool = NpmTool::detect(&runner).await?;
    let scan = options.xray_scan.then(external_scanner);
    let detailed = options.detailed_summary;

    let spinner = create_spinner("Publishing npm package...");
    let result = PublishCommand {
        options,
        working_dir: ctx.working_dir.clone(),
        repo: target.repo.clone(),
        tool,
        runner: &runner,
        service: Context::service(target.server),
        builds_root: ctx.dirs.builds_dir(),
        scan,
    }
    .run()
    .await;
    spinner.finish_and_clear();
    let summary = result.context("npm publish failed")?;

    let mut lines = vec![format!(
        "{} Published {} to {}",
        crate::cli::output::status::SUCCESS,
        summary.package.module_id(),
        target.repo
    )];
    if detailed {
        lines.extend(summary.files.iter().map(|f| format!("    {}/{}", f.repo, f.path)));
    }
    print_result(
        &json!({
            "status": "success",
            "totals": {"success": summary.succeeded, "failure": summary.failed},
            "files": summary.files.iter().map(|f| json!({
                "source": f.name(),
                "target": format!("{}/{}", f.repo, f.path),
                "sha256": f.checksums.sha256,
            })).collect::<Vec<_>>(),
        }),
        &lines,
    );
    Ok(())
}

async fn native(ctx: &Context, args: Vec<String>) -> Result<()> {
    let target = ctx.project_target(TOOL, None)?;
    let runner = ProcessRunner::new();
    let tool = NpmTool::detect(&runner).await?;
    NativeCommand {
        args,
        working_dir: ctx.working_dir.clone(),
        repo: target.repo,
        tool,
        runner: &runner,
        service: Context::service(target.server),
    }
    .run()
    .await?;
    Ok(())
}

/// `npm login` / `yarn login`
pub async fn login(ctx: &Context, tool: BuildTool, args: &[String]) -> Result<()> {
    let mut args = args.to_vec();
    let repo = take_value_flag(&mut args, "--repo")?.unwrap_or_default();
    if !args.is_empty() {
        print_warning(&format!("Ignoring unexpected arguments: {}", args.join(" ")));
    }
    let service = Context::service(ctx.server()?);
    let runner = ProcessRunner::new();
    let executable = find_executable(tool.executable_name())?;
    LoginCommand {
        tool,
        executable,
        repo: &repo,
        service: service.as_ref(),
        runner: &runner,
    }
    .run()
    .await
    .with_context(|| format!("Failed to configure {tool}"))?;
    print_success(&format!("Configured {tool} to use repository '{repo}'"));
    Ok(())
}

/// Scan gate backed by the JFrog CLI `scan` command
///
/// A non-zero exit of the scanner means the package has violations.
fn external_scanner() -> ScanFn {
    Arc::new(|request: ScanRequest| -> BoxFuture<'static, Result<(), BridgeError>> {
        async move {
            let scanner = find_executable("jf")?;
            let format = match request.format {
                ScanOutputFormat::Table => "table",
                ScanOutputFormat::Json => "json",
            };
            let tarball = request.tarball.display().to_string();
            let command = ToolCommand::new(
                scanner,
                [
                    "scan".to_string(),
                    tarball.clone(),
                    format!("--format={format}"),
                    format!("--url={}", request.server.platform_url()),
                ],
            );
            match ProcessRunner::new().run(&command).await {
                Ok(_) => Ok(()),
                Err(ToolError::ExitCode { .. }) => Err(BridgeError::ScanViolation(tarball)),
                Err(e) => Err(e.into()),
            }
        }
        .boxed()
    })
}
