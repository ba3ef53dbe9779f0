//! CLI implementation for `rtbridge yarn`

use anyhow::{Context as _, Result};

use super::npm::login;
use super::Context;
use crate::cli::output::print_success;
use crate::core::project_config::Role;
use crate::core::rc::BuildTool;
use crate::core::yarn::YarnCommand;
use crate::infra::process::{find_executable, ProcessRunner};

/// Execute a yarn command
pub async fn execute(ctx: &Context, args: Vec<String>) -> Result<()> {
    if args.first().is_some_and(|a| a == "login") {
        return login(ctx, BuildTool::Yarn, &args[1..]).await;
    }

    let target = ctx.project_target("yarn", Some(Role::Resolver))?;
    let runner = ProcessRunner::new();
    let executable = find_executable("yarn")?;
    YarnCommand {
        args,
        working_dir: ctx.working_dir.clone(),
        repo: target.repo,
        executable,
        runner: &runner,
        service: Context::service(target.server),
    }
    .run()
    .await
    .context("yarn failed")?;
    print_success("yarn finished successfully");
    Ok(())
}
