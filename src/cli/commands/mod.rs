//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod npm;
pub mod terraform;
pub mod transfer;
pub mod yarn;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Subcommand;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::ServerArgs;
use crate::artifactory::{ArtifactoryClient, ArtifactoryService};
use crate::core::project_config::{ProjectConfig, RepoTarget, Role};
use crate::core::server::{ServerDetails, ServersConfig};
use crate::infra::dirs::BridgeDirs;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run npm against Artifactory (install, ci, publish, login or any other npm command)
    Npm {
        /// npm subcommand followed by its arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },

    /// Run yarn against Artifactory (login or any yarn command)
    Yarn {
        /// yarn arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },

    /// Terraform module commands
    Terraform {
        /// `publish` followed by its flags
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },

    /// Artifactory administration commands
    Rt {
        #[command(subcommand)]
        command: RtCommands,
    },
}

/// Artifactory administration subcommands
#[derive(Subcommand, Debug)]
pub enum RtCommands {
    /// Merge projects and repositories of a source instance into a target instance
    TransferConfigMerge {
        /// Configured id of the source server
        source_server_id: String,

        /// Configured id of the target server
        target_server_id: String,

        /// Repositories to include, semicolon-separated wildcard patterns
        #[arg(long)]
        include_repos: Option<String>,

        /// Repositories to exclude, semicolon-separated wildcard patterns
        #[arg(long)]
        exclude_repos: Option<String>,

        /// Projects to include, semicolon-separated wildcard patterns
        #[arg(long)]
        include_projects: Option<String>,

        /// Projects to exclude, semicolon-separated wildcard patterns
        #[arg(long)]
        exclude_projects: Option<String>,

        /// Only run the pre-transfer checks against the target
        #[arg(long)]
        prechecks: bool,
    },
}

/// Shared state of one command invocation
pub struct Context {
    pub dirs: BridgeDirs,
    pub working_dir: PathBuf,
    pub server_args: ServerArgs,
    pub cancel: CancellationToken,
}

impl Context {
    pub fn new(server_args: ServerArgs) -> Result<Self> {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Interrupted, canceling");
                on_interrupt.cancel();
            }
        });
        Ok(Self {
            dirs: BridgeDirs::new(),
            working_dir: std::env::current_dir().context("Failed to read the current directory")?,
            server_args,
            cancel,
        })
    }

    pub fn servers(&self) -> Result<ServersConfig> {
        let path = self.dirs.servers_path();
        ServersConfig::load_from_path(&path)
            .with_context(|| format!("Failed to load servers from {}", path.display()))
    }

    /// Server given by the global flags
    pub fn server(&self) -> Result<ServerDetails> {
        Ok(self.server_args.resolve(&self.servers()?)?)
    }

    /// Repository and server of a role from the project's `<tool>.yaml`
    ///
    /// An inline `--url` server replaces the configured one.
    pub fn project_target(&self, tool: &str, role: Option<Role>) -> Result<RepoTarget> {
        let config = ProjectConfig::load_for(tool, &self.working_dir, &self.dirs.projects_dir())
            .with_context(|| format!("Failed to read the {tool} project configuration"))?;
        let servers = self.servers()?;
        let mut target = match role {
            Some(role) => config.target(role, &servers)?,
            None => config.deployer_or_resolver(&servers)?,
        };
        if self.server_args.is_inline() {
            target.server = self.server_args.resolve(&servers)?;
        }
        Ok(target)
    }

    pub fn service(server: ServerDetails) -> Arc<dyn ArtifactoryService> {
        Arc::new(ArtifactoryClient::new(server))
    }
}

impl Commands {
    /// Execute the command
    pub async fn run(self, server_args: ServerArgs) -> Result<()> {
        let ctx = Context::new(server_args)?;
        match self {
            Self::Npm { args } => npm::execute(&ctx, args).await,
            Self::Yarn { args } => yarn::execute(&ctx, args).await,
            Self::Terraform { args } => terraform::execute(&ctx, args).await,
            Self::Rt { command } => match command {
                RtCommands::TransferConfigMerge {
                    source_server_id,
                    target_server_id,
                    include_repos,
                    exclude_repos,
                    include_projects,
                    exclude_projects,
                    prechecks,
                } => {
                    let options = transfer::TransferOptions {
                        source_server_id,
                        target_server_id,
                        include_repos: transfer::split_patterns(include_repos.as_deref()),
                        exclude_repos: transfer::split_patterns(exclude_repos.as_deref()),
                        include_projects: transfer::split_patterns(include_projects.as_deref()),
                        exclude_projects: transfer::split_patterns(exclude_projects.as_deref()),
                        prechecks,
                    };
                    transfer::execute(&ctx, options).await
                }
            },
        }
    }
}
