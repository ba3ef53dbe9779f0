//! Command-line interface module
//!
//! This module handles argument parsing and output formatting.
//! It contains no business logic - that belongs in the [`crate::core`] module.

pub mod commands;
pub mod output;

use anyhow::Result;
use clap::{Args, Parser};

use commands::Commands;

use crate::core::server::{ServerDetails, ServersConfig};
use crate::error::BridgeError;

/// rtbridge - npm, yarn and terraform against Artifactory
///
/// Runs package managers through an Artifactory repository, records
/// build info, and merges configuration between Artifactory instances.
#[derive(Parser, Debug)]
#[command(name = "rtbridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    pub json: bool,

    #[command(flatten)]
    pub server: ServerArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Server selection and credentials
///
/// `--url` describes a server inline; otherwise `--server-id` (or the
/// default) is looked up in `servers.toml`.
#[derive(Args, Debug, Clone, Default)]
pub struct ServerArgs {
    /// Configured server to use
    #[arg(long, env = "RTBRIDGE_SERVER_ID", global = true)]
    pub server_id: Option<String>,

    /// Platform URL, overrides the configured server
    #[arg(long, env = "RTBRIDGE_URL", global = true)]
    pub url: Option<String>,

    #[arg(long, env = "RTBRIDGE_USER", global = true)]
    pub user: Option<String>,

    #[arg(long, env = "RTBRIDGE_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    #[arg(long, env = "RTBRIDGE_ACCESS_TOKEN", global = true, hide_env_values = true)]
    pub access_token: Option<String>,
}

impl ServerArgs {
    /// Whether the server is given inline rather than by reference
    pub fn is_inline(&self) -> bool {
        self.url.is_some()
    }

    /// The server the flags describe
    pub fn resolve(&self, servers: &ServersConfig) -> Result<ServerDetails, BridgeError> {
        let mut server = match &self.url {
            Some(url) => ServerDetails::new(url.clone()),
            None => servers.get(self.server_id.as_deref())?,
        };
        if self.user.is_some() {
            server.user.clone_from(&self.user);
        }
        if self.password.is_some() {
            server.password.clone_from(&self.password);
        }
        if self.access_token.is_some() {
            server.access_token.clone_from(&self.access_token);
        }
        server.validate()?;
        Ok(server)
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn run(self) -> Result<()> {
        if let Some(cmd) = self.command {
            cmd.run(self.server).await
        } else {
            // No subcommand provided, show help
            use clap::CommandFactory;
            let mut cmd = Self::command();
            cmd.print_help()?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servers() -> ServersConfig {
        let mut config = ServersConfig::default();
        let mut main = ServerDetails::new("https://main.example.com").with_token("t");
        main.server_id = "main".to_string();
        config.servers.insert("main".to_string(), main);
        config.default = Some("main".to_string());
        config
    }

    #[test]
    fn test_inline_server_wins() {
        let args = ServerArgs {
            url: Some("https://inline.example.com".to_string()),
            user: Some("me".to_string()),
            password: Some("pw".to_string()),
            ..ServerArgs::default()
        };
        let server = args.resolve(&servers()).unwrap();
        assert_eq!(server.url, "https://inline.example.com");
        assert_eq!(server.user.as_deref(), Some("me"));
        assert!(server.access_token.is_none());
    }

    #[test]
    fn test_configured_server_with_override() {
        let args = ServerArgs {
            access_token: Some("override".to_string()),
            ..ServerArgs::default()
        };
        let server = args.resolve(&servers()).unwrap();
        assert_eq!(server.server_id, "main");
        assert_eq!(server.access_token.as_deref(), Some("override"));
    }

    #[test]
    fn test_unknown_server_id() {
        let args = ServerArgs {
            server_id: Some("other".to_string()),
            ..ServerArgs::default()
        };
        assert!(matches!(args.resolve(&servers()), Err(BridgeError::ConfigInvalid(_))));
    }

    #[test]
    fn test_cli_parses_passthrough_args() {
        let cli = Cli::try_parse_from(["rtbridge", "npm", "install", "--omit=dev", "--build-name", "b"]).unwrap();
        match cli.command {
            Some(Commands::Npm { args }) => assert_eq!(args, ["install", "--omit=dev", "--build-name", "b"]),
            other => panic!("unexpected {other:?}"),
        }
    }
}
