//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

use std::path::{Path, PathBuf};
use std::process::Output;

use tempfile::TempDir;

/// Test project context
///
/// Holds a project directory and a separate rtbridge home directory so
/// runs never touch the real `~/.rtbridge`.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
    /// rtbridge home directory for the run
    pub home: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
            home: TempDir::new().expect("Failed to create home directory"),
        }
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        write(&self.dir.path().join(name), content);
    }

    /// Check if a file exists in the test project
    #[allow(dead_code)]
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Write `servers.toml` into the home directory
    pub fn write_servers(&self, content: &str) {
        write(&self.home.path().join("servers.toml"), content);
    }

    /// Write `.jfrog/projects/<tool>.yaml`
    #[allow(dead_code)]
    pub fn write_project_config(&self, tool: &str, content: &str) {
        self.create_file(&format!(".jfrog/projects/{tool}.yaml"), content);
    }

    /// Files the run left in the home directory, relative paths
    #[allow(dead_code)]
    pub fn home_files(&self) -> Vec<PathBuf> {
        walkdir::WalkDir::new(self.home.path())
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.path().strip_prefix(self.home.path()).ok().map(Path::to_path_buf))
            .collect()
    }

    /// A `Command` for the rtbridge binary inside the project
    pub fn command(&self, args: &[&str]) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(env!("CARGO_BIN_EXE_rtbridge"));
        cmd.current_dir(self.path())
            .env("RTBRIDGE_HOME_DIR", self.home.path())
            .env_remove("RTBRIDGE_URL")
            .env_remove("RTBRIDGE_SERVER_ID")
            .env_remove("RTBRIDGE_USER")
            .env_remove("RTBRIDGE_PASSWORD")
            .env_remove("RTBRIDGE_ACCESS_TOKEN")
            .env_remove("RUST_LOG")
            .args(args);
        cmd
    }

    /// Run rtbridge inside the project
    pub async fn run(&self, args: &[&str]) -> Output {
        self.command(args)
            .output()
            .await
            .expect("Failed to execute rtbridge")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    std::fs::write(path, content).expect("Failed to write file");
}

/// `servers.toml` with a single default server
pub fn servers_toml(id: &str, url: &str) -> String {
    format!(
        r#"default = "{id}"

[servers.{id}]
url = "{url}"
access_token = "test-token"
"#
    )
}
