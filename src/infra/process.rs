//! Package-manager process driver
//!
//! Runs npm, yarn and friends as child processes. The child inherits the
//! current environment; extra variables are layered on top. Each output
//! stream is either inherited, captured, or (for stdout) forwarded to our
//! stderr so machine-readable output of rtbridge itself stays clean.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use semver::Version;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::ToolError;

/// Destination of a child output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputSink {
    /// Share the parent's stream
    #[default]
    Inherit,
    /// Collect into [`ToolOutput`]
    Capture,
    /// Forward to the parent's stderr
    Stderr,
}

/// A single invocation of a tool
#[derive(Debug, Clone)]
pub struct ToolCommand {
    /// Executable name or path
    pub executable: PathBuf,
    /// Arguments, starting with the subcommand
    pub args: Vec<String>,
    /// Working directory, current directory if unset
    pub dir: Option<PathBuf>,
    /// Extra environment on top of the inherited one
    pub env: Vec<(String, String)>,
    pub stdout: OutputSink,
    pub stderr: OutputSink,
}

impl ToolCommand {
    /// Create a command with inherited output
    pub fn new(executable: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            executable: executable.into(),
            args: args.into_iter().map(Into::into).collect(),
            dir: None,
            env: Vec::new(),
            stdout: OutputSink::Inherit,
            stderr: OutputSink::Inherit,
        }
    }

    /// Run in a specific directory
    #[must_use]
    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.dir = Some(dir.to_path_buf());
        self
    }

    /// Add an environment variable
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Capture stdout instead of inheriting it
    #[must_use]
    pub fn capture_stdout(mut self) -> Self {
        self.stdout = OutputSink::Capture;
        self
    }

    /// Capture stderr instead of inheriting it
    #[must_use]
    pub fn capture_stderr(mut self) -> Self {
        self.stderr = OutputSink::Capture;
        self
    }

    /// Forward stdout to our stderr
    #[must_use]
    pub fn stdout_to_stderr(mut self) -> Self {
        self.stdout = OutputSink::Stderr;
        self
    }

    /// Human-readable command line for logs and errors
    pub fn display(&self) -> String {
        let tool = self
            .executable
            .file_name()
            .map_or_else(|| self.executable.display().to_string(), |n| n.to_string_lossy().into_owned());
        if self.args.is_empty() {
            tool
        } else {
            format!("{tool} {}", self.args.join(" "))
        }
    }
}

/// Captured output of a finished tool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs tool commands
///
/// Non-zero exits surface as [`ToolError::ExitCode`] so callers can tell a
/// failing tool apart from a failure to start it.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, command: &ToolCommand) -> Result<ToolOutput, ToolError>;
}

/// Runs commands as real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

fn stdio_for(sink: OutputSink) -> Stdio {
    match sink {
        OutputSink::Inherit => Stdio::inherit(),
        OutputSink::Capture | OutputSink::Stderr => Stdio::piped(),
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, command: &ToolCommand) -> Result<ToolOutput, ToolError> {
        let shown = command.display();
        debug!("Running command: {shown}");

        let mut cmd = Command::new(&command.executable);
        cmd.args(&command.args)
            .stdin(Stdio::inherit())
            .stdout(stdio_for(command.stdout))
            .stderr(stdio_for(command.stderr));
        if let Some(dir) = &command.dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| ToolError::SpawnFailed {
            tool: shown.clone(),
            error: e.to_string(),
        })?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let stdout_sink = command.stdout;

        let stdout_task = tokio::spawn(async move {
            let Some(mut pipe) = stdout_pipe else {
                return Ok(String::new());
            };
            if stdout_sink == OutputSink::Stderr {
                let mut stderr = tokio::io::stderr();
                tokio::io::copy(&mut pipe, &mut stderr).await?;
                Ok(String::new())
            } else {
                let mut buf = String::new();
                pipe.read_to_string(&mut buf).await?;
                Ok::<_, std::io::Error>(buf)
            }
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(mut pipe) = stderr_pipe {
                pipe.read_to_string(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        });

        let status = child.wait().await.map_err(|e| ToolError::SpawnFailed {
            tool: shown.clone(),
            error: e.to_string(),
        })?;

        let join = |r: Result<Result<String, std::io::Error>, tokio::task::JoinError>| {
            r.map_err(|e| e.to_string())
                .and_then(|inner| inner.map_err(|e| e.to_string()))
                .map_err(|error| ToolError::SpawnFailed {
                    tool: shown.clone(),
                    error,
                })
        };
        let stdout = join(stdout_task.await)?;
        let stderr = join(stderr_task.await)?;

        if !status.success() {
            return Err(ToolError::ExitCode {
                command: shown,
                exit_code: status.code().unwrap_or(1),
                stderr: stderr.trim().to_string(),
                stdout,
            });
        }

        Ok(ToolOutput { stdout, stderr })
    }
}

/// Locate an executable in PATH
pub fn find_executable(tool: &str) -> Result<PathBuf, ToolError> {
    which::which(tool).map_err(|_| ToolError::NotFound {
        tool: tool.to_string(),
    })
}

/// Run `<tool> --version` and parse the result
pub async fn detect_version(
    runner: &dyn ToolRunner,
    executable: &Path,
) -> Result<Version, ToolError> {
    let output = runner
        .run(&ToolCommand::new(executable, ["--version"]).capture_stdout().capture_stderr())
        .await?;
    parse_version(&executable.display().to_string(), &output.stdout)
}

/// Extract a semver version from tool output such as `v10.2.4\n`
pub fn parse_version(tool: &str, output: &str) -> Result<Version, ToolError> {
    let re = regex::Regex::new(r"v?(\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?)").map_err(|e| {
        ToolError::VersionParse {
            tool: tool.to_string(),
            output: e.to_string(),
        }
    })?;
    re.captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| Version::parse(m.as_str()).ok())
        .ok_or_else(|| ToolError::VersionParse {
            tool: tool.to_string(),
            output: output.trim().to_string(),
        })
}

#[cfg(test)]
pub mod testing {
    //! Scripted runner for tests

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Records every command and answers from a queue of scripted results
    ///
    /// When the queue is empty, commands succeed with empty output.
    #[derive(Default)]
    pub struct ScriptedRunner {
        pub calls: Mutex<Vec<ToolCommand>>,
        responses: Mutex<VecDeque<Result<ToolOutput, ToolError>>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_stdout(&self, stdout: &str) {
            self.responses.lock().unwrap().push_back(Ok(ToolOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
            }));
        }

        pub fn push_error(&self, error: ToolError) {
            self.responses.lock().unwrap().push_back(Err(error));
        }

        pub fn args(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().iter().map(|c| c.args.clone()).collect()
        }
    }

    #[async_trait]
    impl ToolRunner for ScriptedRunner {
        async fn run(&self, command: &ToolCommand) -> Result<ToolOutput, ToolError> {
            self.calls.lock().unwrap().push(command.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ToolOutput::default()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("npm", "10.2.4\n").unwrap(), Version::new(10, 2, 4));
        assert_eq!(parse_version("node", "v18.17.0").unwrap(), Version::new(18, 17, 0));
        assert_eq!(
            parse_version("yarn", "4.0.0-rc.42").unwrap(),
            Version::parse("4.0.0-rc.42").unwrap()
        );
        assert!(parse_version("npm", "not a version").is_err());
    }

    #[test]
    fn test_command_display() {
        let cmd = ToolCommand::new("/usr/bin/npm", ["install", "--no-audit"]);
        assert_eq!(cmd.display(), "npm install --no-audit");
        assert_eq!(ToolCommand::new("npm", Vec::<String>::new()).display(), "npm");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_captures_stdout() {
        let cmd = ToolCommand::new("sh", ["-c", "echo hello"]).capture_stdout();
        let output = ProcessRunner::new().run(&cmd).await.unwrap();
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_exit_code() {
        let cmd = ToolCommand::new("sh", ["-c", "echo boom >&2; exit 4"]).capture_stderr();
        let err = ProcessRunner::new().run(&cmd).await.unwrap_err();
        match err {
            ToolError::ExitCode { exit_code, stderr, .. } => {
                assert_eq!(exit_code, 4);
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_env_and_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let cmd = ToolCommand::new("sh", ["-c", "echo \"$RTBRIDGE_TEST_VALUE\"; pwd"])
            .in_dir(temp.path())
            .env("RTBRIDGE_TEST_VALUE", "from-env")
            .capture_stdout();
        let output = ProcessRunner::new().run(&cmd).await.unwrap();
        let mut lines = output.stdout.lines();
        assert_eq!(lines.next(), Some("from-env"));
        let pwd = std::fs::canonicalize(lines.next().unwrap()).unwrap();
        assert_eq!(pwd, std::fs::canonicalize(temp.path()).unwrap());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_not_exit_code() {
        let cmd = ToolCommand::new("definitely-not-a-real-binary-xyz", ["x"]);
        let err = ProcessRunner::new().run(&cmd).await.unwrap_err();
        assert!(matches!(err, ToolError::SpawnFailed { .. }));
    }
}
