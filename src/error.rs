//! Error types for rtbridge
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while invoking a package-manager binary
#[derive(Error, Debug)]
pub enum ToolError {
    /// Executable could not be located in PATH
    #[error("Could not find the '{tool}' executable in PATH")]
    NotFound { tool: String },

    /// Process could not be started or its pipes failed
    #[error("Failed to run '{tool}': {error}")]
    SpawnFailed { tool: String, error: String },

    /// The tool ran and exited with a non-zero code
    #[error("'{command}' exited with code {exit_code}: {stderr}")]
    ExitCode {
        command: String,
        exit_code: i32,
        stderr: String,
        /// Captured stdout, empty unless stdout was captured
        stdout: String,
    },

    /// Version output could not be parsed
    #[error("Could not parse the version of '{tool}' from '{output}'")]
    VersionParse { tool: String, output: String },
}

/// Errors raised by the Artifactory REST client
#[derive(Error, Debug)]
pub enum ArtifactoryError {
    /// Transport failure
    #[error("Request to '{url}' failed: {error}")]
    Network { url: String, error: String },

    /// Server answered with an unexpected status
    #[error("Artifactory returned {status} for '{url}': {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// Response body did not match the expected shape
    #[error("Failed to parse response from '{url}': {error}")]
    Parse { url: String, error: String },

    /// Local file could not be read for upload
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },
}

impl ArtifactoryError {
    /// HTTP status of the failed call, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to move or remove a file
    #[error("Failed to move '{from}' to '{to}': {error}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },

    /// Failed to remove file
    #[error("Failed to remove file '{path}': {error}")]
    RemoveFile { path: PathBuf, error: String },
}

/// Archive reading and writing errors
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The archive could not be opened or iterated
    #[error("Failed to read archive '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// The archive could not be written
    #[error("Failed to write archive '{path}': {error}")]
    Write { path: PathBuf, error: String },

    /// Invalid exclusion pattern
    #[error("Invalid pattern '{pattern}': {error}")]
    Pattern { pattern: String, error: String },
}

/// Build-info persistence errors
#[derive(Error, Debug)]
pub enum BuildInfoError {
    /// IO error on the partials directory
    #[error("Build-info IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },

    /// Partial record could not be (de)serialized
    #[error("Invalid build-info partial '{path}': {error}")]
    Serde { path: PathBuf, error: String },
}

/// Project configuration (`.jfrog/projects/<tool>.yaml`) errors
#[derive(Error, Debug)]
pub enum ProjectConfigError {
    /// No config file for the tool was found
    #[error("{tool} project configuration not found. Searched from '{searched}' upward and in the home directory")]
    NotFound { tool: String, searched: PathBuf },

    /// File could not be read
    #[error("Failed to read project configuration '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// YAML was malformed
    #[error("Failed to parse project configuration '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// A required role section is missing
    #[error("Missing {role} repository configuration in '{path}'")]
    MissingRole { role: String, path: PathBuf },

    /// Structurally valid but semantically wrong
    #[error("Invalid {role} configuration in '{path}': {reason}")]
    Invalid {
        role: String,
        path: PathBuf,
        reason: String,
    },
}

/// Top-level rtbridge error type
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration shape or required field problem
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Package manager missing or too old
    #[error("{0}")]
    UnsupportedTool(String),

    /// Artifactory version below the required minimum
    #[error("{feature} requires Artifactory version {required} or higher, but found {found}")]
    UnsupportedVersion {
        feature: String,
        required: String,
        found: String,
    },

    /// Target repository does not exist
    #[error("Repository '{0}' does not exist")]
    RepoNotFound(String),

    /// Credentials rejected or unusable
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Server reported failed uploads
    #[error("Failed to upload {0}")]
    UploadFailed(String),

    /// Security scan gate rejected the artifact
    #[error("Scan violations found for '{0}', the package was not uploaded")]
    ScanViolation(String),

    /// Tarball without `package/package.json`
    #[error("Could not find 'package.json' in the compressed npm package: {}", .0.display())]
    MissingPackageJson(PathBuf),

    /// Wrapped tool exited non-zero
    #[error("{command} failed with exit code {exit_code}")]
    ToolFailed { command: String, exit_code: i32 },

    /// A remote endpoint was unreachable or kept failing
    #[error("Remote service unavailable: {0}")]
    RemoteUnavailable(String),

    /// Source and target are the same instance
    #[error("The source and target Artifactory servers are identical, but should be different.")]
    SameServer,

    /// Entities differ between source and target
    #[error("{0}")]
    Conflict(String),

    /// A temporarily replaced project file could not be put back
    #[error("{0}")]
    RestoreFailed(String),

    /// Operation was canceled
    #[error("Operation canceled")]
    Canceled,

    /// A cleanup step failed after the main operation had already failed
    #[error("{primary}\n{cleanup}")]
    Compound {
        primary: Box<BridgeError>,
        cleanup: Box<BridgeError>,
    },

    /// Tool invocation error
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Artifactory client error
    #[error(transparent)]
    Artifactory(#[from] ArtifactoryError),

    /// Filesystem error
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    /// Archive error
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Build-info error
    #[error(transparent)]
    BuildInfo(#[from] BuildInfoError),

    /// Project configuration error
    #[error(transparent)]
    ProjectConfig(#[from] ProjectConfigError),
}

impl BridgeError {
    /// Merge a cleanup failure into the primary error without hiding it
    pub fn compound(primary: BridgeError, cleanup: BridgeError) -> Self {
        Self::Compound {
            primary: Box::new(primary),
            cleanup: Box::new(cleanup),
        }
    }

    /// Process exit code for this error
    ///
    /// A failing wrapped tool keeps its own exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ToolFailed { exit_code, .. }
            | Self::Tool(ToolError::ExitCode { exit_code, .. }) => *exit_code,
            Self::Compound { primary, .. } => primary.exit_code(),
            _ => 1,
        }
    }
}

/// Combine the result of an operation with the result of its cleanup
///
/// The cleanup error surfaces only when the operation succeeded; otherwise
/// both are reported together.
pub fn join_cleanup<T>(
    result: Result<T, BridgeError>,
    cleanup: Result<(), BridgeError>,
) -> Result<T, BridgeError> {
    match (result, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(cleanup)) => Err(cleanup),
        (Err(primary), Ok(())) => Err(primary),
        (Err(primary), Err(cleanup)) => Err(BridgeError::compound(primary, cleanup)),
    }
}
