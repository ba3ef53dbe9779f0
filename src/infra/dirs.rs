//! Home directory management
//!
//! rtbridge keeps its server list, build-info partials and fallback
//! project configurations under a single home directory.
//!
//! `RTBRIDGE_HOME_DIR` overrides the default of `~/.rtbridge`.

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable overriding the home directory
pub const ENV_HOME_DIR: &str = "RTBRIDGE_HOME_DIR";

/// Default directory name under the user's home
const APP_DIR_NAME: &str = ".rtbridge";

const BUILDS_SUBDIR: &str = "builds";
const PROJECTS_SUBDIR: &str = "projects";
const SERVERS_FILE: &str = "servers.toml";

/// Directory provider for rtbridge state
#[derive(Debug, Clone)]
pub struct BridgeDirs {
    home_dir: PathBuf,
}

impl BridgeDirs {
    /// Resolve the home directory from the environment or the user's home
    #[must_use]
    pub fn new() -> Self {
        Self {
            home_dir: Self::resolve_home_dir(),
        }
    }

    /// Use an explicit home directory
    pub fn with_home(home_dir: impl Into<PathBuf>) -> Self {
        Self {
            home_dir: home_dir.into(),
        }
    }

    /// Get the home directory path
    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    /// Root of all persisted build-info records
    #[must_use]
    pub fn builds_dir(&self) -> PathBuf {
        self.home_dir.join(BUILDS_SUBDIR)
    }

    /// Fallback location for `<tool>.yaml` project configurations
    #[must_use]
    pub fn projects_dir(&self) -> PathBuf {
        self.home_dir.join(PROJECTS_SUBDIR)
    }

    /// Path of the configured servers file
    #[must_use]
    pub fn servers_path(&self) -> PathBuf {
        self.home_dir.join(SERVERS_FILE)
    }

    fn resolve_home_dir() -> PathBuf {
        if let Ok(path) = env::var(ENV_HOME_DIR) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }

        dirs::home_dir()
            .map(|h| h.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR_NAME))
    }
}

impl Default for BridgeDirs {
    fn default() -> Self {
        Self::new()
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_home_layout() {
        let dirs = BridgeDirs::with_home("/tmp/rt-home");
        assert_eq!(dirs.home_dir(), Path::new("/tmp/rt-home"));
        assert!(dirs.builds_dir().starts_with(dirs.home_dir()));
        assert!(dirs.projects_dir().ends_with("projects"));
        assert!(dirs.servers_path().ends_with("servers.toml"));
    }

    #[test]
    fn test_new_is_not_empty() {
        let dirs = BridgeDirs::new();
        assert!(!dirs.home_dir().as_os_str().is_empty());
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_tilde("rel/path"), PathBuf::from("rel/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/pkg"), home.join("pkg"));
            assert_eq!(expand_tilde("~"), home);
        }
    }
}
