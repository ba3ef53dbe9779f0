//! Filesystem operations
//!
//! Thin wrappers that attach the offending path to every error, plus the
//! backup/restore pair used around temporary rc files.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::FilesystemError;

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    std::fs::create_dir_all(path).map_err(|e| FilesystemError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Write content to a file, creating parent directories
pub fn write_file(path: &Path, content: impl AsRef<[u8]>) -> Result<(), FilesystemError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content).map_err(|e| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Read content from a file
pub fn read_file(path: &Path) -> Result<String, FilesystemError> {
    std::fs::read_to_string(path).map_err(|e| FilesystemError::ReadFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Remove a file if it exists
pub fn remove_file_if_exists(path: &Path) -> Result<(), FilesystemError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FilesystemError::RemoveFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        }),
    }
}

/// Rename a file, replacing the destination
pub fn rename(from: &Path, to: &Path) -> Result<(), FilesystemError> {
    std::fs::rename(from, to).map_err(|e| FilesystemError::Rename {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        error: e.to_string(),
    })
}

/// A file moved aside so it can be put back later
///
/// Dropping the guard without [`FileBackup::restore`] puts the file back on
/// a best-effort basis.
#[derive(Debug)]
pub struct FileBackup {
    original: PathBuf,
    backup: PathBuf,
    existed: bool,
    restored: bool,
}

impl FileBackup {
    /// Move `original` to `backup` if it exists
    ///
    /// A stale backup left by an interrupted run is restored first so the
    /// user's file is never lost.
    pub fn create(original: &Path, backup: &Path) -> Result<Self, FilesystemError> {
        if backup.exists() && !original.exists() {
            rename(backup, original)?;
        }
        let existed = original.exists();
        if existed {
            rename(original, backup)?;
        }
        Ok(Self {
            original: original.to_path_buf(),
            backup: backup.to_path_buf(),
            existed,
            restored: false,
        })
    }

    /// Whether the original file existed when the backup was taken
    pub fn existed(&self) -> bool {
        self.existed
    }

    /// Put the original back, or remove whatever now sits in its place
    pub fn restore(mut self) -> Result<(), FilesystemError> {
        self.restored = true;
        self.put_back()
    }

    fn put_back(&self) -> Result<(), FilesystemError> {
        if self.existed {
            rename(&self.backup, &self.original)
        } else {
            remove_file_if_exists(&self.original)
        }
    }
}

impl Drop for FileBackup {
    fn drop(&mut self) {
        if !self.restored {
            if let Err(e) = self.put_back() {
                warn!("Failed to restore {}: {e}", self.original.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/dir/file.txt");
        write_file(&path, "hello").unwrap();
        assert_eq!(read_file(&path).unwrap(), "hello");
    }

    #[test]
    fn test_remove_missing_file_is_ok() {
        let temp = TempDir::new().unwrap();
        assert!(remove_file_if_exists(&temp.path().join("absent")).is_ok());
    }

    #[test]
    fn test_backup_restore_existing() {
        let temp = TempDir::new().unwrap();
        let original = temp.path().join(".npmrc");
        let backup = temp.path().join("jfrog.npmrc.backup");
        std::fs::write(&original, "email=a@b\n; comment\n").unwrap();

        let guard = FileBackup::create(&original, &backup).unwrap();
        assert!(guard.existed());
        assert!(!original.exists());
        std::fs::write(&original, "registry = http://temp").unwrap();

        guard.restore().unwrap();
        assert_eq!(std::fs::read(&original).unwrap(), b"email=a@b\n; comment\n");
        assert!(!backup.exists());
    }

    #[test]
    fn test_backup_restore_absent() {
        let temp = TempDir::new().unwrap();
        let original = temp.path().join(".npmrc");
        let backup = temp.path().join("jfrog.npmrc.backup");

        let guard = FileBackup::create(&original, &backup).unwrap();
        assert!(!guard.existed());
        std::fs::write(&original, "registry = http://temp").unwrap();

        guard.restore().unwrap();
        assert!(!original.exists());
    }

    #[test]
    fn test_dropped_backup_puts_original_back() {
        let temp = TempDir::new().unwrap();
        let original = temp.path().join(".yarnrc.yml");
        let backup = temp.path().join("jfrog.yarnrc.backup");
        std::fs::write(&original, "npmScopes: {}\n").unwrap();

        {
            let _guard = FileBackup::create(&original, &backup).unwrap();
            assert!(!original.exists());
            // early return before restore
        }
        assert_eq!(std::fs::read_to_string(&original).unwrap(), "npmScopes: {}\n");
        assert!(!backup.exists());
    }

    #[test]
    fn test_restored_backup_is_not_restored_again() {
        let temp = TempDir::new().unwrap();
        let original = temp.path().join(".npmrc");
        let backup = temp.path().join("jfrog.npmrc.backup");

        let guard = FileBackup::create(&original, &backup).unwrap();
        guard.restore().unwrap();
        std::fs::write(&original, "written after restore").unwrap();
        assert_eq!(std::fs::read_to_string(&original).unwrap(), "written after restore");
    }

    #[test]
    fn test_stale_backup_is_recovered() {
        let temp = TempDir::new().unwrap();
        let original = temp.path().join(".npmrc");
        let backup = temp.path().join("jfrog.npmrc.backup");
        std::fs::write(&backup, "user=stale").unwrap();

        let guard = FileBackup::create(&original, &backup).unwrap();
        assert!(guard.existed());
        guard.restore().unwrap();
        assert_eq!(std::fs::read_to_string(&original).unwrap(), "user=stale");
    }
}
