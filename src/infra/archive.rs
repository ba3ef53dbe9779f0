//! Archive helpers
//!
//! Reads single entries out of gzip-compressed tarballs and writes zip
//! archives of a directory tree.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::ArchiveError;

/// Read the first entry whose path equals `entry_path` from a `.tgz`
///
/// Returns `Ok(None)` when the archive ends without a match.
pub fn read_tgz_entry(archive_path: &Path, entry_path: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
    let read_err = |e: std::io::Error| ArchiveError::Read {
        path: archive_path.to_path_buf(),
        error: e.to_string(),
    };

    let file = File::open(archive_path).map_err(read_err)?;
    let mut archive = Archive::new(GzDecoder::new(file));

    for entry in archive.entries().map_err(read_err)? {
        let mut entry = entry.map_err(read_err)?;
        let path = entry.path().map_err(read_err)?;
        if path.to_string_lossy() == entry_path {
            let mut content = Vec::new();
            entry.read_to_end(&mut content).map_err(read_err)?;
            return Ok(Some(content));
        }
    }
    Ok(None)
}

/// Compiled exclusion patterns
///
/// Patterns are matched against both the path relative to the archive root
/// and the file name, so `*.git` excludes a `.git` directory at any depth.
#[derive(Debug, Default)]
pub struct Exclusions {
    patterns: Vec<glob::Pattern>,
}

impl Exclusions {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ArchiveError> {
        let patterns = patterns
            .iter()
            .map(AsRef::as_ref)
            .filter(|p| !p.is_empty())
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| ArchiveError::Pattern {
                    pattern: p.to_string(),
                    error: e.to_string(),
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_excluded(&self, relative: &Path) -> bool {
        let rel = relative.to_string_lossy().replace('\\', "/");
        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.patterns
            .iter()
            .any(|p| p.matches(&rel) || p.matches(&name))
    }
}

/// Zip `source_dir` into `dest`, skipping excluded files and directories
///
/// Entry names are relative to `source_dir` and use `/` separators.
/// Returns the number of files written.
pub fn zip_directory(source_dir: &Path, dest: &Path, exclusions: &Exclusions) -> Result<usize, ArchiveError> {
    let write_err = |e: &dyn std::fmt::Display| ArchiveError::Write {
        path: dest.to_path_buf(),
        error: e.to_string(),
    };

    let file = File::create(dest).map_err(|e| write_err(&e))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut count = 0;
    let walker = WalkDir::new(source_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.path()
                .strip_prefix(source_dir)
                .map(|rel| rel.as_os_str().is_empty() || !exclusions.is_excluded(rel))
                .unwrap_or(false)
        });

    for entry in walker {
        let entry = entry.map_err(|e| write_err(&e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|e| write_err(&e))?;
        let name = rel.to_string_lossy().replace('\\', "/");

        zip.start_file(name, options).map_err(|e| write_err(&e))?;
        let mut content = Vec::new();
        File::open(entry.path())
            .and_then(|mut f| f.read_to_end(&mut content))
            .map_err(|e| ArchiveError::Read {
                path: entry.path().to_path_buf(),
                error: e.to_string(),
            })?;
        zip.write_all(&content).map_err(|e| write_err(&e))?;
        count += 1;
    }

    zip.finish().map_err(|e| write_err(&e))?;
    Ok(count)
}
