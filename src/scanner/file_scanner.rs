//! Input discovery: expand paths, globs and directories into source files

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', ']'])
}

/// Expand a list of path/glob/directory arguments into source files
///
/// Directories are walked recursively, globs are expanded against the
/// filesystem and plain files are taken as-is. Patterns that match nothing are
/// not an error here; the caller decides what an empty result means.
///
/// # Returns
/// Deduplicated absolute paths in lexicographic order
pub fn resolve_inputs<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<PathBuf>> {
    let mut files = BTreeSet::new();

    for pattern in patterns {
        let pattern = pattern.as_ref();
        if is_glob(pattern) {
            let matches = glob::glob(pattern)
                .with_context(|| format!("Invalid glob pattern: {pattern}"))?;
            for entry in matches {
                match entry {
                    Ok(path) if path.is_file() => {
                        files.insert(absolute(&path)?);
                    }
                    Ok(path) if path.is_dir() => collect_dir(&path, &mut files)?,
                    Ok(_) => {}
                    Err(e) => warn!("Skipping unreadable glob match: {e}"),
                }
            }
            continue;
        }

        let path = Path::new(pattern);
        if path.is_dir() {
            collect_dir(path, &mut files)?;
        } else if path.is_file() {
            files.insert(absolute(path)?);
        } else {
            debug!("No file or directory at {pattern}");
        }
    }

    Ok(files.into_iter().collect())
}

fn collect_dir(dir: &Path, files: &mut BTreeSet<PathBuf>) -> Result<()> {
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {e}", dir.display());
                continue;
            }
        };
        if entry.file_type().is_file() {
            files.insert(absolute(entry.path())?);
        }
    }
    Ok(())
}

/// Absolute form with `.` and `..` folded away, without following symlinks
///
/// Symlinks stay as given so sibling PDFs land next to the path the user
/// named, not next to the link target.
fn absolute(path: &Path) -> Result<PathBuf> {
    let abs = std::path::absolute(path).with_context(|| format!("Cannot resolve {}", path.display()))?;
    let mut normalized = PathBuf::new();
    for component in abs.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}
