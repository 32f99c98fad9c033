//! Recursive glob over a working tree on the host filesystem.

use crate::errors::{SpoolError, SpoolResult};
use globset::Glob;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Walk `root` and return every path (relative to `root`) matching `pattern`.
///
/// Results are ordered by a depth-first walk with entries sorted by file
/// name. `root` itself is never included, and symlinks are not followed.
/// `**/*` therefore lists every file and directory below `root`.
pub fn glob(root: &Path, pattern: &str) -> SpoolResult<Vec<PathBuf>> {
    let matcher = Glob::new(pattern)
        .map_err(|err| SpoolError::client_invalid_path(pattern, &err.to_string()))?
        .compile_matcher();

    let mut matches = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry
            .map_err(|err| SpoolError::client_io(&root.display().to_string(), &err.to_string()))?;
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if matcher.is_match(relative) {
            matches.push(relative.to_path_buf());
        }
    }

    log::debug!(
        "glob {pattern} under {} matched {} paths",
        root.display(),
        matches.len()
    );
    Ok(matches)
}

/// Newline-joined listing of `glob(root, pattern)`
pub fn listing(root: &Path, pattern: &str) -> SpoolResult<String> {
    Ok(glob(root, pattern)?
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n"))
}
