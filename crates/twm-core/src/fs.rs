use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Resolve `path` to an absolute, symlink-free path.
///
/// Uses `dunce` so Windows paths do not carry the `\\?\` verbatim prefix, which would make
/// otherwise identical roots compare unequal across tools.
pub fn realpath(path: &Path) -> io::Result<PathBuf> {
    dunce::canonicalize(path)
}

/// Like [`realpath`], but falls back to an absolute (non-canonical) path when `path` does not
/// exist or cannot be resolved.
pub fn realpath_or_absolute(path: &Path) -> PathBuf {
    match realpath(path) {
        Ok(resolved) => resolved,
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::debug!(
                    target: "twm.core",
                    path = %path.display(),
                    error = %err,
                    "failed to canonicalize path; using absolute path"
                );
            }
            std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
        }
    }
}

/// Render a path as a string with `/` separators.
pub fn path_to_slash_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Modification time of `path` in whole milliseconds since the Unix epoch.
///
/// Missing files yield `Ok(None)`; mtimes before the epoch are clamped to `0`.
pub fn modified_millis(path: &Path) -> io::Result<Option<u64>> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let modified = metadata.modified()?;
    let millis = modified
        .duration_since(UNIX_EPOCH)
        .map(|dur| dur.as_millis() as u64)
        .unwrap_or(0);
    Ok(Some(millis))
}
