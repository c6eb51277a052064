use crate::error::CacheError;
use std::fs;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Upper bound on `remove + rename` retries when publishing a file whose destination keeps
/// reappearing under concurrent writers.
pub const MAX_RENAME_ATTEMPTS: usize = 64;

pub fn now_millis() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as u64,
        Err(err) => {
            static REPORTED: OnceLock<()> = OnceLock::new();
            if REPORTED.set(()).is_ok() {
                tracing::debug!(
                    target: "twm.cache",
                    error = %err,
                    "system time is before unix epoch; using 0 for now_millis"
                );
            }
            0
        }
    }
}

pub(crate) fn remove_file_best_effort(path: &Path, reason: &'static str) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(err) if err.kind() == io::ErrorKind::NotFound => true,
        Err(err) => {
            tracing::debug!(
                target: "twm.cache",
                path = %path.display(),
                reason,
                error = %err,
                "failed to remove cache file"
            );
            false
        }
    }
}

pub(crate) async fn remove_file_best_effort_async(path: &Path, reason: &'static str) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(err) if err.kind() == io::ErrorKind::NotFound => true,
        Err(err) => {
            tracing::debug!(
                target: "twm.cache",
                path = %path.display(),
                reason,
                error = %err,
                "failed to remove cache file"
            );
            false
        }
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `bytes` to `path` so readers observe either the previous file or the complete new
/// one, never a partial write.
///
/// The payload goes to a unique temporary file in the destination directory, is synced, and is
/// then renamed over `path`.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    atomic_write_with(path, |file| {
        file.write_all(bytes)?;
        Ok(())
    })
}

pub(crate) fn atomic_write_with(
    path: &Path,
    write: impl FnOnce(&mut fs::File) -> Result<(), CacheError>,
) -> Result<(), CacheError> {
    let parent = parent_dir(path)?;
    fs::create_dir_all(&parent)?;

    let (tmp_path, mut file) = open_unique_tmp_file(path, &parent)?;
    let write_result = (|| -> Result<(), CacheError> {
        write(&mut file)?;
        file.sync_all()?;
        Ok(())
    })();
    drop(file);
    if let Err(err) = write_result {
        remove_file_best_effort(&tmp_path, "atomic_write.write_failed");
        return Err(err);
    }

    match rename_with_retry(&tmp_path, path) {
        Ok(()) => {
            sync_dir_best_effort(&parent, "atomic_write.sync_parent_dir");
            Ok(())
        }
        Err(err) => {
            remove_file_best_effort(&tmp_path, "atomic_write.rename_failed");
            Err(err)
        }
    }
}

/// Async counterpart of [`atomic_write`]; suspends only on filesystem I/O.
pub async fn atomic_write_async(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    use tokio::io::AsyncWriteExt as _;

    let parent = parent_dir(path)?;
    tokio::fs::create_dir_all(&parent).await?;

    let (tmp_path, mut file) = open_unique_tmp_file_async(path, &parent).await?;
    let write_result = async {
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok::<(), io::Error>(())
    }
    .await;
    drop(file);
    if let Err(err) = write_result {
        remove_file_best_effort_async(&tmp_path, "atomic_write_async.write_failed").await;
        return Err(err.into());
    }

    let mut attempts = 0usize;
    loop {
        match tokio::fs::rename(&tmp_path, path).await {
            Ok(()) => {
                sync_dir_best_effort(&parent, "atomic_write_async.sync_parent_dir");
                return Ok(());
            }
            Err(err) if destination_blocks_rename(&err, path) => {
                attempts += 1;
                let removed = match tokio::fs::remove_file(path).await {
                    Ok(()) => Ok(()),
                    Err(remove_err) if remove_err.kind() == io::ErrorKind::NotFound => Ok(()),
                    Err(remove_err) => Err(remove_err),
                };
                if let Err(remove_err) = removed {
                    remove_file_best_effort_async(&tmp_path, "atomic_write_async.remove_failed")
                        .await;
                    return Err(remove_err.into());
                }
                if attempts >= MAX_RENAME_ATTEMPTS {
                    remove_file_best_effort_async(&tmp_path, "atomic_write_async.rename_failed")
                        .await;
                    return Err(CacheError::RenameRetriesExhausted {
                        path: path.to_path_buf(),
                        attempts,
                        source: err,
                    });
                }
            }
            Err(err) => {
                remove_file_best_effort_async(&tmp_path, "atomic_write_async.rename_failed").await;
                return Err(err.into());
            }
        }
    }
}

/// Rename `tmp_path` over `path`.
///
/// Where rename refuses to replace an existing destination (Windows, some network
/// filesystems) the destination is removed and the rename retried; concurrent writers can
/// recreate it in between, so this is bounded by [`MAX_RENAME_ATTEMPTS`].
fn rename_with_retry(tmp_path: &Path, path: &Path) -> Result<(), CacheError> {
    let mut attempts = 0usize;
    loop {
        match fs::rename(tmp_path, path) {
            Ok(()) => return Ok(()),
            Err(err) if destination_blocks_rename(&err, path) => {
                attempts += 1;
                match fs::remove_file(path) {
                    Ok(()) => {}
                    Err(remove_err) if remove_err.kind() == io::ErrorKind::NotFound => {}
                    Err(remove_err) => return Err(remove_err.into()),
                }
                if attempts >= MAX_RENAME_ATTEMPTS {
                    return Err(CacheError::RenameRetriesExhausted {
                        path: path.to_path_buf(),
                        attempts,
                        source: err,
                    });
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn destination_blocks_rename(err: &io::Error, path: &Path) -> bool {
    err.kind() == io::ErrorKind::AlreadyExists || (cfg!(windows) && path.exists())
}

fn parent_dir(path: &Path) -> Result<PathBuf, CacheError> {
    let Some(parent) = path.parent() else {
        return Err(CacheError::MissingParentDir {
            path: path.to_path_buf(),
        });
    };
    Ok(if parent.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        parent.to_path_buf()
    })
}

fn tmp_path_for(dest: &Path, parent: &Path) -> io::Result<PathBuf> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| io::Error::other("destination path has no file name"))?;
    let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(format!(".tmp.{}.{counter}", std::process::id()));
    Ok(parent.join(tmp_name))
}

fn open_unique_tmp_file(dest: &Path, parent: &Path) -> io::Result<(PathBuf, fs::File)> {
    loop {
        let tmp_path = tmp_path_for(dest, parent)?;
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => return Ok((tmp_path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
}

async fn open_unique_tmp_file_async(
    dest: &Path,
    parent: &Path,
) -> io::Result<(PathBuf, tokio::fs::File)> {
    loop {
        let tmp_path = tmp_path_for(dest, parent)?;
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .await
        {
            Ok(file) => return Ok((tmp_path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
}

fn sync_dir_best_effort(dir: &Path, reason: &'static str) {
    #[cfg(unix)]
    {
        static SYNC_DIR_ERROR_LOGGED: OnceLock<()> = OnceLock::new();
        match fs::File::open(dir).and_then(|dir| dir.sync_all()) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                if SYNC_DIR_ERROR_LOGGED.set(()).is_ok() {
                    tracing::debug!(
                        target: "twm.cache",
                        dir = %dir.display(),
                        reason,
                        error = %err,
                        "failed to sync directory (best effort)"
                    );
                }
            }
        }
    }

    #[cfg(not(unix))]
    let _ = (dir, reason);
}
