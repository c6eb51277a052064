use crate::error::CacheError;
use fs2::FileExt;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};

/// Exclusive advisory lock guarding read-merge-write cycles on a shared cache index.
///
/// Readers never take it: atomic renames already guarantee they see a complete file. Writers
/// hold it so two processes merging different fingerprints cannot drop each other's entries.
/// Released on drop.
#[derive(Debug)]
pub struct IndexLock {
    file: File,
    path: PathBuf,
    // `flock` locks belong to the open file description, not the process. Threads of this
    // process queue on the mutex first and never contend on the file lock itself.
    _guard: MutexGuard<'static, ()>,
}

impl IndexLock {
    /// Lock the sidecar `<index>.lock` file next to `index_path`, blocking until it is free.
    pub fn for_index(index_path: &Path) -> Result<Self, CacheError> {
        Self::lock_exclusive(&lock_path_for(index_path))
    }

    pub fn lock_exclusive(path: &Path) -> Result<Self, CacheError> {
        let guard = process_lock_for_path(path)
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        // Fully qualified: newer std `File` has inherent locking methods of its own.
        FileExt::lock_exclusive(&file)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            _guard: guard,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::debug!(
                target: "twm.cache",
                path = %self.path.display(),
                error = %err,
                "failed to release index lock"
            );
        }
    }
}

pub(crate) fn lock_path_for(index_path: &Path) -> PathBuf {
    let mut name = index_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| OsString::from("index"));
    name.push(".lock");
    index_path.with_file_name(name)
}

fn process_lock_for_path(path: &Path) -> &'static Mutex<()> {
    static PROCESS_LOCKS: OnceLock<Mutex<HashMap<PathBuf, &'static Mutex<()>>>> = OnceLock::new();
    let locks = PROCESS_LOCKS.get_or_init(|| Mutex::new(HashMap::new()));

    let mut map = locks
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(existing) = map.get(path) {
        return existing;
    }

    let mutex: &'static Mutex<()> = Box::leak(Box::new(Mutex::new(())));
    map.insert(path.to_path_buf(), mutex);
    mutex
}
