use crate::error::CacheError;
use crate::index::{decode_index, CacheIndex, DecodedIndex};
use crate::lock::IndexLock;
use crate::util::atomic_write;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Persistence backend selected through configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheDriverKind {
    /// Index persisted as JSON at a configured path, shared across processes.
    #[default]
    File,
    /// Process-lifetime index; no disk I/O.
    Memory,
}

/// Outcome of fetching the raw index from a driver.
#[derive(Debug)]
pub(crate) enum Loaded {
    NotFound,
    Failed(io::Error),
    Decoded(DecodedIndex),
}

/// What a read-merge-write cycle sees before deciding on a change.
#[derive(Debug)]
pub(crate) struct Existing {
    /// The current-schema index, if one is stored.
    pub(crate) index: Option<CacheIndex>,
    /// Whether anything is stored at all (including legacy or unreadable payloads).
    pub(crate) present: bool,
    /// Whether the stored payload failed to decode.
    pub(crate) corrupt: bool,
}

#[derive(Debug)]
pub(crate) enum IndexChange {
    Keep,
    Replace(CacheIndex),
    Remove,
}

#[derive(Clone, Debug)]
pub(crate) enum Driver {
    File { path: PathBuf },
    Memory { slot: Arc<Mutex<Option<CacheIndex>>> },
}

impl Driver {
    pub(crate) fn new(kind: CacheDriverKind, path: PathBuf) -> Self {
        match kind {
            CacheDriverKind::File => Driver::File { path },
            CacheDriverKind::Memory => Driver::Memory {
                slot: Arc::new(Mutex::new(None)),
            },
        }
    }

    pub(crate) fn kind(&self) -> CacheDriverKind {
        match self {
            Driver::File { .. } => CacheDriverKind::File,
            Driver::Memory { .. } => CacheDriverKind::Memory,
        }
    }

    pub(crate) fn path(&self) -> Option<&Path> {
        match self {
            Driver::File { path } => Some(path),
            Driver::Memory { .. } => None,
        }
    }

    pub(crate) fn load(&self) -> Loaded {
        match self {
            Driver::File { path } => match std::fs::read(path) {
                Ok(bytes) => Loaded::Decoded(decode_index(&bytes)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Loaded::NotFound,
                Err(err) => Loaded::Failed(err),
            },
            Driver::Memory { slot } => load_memory(slot),
        }
    }

    pub(crate) async fn load_async(&self) -> Loaded {
        match self {
            Driver::File { path } => match tokio::fs::read(path).await {
                Ok(bytes) => Loaded::Decoded(decode_index(&bytes)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Loaded::NotFound,
                Err(err) => Loaded::Failed(err),
            },
            Driver::Memory { slot } => load_memory(slot),
        }
    }

    /// Remove a payload that failed to decode.
    ///
    /// The payload is re-checked under the index lock so a concurrent writer that just
    /// replaced it with a valid index is never clobbered.
    pub(crate) fn discard_corrupt(&self) -> Result<bool, CacheError> {
        self.update(|existing| {
            if existing.corrupt {
                (IndexChange::Remove, true)
            } else {
                (IndexChange::Keep, false)
            }
        })
    }

    /// Run one read-merge-write cycle.
    ///
    /// For the file driver the whole cycle holds the index lock and publishes through an
    /// atomic rename; the memory driver holds its mutex.
    pub(crate) fn update<R>(
        &self,
        decide: impl FnOnce(Existing) -> (IndexChange, R),
    ) -> Result<R, CacheError> {
        match self {
            Driver::File { path } => {
                let _lock = IndexLock::for_index(path)?;
                let existing = match self.load() {
                    Loaded::NotFound => Existing {
                        index: None,
                        present: false,
                        corrupt: false,
                    },
                    Loaded::Decoded(DecodedIndex::Current(index)) => Existing {
                        index: Some(index),
                        present: true,
                        corrupt: false,
                    },
                    Loaded::Decoded(decoded) => Existing {
                        index: None,
                        present: true,
                        corrupt: matches!(decoded, DecodedIndex::Corrupt { .. }),
                    },
                    Loaded::Failed(err) => return Err(err.into()),
                };

                let (change, out) = decide(existing);
                match change {
                    IndexChange::Keep => {}
                    IndexChange::Replace(index) => atomic_write(path, &index.encode()?)?,
                    IndexChange::Remove => match std::fs::remove_file(path) {
                        Ok(()) => {}
                        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                        Err(err) => return Err(err.into()),
                    },
                }
                Ok(out)
            }
            Driver::Memory { slot } => {
                let mut guard = lock_slot(slot);
                let existing = Existing {
                    index: guard.clone(),
                    present: guard.is_some(),
                    corrupt: false,
                };
                let (change, out) = decide(existing);
                match change {
                    IndexChange::Keep => {}
                    IndexChange::Replace(index) => *guard = Some(index),
                    IndexChange::Remove => *guard = None,
                }
                Ok(out)
            }
        }
    }
}

fn load_memory(slot: &Mutex<Option<CacheIndex>>) -> Loaded {
    match lock_slot(slot).as_ref() {
        Some(index) => Loaded::Decoded(DecodedIndex::Current(index.clone())),
        None => Loaded::NotFound,
    }
}

fn lock_slot(slot: &Mutex<Option<CacheIndex>>) -> MutexGuard<'_, Option<CacheIndex>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

