use crate::context::CacheContext;
use crate::driver::{CacheDriverKind, Driver, IndexChange, Loaded};
use crate::error::CacheError;
use crate::fingerprint::Fingerprint;
use crate::index::{CacheEntry, CacheIndex, DecodedIndex, UnscopedEntry, CACHE_SCHEMA_VERSION};
use crate::util::now_millis;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// How a write combines with what is already persisted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteStrategy {
    /// Re-read the index and replace only this store's slot.
    #[default]
    Merge,
    /// Replace the whole index with a document holding only this store's slot.
    Overwrite,
}

#[derive(Clone, Debug)]
pub struct CacheStoreOptions {
    pub driver: CacheDriverKind,
    /// Index location for the file driver; ignored by the memory driver.
    pub path: PathBuf,
    pub strategy: WriteStrategy,
}

impl CacheStoreOptions {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            driver: CacheDriverKind::File,
            path: path.into(),
            strategy: WriteStrategy::default(),
        }
    }

    pub fn memory() -> Self {
        Self {
            driver: CacheDriverKind::Memory,
            path: PathBuf::new(),
            strategy: WriteStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: WriteStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Why a read produced (or did not produce) data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadReason {
    Hit,
    Miss,
    ContextMismatch,
    LegacySchema,
    NotFound,
    ReadError,
}

impl ReadReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadReason::Hit => "hit",
            ReadReason::Miss => "miss",
            ReadReason::ContextMismatch => "context-mismatch",
            ReadReason::LegacySchema => "legacy-schema",
            ReadReason::NotFound => "not-found",
            ReadReason::ReadError => "read-error",
        }
    }
}

impl fmt::Display for ReadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadMeta {
    pub hit: bool,
    pub reason: ReadReason,
    /// Human-readable diagnostics, e.g. the fields that changed on a context mismatch.
    pub details: Vec<String>,
    /// Fingerprint of the active context; `None` for unscoped stores.
    pub fingerprint: Option<Fingerprint>,
    /// Schema version found on disk, when one could be determined.
    pub schema_version: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheRead {
    pub data: IndexSet<String>,
    pub meta: ReadMeta,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearScope {
    /// Only the active fingerprint's entry (or the unscoped slot).
    #[default]
    Current,
    /// The whole index.
    All,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearReport {
    pub scope: ClearScope,
    /// Slots removed, counting the unscoped slot as one.
    pub contexts_removed: usize,
    /// Tokens held by the removed slots.
    pub entries_removed: usize,
    pub files_removed: usize,
}

impl ClearReport {
    fn nothing(scope: ClearScope) -> Self {
        Self {
            scope,
            contexts_removed: 0,
            entries_removed: 0,
            files_removed: 0,
        }
    }
}

#[derive(Clone, Debug)]
struct Scope {
    context: CacheContext,
    fingerprint: Fingerprint,
}

/// Persisted set of discovered class tokens, keyed by a [`CacheContext`] fingerprint.
///
/// Cloning (or [`scoped`](Self::scoped)) shares the underlying driver, so clones of a
/// memory-backed store observe each other's writes.
#[derive(Clone, Debug)]
pub struct CacheStore {
    driver: Driver,
    scope: Option<Scope>,
    strategy: WriteStrategy,
}

/// A read decision plus whether the stored payload should be discarded.
struct Resolution {
    read: CacheRead,
    discard_corrupt: bool,
}

impl CacheStore {
    /// Open an unscoped store (single slot, no context identity).
    pub fn new(options: CacheStoreOptions) -> Self {
        Self {
            driver: Driver::new(options.driver, options.path),
            scope: None,
            strategy: options.strategy,
        }
    }

    pub fn with_context(options: CacheStoreOptions, context: CacheContext) -> Self {
        Self::new(options).scoped(context)
    }

    /// A store sharing this store's driver but scoped to `context`.
    pub fn scoped(&self, context: CacheContext) -> Self {
        let fingerprint = context.fingerprint();
        Self {
            driver: self.driver.clone(),
            scope: Some(Scope {
                context,
                fingerprint,
            }),
            strategy: self.strategy,
        }
    }

    /// A store sharing this store's driver that uses the unscoped slot.
    pub fn unscoped(&self) -> Self {
        Self {
            driver: self.driver.clone(),
            scope: None,
            strategy: self.strategy,
        }
    }

    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.scope.as_ref().map(|scope| &scope.fingerprint)
    }

    pub fn context(&self) -> Option<&CacheContext> {
        self.scope.as_ref().map(|scope| &scope.context)
    }

    /// Index file path; `None` for the memory driver.
    pub fn path(&self) -> Option<&Path> {
        self.driver.path()
    }

    pub fn driver_kind(&self) -> CacheDriverKind {
        self.driver.kind()
    }

    pub fn strategy(&self) -> WriteStrategy {
        self.strategy
    }

    pub fn read(&self) -> IndexSet<String> {
        self.read_with_meta().data
    }

    /// Read this store's slot, classifying the outcome.
    ///
    /// Never fails: I/O problems and unusable payloads are reported as misses. A payload that
    /// cannot be decoded is removed so the next write starts clean.
    pub fn read_with_meta(&self) -> CacheRead {
        let resolution = self.resolve(self.driver.load());
        if resolution.discard_corrupt {
            self.log_discard(self.driver.discard_corrupt());
        }
        resolution.read
    }

    pub async fn read_async(&self) -> IndexSet<String> {
        self.read_with_meta_async().await.data
    }

    pub async fn read_with_meta_async(&self) -> CacheRead {
        let resolution = self.resolve(self.driver.load_async().await);
        if resolution.discard_corrupt {
            let driver = self.driver.clone();
            let outcome = tokio::task::spawn_blocking(move || driver.discard_corrupt())
                .await
                .map_err(CacheError::from)
                .and_then(|result| result);
            self.log_discard(outcome);
        }
        resolution.read
    }

    /// Persist `values` (deduplicated, first occurrence wins) into this store's slot.
    pub fn write<I, S>(&self, values: I) -> Result<(), CacheError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.write_values(dedup(values))
    }

    pub async fn write_async<I, S>(&self, values: I) -> Result<(), CacheError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = dedup(values);
        self.run_blocking(move |store| store.write_values(values))
            .await
    }

    pub fn clear(&self, scope: ClearScope) -> Result<ClearReport, CacheError> {
        let report = match scope {
            ClearScope::All => self.clear_all()?,
            ClearScope::Current => self.clear_current()?,
        };
        tracing::debug!(
            target: "twm.cache",
            scope = ?report.scope,
            contexts_removed = report.contexts_removed,
            entries_removed = report.entries_removed,
            files_removed = report.files_removed,
            "cleared cache"
        );
        Ok(report)
    }

    pub async fn clear_async(&self, scope: ClearScope) -> Result<ClearReport, CacheError> {
        self.run_blocking(move |store| store.clear(scope)).await
    }

    /// An independent copy of the whole persisted index.
    ///
    /// `None` when nothing is stored or the stored document is not the current schema.
    pub fn read_index_snapshot(&self) -> Option<CacheIndex> {
        snapshot_of(self.driver.load())
    }

    pub async fn read_index_snapshot_async(&self) -> Option<CacheIndex> {
        snapshot_of(self.driver.load_async().await)
    }

    fn resolve(&self, loaded: Loaded) -> Resolution {
        let fingerprint = self.fingerprint().cloned();
        let mut discard_corrupt = false;

        let (data, reason, details, schema_version) = match loaded {
            Loaded::NotFound => (IndexSet::new(), ReadReason::NotFound, Vec::new(), None),
            Loaded::Failed(err) => (
                IndexSet::new(),
                ReadReason::ReadError,
                vec![err.to_string()],
                None,
            ),
            Loaded::Decoded(DecodedIndex::Corrupt { message }) => {
                discard_corrupt = true;
                (
                    IndexSet::new(),
                    ReadReason::ReadError,
                    vec![format!("corrupt cache index discarded: {message}")],
                    None,
                )
            }
            Loaded::Decoded(DecodedIndex::Legacy { schema_version }) => {
                let detail = match schema_version {
                    Some(version) => format!(
                        "schema version {version} predates {CACHE_SCHEMA_VERSION}"
                    ),
                    None => "unversioned legacy token list".to_string(),
                };
                (
                    IndexSet::new(),
                    ReadReason::LegacySchema,
                    vec![detail],
                    schema_version,
                )
            }
            Loaded::Decoded(DecodedIndex::Unsupported { schema_version }) => (
                IndexSet::new(),
                ReadReason::Miss,
                vec![format!(
                    "schema version {schema_version} is newer than supported {CACHE_SCHEMA_VERSION}"
                )],
                Some(schema_version),
            ),
            Loaded::Decoded(DecodedIndex::Current(index)) => {
                let (data, reason, details) = self.lookup(index);
                (data, reason, details, Some(CACHE_SCHEMA_VERSION))
            }
        };

        tracing::debug!(
            target: "twm.cache",
            reason = reason.as_str(),
            fingerprint = fingerprint.as_ref().map(Fingerprint::short),
            tokens = data.len(),
            "cache read"
        );

        Resolution {
            read: CacheRead {
                data,
                meta: ReadMeta {
                    hit: reason == ReadReason::Hit,
                    reason,
                    details,
                    fingerprint,
                    schema_version,
                },
            },
            discard_corrupt,
        }
    }

    fn lookup(&self, mut index: CacheIndex) -> (IndexSet<String>, ReadReason, Vec<String>) {
        let Some(scope) = &self.scope else {
            return match index.unscoped {
                Some(slot) => (slot.values.into_iter().collect(), ReadReason::Hit, Vec::new()),
                None => (IndexSet::new(), ReadReason::Miss, Vec::new()),
            };
        };

        if let Some(entry) = index.contexts.remove(scope.fingerprint.as_str()) {
            return (
                entry.values.into_iter().collect(),
                ReadReason::Hit,
                Vec::new(),
            );
        }

        // Same project, different identity: report what changed against the freshest entry.
        let previous = index
            .contexts
            .values()
            .filter(|entry| {
                entry.context.project_root_realpath == scope.context.project_root_realpath
            })
            .max_by_key(|entry| entry.updated_at_millis);
        match previous {
            Some(entry) => {
                let mut details = scope.context.explain_mismatch(&entry.context);
                if details.is_empty() {
                    details.push("stored fingerprint differs".to_string());
                }
                (IndexSet::new(), ReadReason::ContextMismatch, details)
            }
            None => (IndexSet::new(), ReadReason::Miss, Vec::new()),
        }
    }

    fn write_values(&self, values: Vec<String>) -> Result<(), CacheError> {
        let updated_at_millis = now_millis();
        let count = values.len();
        self.driver.update(|existing| {
            let mut index = match self.strategy {
                WriteStrategy::Merge => existing.index.unwrap_or_default(),
                WriteStrategy::Overwrite => CacheIndex::new(),
            };
            match &self.scope {
                Some(scope) => {
                    index.contexts.insert(
                        scope.fingerprint.to_string(),
                        CacheEntry {
                            context: scope.context.clone(),
                            values,
                            updated_at_millis,
                        },
                    );
                }
                None => {
                    index.unscoped = Some(UnscopedEntry {
                        values,
                        updated_at_millis,
                    });
                }
            }
            (IndexChange::Replace(index), ())
        })?;

        tracing::debug!(
            target: "twm.cache",
            fingerprint = self.fingerprint().map(Fingerprint::short),
            strategy = ?self.strategy,
            tokens = count,
            "cache written"
        );
        Ok(())
    }

    fn clear_all(&self) -> Result<ClearReport, CacheError> {
        let files = self.file_count();
        self.driver.update(|existing| {
            if !existing.present {
                return (IndexChange::Keep, ClearReport::nothing(ClearScope::All));
            }
            let (contexts_removed, entries_removed) = existing
                .index
                .as_ref()
                .map_or((0, 0), |index| (index.slot_count(), index.value_count()));
            (
                IndexChange::Remove,
                ClearReport {
                    scope: ClearScope::All,
                    contexts_removed,
                    entries_removed,
                    files_removed: files,
                },
            )
        })
    }

    fn clear_current(&self) -> Result<ClearReport, CacheError> {
        let files = self.file_count();
        self.driver.update(|existing| {
            let nothing = ClearReport::nothing(ClearScope::Current);
            let Some(mut index) = existing.index else {
                return (IndexChange::Keep, nothing);
            };

            let removed = match &self.scope {
                Some(scope) => index
                    .contexts
                    .remove(scope.fingerprint.as_str())
                    .map(|entry| entry.values.len()),
                None => index.unscoped.take().map(|slot| slot.values.len()),
            };
            let Some(entries_removed) = removed else {
                return (IndexChange::Keep, nothing);
            };

            let mut report = ClearReport {
                scope: ClearScope::Current,
                contexts_removed: 1,
                entries_removed,
                files_removed: 0,
            };
            if index.is_empty() {
                report.files_removed = files;
                (IndexChange::Remove, report)
            } else {
                (IndexChange::Replace(index), report)
            }
        })
    }

    fn file_count(&self) -> usize {
        usize::from(self.driver.kind() == CacheDriverKind::File)
    }

    /// Run a sync operation from async code. File-driver work takes a blocking lock, so it goes
    /// to the blocking pool; the memory driver runs inline.
    async fn run_blocking<R, F>(&self, op: F) -> Result<R, CacheError>
    where
        R: Send + 'static,
        F: FnOnce(CacheStore) -> Result<R, CacheError> + Send + 'static,
    {
        let store = self.clone();
        match self.driver.kind() {
            CacheDriverKind::Memory => op(store),
            CacheDriverKind::File => tokio::task::spawn_blocking(move || op(store)).await?,
        }
    }

    fn log_discard(&self, outcome: Result<bool, CacheError>) {
        match outcome {
            Ok(true) => tracing::warn!(
                target: "twm.cache",
                path = ?self.driver.path(),
                "removed corrupt cache index"
            ),
            Ok(false) => {}
            Err(err) => tracing::warn!(
                target: "twm.cache",
                path = ?self.driver.path(),
                error = %err,
                "failed to remove corrupt cache index"
            ),
        }
    }
}

fn dedup<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values
        .into_iter()
        .map(Into::into)
        .collect::<IndexSet<String>>()
        .into_iter()
        .collect()
}

fn snapshot_of(loaded: Loaded) -> Option<CacheIndex> {
    match loaded {
        Loaded::Decoded(DecodedIndex::Current(index)) => Some(index),
        _ => None,
    }
}
