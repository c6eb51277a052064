//! Fingerprinted persistence for discovered class tokens.
//!
//! A [`CacheStore`] holds one token set per [`CacheContext`] fingerprint. The context captures
//! everything that could change what a re-scan produces (project paths, upstream config file
//! and package, tool version, effective options); a read is a hit only when the stored
//! fingerprint equals the live one.
//!
//! ## On-disk layout (file driver)
//!
//! A single JSON document at the configured path, shared by every project that points at it:
//!
//! ```text
//! {
//!   "schemaVersion": 2,
//!   "contexts": {
//!     "<sha256 fingerprint>": { "context": { .. }, "values": [..], "updatedAtMillis": .. }
//!   },
//!   "unscoped": { "values": [..], "updatedAtMillis": .. }
//! }
//! ```
//!
//! - `<path>.lock` is the sidecar lock file held during read-merge-write cycles.
//! - `<path>.tmp.<pid>.<n>` files are transient; writes publish through an atomic rename.
//! - A bare JSON array (schema 1) is recognised as legacy and replaced on the next write.

mod context;
mod driver;
mod error;
mod fingerprint;
mod index;
mod lock;
mod store;
mod util;

pub use context::{CacheContext, ContextInputs, CACHE_FINGERPRINT_VERSION};
pub use driver::CacheDriverKind;
pub use error::{CacheError, Result};
pub use fingerprint::Fingerprint;
pub use index::{CacheEntry, CacheIndex, UnscopedEntry, CACHE_SCHEMA_VERSION};
pub use lock::IndexLock;
pub use store::{
    CacheRead, CacheStore, CacheStoreOptions, ClearReport, ClearScope, ReadMeta, ReadReason,
    WriteStrategy,
};
pub use util::{atomic_write, atomic_write_async, now_millis, MAX_RENAME_ATTEMPTS};
