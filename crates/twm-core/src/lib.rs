//! Core shared items for tw-mangle.
//!
//! This crate is intentionally small: the tool version and a few filesystem helpers that
//! every other crate needs when it builds cache identities.

pub mod fs;

/// Version of the mangling tool.
///
/// Cache fingerprints embed this value so upgrading the tool invalidates stale caches even
/// when nothing else changed.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");
