use crate::error::CacheError;
use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use twm_core::fs::{modified_millis, path_to_slash_string, realpath, realpath_or_absolute};

/// Version of the descriptor layout itself. Bump when fields are added or change meaning.
pub const CACHE_FINGERPRINT_VERSION: u32 = 1;

/// Identity of "this project, this tool, this upstream library state".
///
/// The descriptor is rebuilt from live filesystem and package metadata on every invocation.
/// Only its [`fingerprint`](Self::fingerprint) decides cache validity; the field values are
/// persisted next to cached data purely for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheContext {
    pub fingerprint_version: u32,
    pub project_root_realpath: String,
    pub process_cwd_realpath: String,
    pub cache_cwd_realpath: String,
    pub upstream_config_path: Option<String>,
    pub upstream_config_mtime_ms: Option<u64>,
    pub upstream_package_root_realpath: Option<String>,
    pub upstream_package_version: Option<String>,
    pub tool_version: String,
    pub major_version_mode: Option<String>,
    pub options_hash: String,
}

/// Live inputs for [`CacheContext::capture`].
///
/// Working directories are passed in explicitly; nothing here reads process-global state.
#[derive(Clone, Debug)]
pub struct ContextInputs {
    pub project_root: PathBuf,
    pub process_cwd: PathBuf,
    pub cache_cwd: PathBuf,
    /// Upstream styling-library config file, relative to `project_root` unless absolute.
    pub upstream_config_path: Option<PathBuf>,
    pub upstream_package_root: Option<PathBuf>,
    pub upstream_package_version: Option<String>,
    pub tool_version: String,
    pub major_version_mode: Option<String>,
    pub options_hash: Fingerprint,
}

impl CacheContext {
    /// Build a descriptor from the current filesystem state.
    ///
    /// The project root must exist. Missing working directories and package roots fall back to
    /// absolute paths, and a missing config file records no mtime.
    pub fn capture(inputs: &ContextInputs) -> Result<Self, CacheError> {
        let project_root = realpath(&inputs.project_root)?;

        let (upstream_config_path, upstream_config_mtime_ms) = match &inputs.upstream_config_path
        {
            Some(path) => {
                let full = if path.is_absolute() {
                    path.clone()
                } else {
                    project_root.join(path)
                };
                let resolved = realpath_or_absolute(&full);
                let mtime = modified_millis(&resolved)?;
                (Some(path_to_slash_string(&resolved)), mtime)
            }
            None => (None, None),
        };

        Ok(Self {
            fingerprint_version: CACHE_FINGERPRINT_VERSION,
            project_root_realpath: path_to_slash_string(&project_root),
            process_cwd_realpath: slash_realpath(&inputs.process_cwd),
            cache_cwd_realpath: slash_realpath(&inputs.cache_cwd),
            upstream_config_path,
            upstream_config_mtime_ms,
            upstream_package_root_realpath: inputs
                .upstream_package_root
                .as_deref()
                .map(slash_realpath),
            upstream_package_version: inputs.upstream_package_version.clone(),
            tool_version: inputs.tool_version.clone(),
            major_version_mode: inputs.major_version_mode.clone(),
            options_hash: inputs.options_hash.to_string(),
        })
    }

    /// Stable hash over every field. Equal descriptors hash identically regardless of how the
    /// fields are ordered on the wire.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_canonical_json(&self.to_canonical_value())
    }

    /// Human-readable reasons why `stored` differs from `self`, in declaration order.
    ///
    /// Diagnostics only; hit/miss decisions compare fingerprints.
    pub fn explain_mismatch(&self, stored: &CacheContext) -> Vec<String> {
        let checks: [(bool, &str); 11] = [
            (
                self.fingerprint_version != stored.fingerprint_version,
                "fingerprint version changed",
            ),
            (
                self.project_root_realpath != stored.project_root_realpath,
                "project-root changed",
            ),
            (
                self.process_cwd_realpath != stored.process_cwd_realpath,
                "process-cwd changed",
            ),
            (
                self.cache_cwd_realpath != stored.cache_cwd_realpath,
                "cache-cwd changed",
            ),
            (
                self.upstream_config_path != stored.upstream_config_path,
                "tailwind-config path changed",
            ),
            (
                self.upstream_config_mtime_ms != stored.upstream_config_mtime_ms,
                "tailwind-config mtime changed",
            ),
            (
                self.upstream_package_root_realpath != stored.upstream_package_root_realpath,
                "tailwind-package root changed",
            ),
            (
                self.upstream_package_version != stored.upstream_package_version,
                "tailwind-package version changed",
            ),
            (self.tool_version != stored.tool_version, "patcher version changed"),
            (
                self.major_version_mode != stored.major_version_mode,
                "major-version mode changed",
            ),
            (
                self.options_hash != stored.options_hash,
                "patch options hash changed",
            ),
        ];

        checks
            .into_iter()
            .filter(|(differs, _)| *differs)
            .map(|(_, reason)| reason.to_string())
            .collect()
    }

    fn to_canonical_value(&self) -> Value {
        json!({
            "fingerprintVersion": self.fingerprint_version,
            "projectRootRealpath": self.project_root_realpath,
            "processCwdRealpath": self.process_cwd_realpath,
            "cacheCwdRealpath": self.cache_cwd_realpath,
            "upstreamConfigPath": self.upstream_config_path,
            "upstreamConfigMtimeMs": self.upstream_config_mtime_ms,
            "upstreamPackageRootRealpath": self.upstream_package_root_realpath,
            "upstreamPackageVersion": self.upstream_package_version,
            "toolVersion": self.tool_version,
            "majorVersionMode": self.major_version_mode,
            "optionsHash": self.options_hash,
        })
    }
}

fn slash_realpath(path: &Path) -> String {
    path_to_slash_string(&realpath_or_absolute(path))
}
