use serde::Deserialize;
use std::path::{Path, PathBuf};

/// An installed copy of the upstream styling library.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamPackage {
    pub root: PathBuf,
    pub version: Option<String>,
}

#[derive(Deserialize)]
struct PackageManifest {
    #[serde(default)]
    version: Option<String>,
}

impl UpstreamPackage {
    /// Search `node_modules/<package_name>` in `project_root` and each of its ancestors.
    pub fn locate(project_root: &Path, package_name: &str) -> Option<Self> {
        project_root
            .ancestors()
            .map(|dir| dir.join("node_modules").join(package_name))
            .find(|candidate| candidate.join("package.json").is_file())
            .map(|root| Self::from_root(&root))
    }

    /// Describe the package at `root`. An unreadable manifest records no version.
    pub fn from_root(root: &Path) -> Self {
        let manifest_path = root.join("package.json");
        let version = match std::fs::read(&manifest_path) {
            Ok(bytes) => match serde_json::from_slice::<PackageManifest>(&bytes) {
                Ok(manifest) => manifest.version,
                Err(err) => {
                    tracing::debug!(
                        target: "twm.mangle",
                        path = %manifest_path.display(),
                        error = %err,
                        "unparseable package manifest"
                    );
                    None
                }
            },
            Err(err) => {
                tracing::debug!(
                    target: "twm.mangle",
                    path = %manifest_path.display(),
                    error = %err,
                    "package manifest not readable"
                );
                None
            }
        };
        Self {
            root: root.to_path_buf(),
            version,
        }
    }

    /// Leading numeric component of the version (`"3.4.18"` gives `3`, `"^4.0.0-beta"` gives `4`).
    pub fn major_version(&self) -> Option<u32> {
        let version = self.version.as_deref()?;
        let digits: String = version
            .trim_start_matches(|c: char| !c.is_ascii_digit())
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse().ok()
    }
}
