use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use twm_config::{MappingFileConfig, MappingSetting};

/// Default report location, relative to the project root.
pub const DEFAULT_MAPPING_FILE: &str = ".tw-patch/tw-map-list.json";

/// One row of the mapping report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRecord {
    pub original: String,
    pub mangled: String,
    pub used_by: Vec<String>,
}

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Caller-supplied report sink.
#[derive(Clone)]
pub enum MappingCallback {
    Sync(Arc<dyn Fn(&[MappingRecord]) -> anyhow::Result<()> + Send + Sync>),
    Async(Arc<dyn Fn(Vec<MappingRecord>) -> BoxFuture<anyhow::Result<()>> + Send + Sync>),
}

impl MappingCallback {
    pub fn sync(f: impl Fn(&[MappingRecord]) -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
        MappingCallback::Sync(Arc::new(f))
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<MappingRecord>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        MappingCallback::Async(Arc::new(move |records| Box::pin(f(records))))
    }
}

impl fmt::Debug for MappingCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingCallback::Sync(_) => f.write_str("MappingCallback::Sync(..)"),
            MappingCallback::Async(_) => f.write_str("MappingCallback::Async(..)"),
        }
    }
}

/// Every form the mapping option can be given in.
#[derive(Clone, Debug, Default)]
pub enum MappingOutput {
    #[default]
    Disabled,
    EnabledWithDefaults,
    EnabledWithConfig(MappingFileConfig),
    Callback(MappingCallback),
}

impl From<&MappingSetting> for MappingOutput {
    fn from(setting: &MappingSetting) -> Self {
        match setting {
            MappingSetting::Toggle(false) => MappingOutput::Disabled,
            MappingSetting::Toggle(true) => MappingOutput::EnabledWithDefaults,
            MappingSetting::Config(config) => MappingOutput::EnabledWithConfig(config.clone()),
        }
    }
}

/// A resolved mapping destination.
#[derive(Clone, Debug)]
pub enum MappingPlan {
    Disabled,
    File(PathBuf),
    Callback(MappingCallback),
}

impl MappingOutput {
    /// Normalize into a concrete plan. Relative report paths are joined to `project_root`.
    pub fn resolve(self, project_root: &Path) -> MappingPlan {
        match self {
            MappingOutput::Disabled => MappingPlan::Disabled,
            MappingOutput::EnabledWithDefaults => {
                MappingPlan::File(project_root.join(DEFAULT_MAPPING_FILE))
            }
            MappingOutput::EnabledWithConfig(config) => {
                let file = config
                    .file
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MAPPING_FILE));
                MappingPlan::File(project_root.join(file))
            }
            MappingOutput::Callback(callback) => MappingPlan::Callback(callback),
        }
    }
}

impl MappingPlan {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, MappingPlan::Disabled)
    }
}
