use crate::allocator::{AllocatorOptions, NameAllocator};
use crate::context::MangleContext;
use crate::error::MangleError;
use crate::inventory::TokenInventory;
use crate::upstream::UpstreamPackage;
use serde_json::json;
use std::path::{Path, PathBuf};
use twm_cache::{
    CacheContext, CacheDriverKind, CacheStore, CacheStoreOptions, ContextInputs, Fingerprint,
    ReadMeta, WriteStrategy,
};
use twm_config::{CacheDriverSetting, CacheStrategySetting, TwmConfig};

/// Supplies candidate class tokens for a project, typically by scanning its sources.
pub trait ClassExtractor {
    fn extract(&mut self, project_root: &Path) -> anyhow::Result<TokenInventory>;
}

impl<F> ClassExtractor for F
where
    F: FnMut(&Path) -> anyhow::Result<TokenInventory>,
{
    fn extract(&mut self, project_root: &Path) -> anyhow::Result<TokenInventory> {
        self(project_root)
    }
}

/// Paths of the current invocation. Nothing in the pipeline reads the process environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineInputs {
    pub project_root: PathBuf,
    pub process_cwd: PathBuf,
}

impl PipelineInputs {
    pub fn new(project_root: impl Into<PathBuf>, process_cwd: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            process_cwd: process_cwd.into(),
        }
    }
}

/// Where the tokens of a prepared context came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenSource {
    Cache,
    Extractor,
    InventoryFile,
    Empty,
}

#[derive(Debug)]
pub struct Prepared {
    pub context: MangleContext,
    pub source: TokenSource,
    /// Cache read outcome; `None` when caching is disabled or unavailable.
    pub cache: Option<ReadMeta>,
    pub store: Option<CacheStore>,
}

/// Fingerprint of every setting that changes which tokens are mangled or how.
pub fn options_hash(config: &TwmConfig) -> Result<Fingerprint, MangleError> {
    let value = json!({
        "mangle": config.mangle,
        "cacheStrategy": config.cache.strategy,
        "upstream": config.upstream,
    });
    Ok(Fingerprint::of_serializable(&value)?)
}

/// Capture the cache identity for this invocation.
pub fn capture_context(
    config: &TwmConfig,
    inputs: &PipelineInputs,
) -> Result<CacheContext, MangleError> {
    let package = match &config.upstream.package_root {
        Some(root) => Some(UpstreamPackage::from_root(&inputs.project_root.join(root))),
        None => UpstreamPackage::locate(&inputs.project_root, &config.upstream.package_name),
    };
    let major_version = config
        .upstream
        .major_version
        .or_else(|| package.as_ref().and_then(UpstreamPackage::major_version));

    let context_inputs = ContextInputs {
        project_root: inputs.project_root.clone(),
        process_cwd: inputs.process_cwd.clone(),
        cache_cwd: config.cache.cache_cwd(&inputs.project_root),
        upstream_config_path: config.upstream.config_path.clone(),
        upstream_package_root: package.as_ref().map(|package| package.root.clone()),
        upstream_package_version: package.and_then(|package| package.version),
        tool_version: twm_core::TOOL_VERSION.to_owned(),
        major_version_mode: major_version.map(|major| major.to_string()),
        options_hash: options_hash(config)?,
    };
    Ok(CacheContext::capture(&context_inputs)?)
}

/// The cache store selected by configuration, scoped to `context`.
pub fn open_store(config: &TwmConfig, inputs: &PipelineInputs, context: CacheContext) -> CacheStore {
    let driver = match config.cache.driver {
        CacheDriverSetting::File => CacheDriverKind::File,
        CacheDriverSetting::Memory => CacheDriverKind::Memory,
    };
    let strategy = match config.cache.strategy {
        CacheStrategySetting::Merge => WriteStrategy::Merge,
        CacheStrategySetting::Overwrite => WriteStrategy::Overwrite,
    };
    let options = CacheStoreOptions {
        driver,
        path: config.cache.index_path(&inputs.process_cwd),
        strategy,
    };
    CacheStore::with_context(options, context)
}

/// Build a [`MangleContext`] for one invocation using the default allocator.
pub fn prepare(
    config: &TwmConfig,
    inputs: &PipelineInputs,
    extractor: Option<&mut dyn ClassExtractor>,
) -> Result<Prepared, MangleError> {
    let allocator = NameAllocator::new(AllocatorOptions::from_config(&config.mangle))?;
    prepare_with_allocator(config, inputs, allocator, extractor)
}

/// Build a [`MangleContext`] for one invocation.
///
/// Tokens come from the cache when it holds an entry for the current context. Otherwise the
/// extractor runs (or, without one, the inventory file is read) and the result is written back
/// to the cache. Cache failures are logged and never fail preparation.
pub fn prepare_with_allocator(
    config: &TwmConfig,
    inputs: &PipelineInputs,
    allocator: NameAllocator,
    extractor: Option<&mut dyn ClassExtractor>,
) -> Result<Prepared, MangleError> {
    let store = if config.cache.enabled {
        match capture_context(config, inputs) {
            Ok(context) => Some(open_store(config, inputs, context)),
            Err(err) => {
                tracing::warn!(
                    target: "twm.mangle",
                    error = %err,
                    "cache context unavailable; continuing without cache"
                );
                None
            }
        }
    } else {
        None
    };

    let cached = store.as_ref().map(CacheStore::read_with_meta);
    let cache_meta = cached.as_ref().map(|read| read.meta.clone());

    let (inventory, source) = match cached {
        Some(read) if read.meta.hit => (read.data.into_iter().collect(), TokenSource::Cache),
        _ => {
            let (inventory, source) = load_fresh(config, inputs, extractor)?;
            // Cache entries carry no attribution, so file filters are applied before writing.
            let inventory = inventory.retain_files(|file| allocator.is_file_included(file));
            if let (Some(store), TokenSource::Extractor | TokenSource::InventoryFile) =
                (store.as_ref(), source)
            {
                if let Err(err) = store.write(inventory.tokens()) {
                    tracing::warn!(
                        target: "twm.mangle",
                        error = %err,
                        "failed to persist class cache"
                    );
                }
            }
            (inventory, source)
        }
    };

    tracing::debug!(
        target: "twm.mangle",
        source = ?source,
        tokens = inventory.len(),
        cache = cache_meta.as_ref().map(|meta| meta.reason.as_str()),
        "prepared token inventory"
    );

    Ok(Prepared {
        context: MangleContext::new(allocator, &inventory),
        source,
        cache: cache_meta,
        store,
    })
}

fn load_fresh(
    config: &TwmConfig,
    inputs: &PipelineInputs,
    extractor: Option<&mut dyn ClassExtractor>,
) -> Result<(TokenInventory, TokenSource), MangleError> {
    if let Some(extractor) = extractor {
        let inventory = extractor
            .extract(&inputs.project_root)
            .map_err(MangleError::Extraction)?;
        return Ok((inventory, TokenSource::Extractor));
    }

    let path = inputs.project_root.join(&config.mangle.inventory_file);
    match TokenInventory::load(&path)? {
        Some(inventory) => Ok((inventory, TokenSource::InventoryFile)),
        None => Ok((TokenInventory::new(), TokenSource::Empty)),
    }
}
