use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

mod logging;
mod schema;

pub use logging::{init_tracing, LoggingConfig};
pub use schema::json_schema;

/// Top-level `twm.toml` configuration.
///
/// Every section is optional; an empty file is equivalent to [`TwmConfig::default`].
///
/// ```toml
/// [mangle]
/// class_prefix = "tw-"
/// reserved = ["tw-ad"]
/// mapping = { file = ".tw-patch/tw-map-list.json" }
///
/// [cache]
/// driver = "file"
/// dir = "node_modules/.cache/twm"
///
/// [upstream]
/// config_path = "tailwind.config.js"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TwmConfig {
    /// Class-name allocation and mapping report settings.
    #[serde(default)]
    pub mangle: MangleConfig,

    /// Discovered-token cache settings.
    #[serde(default)]
    pub cache: CacheSettings,

    /// The upstream styling library whose installed state scopes the cache.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MangleConfig {
    /// Literal prefix of every generated class name.
    #[serde(default = "MangleConfig::default_class_prefix")]
    #[schemars(length(min = 1))]
    pub class_prefix: String,

    /// Generated names that must never be produced (e.g. names blocked by ad filters).
    #[serde(default)]
    pub reserved: Vec<String>,

    /// Regular expressions matched against generated names; matches are skipped.
    #[serde(default)]
    pub reserved_patterns: Vec<String>,

    /// Globs selecting the files whose tokens are mangled. Empty means every file.
    #[serde(default)]
    pub include: Vec<String>,

    /// Globs excluding files from mangling. Applied after `include`.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Regular expression a token must match to be mangled.
    ///
    /// When unset, a token is eligible if it contains `-` or `:`.
    #[serde(default)]
    pub class_name_pattern: Option<String>,

    /// Tokens that are never mangled.
    #[serde(default)]
    pub ignore_class: Vec<String>,

    /// Regular expressions over tokens that are never mangled.
    #[serde(default)]
    pub ignore_class_patterns: Vec<String>,

    /// Log every allocation and every skipped reserved name at `debug`.
    #[serde(default)]
    pub verbose: bool,

    /// JSON array of tokens produced by the extraction step, relative to the project root.
    #[serde(default = "MangleConfig::default_inventory_file")]
    #[schemars(with = "String")]
    pub inventory_file: PathBuf,

    /// Mapping report output: `false`, `true`, or `{ file = "..." }`.
    #[serde(default)]
    pub mapping: MappingSetting,
}

impl MangleConfig {
    fn default_class_prefix() -> String {
        "tw-".to_owned()
    }

    fn default_inventory_file() -> PathBuf {
        PathBuf::from(".tw-patch/tw-class-list.json")
    }
}

impl Default for MangleConfig {
    fn default() -> Self {
        Self {
            class_prefix: Self::default_class_prefix(),
            reserved: Vec::new(),
            reserved_patterns: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            class_name_pattern: None,
            ignore_class: Vec::new(),
            ignore_class_patterns: Vec::new(),
            verbose: false,
            inventory_file: Self::default_inventory_file(),
            mapping: MappingSetting::default(),
        }
    }
}

/// The TOML forms of the mapping report option.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum MappingSetting {
    Toggle(bool),
    Config(MappingFileConfig),
}

impl Default for MappingSetting {
    fn default() -> Self {
        MappingSetting::Toggle(false)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MappingFileConfig {
    /// Report path relative to the project root. Defaults to `.tw-patch/tw-map-list.json`.
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub file: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CacheDriverSetting {
    #[default]
    File,
    Memory,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CacheStrategySetting {
    #[default]
    Merge,
    Overwrite,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    #[serde(default = "CacheSettings::default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub driver: CacheDriverSetting,

    /// Cache directory, relative to the process working directory unless absolute.
    #[serde(default = "CacheSettings::default_dir")]
    #[schemars(with = "String")]
    pub dir: PathBuf,

    /// Index file name inside `dir`.
    #[serde(default = "CacheSettings::default_file")]
    #[schemars(length(min = 1))]
    pub file: String,

    /// Cache working directory. Defaults to the project root.
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub cwd: Option<PathBuf>,

    #[serde(default)]
    pub strategy: CacheStrategySetting,
}

impl CacheSettings {
    fn default_enabled() -> bool {
        true
    }

    fn default_dir() -> PathBuf {
        PathBuf::from("node_modules/.cache/twm")
    }

    fn default_file() -> String {
        "index.json".to_owned()
    }

    /// Location of the index file for a given process working directory.
    pub fn index_path(&self, process_cwd: &Path) -> PathBuf {
        process_cwd.join(&self.dir).join(&self.file)
    }

    /// The cache working directory, resolved against the project root.
    pub fn cache_cwd(&self, project_root: &Path) -> PathBuf {
        match &self.cwd {
            Some(cwd) => project_root.join(cwd),
            None => project_root.to_path_buf(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            driver: CacheDriverSetting::default(),
            dir: Self::default_dir(),
            file: Self::default_file(),
            cwd: None,
            strategy: CacheStrategySetting::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// npm package name of the styling library.
    #[serde(default = "UpstreamConfig::default_package_name")]
    pub package_name: String,

    /// Library config file, relative to the project root.
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub config_path: Option<PathBuf>,

    /// Explicit package directory; otherwise `node_modules` is searched upwards.
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub package_root: Option<PathBuf>,

    /// Major version mode. Defaults to the installed package's major version.
    #[serde(default)]
    pub major_version: Option<u32>,
}

impl UpstreamConfig {
    fn default_package_name() -> String {
        "tailwindcss".to_owned()
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            package_name: Self::default_package_name(),
            config_path: None,
            package_root: None,
            major_version: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` quotes a source snippet; keep only the message.
        ConfigError::Toml(sanitize_toml_error_message(err.message()))
    }
}

fn sanitize_toml_error_message(message: &str) -> String {
    // serde diagnostics echo scalar values (`invalid type: string "..."`), redact them.
    static QUOTED_STRING_RE: OnceLock<Option<regex::Regex>> = OnceLock::new();
    static BACKTICK_VALUE_RE: OnceLock<Option<regex::Regex>> = OnceLock::new();

    let quoted = QUOTED_STRING_RE.get_or_init(|| regex::Regex::new(r#""(?:\\.|[^"\\])*""#).ok());
    let mut out = match quoted {
        Some(re) => re.replace_all(message, r#""<redacted>""#).into_owned(),
        None => message.to_owned(),
    };

    // `unknown field `x`` and `unknown variant `x`` carry user-written keys; `missing field` names
    // schema fields and stays readable.
    let backtick = BACKTICK_VALUE_RE
        .get_or_init(|| regex::Regex::new(r"(unknown (?:field|variant)|integer|float) `[^`]*`").ok());
    if let Some(re) = backtick {
        out = re.replace_all(&out, "$1 `<redacted>`").into_owned();
    }
    out
}

impl TwmConfig {
    /// Load a config file from TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

/// Locate the config file for a project root: `twm.toml`, then `.twm.toml`.
pub fn discover_config_path(project_root: &Path) -> Option<PathBuf> {
    ["twm.toml", ".twm.toml"]
        .into_iter()
        .map(|name| project_root.join(name))
        .find(|path| path.is_file())
}

/// Load the configuration for a project root.
///
/// If no config is present, returns [`TwmConfig::default`] and `None`.
pub fn load_for_project(project_root: &Path) -> Result<(TwmConfig, Option<PathBuf>), ConfigError> {
    let Some(path) = discover_config_path(project_root) else {
        tracing::debug!(
            target: "twm.config",
            root = %project_root.display(),
            "no config file found; using defaults"
        );
        return Ok((TwmConfig::default(), None));
    };

    let config = TwmConfig::load_from_path(&path)?;
    tracing::debug!(target: "twm.config", path = %path.display(), "loaded config");
    Ok((config, Some(path)))
}
