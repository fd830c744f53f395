//! Settings consumed by the Gradle model loader.
//!
//! Global settings are loaded from a TOML file and can be refined per project by an
//! override file (`.nbgradle.toml`) found in the project directory or one of its ancestors.
//! Values that must be observed while the IDE is running (the in-memory project cache size)
//! are exposed as [`LiveValue`]s.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use url::Url;

mod diagnostics;
mod live;
mod logging;

pub use diagnostics::{ConfigDiagnostics, ConfigValidationError, ConfigWarning};
pub use live::{LiveValue, LiveValueSubscription};
pub use logging::{init_tracing, LoggingConfig};

/// Name of the per-project override file.
pub const PROJECT_SETTINGS_FILE_NAME: &str = ".nbgradle.toml";

/// Default directory (relative to a build root) holding persisted project models.
pub const DEFAULT_PERSISTENT_CACHE_DIR: &str = ".gradle/nb-cache";

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
        // Keep the message without the source snippet; config files may carry credentials in
        // distribution URLs.
        ConfigError::Toml(err.message().to_string())
    }
}

/// Which Gradle distribution the connector should use for a project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GradleDistribution {
    /// Whatever the project declares (wrapper) or the connector's own default.
    #[default]
    Default,
    /// A specific released Gradle version, downloaded on demand.
    Version { version: String },
    /// A local Gradle installation directory.
    Local { home: PathBuf },
    /// A distribution archive URL.
    Url { url: Url },
}

/// User preference for the model loading protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelLoadStrategy {
    /// Use the batched model fetch whenever the connected Gradle supports it.
    #[default]
    NewestPossible,
    /// Always use the IDEA-model based protocol.
    Compatible,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradleConfig {
    #[serde(default)]
    pub distribution: GradleDistribution,

    /// Gradle user home (`GRADLE_USER_HOME`). Connector default when unset.
    #[serde(default)]
    pub user_home: Option<PathBuf>,

    /// JDK used to run the build. The connector default is used when unset.
    #[serde(default)]
    pub java_home: Option<PathBuf>,

    /// Extra JVM flags for the Gradle daemon.
    #[serde(default)]
    pub jvm_args: Vec<String>,

    /// Extra command line arguments passed to every model fetch.
    #[serde(default)]
    pub arguments: Vec<String>,

    /// Idle timeout for daemons started on behalf of the IDE (seconds).
    #[serde(default)]
    pub daemon_idle_timeout_secs: Option<u64>,

    /// Resolve the multi-project root before loading one of its subprojects.
    #[serde(default = "GradleConfig::default_load_root_project_first")]
    pub load_root_project_first: bool,

    #[serde(default)]
    pub model_load_strategy: ModelLoadStrategy,
}

impl GradleConfig {
    fn default_load_root_project_first() -> bool {
        true
    }

    pub fn daemon_idle_timeout(&self) -> Option<Duration> {
        self.daemon_idle_timeout_secs.map(Duration::from_secs)
    }

    /// Returns a copy of `self` with every value set in `overrides` applied.
    pub fn with_overrides(&self, overrides: &GradleConfigOverrides) -> GradleConfig {
        let mut out = self.clone();
        if let Some(distribution) = &overrides.distribution {
            out.distribution = distribution.clone();
        }
        if let Some(user_home) = &overrides.user_home {
            out.user_home = Some(user_home.clone());
        }
        if let Some(java_home) = &overrides.java_home {
            out.java_home = Some(java_home.clone());
        }
        if let Some(jvm_args) = &overrides.jvm_args {
            out.jvm_args = jvm_args.clone();
        }
        if let Some(arguments) = &overrides.arguments {
            out.arguments = arguments.clone();
        }
        if let Some(timeout) = overrides.daemon_idle_timeout_secs {
            out.daemon_idle_timeout_secs = Some(timeout);
        }
        if let Some(root_first) = overrides.load_root_project_first {
            out.load_root_project_first = root_first;
        }
        if let Some(strategy) = overrides.model_load_strategy {
            out.model_load_strategy = strategy;
        }
        out
    }
}

impl Default for GradleConfig {
    fn default() -> Self {
        Self {
            distribution: GradleDistribution::Default,
            user_home: None,
            java_home: None,
            jvm_args: Vec::new(),
            arguments: Vec::new(),
            daemon_idle_timeout_secs: None,
            load_root_project_first: Self::default_load_root_project_first(),
            model_load_strategy: ModelLoadStrategy::NewestPossible,
        }
    }
}

/// Per-project overrides read from [`PROJECT_SETTINGS_FILE_NAME`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GradleConfigOverrides {
    #[serde(default)]
    pub distribution: Option<GradleDistribution>,
    #[serde(default)]
    pub user_home: Option<PathBuf>,
    #[serde(default)]
    pub java_home: Option<PathBuf>,
    #[serde(default)]
    pub jvm_args: Option<Vec<String>>,
    #[serde(default)]
    pub arguments: Option<Vec<String>>,
    #[serde(default)]
    pub daemon_idle_timeout_secs: Option<u64>,
    #[serde(default)]
    pub load_root_project_first: Option<bool>,
    #[serde(default)]
    pub model_load_strategy: Option<ModelLoadStrategy>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
struct ProjectSettingsFile {
    #[serde(default)]
    gradle: GradleConfigOverrides,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of loaded project models kept in memory.
    #[serde(default = "CacheConfig::default_project_cache_size")]
    pub project_cache_size: usize,

    /// Persist loaded models across restarts.
    #[serde(default = "CacheConfig::default_persistent")]
    pub persistent: bool,

    /// Directory (relative to the build root unless absolute) holding persisted models.
    #[serde(default = "CacheConfig::default_directory")]
    pub directory: PathBuf,
}

impl CacheConfig {
    fn default_project_cache_size() -> usize {
        100
    }

    fn default_persistent() -> bool {
        true
    }

    fn default_directory() -> PathBuf {
        PathBuf::from(DEFAULT_PERSISTENT_CACHE_DIR)
    }

    /// Resolves the persisted model directory for the build rooted at `root_dir`.
    pub fn persistent_dir_for_root(&self, root_dir: &Path) -> PathBuf {
        if self.directory.is_absolute() {
            self.directory.clone()
        } else {
            root_dir.join(&self.directory)
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            project_cache_size: Self::default_project_cache_size(),
            persistent: Self::default_persistent(),
            directory: Self::default_directory(),
        }
    }
}

/// Top-level settings file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NbGradleConfig {
    #[serde(default)]
    pub gradle: GradleConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NbGradleConfig {
    /// Load a config file from TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a config file and return unknown keys plus validation problems alongside it.
    pub fn load_from_path_with_diagnostics(
        path: impl AsRef<Path>,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str_with_diagnostics(&text)
    }

    pub fn load_from_str_with_diagnostics(
        text: &str,
    ) -> Result<(Self, ConfigDiagnostics), ConfigError> {
        let (config, unknown_keys) =
            diagnostics::deserialize_toml_with_unknown_keys::<NbGradleConfig>(text)?;
        let mut diagnostics = ConfigDiagnostics {
            unknown_keys,
            ..ConfigDiagnostics::default()
        };
        diagnostics.extend(config.validate());
        Ok((config, diagnostics))
    }

    /// Semantic checks that deserialization alone cannot express.
    pub fn validate(&self) -> ConfigDiagnostics {
        let mut out = ConfigDiagnostics::default();

        if self.cache.project_cache_size == 0 {
            out.errors.push(ConfigValidationError::InvalidValue {
                toml_path: "cache.project_cache_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        match &self.gradle.distribution {
            GradleDistribution::Version { version } if version.trim().is_empty() => {
                out.errors.push(ConfigValidationError::InvalidValue {
                    toml_path: "gradle.distribution.version".to_string(),
                    message: "must not be empty".to_string(),
                });
            }
            GradleDistribution::Local { home } if !home.is_dir() => {
                out.warnings
                    .push(ConfigWarning::LocalDistributionMissing { home: home.clone() });
            }
            _ => {}
        }

        if self.gradle.daemon_idle_timeout_secs == Some(0) {
            out.warnings.push(ConfigWarning::InvalidValue {
                toml_path: "gradle.daemon_idle_timeout_secs".to_string(),
                message: "0 lets daemons exit immediately; the connector default is used"
                    .to_string(),
            });
        }

        if let Some(java_home) = &self.gradle.java_home {
            if !java_home.is_dir() {
                out.warnings.push(ConfigWarning::JavaHomeMissing {
                    java_home: java_home.clone(),
                });
            }
        }

        let normalized = LoggingConfig::normalize_level_directives(&self.logging.level);
        if normalized != self.logging.level {
            out.warnings.push(ConfigWarning::LoggingLevelInvalid {
                value: self.logging.level.clone(),
                normalized,
            });
        }

        out
    }
}

/// Resolves the Gradle settings that apply to a given project directory.
pub trait ProjectSettingsProvider: Send + Sync {
    fn gradle_settings(&self, project_dir: &Path) -> GradleConfig;

    fn cache_settings(&self) -> CacheConfig;
}

/// Application-lifetime settings holder.
///
/// The global config can be replaced at runtime; the project cache size is additionally
/// published through a [`LiveValue`] so caches can resize without polling.
#[derive(Clone)]
pub struct SettingsStore {
    config: LiveValue<NbGradleConfig>,
    project_cache_size: LiveValue<usize>,
}

impl SettingsStore {
    pub fn new(config: NbGradleConfig) -> Self {
        let project_cache_size = LiveValue::new(config.cache.project_cache_size);
        Self {
            config: LiveValue::new(config),
            project_cache_size,
        }
    }

    pub fn config(&self) -> NbGradleConfig {
        self.config.get()
    }

    /// Replace the global settings. Returns `true` when anything changed.
    pub fn update(&self, config: NbGradleConfig) -> bool {
        let size = config.cache.project_cache_size;
        let changed = self.config.set(config);
        self.project_cache_size.set(size);
        changed
    }

    pub fn project_cache_size(&self) -> LiveValue<usize> {
        self.project_cache_size.clone()
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&NbGradleConfig) + Send + Sync + 'static,
    ) -> LiveValueSubscription {
        self.config.subscribe(listener)
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(NbGradleConfig::default())
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("config", &self.config.get())
            .finish()
    }
}

impl ProjectSettingsProvider for SettingsStore {
    fn gradle_settings(&self, project_dir: &Path) -> GradleConfig {
        let global = self.config.get().gradle;
        match find_project_overrides(project_dir) {
            Some(overrides) => global.with_overrides(&overrides),
            None => global,
        }
    }

    fn cache_settings(&self) -> CacheConfig {
        self.config.get().cache
    }
}

impl<T: ProjectSettingsProvider + ?Sized> ProjectSettingsProvider for Arc<T> {
    fn gradle_settings(&self, project_dir: &Path) -> GradleConfig {
        (**self).gradle_settings(project_dir)
    }

    fn cache_settings(&self) -> CacheConfig {
        (**self).cache_settings()
    }
}

/// Reads the nearest override file at or above `project_dir`.
///
/// A malformed override file is logged and ignored.
pub fn find_project_overrides(project_dir: &Path) -> Option<GradleConfigOverrides> {
    let mut dir = Some(project_dir);
    while let Some(current) = dir {
        let candidate = current.join(PROJECT_SETTINGS_FILE_NAME);
        if candidate.is_file() {
            return match std::fs::read_to_string(&candidate)
                .map_err(|source| ConfigError::Io {
                    path: candidate.display().to_string(),
                    source,
                })
                .and_then(|text| Ok(toml::from_str::<ProjectSettingsFile>(&text)?))
            {
                Ok(file) => Some(file.gradle),
                Err(err) => {
                    tracing::warn!(
                        target: "nbgradle.config",
                        path = %candidate.display(),
                        error = %err,
                        "ignoring unreadable project settings file"
                    );
                    None
                }
            };
        }
        dir = current.parent();
    }
    None
}
