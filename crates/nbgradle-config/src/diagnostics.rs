use serde::de::DeserializeOwned;
use std::path::PathBuf;

/// Diagnostics produced while loading and validating a settings file.
///
/// Loading is best effort: callers always get a config when deserialization succeeds, plus
/// the problems that may affect runtime behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDiagnostics {
    /// Keys in the input that the schema does not know about, as dotted paths.
    pub unknown_keys: Vec<String>,
    pub warnings: Vec<ConfigWarning>,
    pub errors: Vec<ConfigValidationError>,
}

impl ConfigDiagnostics {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unknown_keys.is_empty() && self.warnings.is_empty() && self.errors.is_empty()
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn extend(&mut self, other: ConfigDiagnostics) {
        self.unknown_keys.extend(other.unknown_keys);
        self.unknown_keys.sort();
        self.unknown_keys.dedup();
        self.warnings.extend(other.warnings);
        self.errors.extend(other.errors);
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    InvalidValue { toml_path: String, message: String },
    LocalDistributionMissing { home: PathBuf },
    JavaHomeMissing { java_home: PathBuf },
    LoggingLevelInvalid { value: String, normalized: String },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::InvalidValue { toml_path, message } => {
                write!(f, "{toml_path}: {message}")
            }
            ConfigWarning::LocalDistributionMissing { home } => write!(
                f,
                "gradle.distribution.home: {} is not a directory",
                home.display()
            ),
            ConfigWarning::JavaHomeMissing { java_home } => {
                write!(f, "gradle.java_home: {} is not a directory", java_home.display())
            }
            ConfigWarning::LoggingLevelInvalid { value, normalized } => {
                write!(f, "logging.level: `{value}` is treated as `{normalized}`")
            }
        }
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    InvalidValue { toml_path: String, message: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigValidationError::InvalidValue { toml_path, message } => {
                write!(f, "{toml_path}: {message}")
            }
        }
    }
}

pub(crate) fn deserialize_toml_with_unknown_keys<T: DeserializeOwned>(
    text: &str,
) -> Result<(T, Vec<String>), toml::de::Error> {
    let mut unknown = Vec::<String>::new();
    let deserializer = toml::de::Deserializer::new(text);
    let value = serde_ignored::deserialize(deserializer, |path| {
        unknown.push(path.to_string().trim_start_matches('.').to_string());
    })?;
    unknown.sort();
    unknown.dedup();
    Ok((value, unknown))
}
