//! Configuration error types.

use thiserror::Error;

/// Result type alias for configuration loading and validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating install configuration.
///
/// All of these are fatal: they are reported before any cluster
/// mutation and are never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("release {release}: field `{field}` must not be empty")]
    EmptyField { release: String, field: &'static str },

    #[error("release {release}: invalid version {version:?}: {source}")]
    InvalidVersion {
        release: String,
        version: String,
        #[source]
        source: semver::Error,
    },

    #[error("persistence {name}: {count} access modes requested, at most one is supported")]
    MultipleAccessModes { name: String, count: usize },

    #[error("invalid size quantity {value:?}: {reason}")]
    InvalidQuantity { value: String, reason: String },

    #[error("invalid override {key:?}: {reason}")]
    InvalidOverride { key: String, reason: String },
}
