//! Install definition and user configuration parsers.
//!
//! An install definition (`install.toml`) declares the releases of a
//! platform. A user configuration (`shipyard.toml`) carries the operator's
//! namespace, prefix, template values, and per-release value overrides.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Release, Values};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallDefinition {
    pub install: InstallMeta,
    #[serde(default, rename = "release")]
    pub releases: Vec<Release>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallMeta {
    pub name: String,
    pub version: Option<String>,
    pub chart_repository: Option<String>,
    pub namespace: Option<String>,
}

/// Operator-supplied settings layered over an install definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserConfig {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Substituted for `{{ values.<key> }}` placeholders in values templates.
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    /// Per-release documents merged over the rendered values.
    #[serde(default)]
    pub overrides: BTreeMap<String, Values>,
}

impl InstallDefinition {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = read(path)?;
        let def: InstallDefinition = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        def.validate()?;
        Ok(def)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Field-level checks that need no cluster access.
    ///
    /// Requirement resolution and cycle detection belong to the release
    /// graph and are not repeated here.
    pub fn validate(&self) -> ConfigResult<()> {
        for release in &self.releases {
            if release.name.trim().is_empty() {
                return Err(ConfigError::EmptyField {
                    release: "<unnamed>".to_string(),
                    field: "name",
                });
            }
            if release.chart.trim().is_empty() {
                return Err(ConfigError::EmptyField {
                    release: release.name.clone(),
                    field: "chart",
                });
            }
            if let Some(version) = &release.version {
                check_version(&release.name, version)?;
            }
            for spec in &release.persistence {
                spec.validate()?;
            }
        }
        if let Some(version) = &self.install.version {
            check_version(&self.install.name, version)?;
        }
        Ok(())
    }

    /// Scaffold a minimal definition with a single release.
    pub fn scaffold(name: &str) -> Self {
        InstallDefinition {
            install: InstallMeta {
                name: name.to_string(),
                version: Some("0.1.0".to_string()),
                chart_repository: Some("https://charts.example.com".to_string()),
                namespace: Some(name.to_string()),
            },
            releases: vec![Release::new("database", "postgresql")],
        }
    }
}

impl UserConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = read(path)?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Record a `release:dotted.key=value` override.
    ///
    /// The value is read as JSON when it parses (numbers, booleans,
    /// arrays) and as a plain string otherwise.
    pub fn set_override(&mut self, assignment: &str) -> ConfigResult<()> {
        let invalid = |reason: &str| ConfigError::InvalidOverride {
            key: assignment.to_string(),
            reason: reason.to_string(),
        };
        let (target, raw) = assignment
            .split_once('=')
            .ok_or_else(|| invalid("expected release:key=value"))?;
        let (release, path) = target
            .split_once(':')
            .ok_or_else(|| invalid("expected release:key=value"))?;
        if release.is_empty() || path.is_empty() || path.split('.').any(str::is_empty) {
            return Err(invalid("release and key must be non-empty"));
        }

        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        let mut overlay = value;
        for segment in path.rsplit('.') {
            let mut map = Values::new();
            map.insert(segment.to_string(), overlay);
            overlay = Value::Object(map);
        }
        if let Value::Object(map) = overlay {
            deep_merge(self.overrides.entry(release.to_string()).or_default(), &map);
        }
        Ok(())
    }
}

/// Merge `overlay` into `base`, recursing into nested tables.
pub fn deep_merge(base: &mut Values, overlay: &Values) {
    for (key, value) in overlay {
        if let (Some(Value::Object(existing)), Value::Object(incoming)) = (base.get_mut(key), value)
        {
            deep_merge(existing, incoming);
            continue;
        }
        base.insert(key.clone(), value.clone());
    }
}

/// Names that appear more than once, in first-seen order.
pub fn duplicate_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut dups = Vec::new();
    for name in names {
        if !seen.insert(name) && !dups.iter().any(|d: &String| d == name) {
            dups.push(name.to_string());
        }
    }
    dups
}

fn check_version(owner: &str, version: &str) -> ConfigResult<()> {
    semver::Version::parse(version.trim_start_matches('v'))
        .map(|_| ())
        .map_err(|source| ConfigError::InvalidVersion {
            release: owner.to_string(),
            version: version.to_string(),
            source,
        })
}

fn read(path: &Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })
}
