//! Values rendering.
//!
//! A release's values are layered in three steps:
//!
//! 1. the `values` table declared on the release
//! 2. its values template, with `{{ placeholder }}` markers substituted
//!    from the run context and parsed as TOML
//! 3. the user's per-release overrides
//!
//! Later layers win, merging tables key by key.

use std::collections::BTreeMap;
use std::path::PathBuf;

use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;

use shipyard_core::config::deep_merge;
use shipyard_core::{Release, RunContext, Values};

use crate::BoxFuture;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("cannot read values template for {release}: {source}")]
    Source {
        release: String,
        #[source]
        source: std::io::Error,
    },

    #[error("values template for {release} uses unknown placeholder `{placeholder}`")]
    UnknownPlaceholder { release: String, placeholder: String },

    #[error("values template for {release} is not valid TOML: {source}")]
    Parse {
        release: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("placeholder pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("values for {release} cannot be encoded: {source}")]
    Encode {
        release: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Where values templates come from.
pub trait ValuesSource: Send + Sync {
    /// Template text for `release`, or `None` when it has none.
    fn template<'a>(&'a self, release: &'a Release) -> BoxFuture<'a, std::io::Result<Option<String>>>;
}

/// Reads `<dir>/<release>.toml`. A missing file means no template.
#[derive(Debug, Clone)]
pub struct DirValuesSource {
    dir: PathBuf,
}

impl DirValuesSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ValuesSource for DirValuesSource {
    fn template<'a>(&'a self, release: &'a Release) -> BoxFuture<'a, std::io::Result<Option<String>>> {
        Box::pin(async move {
            let path = self.dir.join(format!("{}.toml", release.name));
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => Ok(Some(text)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e),
            }
        })
    }
}

/// Source with no templates; releases render from their base values alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTemplates;

impl ValuesSource for NoTemplates {
    fn template<'a>(&'a self, _release: &'a Release) -> BoxFuture<'a, std::io::Result<Option<String>>> {
        Box::pin(async { Ok(None) })
    }
}

/// Placeholder values available to a release's template.
pub fn placeholders(release: &Release, ctx: &RunContext) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::from([
        ("namespace".to_string(), release.namespace.clone().unwrap_or_else(|| ctx.namespace.clone())),
        ("prefix".to_string(), ctx.prefix.clone()),
        ("name".to_string(), release.name.clone()),
        ("release".to_string(), ctx.release_name(&release.name)),
        ("version".to_string(), release.version.clone().unwrap_or_else(|| ctx.version.clone())),
    ]);
    for (key, value) in &ctx.user.values {
        vars.insert(format!("values.{key}"), value.clone());
    }
    vars
}

/// Substitute every placeholder in `template`. Unknown names are an error.
pub fn substitute(
    template: &str,
    vars: &BTreeMap<String, String>,
    release: &str,
) -> Result<String, RenderError> {
    let placeholder = Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}\}")?;
    if let Some(unknown) = placeholder
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .find(|name| !vars.contains_key(name))
    {
        return Err(RenderError::UnknownPlaceholder {
            release: release.to_string(),
            placeholder: unknown,
        });
    }
    Ok(placeholder
        .replace_all(template, |c: &regex::Captures<'_>| {
            vars.get(&c[1]).cloned().unwrap_or_default()
        })
        .into_owned())
}

/// Build the final values for `release`.
pub fn render_values(
    template: Option<&str>,
    release: &Release,
    ctx: &RunContext,
) -> Result<Values, RenderError> {
    let mut values = release.values.clone();

    if let Some(text) = template {
        let rendered = substitute(text, &placeholders(release, ctx), &release.name)?;
        let table: toml::Table = toml::from_str(&rendered).map_err(|source| RenderError::Parse {
            release: release.name.clone(),
            source,
        })?;
        let layer: Values = serde_json::to_value(table)
            .and_then(serde_json::from_value)
            .map_err(|source| RenderError::Encode {
                release: release.name.clone(),
                source,
            })?;
        deep_merge(&mut values, &layer);
    }

    if let Some(overrides) = ctx.user.overrides.get(&release.name) {
        deep_merge(&mut values, overrides);
    }
    Ok(values)
}

/// Stable SHA-256 of the values, hex encoded.
pub fn values_digest(values: &Values) -> String {
    // Map keys are sorted, so equal values always serialize identically.
    let canonical = serde_json::to_vec(values).unwrap_or_default();
    hex::encode(Sha256::digest(&canonical))
}
