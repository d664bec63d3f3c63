//! Per-release install phases.

use std::fmt;

use serde::Serialize;

/// Where a release is in its install. Phases run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Check,
    DependencyWait,
    Provision,
    PreCommands,
    RenderValues,
    Chart,
    PostCommands,
    Record,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::DependencyWait => "dependency-wait",
            Self::Provision => "provision",
            Self::PreCommands => "pre-commands",
            Self::RenderValues => "render-values",
            Self::Chart => "chart",
            Self::PostCommands => "post-commands",
            Self::Record => "record",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_serialized_form() {
        for phase in [Phase::Check, Phase::DependencyWait, Phase::PostCommands] {
            let json = serde_json::to_value(phase).unwrap();
            assert_eq!(json, phase.to_string());
        }
        assert!(Phase::PreCommands < Phase::Chart);
    }
}
