//! Analysis settings, loadable from YAML.

use serde::{Deserialize, Serialize};

use crate::ddg::DEFAULT_MAX_VISITS;
use crate::simplify::SimplifyOptions;
use crate::syntax::Dialect;

/// Settings for one run of the pipeline. Missing YAML keys take defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Grammar used to parse the source.
    pub dialect: Dialect,
    /// Passes run on the CFG before the DDG is built.
    pub simplify: SimplifyOptions,
    /// Cap on block visits in the reaching-definitions fixpoint.
    pub max_visits: usize,
    /// Add `depends` edges to graph projections.
    pub depends_edges: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            simplify: SimplifyOptions::default(),
            max_visits: DEFAULT_MAX_VISITS,
            depends_edges: true,
        }
    }
}

impl AnalysisConfig {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "dialect: javascript\nsimplify:\n  split: true\n";
        let config = AnalysisConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.dialect, Dialect::JavaScript);
        assert!(config.simplify.split);
        assert!(config.simplify.eliminate_empty_jumps);
        assert_eq!(config.max_visits, DEFAULT_MAX_VISITS);
        assert!(config.depends_edges);
    }

    #[test]
    fn test_unknown_dialect_is_rejected() {
        assert!(AnalysisConfig::from_yaml("dialect: python\n").is_err());
    }
}
