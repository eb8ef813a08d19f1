//! Comparison thresholds and per-metric policy.
//!
//! Defaults are compiled in; a TOML config file can override the global
//! limit and add per-field rules.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DiffError, DiffResult};

/// Which way a metric regresses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// The metric regresses by increasing (rms, run times).
    #[default]
    LowerIsBetter,
    /// The metric regresses by decreasing (signal-to-noise, peak flux, QA).
    HigherIsBetter,
}

/// Per-field override of limit and direction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricRule {
    pub limit: Option<f64>,
    #[serde(default)]
    pub direction: Direction,
}

/// Options controlling a record comparison.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffOptions {
    /// Fractional change beyond which a numeric leaf is flagged.
    pub limit: f64,
    /// Channels with a reference signal-to-noise at or below this floor are
    /// too noisy to judge and never flag max/snr metrics.
    pub snr_floor: f64,
    /// Drop unchanged leaves from the output tree (proposal_code is always
    /// retained).
    pub diff_only: bool,
    /// Image types compared per target and spectral window.
    pub image_types: Vec<String>,
    /// Per-field rules, keyed by exact field name.
    pub rules: BTreeMap<String, MetricRule>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            limit: 0.05,
            snr_floor: 10.0,
            diff_only: false,
            image_types: ["mfs", "mfs_selfcal", "cube", "cube_selfcal", "cont", "cont_selfcal"]
                .map(String::from)
                .to_vec(),
            rules: BTreeMap::new(),
        }
    }
}

impl DiffOptions {
    /// Resolve the limit and direction for a field.
    ///
    /// Resolution order: exact rule, then metric-class heuristics on the
    /// field name, then the global default (lower is better).
    pub fn rule_for(&self, field: &str) -> (f64, Direction) {
        if let Some(rule) = self.rules.get(field) {
            return (rule.limit.unwrap_or(self.limit), rule.direction);
        }
        let direction = if field.contains("rms") || field.contains("time") {
            Direction::LowerIsBetter
        } else if field.contains("max")
            || field.contains("snr")
            || field.contains("qa_score")
            || field.contains("flux")
            || field.contains("value")
        {
            Direction::HigherIsBetter
        } else {
            Direction::LowerIsBetter
        };
        (self.limit, direction)
    }
}

/// The on-disk comparison config: a `DiffOptions` in TOML form.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompareConfig {
    #[serde(flatten)]
    pub options: DiffOptions,
}

impl CompareConfig {
    /// Load options from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> DiffResult<DiffOptions> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DiffError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: CompareConfig =
            toml::from_str(&text).map_err(|source| DiffError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(config.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let opts = DiffOptions::default();
        assert_eq!(opts.limit, 0.05);
        assert_eq!(opts.snr_floor, 10.0);
        assert!(!opts.diff_only);
        assert_eq!(opts.image_types.len(), 6);
    }

    #[test]
    fn class_heuristics() {
        let opts = DiffOptions::default();
        assert_eq!(
            opts.rule_for("makeimages_science_cube_rms"),
            (0.05, Direction::LowerIsBetter)
        );
        assert_eq!(
            opts.rule_for("makeimages_science_cube_max"),
            (0.05, Direction::HigherIsBetter)
        );
        assert_eq!(opts.rule_for("qa_score").1, Direction::HigherIsBetter);
        assert_eq!(opts.rule_for("task_time").1, Direction::LowerIsBetter);
    }

    #[test]
    fn exact_rule_overrides_class() {
        let mut opts = DiffOptions::default();
        opts.rules.insert(
            "makeimages_science_cube_rms".into(),
            MetricRule {
                limit: Some(0.2),
                direction: Direction::HigherIsBetter,
            },
        );
        assert_eq!(
            opts.rule_for("makeimages_science_cube_rms"),
            (0.2, Direction::HigherIsBetter)
        );
    }

    #[test]
    fn load_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
limit = 0.1
snr_floor = 5.0
diff_only = true

[rules.qa_score]
limit = 0.01
direction = "higher-is-better"
"#
        )
        .unwrap();
        let opts = CompareConfig::load(file.path()).unwrap();
        assert_eq!(opts.limit, 0.1);
        assert_eq!(opts.snr_floor, 5.0);
        assert!(opts.diff_only);
        assert_eq!(opts.rule_for("qa_score"), (0.01, Direction::HigherIsBetter));
    }

    #[test]
    fn missing_config_is_an_error() {
        let err = CompareConfig::load("/nonexistent/compare.toml").unwrap_err();
        assert!(matches!(err, DiffError::ConfigRead { .. }));
    }
}
