//! The run configuration: the recognized options controlling a single
//! `repair` invocation, deserialized from TOML via `toml_edit`, following
//! the same validated-config-struct shape used elsewhere in this crate.

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// How `TestPrioritization` reorders a location's related tests after a
/// failing candidate.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TestPrioritization {
    #[default]
    Original,
    MaxFailing,
}

/// Which cost function the generator's search space is sorted by.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PatchPrioritization {
    #[default]
    SyntacticDiff,
    SemanticDiff,
}

/// The recognized configuration options, one field per option.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RepairConfig {
    /// Enable value-based test-equivalence partitioning.
    pub value_teq: bool,
    pub test_prioritization: TestPrioritization,
    pub patch_prioritization: PatchPrioritization,
    /// Find every plausible patch instead of stopping at the first.
    pub generate_all: bool,
    /// Cap on the number of plausible patches collected when `generate_all`.
    pub output_top: Option<usize>,
    /// When `generate_all`, keep at most one patch per schema application.
    pub output_one_per_location: bool,
    /// Re-apply and re-test each plausible patch source-level before
    /// accepting it.
    pub validate_patches: bool,
    pub verbose: bool,
    /// Scratch directory for the runtime artifacts and partition channel.
    pub data_dir: PathBuf,
    /// Where to dump the prioritized search space as JSON, if at all.
    pub search_space_file: Option<PathBuf>,
    /// Dump every candidate as a numbered `.patch` file without running any
    /// tests (used for inspection; short-circuits the search).
    pub dump: bool,
}

impl Default for RepairConfig {
    fn default() -> Self {
        RepairConfig {
            value_teq: true,
            test_prioritization: TestPrioritization::default(),
            patch_prioritization: PatchPrioritization::default(),
            generate_all: false,
            output_top: None,
            output_one_per_location: false,
            validate_patches: false,
            verbose: false,
            data_dir: PathBuf::from(".f1x"),
            search_space_file: None,
            dump: false,
        }
    }
}

impl RepairConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.data_dir.as_os_str().is_empty() {
            issues.push(ValidationIssue::MissingField { field: "data_dir" });
        }

        if let Some(top) = self.output_top {
            if top == 0 {
                issues.push(ValidationIssue::InvalidCombo {
                    message: "output_top, if set, must be at least 1".to_string(),
                });
            }
            if !self.generate_all {
                issues.push(ValidationIssue::InvalidCombo {
                    message: "output_top only applies when generate_all is set".to_string(),
                });
            }
        }

        if self.output_one_per_location && !self.generate_all {
            issues.push(ValidationIssue::InvalidCombo {
                message: "output_one_per_location only applies when generate_all is set"
                    .to_string(),
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    MissingField { field: &'static str },
    InvalidCombo { message: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { field } => {
                write!(f, "missing required configuration field '{field}'")
            }
            ValidationIssue::InvalidCombo { message } => {
                write!(f, "invalid configuration: {message}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RepairConfig::default().validate().is_ok());
    }

    #[test]
    fn output_top_without_generate_all_is_rejected() {
        let config = RepairConfig {
            output_top: Some(5),
            ..RepairConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_output_top_is_rejected() {
        let config = RepairConfig {
            generate_all: true,
            output_top: Some(0),
            ..RepairConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_roundtrip_deserializes_recognized_options() {
        let toml = r#"
            value_teq = false
            test_prioritization = "max-failing"
            patch_prioritization = "semantic-diff"
            generate_all = true
            output_top = 3
            data_dir = "/tmp/f1x-data"
        "#;
        let config: RepairConfig = toml_edit::de::from_str(toml).unwrap();
        assert!(!config.value_teq);
        assert_eq!(config.test_prioritization, TestPrioritization::MaxFailing);
        assert_eq!(config.patch_prioritization, PatchPrioritization::SemanticDiff);
        assert_eq!(config.output_top, Some(3));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/f1x-data"));
    }
}
