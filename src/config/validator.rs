//! Structural validation of parsed configuration.
//!
//! The validator enforces the invariants that must hold before any
//! execution is planned: exactly one region list per deployment, exactly
//! one source (path or parallel children) per module, known explicit type
//! keys, and in-range assume-role durations.

use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::module::ModuleType;

use super::spec::{DeploymentDefinition, ModuleDefinition, RunwayConfig};

/// Validator for parsed configuration.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Result of a validation pass: errors abort, warnings accumulate.
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// Non-fatal findings worth surfacing to the user.
    pub warnings: Vec<String>,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first structural error found.
    pub fn validate(&self, config: &RunwayConfig) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();

        if config.deployments.is_empty() {
            return Err(ConfigError::validation_general(
                "configuration defines no deployments",
            )
            .into());
        }

        let mut seen_names: Vec<&str> = Vec::new();
        for deployment in &config.deployments {
            let name = deployment.display_name();
            if seen_names.contains(&name) {
                report
                    .warnings
                    .push(format!("duplicate deployment name: {name}"));
            }
            seen_names.push(name);

            Self::validate_deployment(deployment, &mut report)?;
        }

        debug!(
            "Configuration valid ({} warning(s))",
            report.warnings.len()
        );
        Ok(report)
    }

    /// Validates one deployment.
    fn validate_deployment(
        deployment: &DeploymentDefinition,
        report: &mut ValidationReport,
    ) -> Result<()> {
        let name = deployment.display_name();

        let has_regions = region_list_present(&deployment.regions);
        let has_parallel = region_list_present(&deployment.parallel_regions);
        if has_regions && has_parallel {
            return Err(ConfigError::ConflictingRegions {
                deployment: name.to_string(),
            }
            .into());
        }
        if !has_regions && !has_parallel {
            return Err(ConfigError::MissingRegions {
                deployment: name.to_string(),
            }
            .into());
        }

        if deployment.modules.is_empty() {
            report
                .warnings
                .push(format!("deployment '{name}' has no modules"));
        }

        for module in &deployment.modules {
            Self::validate_module(module)?;
        }

        Ok(())
    }

    /// Validates one module, recursing into parallel children.
    fn validate_module(module: &ModuleDefinition) -> Result<()> {
        let name = module.display_name();

        let has_path = module.path.is_some();
        let has_children = !module.parallel.is_empty();
        if has_path && has_children {
            return Err(ConfigError::ConflictingModuleSource { module: name }.into());
        }
        if !has_path && !has_children {
            return Err(ConfigError::MissingModuleSource { module: name }.into());
        }

        if let Some(type_key) = &module.module_type {
            if ModuleType::from_key(type_key).is_none() {
                return Err(ConfigError::UnknownModuleType {
                    type_name: type_key.clone(),
                    module: name,
                }
                .into());
            }
        }

        for child in &module.parallel {
            Self::validate_module(child)?;
        }

        Ok(())
    }
}

/// A region list is "present" when it is a non-empty array or a lookup
/// string that resolves to one later.
fn region_list_present(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Array(items) => !items.is_empty(),
        serde_json::Value::String(s) => !s.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::error::RunwayError;

    fn parse(yaml: &str) -> RunwayConfig {
        ConfigParser::new().parse_yaml(yaml, None).unwrap()
    }

    #[test]
    fn test_valid_config_passes() {
        let config = parse(
            r"
deployments:
  - name: app
    regions: [us-east-1]
    modules: [sampleapp.tf]
",
        );
        let report = ConfigValidator::new().validate(&config).unwrap();
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_both_region_lists_rejected() {
        let config = parse(
            r"
deployments:
  - name: app
    regions: [us-east-1]
    parallel_regions: [us-west-2]
    modules: [sampleapp.tf]
",
        );
        let err = ConfigValidator::new().validate(&config).unwrap_err();
        assert!(matches!(
            err,
            RunwayError::Config(ConfigError::ConflictingRegions { .. })
        ));
    }

    #[test]
    fn test_missing_region_lists_rejected() {
        let config = parse(
            r"
deployments:
  - name: app
    modules: [sampleapp.tf]
",
        );
        let err = ConfigValidator::new().validate(&config).unwrap_err();
        assert!(matches!(
            err,
            RunwayError::Config(ConfigError::MissingRegions { .. })
        ));
    }

    #[test]
    fn test_lookup_region_list_counts_as_present() {
        let config = parse(
            r"
deployments:
  - name: app
    regions: ${var regions}
    modules: [sampleapp.tf]
",
        );
        assert!(ConfigValidator::new().validate(&config).is_ok());
    }

    #[test]
    fn test_module_with_path_and_children_rejected() {
        let config = parse(
            r"
deployments:
  - name: app
    regions: [us-east-1]
    modules:
      - name: broken
        path: app.tf
        parallel:
          - other.tf
",
        );
        let err = ConfigValidator::new().validate(&config).unwrap_err();
        assert!(matches!(
            err,
            RunwayError::Config(ConfigError::ConflictingModuleSource { .. })
        ));
    }

    #[test]
    fn test_unknown_explicit_type_rejected() {
        let config = parse(
            r"
deployments:
  - name: app
    regions: [us-east-1]
    modules:
      - name: app
        path: app.xyz
        type: pulumi
",
        );
        let err = ConfigValidator::new().validate(&config).unwrap_err();
        assert!(matches!(
            err,
            RunwayError::Config(ConfigError::UnknownModuleType { .. })
        ));
    }

    #[test]
    fn test_empty_deployment_warns() {
        let config = parse(
            r"
deployments:
  - name: app
    regions: [us-east-1]
",
        );
        let report = ConfigValidator::new().validate(&config).unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("no modules"));
    }
}
