//! Configuration definition types for the orchestrator.
//!
//! These types map to the `runway.yml` file. Fields that may contain
//! `${lookup ...}` syntax are kept as raw [`serde_json::Value`]s; the
//! executors wrap them in [`crate::variables::Variable`] and resolve them
//! in two phases before reading.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ConfigError, Result};

/// The root configuration structure for a run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunwayConfig {
    /// Ordered list of deployments.
    pub deployments: Vec<DeploymentDefinition>,
    /// Inline variables document, merged over the variables file.
    #[serde(default)]
    pub variables: Value,
    /// Skip git-branch derivation of the deploy environment.
    #[serde(default)]
    pub ignore_git_branch: bool,
    /// Treat a missing environment entry as "skip" instead of deferring to
    /// the module handler.
    #[serde(default)]
    pub strict_environments: bool,
}

/// A named, ordered group of modules plus its target regions.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeploymentDefinition {
    /// Deployment name; defaulted by the parser when omitted.
    #[serde(default)]
    pub name: Option<String>,
    /// Ordered list of modules.
    #[serde(default)]
    pub modules: Vec<ModuleDefinition>,
    /// Regions executed sequentially. Mutually exclusive with
    /// `parallel_regions`.
    #[serde(default)]
    pub regions: Value,
    /// Regions executed concurrently. Mutually exclusive with `regions`.
    #[serde(default)]
    pub parallel_regions: Value,
    /// Assume-role configuration (ARN string, detailed map, or
    /// per-environment map).
    #[serde(default)]
    pub assume_role: Value,
    /// Expected AWS account id (literal or per-environment map).
    #[serde(default)]
    pub account_id: Value,
    /// Expected AWS account alias (literal or per-environment map).
    #[serde(default)]
    pub account_alias: Value,
    /// Environment-variable overrides applied to every module run.
    #[serde(default)]
    pub env_vars: Value,
    /// Default environment gating for modules without their own.
    #[serde(default)]
    pub environments: Value,
    /// Default parameters merged under each module's own.
    #[serde(default)]
    pub parameters: Value,
    /// Default handler options merged under each module's own.
    #[serde(default)]
    pub module_options: Value,
}

impl DeploymentDefinition {
    /// Returns the deployment name, falling back to a placeholder.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed_deployment")
    }

    /// Produces the structural reverse used by `destroy`: the module list
    /// and every parallel group's internal order are reversed before any
    /// execution begins. Region order is untouched.
    #[must_use]
    pub fn reversed(&self) -> Self {
        let mut reversed = self.clone();
        reversed.modules = self.modules.iter().rev().map(ModuleDefinition::reversed).collect();
        reversed
    }
}

/// A single executable module, or a parallel group of child modules.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "ModuleEntry")]
pub struct ModuleDefinition {
    /// Module name; defaulted from the path by the parser when omitted.
    pub name: Option<String>,
    /// Path definition (local or `source::uri//location?options`).
    pub path: Option<String>,
    /// Explicit handler type key, bypassing detection.
    pub module_type: Option<String>,
    /// Environment gating definition (bool, map, list, int, or string).
    pub environments: Value,
    /// Handler options.
    pub options: Value,
    /// Handler parameters.
    pub parameters: Value,
    /// Environment-variable overrides for this module only.
    pub env_vars: Value,
    /// Tags used for CLI filtering.
    pub tags: Vec<String>,
    /// Child modules executed as a parallel group. Mutually exclusive with
    /// `path`.
    pub parallel: Vec<ModuleDefinition>,
}

impl ModuleDefinition {
    /// Returns the module name, falling back to the path definition.
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some(path) = &self.path {
            return path.clone();
        }
        format!("parallel_group[{}]", self.parallel.len())
    }

    /// Reverses every parallel group's internal order, recursively.
    #[must_use]
    pub fn reversed(&self) -> Self {
        let mut reversed = self.clone();
        reversed.parallel = self.parallel.iter().rev().map(Self::reversed).collect();
        reversed
    }

    /// Returns true when every requested tag is present on this module.
    #[must_use]
    pub fn matches_tags(&self, tags: &[String]) -> bool {
        tags.iter().all(|tag| self.tags.contains(tag))
    }
}

/// Accepted YAML shapes for a module entry: a bare path string or a full
/// definition map.
#[derive(Deserialize)]
#[serde(untagged)]
enum ModuleEntry {
    Path(String),
    Full(RawModuleDefinition),
}

/// The full-map module shape, before shorthand normalization.
#[derive(Deserialize)]
struct RawModuleDefinition {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default, rename = "type")]
    module_type: Option<String>,
    #[serde(default)]
    environments: Value,
    #[serde(default)]
    options: Value,
    #[serde(default)]
    parameters: Value,
    #[serde(default)]
    env_vars: Value,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    parallel: Vec<ModuleDefinition>,
}

impl From<ModuleEntry> for ModuleDefinition {
    fn from(entry: ModuleEntry) -> Self {
        match entry {
            ModuleEntry::Path(path) => Self {
                name: None,
                path: Some(path),
                module_type: None,
                environments: Value::Null,
                options: Value::Null,
                parameters: Value::Null,
                env_vars: Value::Null,
                tags: Vec::new(),
                parallel: Vec::new(),
            },
            ModuleEntry::Full(raw) => Self {
                name: raw.name,
                path: raw.path,
                module_type: raw.module_type,
                environments: raw.environments,
                options: raw.options,
                parameters: raw.parameters,
                env_vars: raw.env_vars,
                tags: raw.tags,
                parallel: raw.parallel,
            },
        }
    }
}

/// Assume-role settings resolved for one deployment and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRole {
    /// ARN of the role to assume.
    pub role_arn: String,
    /// Session duration in seconds (900-43200).
    pub duration_seconds: i64,
    /// STS session name.
    pub session_name: String,
    /// Restore the previous credentials once the deployment finishes.
    pub revert_on_exit: bool,
}

/// Default assume-role session duration.
const DEFAULT_SESSION_DURATION: i64 = 3600;

/// Accepted assume-role session duration range.
const SESSION_DURATION_RANGE: std::ops::RangeInclusive<i64> = 900..=43_200;

/// Resolves an assume-role definition for the current environment.
///
/// Accepted shapes: a bare ARN string, a detailed map with an `arn` key,
/// or a per-environment map of either.
///
/// # Errors
///
/// Returns an error for out-of-range durations or unrecognized shapes.
pub fn assume_role_for_environment(
    value: &Value,
    environment: &str,
    deployment: &str,
) -> Result<Option<AssumeRole>> {
    match value {
        Value::Null => Ok(None),
        Value::String(arn) => Ok(Some(AssumeRole {
            role_arn: arn.clone(),
            duration_seconds: DEFAULT_SESSION_DURATION,
            session_name: default_session_name(),
            revert_on_exit: false,
        })),
        Value::Object(map) if map.contains_key("arn") => {
            let role_arn = map
                .get("arn")
                .and_then(Value::as_str)
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: format!("{deployment}.assume_role.arn"),
                    message: String::from("expected a string ARN"),
                })?
                .to_string();

            let duration_seconds = match map.get("duration") {
                None | Some(Value::Null) => DEFAULT_SESSION_DURATION,
                Some(Value::Number(n)) => n.as_i64().ok_or_else(|| ConfigError::InvalidValue {
                    field: format!("{deployment}.assume_role.duration"),
                    message: String::from("expected an integer number of seconds"),
                })?,
                Some(other) => {
                    return Err(ConfigError::InvalidValue {
                        field: format!("{deployment}.assume_role.duration"),
                        message: format!("unexpected value: {other}"),
                    }
                    .into());
                }
            };
            if !SESSION_DURATION_RANGE.contains(&duration_seconds) {
                return Err(ConfigError::InvalidAssumeRoleDuration {
                    seconds: duration_seconds,
                    deployment: deployment.to_string(),
                }
                .into());
            }

            let session_name = map
                .get("session_name")
                .and_then(Value::as_str)
                .map_or_else(default_session_name, ToString::to_string);

            let revert_on_exit = map
                .get("post_deploy_env_revert")
                .and_then(Value::as_bool)
                .unwrap_or(false);

            Ok(Some(AssumeRole {
                role_arn,
                duration_seconds,
                session_name,
                revert_on_exit,
            }))
        }
        Value::Object(map) => match map.get(environment) {
            None => Ok(None),
            Some(entry) => assume_role_for_environment(entry, environment, deployment),
        },
        other => Err(ConfigError::InvalidValue {
            field: format!("{deployment}.assume_role"),
            message: format!("unexpected value: {other}"),
        }
        .into()),
    }
}

/// Default STS session name, tagged with the local hostname.
fn default_session_name() -> String {
    hostname::get().map_or_else(
        |_| String::from("runway"),
        |host| format!("runway-{}", host.to_string_lossy()),
    )
}

/// Resolves a literal-or-per-environment expectation (account id/alias).
///
/// A scalar applies to every environment; a map applies per environment
/// name, with no entry meaning "no expectation for this environment".
#[must_use]
pub fn expected_for_environment(value: &Value, environment: &str) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get(environment).and_then(|entry| match entry {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }),
        _ => None,
    }
}

/// Resolves an `env_vars` definition into a flat map for the current
/// environment.
///
/// The definition is either a flat `KEY: value` map, or keyed by
/// environment name with a `*` default; the current environment's submap
/// wins, falling back to `*`.
///
/// # Errors
///
/// Returns an error when values are not scalars.
pub fn env_vars_for_environment(
    value: &Value,
    environment: &str,
) -> Result<HashMap<String, String>> {
    let Value::Object(map) = value else {
        if value.is_null() {
            return Ok(HashMap::new());
        }
        return Err(ConfigError::InvalidValue {
            field: String::from("env_vars"),
            message: String::from("expected a mapping"),
        }
        .into());
    };

    let keyed = map
        .get(environment)
        .or_else(|| map.get("*"))
        .and_then(Value::as_object);

    // A map whose values are all submaps is environment-keyed; no entry for
    // the current environment means no overrides, not a shape error.
    if keyed.is_none() && !map.is_empty() && map.values().all(Value::is_object) {
        return Ok(HashMap::new());
    }

    let flat = keyed.unwrap_or(map);
    let mut resolved = HashMap::with_capacity(flat.len());
    for (key, entry) in flat {
        let rendered = match entry {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => {
                return Err(ConfigError::InvalidValue {
                    field: format!("env_vars.{key}"),
                    message: format!("expected a scalar value, found: {other}"),
                }
                .into());
            }
        };
        resolved.insert(key.clone(), rendered);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_deployment() -> DeploymentDefinition {
        serde_yaml::from_str(
            r"
name: app
regions:
  - us-east-1
modules:
  - first.tf
  - name: group
    parallel:
      - a.cfn
      - b.cfn
  - last.k8s
",
        )
        .unwrap()
    }

    #[test]
    fn test_module_shorthand_becomes_path() {
        let deployment = sample_deployment();
        assert_eq!(deployment.modules[0].path.as_deref(), Some("first.tf"));
        assert!(deployment.modules[0].parallel.is_empty());
    }

    #[test]
    fn test_reversed_flips_modules_and_groups() {
        let deployment = sample_deployment();
        let reversed = deployment.reversed();

        assert_eq!(reversed.modules[0].path.as_deref(), Some("last.k8s"));
        assert_eq!(reversed.modules[2].path.as_deref(), Some("first.tf"));
        assert_eq!(reversed.modules[1].parallel[0].path.as_deref(), Some("b.cfn"));
        assert_eq!(reversed.regions, deployment.regions);
    }

    #[test]
    fn test_reversing_twice_restores_order() {
        let deployment = sample_deployment();
        assert_eq!(deployment.reversed().reversed(), deployment);
    }

    #[test]
    fn test_assume_role_bare_arn() {
        let role = assume_role_for_environment(
            &json!("arn:aws:iam::111111111111:role/deploy"),
            "dev",
            "app",
        )
        .unwrap()
        .unwrap();
        assert_eq!(role.role_arn, "arn:aws:iam::111111111111:role/deploy");
        assert_eq!(role.duration_seconds, 3600);
        assert!(!role.revert_on_exit);
    }

    #[test]
    fn test_assume_role_per_environment() {
        let value = json!({
            "dev": "arn:aws:iam::111111111111:role/dev-deploy",
            "prod": {"arn": "arn:aws:iam::222222222222:role/prod-deploy", "duration": 7200},
        });

        let dev = assume_role_for_environment(&value, "dev", "app").unwrap().unwrap();
        assert_eq!(dev.role_arn, "arn:aws:iam::111111111111:role/dev-deploy");

        let prod = assume_role_for_environment(&value, "prod", "app").unwrap().unwrap();
        assert_eq!(prod.duration_seconds, 7200);

        assert!(assume_role_for_environment(&value, "stage", "app").unwrap().is_none());
    }

    #[test]
    fn test_assume_role_duration_range_enforced() {
        let value = json!({"arn": "arn:aws:iam::1:role/x", "duration": 60});
        let err = assume_role_for_environment(&value, "dev", "app").unwrap_err();
        assert!(err.to_string().contains("900-43200"));
    }

    #[test]
    fn test_expected_for_environment_shapes() {
        assert_eq!(
            expected_for_environment(&json!("111111111111"), "dev"),
            Some(String::from("111111111111"))
        );
        assert_eq!(
            expected_for_environment(&json!(111_111_111_111_i64), "dev"),
            Some(String::from("111111111111"))
        );
        assert_eq!(
            expected_for_environment(&json!({"dev": "111111111111"}), "dev"),
            Some(String::from("111111111111"))
        );
        assert_eq!(expected_for_environment(&json!({"dev": "1"}), "prod"), None);
        assert_eq!(expected_for_environment(&Value::Null, "dev"), None);
    }

    #[test]
    fn test_env_vars_flat_map() {
        let vars = env_vars_for_environment(&json!({"FOO": "bar", "COUNT": 2}), "dev").unwrap();
        assert_eq!(vars.get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(vars.get("COUNT").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_env_vars_environment_keyed_with_default() {
        let value = json!({
            "dev": {"STAGE": "development"},
            "*": {"STAGE": "fallback"},
        });
        let dev = env_vars_for_environment(&value, "dev").unwrap();
        assert_eq!(dev.get("STAGE").map(String::as_str), Some("development"));

        let other = env_vars_for_environment(&value, "prod").unwrap();
        assert_eq!(other.get("STAGE").map(String::as_str), Some("fallback"));
    }

    #[test]
    fn test_tag_matching_requires_all() {
        let module: ModuleDefinition = serde_yaml::from_str(
            r"
path: app.tf
tags: [app, infra]
",
        )
        .unwrap();
        assert!(module.matches_tags(&[String::from("app")]));
        assert!(module.matches_tags(&[]));
        assert!(!module.matches_tags(&[String::from("app"), String::from("db")]));
    }
}
