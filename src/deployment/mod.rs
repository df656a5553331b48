//! Deployment execution: pre-process resolution and region fan-out.

pub mod runner;

use std::collections::HashMap;

use serde_json::Value;

use crate::aws::ExpectedAccount;
use crate::config::{
    assume_role_for_environment, env_vars_for_environment, expected_for_environment, AssumeRole,
    DeploymentDefinition, ModuleDefinition,
};
use crate::error::{ConfigError, Result};
use crate::module::ModuleStats;
use crate::variables::{ResolutionContext, Variable};

pub use runner::DeploymentRunner;

/// A deployment with its pre-process fields wrapped for resolution.
///
/// The pre-process phase covers everything that must be known before
/// region fan-out can even be planned: the region lists, assume-role and
/// account expectations, and environment-variable overrides. Reading any
/// of them before [`Deployment::resolve_pre_process`] is an
/// unresolved-variable error.
#[derive(Debug, Clone)]
pub struct Deployment {
    definition: DeploymentDefinition,
    regions: Variable,
    parallel_regions: Variable,
    assume_role: Variable,
    account_id: Variable,
    account_alias: Variable,
    env_vars: Variable,
}

/// The region list of a deployment plus its execution mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionPlan {
    /// Regions in declared order.
    pub regions: Vec<String>,
    /// Whether the regions may run concurrently.
    pub parallel: bool,
}

impl Deployment {
    /// Wraps a definition for execution.
    #[must_use]
    pub fn new(definition: DeploymentDefinition) -> Self {
        let name = definition.display_name().to_string();
        let wrap = |field: &str, value: &Value| Variable::new(format!("{name}.{field}"), value.clone());

        let regions = wrap("regions", &definition.regions);
        let parallel_regions = wrap("parallel_regions", &definition.parallel_regions);
        let assume_role = wrap("assume_role", &definition.assume_role);
        let account_id = wrap("account_id", &definition.account_id);
        let account_alias = wrap("account_alias", &definition.account_alias);
        let env_vars = wrap("env_vars", &definition.env_vars);

        Self {
            definition,
            regions,
            parallel_regions,
            assume_role,
            account_id,
            account_alias,
            env_vars,
        }
    }

    /// Returns the deployment name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.definition.display_name()
    }

    /// Returns the ordered module definitions.
    #[must_use]
    pub fn modules(&self) -> &[ModuleDefinition] {
        &self.definition.modules
    }

    /// Returns the underlying definition.
    #[must_use]
    pub const fn definition(&self) -> &DeploymentDefinition {
        &self.definition
    }

    /// Resolves the pre-process subset of fields.
    ///
    /// # Errors
    ///
    /// Returns an error if any lookup fails.
    pub fn resolve_pre_process(&mut self, rctx: &ResolutionContext<'_>) -> Result<()> {
        self.regions.resolve(rctx)?;
        self.parallel_regions.resolve(rctx)?;
        self.assume_role.resolve(rctx)?;
        self.account_id.resolve(rctx)?;
        self.account_alias.resolve(rctx)?;
        self.env_vars.resolve(rctx)?;
        Ok(())
    }

    /// Returns the region plan, enforcing the exactly-one-list invariant
    /// against the resolved values.
    ///
    /// # Errors
    ///
    /// Returns an error before pre-process resolution, when both lists are
    /// populated, or when neither is.
    pub fn regions(&self) -> Result<RegionPlan> {
        let sequential = region_list(self.regions.value()?, self.regions.name())?;
        let parallel = region_list(self.parallel_regions.value()?, self.parallel_regions.name())?;

        match (sequential.is_empty(), parallel.is_empty()) {
            (false, false) => Err(ConfigError::ConflictingRegions {
                deployment: self.name().to_string(),
            }
            .into()),
            (true, true) => Err(ConfigError::MissingRegions {
                deployment: self.name().to_string(),
            }
            .into()),
            (false, true) => Ok(RegionPlan {
                regions: sequential,
                parallel: false,
            }),
            (true, false) => Ok(RegionPlan {
                regions: parallel,
                parallel: true,
            }),
        }
    }

    /// Returns the assume-role settings for the environment, if configured.
    ///
    /// # Errors
    ///
    /// Returns an error before pre-process resolution or on an invalid
    /// definition shape.
    pub fn assume_role(&self, environment: &str) -> Result<Option<AssumeRole>> {
        assume_role_for_environment(self.assume_role.value()?, environment, self.name())
    }

    /// Returns the expected account identity for the environment.
    ///
    /// # Errors
    ///
    /// Returns an error before pre-process resolution.
    pub fn expected_account(&self, environment: &str) -> Result<ExpectedAccount> {
        Ok(ExpectedAccount {
            account_id: expected_for_environment(self.account_id.value()?, environment),
            account_alias: expected_for_environment(self.account_alias.value()?, environment),
        })
    }

    /// Returns the environment-variable overrides for the environment.
    ///
    /// # Errors
    ///
    /// Returns an error before pre-process resolution or on non-scalar
    /// values.
    pub fn env_var_overrides(&self, environment: &str) -> Result<HashMap<String, String>> {
        env_vars_for_environment(self.env_vars.value()?, environment)
    }
}

/// Interprets a resolved region-list value.
fn region_list(value: &Value, field: &str) -> Result<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        // A lookup may resolve to a single region name.
        Value::String(region) => Ok(vec![region.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(ToString::to_string).ok_or_else(|| {
                    ConfigError::InvalidValue {
                        field: field.to_string(),
                        message: format!("expected a region name string, found: {item}"),
                    }
                    .into()
                })
            })
            .collect(),
        other => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("expected a list of regions, found: {other}"),
        }
        .into()),
    }
}

/// Per-deployment outcome for the final report.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DeploymentSummary {
    /// Deployment name.
    pub name: String,
    /// Regions processed, in declared order.
    pub regions: Vec<String>,
    /// Whether the regions were eligible to run concurrently.
    pub parallel: bool,
    /// Module outcome counts across all regions.
    pub stats: ModuleStats,
}

/// Aggregate outcome of one `run_list` invocation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunReport {
    /// The action that ran.
    pub action: String,
    /// The deploy-environment name.
    pub environment: String,
    /// Per-deployment summaries, in execution order.
    pub deployments: Vec<DeploymentSummary>,
}

impl RunReport {
    /// Sums module counts across deployments.
    #[must_use]
    pub fn totals(&self) -> ModuleStats {
        let mut totals = ModuleStats::default();
        for deployment in &self.deployments {
            totals.absorb(deployment.stats);
        }
        totals
    }
}
