//! The deployment executor.
//!
//! Walks deployments in order (reversed for destroy), resolves their
//! pre-process configuration, enters the assume-role scope, validates the
//! account, and fans out across regions. Region fan-out is concurrent only
//! for `parallel_regions` in a non-interactive run on a POSIX host;
//! anything else degrades to sequential execution with a warning.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::aws::{AccountValidator, AwsFacade};
use crate::config::DeploymentDefinition;
use crate::context::{Action, RunContext};
use crate::error::{Result, RunwayError};
use crate::fanout::join_barrier;
use crate::module::{DeploymentDefaults, HandlerRegistry, ModuleRunner, ModuleStats};
use crate::path::FetcherRegistry;
use crate::variables::{LookupRegistry, Variable};

use super::{Deployment, DeploymentSummary, RunReport};

/// Executes a list of deployments for one action.
#[derive(Clone)]
pub struct DeploymentRunner {
    aws: Arc<dyn AwsFacade>,
    handlers: Arc<HandlerRegistry>,
    fetchers: Arc<FetcherRegistry>,
    lookups: Arc<LookupRegistry>,
}

impl DeploymentRunner {
    /// Creates a runner with the default handler, fetcher, and lookup
    /// registries.
    #[must_use]
    pub fn new(aws: Arc<dyn AwsFacade>) -> Self {
        Self {
            aws,
            handlers: Arc::new(HandlerRegistry::default()),
            fetchers: Arc::new(FetcherRegistry::default()),
            lookups: Arc::new(LookupRegistry::default()),
        }
    }

    /// Replaces the handler registry.
    #[must_use]
    pub fn with_handlers(mut self, handlers: Arc<HandlerRegistry>) -> Self {
        self.handlers = handlers;
        self
    }

    /// Replaces the source-fetcher registry.
    #[must_use]
    pub fn with_fetchers(mut self, fetchers: Arc<FetcherRegistry>) -> Self {
        self.fetchers = fetchers;
        self
    }

    /// Replaces the lookup registry.
    #[must_use]
    pub fn with_lookups(mut self, lookups: Arc<LookupRegistry>) -> Self {
        self.lookups = lookups;
        self
    }

    /// Runs every deployment in order for the context's action.
    ///
    /// For destroy, the deployment list, each deployment's module list, and
    /// each parallel group's internal order are reversed structurally
    /// before anything executes. Deployments with no modules are skipped
    /// with a warning.
    ///
    /// # Errors
    ///
    /// Returns the first failure; later deployments do not run.
    pub async fn run_list(
        &self,
        ctx: &RunContext,
        definitions: &[DeploymentDefinition],
    ) -> Result<RunReport> {
        let ordered: Vec<DeploymentDefinition> = if ctx.action == Action::Destroy {
            debug!("Destroy run: reversing deployment and module order");
            definitions
                .iter()
                .rev()
                .map(DeploymentDefinition::reversed)
                .collect()
        } else {
            definitions.to_vec()
        };

        let mut report = RunReport {
            action: ctx.action.to_string(),
            environment: ctx.env.name().to_string(),
            deployments: Vec::new(),
        };

        for definition in ordered {
            let mut deployment = Deployment::new(definition);
            deployment.resolve_pre_process(&ctx.resolution(&self.lookups))?;

            if deployment.modules().is_empty() {
                warn!("Skipping deployment '{}': no modules", deployment.name());
                continue;
            }

            let summary = self.run_deployment(ctx, &deployment).await?;
            report.deployments.push(summary);
        }

        Ok(report)
    }

    /// Runs one deployment: role scope, account validation, region fan-out.
    async fn run_deployment(
        &self,
        ctx: &RunContext,
        deployment: &Deployment,
    ) -> Result<DeploymentSummary> {
        let name = deployment.name().to_string();
        info!("Processing deployment: {name}");

        let environment = ctx.env.name().to_string();
        let plan = deployment.regions()?;
        let role = deployment.assume_role(&environment)?;
        let expected = deployment.expected_account(&environment)?;

        let mut deployment_ctx = ctx.copy();
        deployment_ctx
            .env
            .merge_vars(&deployment.env_var_overrides(&environment)?);

        let first_region = plan.regions.first().map(String::as_str);
        let credentials = match &role {
            Some(role) => {
                let creds = self.aws.assume_role(role, first_region).await?;
                creds.apply_to(&mut deployment_ctx.env);
                if role.revert_on_exit {
                    debug!("Assumed credentials are scoped to this deployment run");
                }
                Some(creds)
            }
            None => None,
        };

        let validator = AccountValidator::new(Arc::clone(&self.aws));
        deployment_ctx.account_id = validator
            .validate(&expected, credentials.as_ref(), first_region)
            .await?;

        let stats = if plan.parallel {
            if let Some(reason) = deployment_ctx.concurrency_block_reason() {
                warn!("Parallel regions of '{name}' will run sequentially: {reason}");
                self.run_regions_sequential(&deployment_ctx, deployment, &plan.regions)
                    .await?
            } else {
                self.run_regions_parallel(&deployment_ctx, deployment, &plan.regions)
                    .await?
            }
        } else {
            self.run_regions_sequential(&deployment_ctx, deployment, &plan.regions)
                .await?
        };

        Ok(DeploymentSummary {
            name,
            regions: plan.regions,
            parallel: plan.parallel,
            stats,
        })
    }

    /// Runs regions one at a time, fully completing each before the next.
    async fn run_regions_sequential(
        &self,
        ctx: &RunContext,
        deployment: &Deployment,
        regions: &[String],
    ) -> Result<ModuleStats> {
        let mut stats = ModuleStats::default();
        for region in regions {
            stats.absorb(
                self.run_region(ctx.for_region(region), deployment.definition().clone())
                    .await?,
            );
        }
        Ok(stats)
    }

    /// Runs regions concurrently with join-barrier semantics, bounded by
    /// the region concurrency limit.
    async fn run_regions_parallel(
        &self,
        ctx: &RunContext,
        deployment: &Deployment,
        regions: &[String],
    ) -> Result<ModuleStats> {
        info!(
            "Processing {} regions of '{}' in parallel (up to {} at a time)",
            regions.len(),
            deployment.name(),
            ctx.env.max_concurrent_regions()
        );

        let semaphore = Arc::new(Semaphore::new(ctx.env.max_concurrent_regions()));
        let mut join_set: JoinSet<Result<ModuleStats>> = JoinSet::new();

        for region in regions {
            let runner = self.clone();
            let region_ctx = ctx.for_region(region);
            let definition = deployment.definition().clone();
            let semaphore = Arc::clone(&semaphore);

            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| RunwayError::internal(e.to_string()))?;
                runner.run_region(region_ctx, definition).await
            });
        }

        let outputs = join_barrier(join_set).await?;
        let mut stats = ModuleStats::default();
        for output in outputs {
            stats.absorb(output);
        }
        Ok(stats)
    }

    /// Runs one deployment's modules in one region.
    ///
    /// The deployment-level defaults are resolved here, against the
    /// region-bound context, so region-dependent lookups see the right
    /// values.
    async fn run_region(
        &self,
        ctx: RunContext,
        definition: DeploymentDefinition,
    ) -> Result<ModuleStats> {
        info!(
            "Entering region {} for deployment '{}'",
            ctx.region(),
            definition.display_name()
        );

        let rctx = ctx.resolution(&self.lookups);
        let name = definition.display_name();

        let mut environments =
            Variable::new(format!("{name}.environments"), definition.environments.clone());
        let mut parameters =
            Variable::new(format!("{name}.parameters"), definition.parameters.clone());
        let mut module_options = Variable::new(
            format!("{name}.module_options"),
            definition.module_options.clone(),
        );
        environments.resolve(&rctx)?;
        parameters.resolve(&rctx)?;
        module_options.resolve(&rctx)?;

        let defaults = DeploymentDefaults {
            environments: environments.value()?.clone(),
            parameters: parameters.value()?.clone(),
            module_options: module_options.value()?.clone(),
        };

        let runner = ModuleRunner::new(
            Arc::clone(&self.handlers),
            Arc::clone(&self.fetchers),
            Arc::clone(&self.lookups),
        );
        runner.run_list(&ctx, &definition.modules, &defaults).await
    }
}

impl std::fmt::Debug for DeploymentRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentRunner")
            .field("handlers", &self.handlers)
            .field("fetchers", &self.fetchers)
            .field("lookups", &self.lookups)
            .finish_non_exhaustive()
    }
}
