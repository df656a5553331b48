//! Module execution.
//!
//! Runs one ordered list of modules for a region: resolves each module's
//! variables, evaluates its environment gate, resolves its path and type,
//! and dispatches the action to the resolved handler. A module defined as
//! a parallel group fans out to its children with the same join-barrier
//! semantics as region fan-out.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{env_vars_for_environment, ModuleDefinition};
use crate::context::RunContext;
use crate::error::{ConfigError, Result};
use crate::fanout::join_barrier;
use crate::path::{FetcherRegistry, ModulePath};
use crate::variables::{LookupRegistry, Variable};

use super::gate::{self, GateContext, GateDefinition};
use super::handlers::{HandlerPayload, HandlerRegistry};
use super::type_resolver;

/// Deployment-level defaults merged under every module's own values.
#[derive(Debug, Clone, Default)]
pub struct DeploymentDefaults {
    /// Default environment gating.
    pub environments: Value,
    /// Default parameters.
    pub parameters: Value,
    /// Default handler options.
    pub module_options: Value,
}

/// Counts of module outcomes for one run segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ModuleStats {
    /// Modules whose handler action ran.
    pub run: usize,
    /// Modules skipped by gating.
    pub skipped: usize,
}

impl ModuleStats {
    /// Folds another segment's counts into this one.
    pub fn absorb(&mut self, other: Self) {
        self.run += other.run;
        self.skipped += other.skipped;
    }
}

/// Boxed future used for the recursive module walk.
type ModuleFuture<'a> = Pin<Box<dyn Future<Output = Result<ModuleStats>> + Send + 'a>>;

/// Executes modules for one region.
#[derive(Debug, Clone)]
pub struct ModuleRunner {
    handlers: Arc<HandlerRegistry>,
    fetchers: Arc<FetcherRegistry>,
    lookups: Arc<LookupRegistry>,
}

impl ModuleRunner {
    /// Creates a runner over the given registries.
    #[must_use]
    pub const fn new(
        handlers: Arc<HandlerRegistry>,
        fetchers: Arc<FetcherRegistry>,
        lookups: Arc<LookupRegistry>,
    ) -> Self {
        Self {
            handlers,
            fetchers,
            lookups,
        }
    }

    /// Runs an ordered list of modules sequentially, preserving declared
    /// order. Destroy-order reversal has already been applied structurally
    /// by the deployment executor.
    ///
    /// # Errors
    ///
    /// Returns the first module failure; later modules do not run.
    pub async fn run_list(
        &self,
        ctx: &RunContext,
        modules: &[ModuleDefinition],
        defaults: &DeploymentDefaults,
    ) -> Result<ModuleStats> {
        let mut stats = ModuleStats::default();
        for definition in modules {
            stats.absorb(self.run_module(ctx, definition, defaults).await?);
        }
        Ok(stats)
    }

    /// Runs one module or parallel group.
    fn run_module<'a>(
        &'a self,
        ctx: &'a RunContext,
        definition: &'a ModuleDefinition,
        defaults: &'a DeploymentDefaults,
    ) -> ModuleFuture<'a> {
        Box::pin(async move {
            let name = definition.display_name();

            if !definition.matches_tags(&ctx.filter_tags) {
                debug!("Module '{name}' does not match the requested tags");
                return Ok(ModuleStats::default());
            }

            if definition.parallel.is_empty() {
                self.run_single(ctx, definition, defaults, &name).await
            } else {
                self.run_children(ctx, definition, defaults, &name).await
            }
        })
    }

    /// Resolves, gates, and executes a single module.
    async fn run_single(
        &self,
        ctx: &RunContext,
        definition: &ModuleDefinition,
        defaults: &DeploymentDefaults,
        name: &str,
    ) -> Result<ModuleStats> {
        let rctx = ctx.resolution(&self.lookups);

        let mut environments = Variable::new(
            format!("{name}.environments"),
            definition.environments.clone(),
        );
        let mut options = Variable::new(format!("{name}.options"), definition.options.clone());
        let mut parameters =
            Variable::new(format!("{name}.parameters"), definition.parameters.clone());
        let mut env_vars = Variable::new(format!("{name}.env_vars"), definition.env_vars.clone());
        environments.resolve(&rctx)?;
        options.resolve(&rctx)?;
        parameters.resolve(&rctx)?;
        env_vars.resolve(&rctx)?;

        let gate_value = gate::merge_definitions(&defaults.environments, environments.value()?);
        let gate_definition = GateDefinition::from_value(&gate_value);
        let outcome = gate::evaluate(
            gate_definition.as_ref(),
            &GateContext {
                environment: ctx.env.name(),
                account_id: ctx.account_id.as_deref(),
                region: ctx.region(),
                strict: ctx.strict_environments,
            },
        );

        if let gate::GateOutcome::Disabled(reason) = &outcome {
            info!("Skipped module '{name}' ({reason})");
            return Ok(ModuleStats {
                run: 0,
                skipped: 1,
            });
        }

        let path_definition = definition.path.as_deref().ok_or_else(|| {
            ConfigError::MissingModuleSource {
                module: name.to_string(),
            }
        })?;
        let module_path = ModulePath::parse(path_definition)?;
        let module_root = module_path
            .module_root(ctx.env.root_dir(), &self.fetchers)
            .await?;
        if !module_root.is_dir() {
            return Err(ConfigError::validation(
                format!("module root '{}' does not exist", module_root.display()),
                name,
            )
            .into());
        }

        let module_type =
            type_resolver::resolve(&module_root, definition.module_type.as_deref(), name)?;

        let mut handler_env = ctx.env.copy();
        let overrides = env_vars_for_environment(env_vars.value()?, ctx.env.name())?;
        handler_env.merge_vars(&overrides);

        let payload = HandlerPayload {
            name: name.to_string(),
            module_root,
            environment: ctx.env.name().to_string(),
            region: ctx.region().to_string(),
            env_vars: handler_env.vars().clone(),
            options: merge_maps(&defaults.module_options, options.value()?),
            parameters: merge_maps(&defaults.parameters, parameters.value()?),
            explicitly_enabled: outcome.explicitly_enabled(),
        };

        info!(
            "Running {} for module '{name}' ({module_type}) in {}",
            ctx.action,
            ctx.region()
        );
        let handler = self.handlers.build(module_type, payload)?;
        handler.run(ctx.action).await?;

        Ok(ModuleStats {
            run: 1,
            skipped: 0,
        })
    }

    /// Fans out to a parallel group's children.
    ///
    /// Children run concurrently when the context allows it, bounded by the
    /// module concurrency limit, with join-barrier error semantics.
    /// Otherwise they run sequentially in declared order.
    async fn run_children(
        &self,
        ctx: &RunContext,
        definition: &ModuleDefinition,
        defaults: &DeploymentDefaults,
        name: &str,
    ) -> Result<ModuleStats> {
        if let Some(reason) = ctx.concurrency_block_reason() {
            warn!("Parallel modules in '{name}' will run sequentially: {reason}");
            let mut stats = ModuleStats::default();
            for child in &definition.parallel {
                stats.absorb(self.run_module(ctx, child, defaults).await?);
            }
            return Ok(stats);
        }

        info!(
            "Processing modules of '{name}' in parallel (up to {} at a time)",
            ctx.env.max_concurrent_modules()
        );

        let semaphore = Arc::new(Semaphore::new(ctx.env.max_concurrent_modules()));
        let mut join_set: JoinSet<Result<ModuleStats>> = JoinSet::new();

        for child in &definition.parallel {
            let runner = self.clone();
            let child_ctx = ctx.copy();
            let child_definition = child.clone();
            let child_defaults = defaults.clone();
            let semaphore = Arc::clone(&semaphore);

            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| crate::error::RunwayError::internal(e.to_string()))?;
                runner
                    .run_module(&child_ctx, &child_definition, &child_defaults)
                    .await
            });
        }

        let outputs = join_barrier(join_set).await?;
        let mut stats = ModuleStats::default();
        for output in outputs {
            stats.absorb(output);
        }
        Ok(stats)
    }
}

/// Merges two map-shaped values, the overlay winning per key.
fn merge_maps(base: &Value, overlay: &Value) -> serde_json::Map<String, Value> {
    let mut merged = base.as_object().cloned().unwrap_or_default();
    if let Some(overlay) = overlay.as_object() {
        for (key, value) in overlay {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_maps_module_wins() {
        let merged = merge_maps(
            &json!({"namespace": "default", "retain": true}),
            &json!({"namespace": "app"}),
        );
        assert_eq!(merged.get("namespace"), Some(&json!("app")));
        assert_eq!(merged.get("retain"), Some(&json!(true)));
    }

    #[test]
    fn test_merge_maps_tolerates_null_sides() {
        let merged = merge_maps(&Value::Null, &json!({"a": 1}));
        assert_eq!(merged.get("a"), Some(&json!(1)));
        assert!(merge_maps(&Value::Null, &Value::Null).is_empty());
    }

    #[test]
    fn test_stats_absorb() {
        let mut stats = ModuleStats { run: 1, skipped: 0 };
        stats.absorb(ModuleStats { run: 2, skipped: 3 });
        assert_eq!(stats, ModuleStats { run: 3, skipped: 3 });
    }

    #[tokio::test]
    async fn test_gated_module_is_skipped_not_run() {
        let runner = ModuleRunner::new(
            Arc::new(HandlerRegistry::default()),
            Arc::new(FetcherRegistry::default()),
            Arc::new(LookupRegistry::default()),
        );

        let env = crate::environment::DeployEnvironment::fixture("dev", true, "/tmp");
        let ctx = RunContext::new(
            crate::context::Action::Deploy,
            env,
            false,
            vec![],
            Value::Null,
        );

        let definition: ModuleDefinition = serde_yaml::from_str(
            r"
name: gated
path: missing.tf
environments: false
",
        )
        .unwrap();

        let stats = runner
            .run_list(&ctx, &[definition], &DeploymentDefaults::default())
            .await
            .unwrap();
        assert_eq!(stats, ModuleStats { run: 0, skipped: 1 });
    }

    #[tokio::test]
    async fn test_account_mismatch_skips_with_reason() {
        let runner = ModuleRunner::new(
            Arc::new(HandlerRegistry::default()),
            Arc::new(FetcherRegistry::default()),
            Arc::new(LookupRegistry::default()),
        );

        let env = crate::environment::DeployEnvironment::fixture("prod", true, "/tmp");
        let mut ctx = RunContext::new(
            crate::context::Action::Deploy,
            env,
            false,
            vec![],
            Value::Null,
        );
        ctx.account_id = Some(String::from("222222222222"));
        ctx.region = Some(String::from("us-east-1"));

        let definition: ModuleDefinition = serde_yaml::from_str(
            r#"
name: prod-only
path: missing.tf
environments:
  prod: "111111111111"
"#,
        )
        .unwrap();

        let stats = runner
            .run_list(&ctx, &[definition], &DeploymentDefaults::default())
            .await
            .unwrap();
        assert_eq!(stats, ModuleStats { run: 0, skipped: 1 });
    }

    #[tokio::test]
    async fn test_tag_filter_excludes_module() {
        let runner = ModuleRunner::new(
            Arc::new(HandlerRegistry::default()),
            Arc::new(FetcherRegistry::default()),
            Arc::new(LookupRegistry::default()),
        );

        let env = crate::environment::DeployEnvironment::fixture("dev", true, "/tmp");
        let ctx = RunContext::new(
            crate::context::Action::Deploy,
            env,
            false,
            vec![String::from("db")],
            Value::Null,
        );

        let definition: ModuleDefinition = serde_yaml::from_str(
            r"
name: app
path: missing.tf
tags: [frontend]
",
        )
        .unwrap();

        let stats = runner
            .run_list(&ctx, &[definition], &DeploymentDefaults::default())
            .await
            .unwrap();
        assert_eq!(stats, ModuleStats::default());
    }
}
