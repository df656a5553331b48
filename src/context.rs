//! Per-task run context.
//!
//! A [`RunContext`] carries everything one unit of work needs: the action,
//! an owned [`DeployEnvironment`] copy, the variables document, tag
//! filters, and the current region/account once known. Contexts are copied
//! at every fork point so concurrent tasks never share mutable state.

use std::sync::Arc;

use serde_json::Value;

use crate::environment::DeployEnvironment;
use crate::variables::{LookupRegistry, ResolutionContext};

/// The orchestration action being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Create or update infrastructure.
    Deploy,
    /// Tear infrastructure down, in reverse order.
    Destroy,
    /// Show what a deploy would change.
    Plan,
    /// Run per-tool initialization.
    Init,
}

impl Action {
    /// Returns the lowercase action name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Deploy => "deploy",
            Self::Destroy => "destroy",
            Self::Plan => "plan",
            Self::Init => "init",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Context threaded through one unit of work.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// The action being executed.
    pub action: Action,
    /// This task's private environment.
    pub env: DeployEnvironment,
    /// Treat missing environment entries as "skip" during gating.
    pub strict_environments: bool,
    /// Tags a module must carry to be included in the run.
    pub filter_tags: Arc<Vec<String>>,
    /// The run's variables document.
    pub variables: Arc<Value>,
    /// The region this task is operating in, once fanned out.
    pub region: Option<String>,
    /// The validated AWS account id, once known.
    pub account_id: Option<String>,
}

impl RunContext {
    /// Creates the root context for a run.
    #[must_use]
    pub fn new(
        action: Action,
        env: DeployEnvironment,
        strict_environments: bool,
        filter_tags: Vec<String>,
        variables: Value,
    ) -> Self {
        Self {
            action,
            env,
            strict_environments,
            filter_tags: Arc::new(filter_tags),
            variables: Arc::new(variables),
            region: None,
            account_id: None,
        }
    }

    /// Produces an independent copy for a concurrent task.
    #[must_use]
    pub fn copy(&self) -> Self {
        let mut copied = self.clone();
        copied.env = self.env.copy();
        copied
    }

    /// Produces a copy bound to a region, exporting the region variables
    /// tool subprocesses expect.
    #[must_use]
    pub fn for_region(&self, region: &str) -> Self {
        let mut copied = self.copy();
        copied.region = Some(region.to_string());
        copied.env.set_var("AWS_REGION", region);
        copied.env.set_var("AWS_DEFAULT_REGION", region);
        copied
    }

    /// Returns the current region, or an empty string before region
    /// fan-out.
    #[must_use]
    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or("")
    }

    /// Returns why concurrent fan-out is blocked, or `None` when allowed.
    ///
    /// Concurrency requires a non-interactive run (prompts cannot race on
    /// one terminal) and a POSIX host; a blocked fan-out degrades to
    /// sequential execution, never to an error.
    #[must_use]
    pub fn concurrency_block_reason(&self) -> Option<&'static str> {
        if !self.env.ci() {
            return Some("interactive session");
        }
        if !cfg!(unix) {
            return Some("non-POSIX host");
        }
        None
    }

    /// Builds a variable-resolution context over this task's state.
    #[must_use]
    pub fn resolution<'a>(&'a self, lookups: &'a LookupRegistry) -> ResolutionContext<'a> {
        ResolutionContext {
            environment: &self.env,
            variables: &self.variables,
            lookups,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_names() {
        assert_eq!(Action::Deploy.name(), "deploy");
        assert_eq!(Action::Destroy.to_string(), "destroy");
    }

    #[test]
    fn test_for_region_exports_region_vars() {
        let env = DeployEnvironment::fixture("dev", true, "/tmp");
        let ctx = RunContext::new(Action::Deploy, env, false, vec![], Value::Null);

        let regional = ctx.for_region("us-west-2");
        assert_eq!(regional.region(), "us-west-2");
        assert_eq!(regional.env.var("AWS_REGION"), Some("us-west-2"));
        assert_eq!(regional.env.var("AWS_DEFAULT_REGION"), Some("us-west-2"));

        assert!(ctx.env.var("AWS_REGION").is_none());
        assert_eq!(ctx.region(), "");
    }

    #[test]
    fn test_interactive_context_blocks_concurrency() {
        let env = DeployEnvironment::fixture("dev", false, "/tmp");
        let ctx = RunContext::new(Action::Deploy, env, false, vec![], Value::Null);
        assert_eq!(ctx.concurrency_block_reason(), Some("interactive session"));
    }

    #[cfg(unix)]
    #[test]
    fn test_ci_context_allows_concurrency() {
        let env = DeployEnvironment::fixture("dev", true, "/tmp");
        let ctx = RunContext::new(Action::Deploy, env, false, vec![], Value::Null);
        assert_eq!(ctx.concurrency_block_reason(), None);
    }
}
