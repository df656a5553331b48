//! Module execution: gating, type resolution, handlers, and the runner.

pub mod gate;
pub mod handlers;
pub mod runner;
pub mod type_resolver;

pub use gate::{GateContext, GateDefinition, GateOutcome};
pub use handlers::{HandlerPayload, HandlerRegistry, ModuleHandler};
pub use runner::{DeploymentDefaults, ModuleRunner, ModuleStats};
pub use type_resolver::ModuleType;
