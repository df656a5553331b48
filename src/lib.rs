// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Runway
//!
//! A multi-tool infrastructure-deployment orchestrator for AWS
//! environments.
//!
//! ## Overview
//!
//! Runway reads a declarative `runway.yml` describing deployments, AWS
//! regions, and infrastructure-as-code modules (Terraform, CloudFormation,
//! Serverless Framework, CDK, SAM, Kubernetes, static sites) and executes
//! `deploy`/`destroy`/`plan`/`init` across them:
//!
//! - In the declared order, reversed structurally for `destroy`
//! - With the configured concurrency (parallel regions, parallel module
//!   groups) under join-barrier semantics
//! - Under the right AWS identity (assume-role scope plus account id/alias
//!   validation)
//! - Only where the current deploy environment, account, and region pass
//!   each module's environment gate
//!
//! ## Architecture
//!
//! Every concurrent unit of work owns a private copy of its
//! [`environment::DeployEnvironment`], and every tool subprocess runs with
//! an explicit working directory and environment map; no process-global
//! state is mutated for context propagation.
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing and validation
//! - [`environment`]: Deploy-environment detection
//! - [`variables`]: Lazy `${lookup ...}` resolution
//! - [`path`]: Module path parsing and remote-source fetching
//! - [`module`]: Gating, type resolution, handlers, module execution
//! - [`deployment`]: Deployment execution and region fan-out
//! - [`aws`]: Credential facade and account validation
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! deployments:
//!   - name: app
//!     regions:
//!       - us-east-1
//!     assume_role: arn:aws:iam::111111111111:role/deploy
//!     modules:
//!       - backend.tf
//!       - name: site
//!         path: site.web
//!         environments:
//!           prod: true
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod aws;
pub mod cli;
pub mod config;
pub mod context;
pub mod deployment;
pub mod environment;
pub mod error;
pub mod module;
pub mod path;
pub mod variables;

pub(crate) mod fanout;

// ============================================================================
// Re-exports
// ============================================================================

pub use aws::{AccountValidator, AwsFacade, StsFacade};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, RunwayConfig};
pub use context::{Action, RunContext};
pub use deployment::{Deployment, DeploymentRunner, RunReport};
pub use environment::{DeployEnvironment, DetectOptions, NameDerivation};
pub use error::{Result, RunwayError};
pub use module::{HandlerRegistry, ModuleHandler, ModuleRunner, ModuleType};
pub use path::{FetcherRegistry, ModulePath, SourceFetcher};
pub use variables::{LookupHandler, LookupRegistry, Variable};
