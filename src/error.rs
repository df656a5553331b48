//! Error types for the Runway orchestration core.
//!
//! This module provides a comprehensive error hierarchy for all phases of a
//! run: configuration, deploy-environment detection, variable resolution,
//! module-path handling, module execution, and credential validation.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Runway orchestrator.
#[derive(Debug, Error)]
pub enum RunwayError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Deploy-environment detection errors.
    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    /// Variable and lookup resolution errors.
    #[error("Variable error: {0}")]
    Variable(#[from] VariableError),

    /// Module-path parsing and source-fetch errors.
    #[error("Module path error: {0}")]
    Path(#[from] PathError),

    /// Module execution errors.
    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    /// Credential and account-validation errors.
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// A deployment defines both `regions` and `parallel_regions`.
    #[error("Deployment '{deployment}' defines both regions and parallel_regions; exactly one must be used")]
    ConflictingRegions {
        /// Name of the offending deployment.
        deployment: String,
    },

    /// A deployment defines neither `regions` nor `parallel_regions`.
    #[error("Deployment '{deployment}' defines neither regions nor parallel_regions")]
    MissingRegions {
        /// Name of the offending deployment.
        deployment: String,
    },

    /// A module defines both a path and parallel child modules.
    #[error("Module '{module}' defines both a path and parallel child modules; exactly one must be used")]
    ConflictingModuleSource {
        /// Name of the offending module.
        module: String,
    },

    /// A module defines neither a path nor parallel child modules.
    #[error("Module '{module}' defines neither a path nor parallel child modules")]
    MissingModuleSource {
        /// Name of the offending module.
        module: String,
    },

    /// An explicit module type key is not in the handler table.
    #[error("Unknown module type '{type_name}' for module '{module}'")]
    UnknownModuleType {
        /// The unknown type key.
        type_name: String,
        /// Name of the offending module.
        module: String,
    },

    /// Assume-role duration is outside the accepted range.
    #[error("Assume-role duration {seconds}s for deployment '{deployment}' is outside the accepted range (900-43200)")]
    InvalidAssumeRoleDuration {
        /// The configured duration in seconds.
        seconds: i64,
        /// Name of the offending deployment.
        deployment: String,
    },

    /// A configuration value has an unexpected shape.
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue {
        /// The offending field.
        field: String,
        /// Description of the problem.
        message: String,
    },
}

/// Deploy-environment detection errors.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    /// The git HEAD is detached, so no branch name is available.
    #[error(
        "Git repository is in a detached-HEAD state so the deploy environment cannot \
         be determined from the branch; set the DEPLOY_ENVIRONMENT environment \
         variable or pass --deploy-environment to continue"
    )]
    DetachedHead,

    /// Reading user input during environment confirmation failed.
    #[error("Failed to read deploy-environment confirmation: {message}")]
    PromptFailed {
        /// Description of the IO failure.
        message: String,
    },
}

/// Variable and lookup resolution errors.
#[derive(Debug, Error)]
pub enum VariableError {
    /// A variable was read before `resolve()` ran.
    #[error("Variable '{name}' was read before it was resolved")]
    Unresolved {
        /// Name of the variable.
        name: String,
    },

    /// A lookup references a handler that is not registered.
    #[error("Unknown lookup '{lookup}' in variable '{variable}'")]
    UnknownLookup {
        /// The unregistered lookup name.
        lookup: String,
        /// The variable containing the lookup.
        variable: String,
    },

    /// A lookup query could not be satisfied.
    #[error("Lookup '{lookup} {query}' failed: {message}")]
    LookupFailed {
        /// The lookup handler name.
        lookup: String,
        /// The query string passed to the handler.
        query: String,
        /// Description of the failure.
        message: String,
    },

    /// A lookup expression is malformed.
    #[error("Malformed lookup expression '{expression}' in variable '{variable}'")]
    MalformedLookup {
        /// The offending expression.
        expression: String,
        /// The variable containing the expression.
        variable: String,
    },

    /// A complex value cannot be interpolated into the middle of a string.
    #[error("Lookup '{lookup}' in variable '{variable}' produced a non-scalar value that cannot be interpolated into a string")]
    NonScalarInterpolation {
        /// The lookup handler name.
        lookup: String,
        /// The variable containing the lookup.
        variable: String,
    },
}

/// Module-path parsing and source-fetch errors.
#[derive(Debug, Error)]
pub enum PathError {
    /// The path definition references an unregistered remote source.
    #[error("No fetcher is registered for remote source '{source_key}'")]
    UnknownSource {
        /// The unregistered source key.
        source_key: String,
    },

    /// A remote source fetch failed.
    #[error("Failed to fetch '{uri}' via source '{source_key}': {message}")]
    FetchFailed {
        /// The source key.
        source_key: String,
        /// The URI that failed to fetch.
        uri: String,
        /// Description of the failure.
        message: String,
    },

    /// A path definition could not be parsed.
    #[error("Invalid module path definition '{definition}': {message}")]
    InvalidDefinition {
        /// The raw path definition.
        definition: String,
        /// Description of the problem.
        message: String,
    },
}

/// Module execution errors.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// No module type could be determined for a directory.
    #[error("Could not determine the module type of '{path}'; set an explicit type or add tool marker files")]
    TypeUndetermined {
        /// The directory that was inspected.
        path: PathBuf,
    },

    /// The resolved handler does not support the requested action.
    #[error("Module handler '{handler}' does not support the '{action}' action")]
    UnsupportedAction {
        /// The handler type name.
        handler: String,
        /// The requested action.
        action: String,
    },

    /// A tool subprocess could not be spawned.
    #[error("Failed to spawn '{program}' for module '{module}': {message}")]
    SpawnFailed {
        /// The program that failed to start.
        program: String,
        /// Name of the module being executed.
        module: String,
        /// Description of the failure.
        message: String,
    },

    /// A tool subprocess exited with a non-zero status.
    #[error("'{program}' exited with status {code} for module '{module}'")]
    ToolFailed {
        /// The program that failed.
        program: String,
        /// Name of the module being executed.
        module: String,
        /// The exit code, or -1 if terminated by a signal.
        code: i32,
    },

    /// A required handler option is missing.
    #[error("Module '{module}' is missing required option '{option}'")]
    MissingOption {
        /// Name of the module.
        module: String,
        /// The missing option key.
        option: String,
    },
}

/// Credential and account-validation errors.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The current account id does not match the configured expectation.
    #[error("Account id mismatch: expected {expected}, currently {actual}")]
    AccountIdMismatch {
        /// The configured account id.
        expected: String,
        /// The account id of the active credentials.
        actual: String,
    },

    /// The configured alias is not among the current account's aliases.
    #[error("Account alias '{expected}' not found in the current account's aliases [{aliases}]")]
    AccountAliasMismatch {
        /// The configured alias.
        expected: String,
        /// Comma-separated aliases of the active account.
        aliases: String,
    },

    /// Assuming the configured IAM role failed.
    #[error("Failed to assume role '{role_arn}': {message}")]
    AssumeRoleFailed {
        /// The role ARN that could not be assumed.
        role_arn: String,
        /// Description of the failure.
        message: String,
    },

    /// The current AWS identity could not be determined.
    #[error("Failed to determine the current AWS account identity: {message}")]
    IdentityUnavailable {
        /// Description of the failure.
        message: String,
    },
}

/// Result type alias for Runway operations.
pub type Result<T> = std::result::Result<T, RunwayError>;

impl RunwayError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl VariableError {
    /// Creates an unresolved-variable error.
    #[must_use]
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self::Unresolved { name: name.into() }
    }
}

impl PathError {
    /// Creates a fetch failure for the given source and URI.
    #[must_use]
    pub fn fetch(
        source: impl Into<String>,
        uri: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::FetchFailed {
            source_key: source.into(),
            uri: uri.into(),
            message: message.into(),
        }
    }
}
