//! Configuration loading for `runway.yml`.
//!
//! Handles file discovery (walking up from the working directory), YAML
//! parsing, `.env` loading, environment-variable overrides, and the
//! optional variables sidecar file.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ConfigError, Result, RunwayError};

use super::spec::RunwayConfig;

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["runway.yml", "runway.yaml"];

/// Variables sidecar file names, searched next to the configuration file.
const VARIABLES_FILES: &[&str] = &["runway.variables.yml", "runway.variables.yaml"];

/// Configuration parser for loading the runway file.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving the `.env` and variables files.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving sidecar files.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<RunwayConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            RunwayError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<RunwayConfig> {
        debug!("Parsing YAML configuration");

        let mut config: RunwayConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            RunwayError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        Self::apply_env_overrides(&mut config);
        Self::normalize(&mut config);

        debug!(
            "Successfully parsed configuration with {} deployment(s)",
            config.deployments.len()
        );
        Ok(config)
    }

    /// Applies `RUNWAY_*` environment-variable overrides.
    fn apply_env_overrides(config: &mut RunwayConfig) {
        if let Ok(value) = std::env::var("RUNWAY_IGNORE_GIT_BRANCH") {
            debug!("Overriding ignore_git_branch from environment");
            config.ignore_git_branch = is_truthy(&value);
        }
        if let Ok(value) = std::env::var("RUNWAY_STRICT_ENVIRONMENTS") {
            debug!("Overriding strict_environments from environment");
            config.strict_environments = is_truthy(&value);
        }
    }

    /// Fills in default deployment and module names.
    fn normalize(config: &mut RunwayConfig) {
        for (index, deployment) in config.deployments.iter_mut().enumerate() {
            if deployment.name.is_none() {
                deployment.name = Some(format!("deployment_{}", index + 1));
            }
            for module in &mut deployment.modules {
                normalize_module_names(module);
            }
        }
    }

    /// Loads the variables document: the sidecar file, overlaid by the
    /// inline `variables` mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if a sidecar file exists but cannot be parsed.
    pub fn load_variables(&self, config: &RunwayConfig) -> Result<Value> {
        let mut variables = Value::Object(serde_json::Map::new());

        if let Some(base) = &self.base_path {
            for filename in VARIABLES_FILES {
                let candidate = base.join(filename);
                if candidate.exists() {
                    info!("Loading variables from: {}", candidate.display());
                    let content = std::fs::read_to_string(&candidate)?;
                    variables = serde_yaml::from_str(&content).map_err(|e| {
                        RunwayError::Config(ConfigError::ParseError {
                            message: format!("YAML parse error: {e}"),
                            location: Some(candidate.display().to_string()),
                        })
                    })?;
                    break;
                }
            }
        }

        if let (Value::Object(base), Value::Object(inline)) = (&mut variables, &config.variables) {
            for (key, value) in inline {
                base.insert(key.clone(), value.clone());
            }
        } else if !config.variables.is_null() {
            variables = config.variables.clone();
        }

        Ok(variables)
    }

    /// Loads the `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the `.env` file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                RunwayError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Recursively fills in module names from their paths.
fn normalize_module_names(module: &mut super::spec::ModuleDefinition) {
    if module.name.is_none() {
        module.name = Some(module.display_name());
    }
    for child in &mut module.parallel {
        normalize_module_names(child);
    }
}

/// Interprets common truthy spellings of an override variable.
fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Finds the configuration file in the start directory or its parents.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }
    .into())
}
