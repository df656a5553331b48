//! Deploy-environment detection and per-task process environment.
//!
//! The [`DeployEnvironment`] answers "which logical environment is this run
//! targeting" (e.g. `dev`, `prod`) and owns the environment-variable map
//! handed to every tool subprocess. Detection happens exactly once, at
//! construction; concurrent tasks receive isolated copies via
//! [`DeployEnvironment::copy`] so no two workers share a mutable map.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::error::{EnvironmentError, Result};

/// Hard ceiling on concurrent workers. 61 is the `WaitForMultipleObjects`
/// handle limit on Windows; it is respected on every platform so runs behave
/// the same everywhere.
const MAX_CONCURRENCY_CAP: usize = 61;

/// Environment variable holding an explicit deploy-environment name.
pub const DEPLOY_ENVIRONMENT_VAR: &str = "DEPLOY_ENVIRONMENT";

/// Environment variable overriding the module concurrency limit.
const MAX_CONCURRENT_MODULES_VAR: &str = "RUNWAY_MAX_CONCURRENT_MODULES";

/// Environment variable overriding the region concurrency limit.
const MAX_CONCURRENT_REGIONS_VAR: &str = "RUNWAY_MAX_CONCURRENT_REGIONS";

/// How the deploy-environment name was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameDerivation {
    /// Supplied explicitly (CLI flag, environment variable, or user override).
    Explicit,
    /// Derived from the current git branch.
    Branch,
    /// Derived from the root directory's basename.
    Directory,
}

/// Options controlling deploy-environment detection.
#[derive(Debug, Default)]
pub struct DetectOptions {
    /// Explicit environment name, taking precedence over all derivation.
    pub explicit_name: Option<String>,
    /// Skip git-branch derivation entirely.
    pub ignore_git_branch: bool,
    /// Force non-interactive (CI) behavior.
    pub ci: bool,
    /// Root directory of the run (the configuration file's directory).
    pub root_dir: PathBuf,
}

/// The resolved deploy environment for one run.
///
/// The name and its derivation are fixed at construction; later changes to
/// the backing git branch or directory do not affect an existing instance.
#[derive(Debug, Clone)]
pub struct DeployEnvironment {
    name: String,
    name_derived_from: NameDerivation,
    vars: HashMap<String, String>,
    ci: bool,
    root_dir: PathBuf,
}

impl DeployEnvironment {
    /// Detects the deploy environment for the current process.
    ///
    /// Resolution order: explicit name (option or `DEPLOY_ENVIRONMENT`
    /// variable) > git branch > root directory basename. Branch names are
    /// normalized: a leading `ENV-` is stripped and `master` maps to
    /// `common`. An unrecognized branch is used literally in CI mode and
    /// confirmed interactively otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository is in a detached-HEAD state or if
    /// the interactive confirmation prompt cannot be read.
    pub fn detect(options: DetectOptions) -> Result<Self> {
        let mut vars: HashMap<String, String> = std::env::vars().collect();
        let ci = options.ci || vars.contains_key("CI");

        let explicit = options
            .explicit_name
            .or_else(|| vars.get(DEPLOY_ENVIRONMENT_VAR).cloned());

        let (name, name_derived_from) = if let Some(name) = explicit {
            debug!("Deploy environment explicitly set to: {name}");
            (name, NameDerivation::Explicit)
        } else if options.ignore_git_branch {
            Self::derive_from_directory(&options.root_dir)
        } else if let Some(branch) = current_git_branch(&options.root_dir)? {
            Self::derive_from_branch(&branch, ci)?
        } else {
            Self::derive_from_directory(&options.root_dir)
        };

        info!(
            "Deploy environment: {name} (from {})",
            match name_derived_from {
                NameDerivation::Explicit => "explicit value",
                NameDerivation::Branch => "git branch",
                NameDerivation::Directory => "directory name",
            }
        );

        vars.insert(DEPLOY_ENVIRONMENT_VAR.to_string(), name.clone());

        Ok(Self {
            name,
            name_derived_from,
            vars,
            ci,
            root_dir: options.root_dir,
        })
    }

    /// Derives the environment name from a git branch name.
    fn derive_from_branch(branch: &str, ci: bool) -> Result<(String, NameDerivation)> {
        if let Some(stripped) = branch.strip_prefix("ENV-") {
            return Ok((stripped.to_string(), NameDerivation::Branch));
        }
        if branch == "master" {
            return Ok((String::from("common"), NameDerivation::Branch));
        }
        if ci {
            debug!("Non-interactive run; using branch '{branch}' literally");
            return Ok((branch.to_string(), NameDerivation::Branch));
        }
        match prompt_for_override(branch)? {
            Some(override_name) => Ok((override_name, NameDerivation::Explicit)),
            None => Ok((branch.to_string(), NameDerivation::Branch)),
        }
    }

    /// Derives the environment name from the root directory's basename.
    fn derive_from_directory(root_dir: &Path) -> (String, NameDerivation) {
        let basename = root_dir
            .file_name()
            .map_or_else(|| String::from("common"), |n| n.to_string_lossy().to_string());
        let name = basename
            .strip_prefix("ENV-")
            .map_or(basename.clone(), ToString::to_string);
        (name, NameDerivation::Directory)
    }

    /// Returns the resolved environment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns how the environment name was derived.
    #[must_use]
    pub const fn name_derived_from(&self) -> NameDerivation {
        self.name_derived_from
    }

    /// Returns true when running non-interactively.
    #[must_use]
    pub const fn ci(&self) -> bool {
        self.ci
    }

    /// Returns the root directory of the run.
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Returns the environment-variable map.
    #[must_use]
    pub const fn vars(&self) -> &HashMap<String, String> {
        &self.vars
    }

    /// Returns a single environment variable, if set.
    #[must_use]
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Sets an environment variable on this instance only.
    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Merges a map of environment variables into this instance.
    pub fn merge_vars(&mut self, vars: &HashMap<String, String>) {
        for (key, value) in vars {
            self.vars.insert(key.clone(), value.clone());
        }
    }

    /// Produces an independent copy for a concurrent task.
    ///
    /// The copy carries the already-resolved name and derivation, so a child
    /// never re-runs detection or mutates its parent's variable map.
    #[must_use]
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Maximum number of modules to run concurrently.
    #[must_use]
    pub fn max_concurrent_modules(&self) -> usize {
        self.concurrency_limit(MAX_CONCURRENT_MODULES_VAR)
    }

    /// Maximum number of regions to run concurrently.
    #[must_use]
    pub fn max_concurrent_regions(&self) -> usize {
        self.concurrency_limit(MAX_CONCURRENT_REGIONS_VAR)
    }

    /// Reads a concurrency limit from an override variable, defaulting to
    /// the logical CPU count capped at [`MAX_CONCURRENCY_CAP`].
    fn concurrency_limit(&self, override_var: &str) -> usize {
        if let Some(raw) = self.vars.get(override_var) {
            if let Ok(value) = raw.parse::<usize>() {
                if value > 0 {
                    return value;
                }
            }
            debug!("Ignoring invalid {override_var} value: {raw}");
        }
        let cpus = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        cpus.min(MAX_CONCURRENCY_CAP)
    }
}

/// Reads the current git branch of `root_dir`.
///
/// Returns `Ok(None)` when git is unavailable or the directory is not a
/// repository; those cases fall back to directory-name derivation. A
/// detached HEAD is fatal because the branch is the only signal the user
/// intended to rely on.
fn current_git_branch(root_dir: &Path) -> Result<Option<String>> {
    let output = match Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .current_dir(root_dir)
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            debug!("git unavailable ({e}); falling back to directory name");
            return Ok(None);
        }
    };

    if !output.status.success() {
        debug!("Not a git repository; falling back to directory name");
        return Ok(None);
    }

    let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if branch.is_empty() {
        return Ok(None);
    }
    if branch == "HEAD" {
        return Err(EnvironmentError::DetachedHead.into());
    }
    Ok(Some(branch))
}

/// Prompts the user to confirm or override a branch-derived name.
///
/// Returns `None` when the user accepts the derived name, or the override
/// value they typed.
fn prompt_for_override(branch: &str) -> Result<Option<String>> {
    eprint!(
        "Deploy environment '{branch}' was determined from the current git branch. \
         Press enter to continue or type a different environment name: "
    );
    std::io::stderr()
        .flush()
        .map_err(|e| EnvironmentError::PromptFailed {
            message: e.to_string(),
        })?;

    let mut input = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut input)
        .map_err(|e| EnvironmentError::PromptFailed {
            message: e.to_string(),
        })?;

    let trimmed = input.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}

#[cfg(test)]
impl DeployEnvironment {
    /// Builds a fixture instance without touching the process environment.
    pub(crate) fn fixture(name: &str, ci: bool, root_dir: impl Into<PathBuf>) -> Self {
        let name = name.to_string();
        let mut vars = HashMap::new();
        vars.insert(DEPLOY_ENVIRONMENT_VAR.to_string(), name.clone());
        Self {
            name,
            name_derived_from: NameDerivation::Explicit,
            vars,
            ci,
            root_dir: root_dir.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_env_prefix_stripped() {
        let (name, derived) = DeployEnvironment::derive_from_branch("ENV-dev", true).unwrap();
        assert_eq!(name, "dev");
        assert_eq!(derived, NameDerivation::Branch);
    }

    #[test]
    fn test_branch_master_translates_to_common() {
        let (name, derived) = DeployEnvironment::derive_from_branch("master", true).unwrap();
        assert_eq!(name, "common");
        assert_eq!(derived, NameDerivation::Branch);
    }

    #[test]
    fn test_unknown_branch_used_literally_in_ci() {
        let (name, derived) =
            DeployEnvironment::derive_from_branch("feature/login", true).unwrap();
        assert_eq!(name, "feature/login");
        assert_eq!(derived, NameDerivation::Branch);
    }

    #[test]
    fn test_directory_derivation_strips_prefix() {
        let (name, derived) =
            DeployEnvironment::derive_from_directory(Path::new("/work/ENV-staging"));
        assert_eq!(name, "staging");
        assert_eq!(derived, NameDerivation::Directory);
    }

    #[test]
    fn test_directory_derivation_plain_name() {
        let (name, _) = DeployEnvironment::derive_from_directory(Path::new("/work/myapp"));
        assert_eq!(name, "myapp");
    }

    #[test]
    fn test_copy_is_isolated() {
        let parent = DeployEnvironment::fixture("dev", true, "/tmp");
        let mut child = parent.copy();
        child.set_var("AWS_REGION", "us-east-1");

        assert!(parent.var("AWS_REGION").is_none());
        assert_eq!(child.var("AWS_REGION"), Some("us-east-1"));
        assert_eq!(child.name(), "dev");
        assert_eq!(child.name_derived_from(), NameDerivation::Explicit);
    }

    #[test]
    fn test_concurrency_override_wins() {
        let mut env = DeployEnvironment::fixture("dev", true, "/tmp");
        env.set_var("RUNWAY_MAX_CONCURRENT_REGIONS", "3");
        assert_eq!(env.max_concurrent_regions(), 3);
    }

    #[test]
    fn test_concurrency_default_capped() {
        let env = DeployEnvironment::fixture("dev", true, "/tmp");
        assert!(env.max_concurrent_modules() <= MAX_CONCURRENCY_CAP);
        assert!(env.max_concurrent_modules() >= 1);
    }
}
