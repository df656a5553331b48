//! Runway CLI entrypoint.
//!
//! This is the main entrypoint for the runway command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use runway::aws::StsFacade;
use runway::cli::{Cli, Commands, OutputFormatter};
use runway::config::{find_config_file, ConfigParser, ConfigValidator, RunwayConfig};
use runway::context::{Action, RunContext};
use runway::deployment::DeploymentRunner;
use runway::environment::{DeployEnvironment, DetectOptions};
use runway::error::Result;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    let Some(action) = cli.command.action() else {
        let Commands::New { path, force } = &cli.command else {
            unreachable!("every non-action command is handled here");
        };
        return cmd_new(path, *force);
    };

    let tags = cli.command.tags();
    let (config, config_dir) = load_config(cli.config.as_ref())?;

    let env = DeployEnvironment::detect(DetectOptions {
        explicit_name: cli.deploy_environment.clone(),
        ignore_git_branch: config.ignore_git_branch,
        ci: cli.ci,
        root_dir: config_dir,
    })?;

    if action == Action::Destroy && !confirm_destroy(&cli, &env)? {
        eprintln!("Destroy cancelled.");
        return Ok(());
    }

    let parser = ConfigParser::new().with_base_path(env.root_dir());
    let variables = parser.load_variables(&config)?;

    let ctx = RunContext::new(action, env, config.strict_environments, tags, variables);
    let runner = DeploymentRunner::new(Arc::new(StsFacade));

    info!("Starting {action} run");
    let report = runner.run_list(&ctx, &config.deployments).await?;

    eprintln!("{}", formatter.format_report(&report));
    Ok(())
}

/// Loads, validates, and returns the configuration plus its directory.
fn load_config(config_path: Option<&PathBuf>) -> Result<(RunwayConfig, PathBuf)> {
    let config_file = config_path.map_or_else(
        || {
            let cwd = std::env::current_dir()?;
            find_config_file(cwd)
        },
        |path| Ok(path.clone()),
    )?;

    let config_dir = config_file
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    debug!("Loading configuration from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(&config_dir);
    parser.load_dotenv()?;

    let config = parser.load_file(&config_file)?;

    let report = ConfigValidator::new().validate(&config)?;
    for warning in &report.warnings {
        eprintln!("Warning: {warning}");
    }

    Ok((config, config_dir))
}

/// Confirms a destroy run unless `--yes` was passed or the run is
/// non-interactive.
fn confirm_destroy(cli: &Cli, env: &DeployEnvironment) -> Result<bool> {
    let Commands::Destroy { yes, .. } = &cli.command else {
        return Ok(true);
    };
    if *yes || env.ci() {
        return Ok(true);
    }

    eprint!(
        "This will destroy infrastructure in the '{}' environment. \
         This action is IRREVERSIBLE. Type 'destroy' to confirm: ",
        env.name()
    );
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    Ok(input.trim() == "destroy")
}

/// Scaffolds a starter configuration file.
fn cmd_new(path: &Path, force: bool) -> Result<()> {
    info!("Initializing new Runway project in: {}", path.display());

    let config_path = path.join("runway.yml");

    if !force && config_path.exists() {
        eprintln!("Configuration file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    let config_template = include_str!("../templates/runway.yml");
    std::fs::write(&config_path, config_template)?;
    eprintln!("Created: {}", config_path.display());

    eprintln!("\nProject initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Edit runway.yml with your deployments and modules");
    eprintln!("  2. Run 'runway plan' to see what would change");
    eprintln!("  3. Run 'runway deploy' to deploy");

    Ok(())
}
