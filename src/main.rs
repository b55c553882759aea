//! opsman CLI entrypoint.
//!
//! This is the main entrypoint for the opsman command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use opsman_director::cli::{Cli, Commands, OutputFormatter, StateCommands};
use opsman_director::config::{ConfigParser, ConfigValidator, OpsmanConfig, find_config_file};
use opsman_director::error::{OpsmanError, ReconcileError, Result};
use opsman_director::opsman::{DirectorResource, OpsManClient};
use opsman_director::reconciler::Reconciler;
use opsman_director::state::{LocalStateStore, StateStore, generate_holder_id};

use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

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
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Validate { warnings } => cmd_validate(config_path, warnings, &formatter),
        Commands::Plan { detailed } => cmd_plan(config_path, detailed, &formatter).await,
        Commands::Apply { yes, no_wait } => cmd_apply(config_path, yes, no_wait, &formatter).await,
        Commands::Refresh => cmd_refresh(config_path, &formatter).await,
        Commands::Import { id } => cmd_import(config_path, &id, &formatter).await,
        Commands::Drift => cmd_drift(config_path, &formatter).await,
        Commands::Destroy { yes } => cmd_destroy(config_path, yes, &formatter).await,
        Commands::State { command } => cmd_state(config_path, command, &formatter).await,
    }
}

/// Validates the manifest without contacting Ops Manager.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(manifest_dir(&config_file));
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;

    let result = ConfigValidator::new().check(&config);
    eprintln!("{}", formatter.format_validation(&config, &result, show_warnings));

    if result.is_valid() {
        Ok(())
    } else {
        Err(OpsmanError::internal(format!(
            "configuration has {} error(s)",
            result.error_count()
        )))
    }
}

/// Shows what apply would change.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path)?;
    let director = build_director(&config)?;

    let reconciler = Reconciler::new(&config, &state_store, &director);
    let plan = reconciler.plan().await?;

    eprintln!("{}", formatter.format_plan(&plan, detailed));
    Ok(())
}

/// Stages the director configuration and applies changes.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    yes: bool,
    no_wait: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (mut config, state_store) = load_config_and_state(config_path)?;
    if no_wait {
        config.apply.wait = false;
    }
    let director = build_director(&config)?;
    let reconciler = Reconciler::new(&config, &state_store, &director);

    let plan = reconciler.plan().await?;
    if !formatter.is_json() {
        eprintln!("{}", formatter.format_plan(&plan, true));
    }

    if !plan.is_empty() && !yes && !confirm("Do you want to apply these changes?")? {
        return Err(OpsmanError::Reconcile(ReconcileError::Aborted {
            reason: String::from("apply cancelled by user"),
        }));
    }

    let result = reconciler.reconcile().await?;
    eprintln!("{}", formatter.format_reconciliation(&result));

    if result.success {
        Ok(())
    } else {
        error!("Apply finished with {} error(s)", result.errors.len());
        Err(OpsmanError::Reconcile(ReconcileError::ResourceReconcileFailed {
            target: result.resource_id,
            reason: result.errors.last().cloned().unwrap_or_default(),
        }))
    }
}

/// Reads the director and records it in state.
async fn cmd_refresh(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path)?;
    let director = build_director(&config)?;

    let state = Reconciler::new(&config, &state_store, &director)
        .refresh()
        .await?;

    eprintln!("{}", formatter.format_state(&state));
    Ok(())
}

/// Adopts an existing director into state.
async fn cmd_import(
    config_path: Option<&PathBuf>,
    id: &str,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path)?;
    let director = build_director(&config)?;

    let state = Reconciler::new(&config, &state_store, &director)
        .import(id)
        .await?;

    eprintln!("{}", formatter.format_state(&state));
    Ok(())
}

/// Reports drift between state, manifest and Ops Manager.
async fn cmd_drift(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path)?;
    let director = build_director(&config)?;

    let report = Reconciler::new(&config, &state_store, &director)
        .check_drift()
        .await?;

    eprintln!("{}", formatter.format_drift(&report));
    Ok(())
}

/// Forgets the director.
async fn cmd_destroy(
    config_path: Option<&PathBuf>,
    yes: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, state_store) = load_config_and_state(config_path)?;

    if !yes {
        eprintln!(
            "This removes state for {} ({}). Ops Manager is left unchanged.",
            config.provider.target_hostname,
            state_store.location()
        );
        if !confirm("Continue?")? {
            return Err(OpsmanError::Reconcile(ReconcileError::Aborted {
                reason: String::from("destroy cancelled by user"),
            }));
        }
    }

    let director = build_director(&config)?;
    Reconciler::new(&config, &state_store, &director)
        .destroy()
        .await?;

    eprintln!("{}", formatter.message("success", "Director removed from state."));
    Ok(())
}

/// Inspects or manages local state.
async fn cmd_state(
    config_path: Option<&PathBuf>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (_config, state_store) = load_config_and_state(config_path)?;

    match command {
        StateCommands::Show => {
            if let Some(state) = state_store.load().await? {
                eprintln!("{}", formatter.format_state(&state));
            } else {
                eprintln!("{}", formatter.message("warning", "No state found."));
            }
            if let Some(lock) = state_store.get_lock_info().await? {
                eprintln!("{}", formatter.format_lock(&lock));
            }
        }
        StateCommands::Lock { holder } => {
            let holder = holder.unwrap_or_else(generate_holder_id);
            let lock = state_store.acquire_lock(&holder, "manual").await?;
            eprintln!("{}", formatter.format_lock(&lock));
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                match state_store.force_unlock().await? {
                    Some(lock) => eprintln!(
                        "{}",
                        formatter.message("success", &format!("Removed lock {}.", lock.lock_id))
                    ),
                    None => eprintln!("{}", formatter.message("warning", "State is not locked.")),
                }
            } else if let Some(id) = lock_id {
                state_store.release_lock(&id).await?;
                eprintln!("{}", formatter.message("success", "State unlocked."));
            } else {
                eprintln!(
                    "{}",
                    formatter.message("error", "Provide --lock-id or use --force.")
                );
            }
        }
    }

    Ok(())
}

/// Asks the user to confirm on stdin.
fn confirm(prompt: &str) -> Result<bool> {
    eprint!("\n{prompt} [y/N] ");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Returns the directory holding the manifest.
fn manifest_dir(config_file: &Path) -> &Path {
    config_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Loads and validates configuration and creates the state store.
fn load_config_and_state(config_path: Option<&PathBuf>) -> Result<(OpsmanConfig, LocalStateStore)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let base = manifest_dir(&config_file);
    let parser = ConfigParser::new().with_base_path(base);
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;
    ConfigValidator::new().validate(&config)?;

    let state_store = LocalStateStore::for_manifest(base, &config.state);
    debug!("Using state at: {}", state_store.location());

    Ok((config, state_store))
}

/// Builds the director resource from configuration.
fn build_director(config: &OpsmanConfig) -> Result<DirectorResource> {
    let client = OpsManClient::new(&config.provider)?;
    Ok(DirectorResource::new(client, config.apply))
}
