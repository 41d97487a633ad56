//! Command-line interface for the standalone scheduler.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::TemplateCatalog;
use crate::config::EngineConfig;
use crate::database::SqliteTaskStore;
use crate::engine::OnboardingEngine;
use crate::memory::{LogNotifier, MemoryHireDirectory};

/// Onboarding workflow scheduler
///
/// Runs automation scans over the onboarding task database and applies
/// workflow templates to hires from the command line.
#[derive(Parser, Debug, Clone)]
#[command(name = "onboarding-scheduler")]
#[command(about = "Onboarding workflow scheduler")]
#[command(version)]
pub struct Args {
    /// Path to config.yaml (defaults to the platform config directory)
    #[arg(long, global = true, env = "ONBOARDING_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// SQLite task database
    #[arg(long, global = true, env = "ONBOARDING_DATABASE", value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// YAML template catalog (built-in templates when omitted)
    #[arg(long, global = true, env = "ONBOARDING_CATALOG", value_name = "PATH")]
    pub catalog: Option<PathBuf>,

    /// YAML list of hires
    #[arg(long, global = true, env = "ONBOARDING_HIRES", value_name = "PATH")]
    pub hires: Option<PathBuf>,

    /// Seconds between automation scans
    #[arg(long, global = true, env = "ONBOARDING_SCAN_INTERVAL", value_name = "SECS")]
    pub interval: Option<u64>,

    /// Log filter, e.g. `info` or `onboarding_engine=debug`
    #[arg(long, global = true, env = "ONBOARDING_LOG", value_name = "FILTER")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run automation scans on a timer until Ctrl-C
    Run,

    /// Run a single automation scan and print the report
    Scan,

    /// Apply a template to one or more hires
    Apply {
        /// Template id
        #[arg(long, value_name = "ID")]
        template: String,

        /// Recorded as the assigner of created tasks
        #[arg(long, default_value = "admin")]
        actor: String,

        /// Hire ids
        #[arg(required = true, value_name = "HIRE")]
        hire_ids: Vec<String>,
    },

    /// Check a catalog file without touching the database
    ValidateCatalog {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

impl Args {
    /// Config file with command-line and environment overrides applied
    pub fn load_config(&self) -> Result<EngineConfig> {
        let mut config = EngineConfig::load(self.config.as_deref())?;

        if let Some(database) = &self.database {
            config.database_path = Some(database.clone());
        }
        if let Some(catalog) = &self.catalog {
            config.catalog_path = Some(catalog.clone());
        }
        if let Some(hires) = &self.hires {
            config.hires_path = Some(hires.clone());
        }
        if let Some(interval) = self.interval {
            config.scan_interval_secs = interval;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

/// Install the tracing subscriber; `RUST_LOG` wins over the config level
pub fn init_logging(log_level: &str) -> Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

fn load_catalog(config: &EngineConfig) -> Result<TemplateCatalog> {
    match &config.catalog_path {
        Some(path) => {
            let catalog = TemplateCatalog::new();
            let count = catalog.load_file(path)?;
            info!(path = %path.display(), templates = count, "Loaded template catalog");
            Ok(catalog)
        }
        None => Ok(TemplateCatalog::with_builtin()?),
    }
}

fn load_hires(config: &EngineConfig) -> Result<MemoryHireDirectory> {
    match &config.hires_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read hires file {}", path.display()))?;
            MemoryHireDirectory::from_yaml(&content)
                .with_context(|| format!("Invalid hires file {}", path.display()))
        }
        None => {
            warn!("No hires file configured; hire lookups will find nothing");
            Ok(MemoryHireDirectory::default())
        }
    }
}

/// Build the engine from configuration
pub fn build_engine(config: &EngineConfig) -> Result<OnboardingEngine> {
    let store = SqliteTaskStore::open(&config.database_path())?;
    let catalog = load_catalog(config)?;
    let directory = load_hires(config)?;

    let engine = OnboardingEngine::builder(
        Arc::new(store),
        Arc::new(directory),
        Arc::new(LogNotifier::default()),
        Arc::new(catalog),
    )
    .config(config.clone())
    .build()?;
    Ok(engine)
}

pub async fn run(args: Args, config: EngineConfig) -> Result<()> {
    match args.command {
        Command::ValidateCatalog { path } => {
            let catalog = TemplateCatalog::new();
            let count = catalog.load_file(&path)?;
            println!("{}: {} template(s) valid", path.display(), count);
            Ok(())
        }
        Command::Scan => {
            let engine = build_engine(&config)?;
            let report = engine.scan().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Apply {
            template,
            actor,
            hire_ids,
        } => {
            let engine = build_engine(&config)?;
            let report = engine
                .bulk()
                .apply_workflow(&template, hire_ids, &actor, &CancellationToken::new())
                .await?;

            for outcome in &report.outcomes {
                println!("{}: {}", outcome.hire_id, outcome.result);
            }
            println!("{}", report.summary());

            if report.is_partial_failure() {
                anyhow::bail!("{} hire(s) failed", report.failed().len());
            }
            Ok(())
        }
        Command::Run => {
            let engine = build_engine(&config)?;
            let shutdown = CancellationToken::new();
            let handle = engine.scheduler().spawn(shutdown.clone());

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("Shutdown requested");
            shutdown.cancel();
            handle.await?;
            Ok(())
        }
    }
}
