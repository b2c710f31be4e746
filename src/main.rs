//! GrowFS Wizard
//!
//! Serves the guided file-system grow workflow over REST, backed by a YAML
//! server inventory.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use growfs_wizard::{
    ApiServer, Error, Result, StaticInventory, WizardConfig, WorkflowArbiter, WorkflowController,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// GrowFS Wizard - guided capacity expansion for clustered file systems
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "GROWFS_CONFIG")]
    config: Option<PathBuf>,

    /// YAML server inventory (overrides the configuration file)
    #[arg(long, env = "GROWFS_INVENTORY")]
    inventory: Option<PathBuf>,

    /// REST API bind address
    #[arg(long, env = "API_ADDR")]
    api_addr: Option<String>,

    /// Maximum LUNs per file system
    #[arg(long, env = "GROWFS_MAX_LUNS")]
    max_luns: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = load_config(&args)?;

    info!("Starting GrowFS Wizard");
    info!("  Version: {}", growfs_wizard::VERSION);
    info!("  REST API: {}", config.api.addr);
    info!("  Max LUNs: {}", config.limits.max_luns_total);
    info!("  Max striped groups: {}", config.limits.max_striped_groups);

    let inventory_path = config.inventory_path.clone().ok_or_else(|| {
        Error::Configuration("no inventory configured (use --inventory)".into())
    })?;
    let inventory = Arc::new(StaticInventory::from_file(&inventory_path)?);

    let controller = Arc::new(WorkflowController::new(
        inventory.clone(),
        inventory.clone(),
        inventory,
        WorkflowArbiter::new(),
        config.limits,
        config.validation.clone(),
    )?);

    // Audit trail
    let mut events = controller.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => debug!(target: "growfs_wizard::audit", "{}", json),
                    Err(e) => error!("Failed to serialize workflow event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => warn!("Audit trail skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let server = Arc::new(ApiServer::new(config.api.clone(), controller));

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, shutting down");
            let _ = shutdown.send(());
        }
    });

    server.run().await?;

    info!("Wizard shutdown complete");
    Ok(())
}

// =============================================================================
// Configuration
// =============================================================================

fn load_config(args: &Args) -> Result<WizardConfig> {
    let mut config = match &args.config {
        Some(path) => WizardConfig::from_file(path)?,
        None => WizardConfig::default(),
    };

    if let Some(path) = &args.inventory {
        config.inventory_path = Some(path.clone());
    }
    if let Some(addr) = &args.api_addr {
        config.api.addr = addr
            .parse()
            .map_err(|e| Error::Configuration(format!("Invalid REST API address: {}", e)))?;
    }
    if let Some(max_luns) = args.max_luns {
        config.limits.max_luns_total = max_luns;
    }

    config.validate()?;
    Ok(config)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "tower_http=info", "axum=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
