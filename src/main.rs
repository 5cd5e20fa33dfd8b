#![recursion_limit = "256"]
//! # Main Entry Point
//!
//! Loads the configuration, sets up logging and hands control to the supervisor:
//! - Domain: Configuration and Types
//! - Infrastructure: Matrix
//! - Application: Supervisor, Session, Router, Wizards
//! - Interface: Command Handlers
//!
//! The process exit code reports why the bot stopped (see `ExitStatus`).

mod application;
mod domain;
mod infrastructure;
mod interface;
mod strings;

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::application::backoff::Backoff;
use crate::application::context::BotContext;
use crate::application::logging::init_logging;
use crate::application::router::CommandRouter;
use crate::application::session::Session;
use crate::application::state::RuntimeState;
use crate::application::supervisor::Supervisor;
use crate::domain::config::AppConfig;
use crate::domain::error::BotError;
use crate::domain::paths;
use crate::domain::types::ExitStatus;
use crate::infrastructure::matrix::MatrixService;
use crate::strings::logs;

#[derive(Parser, Debug)]
#[command(version, about = "Matrix bot with an add-on system and conversational wizards")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = paths::DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let status = run(&args.config).await;
    std::process::exit(status.code());
}

async fn run(config_path: &Path) -> ExitStatus {
    // 1. Load Configuration
    let config = match AppConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", BotError::Config(format!("{e:#}")));
            return ExitStatus::ConfigFile;
        }
    };

    // 2. Logging Setup
    let data_dir = PathBuf::from(&config.system.data_dir);
    let _guard = match init_logging(&data_dir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitStatus::Error;
        }
    };

    // 3. Initialize Components
    let state = RuntimeState::load(paths::state_file(&config.system.data_dir));
    let matrix = Arc::new(MatrixService::new(config.services.matrix.clone()));
    let ctx = Arc::new(BotContext::init(config, matrix.clone(), state));

    let extensions = ctx.config.system.extensions.clone();
    let router = match CommandRouter::load(ctx.clone(), &extensions) {
        Ok(router) => Arc::new(router),
        Err(e) => {
            tracing::error!("{}", e);
            return ExitStatus::ExtensionLoad;
        }
    };

    // 4. Interrupt Listener
    let shutdown = ctx.shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => shutdown.cancel(),
            Err(e) => tracing::error!("{}", logs::shutdown_fail(&e.to_string())),
        }
    });

    // 5. Supervisor Loop
    let session = Session::new(ctx.clone(), matrix, router);
    let backoff = Backoff::from_config(&ctx.config.supervisor);
    let supervisor = Supervisor::new(session, backoff, ctx.shutdown.clone());

    let status = match supervisor.run().await {
        Ok(status) => status,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitStatus::Error
        }
    };

    ctx.shutdown().await;
    tracing::info!("{}", logs::EXITING);
    status
}
