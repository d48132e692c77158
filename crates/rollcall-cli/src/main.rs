//! rollcall - Command-line front end for the rollcall attendance engine
//!
//! Each invocation opens the store, runs one operation and prints its
//! result as JSON on stdout. Logs go to stderr. Failures are printed as
//! `{"error": {"kind", "message"}}` with a non-zero exit status.

mod commands;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use rollcall_config::{Config, load_config};
use rollcall_core::{Collaborators, RollcallEngine};
use rollcall_store::{SqliteStore, Store};
use rollcall_util::{RollcallError, SystemClock, database_path, default_config_path};
use rollcall_verify::{
    FaceMatch, FaceMatcher, FsImageStore, GreatCircleAssessor, HttpFaceMatcher, VerifyError,
    VerifyResult,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::commands::Command;

/// rollcall - Training session enrollment, registration and attendance
#[derive(Parser, Debug)]
#[command(name = "rollcall", version)]
#[command(about = "Training session enrollment, registration and attendance", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/rollcall/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set ROLLCALL_DATA_DIR env var)
    #[arg(short, long, env = "ROLLCALL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

/// Everything a command needs
pub struct App {
    pub engine: RollcallEngine,
    pub images: FsImageStore,
}

impl App {
    fn open(args: &Args) -> Result<Self> {
        let mut config = if args.config.exists() {
            let config = load_config(&args.config)
                .with_context(|| format!("Failed to load config from {:?}", args.config))?;
            info!(config_path = %args.config.display(), "Configuration loaded");
            config
        } else {
            debug!(
                config_path = %args.config.display(),
                "No config file, using defaults"
            );
            Config::with_data_dir(rollcall_util::default_data_dir())
        };

        if let Some(data_dir) = &args.data_dir {
            config.service.image_dir = data_dir.join("images");
            config.service.data_dir = data_dir.clone();
        }

        let data_dir = &config.service.data_dir;
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = database_path(data_dir);
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );
        debug!(db_path = %db_path.display(), "Store initialized");

        let face_matcher: Arc<dyn FaceMatcher> = match &config.face_matcher {
            Some(matcher) => {
                let http = HttpFaceMatcher::new(&matcher.endpoint, matcher.timeout)
                    .context("Failed to build face matcher client")?;
                debug!(endpoint = http.endpoint(), "Face matcher configured");
                Arc::new(http)
            }
            None => {
                debug!("No face matcher configured");
                Arc::new(UnconfiguredFaceMatcher)
            }
        };
        let location = Arc::new(GreatCircleAssessor::new(
            config.rules.far_radius_meters,
            config.rules.far_note_marker.clone(),
        ));

        let engine = RollcallEngine::new(
            config.rules.clone(),
            store,
            Arc::new(SystemClock),
            Collaborators {
                face_matcher,
                location,
            },
        );

        if !config.classes.is_empty() {
            engine.catalog().seed_classes(&config.classes)?;
        }

        let images = FsImageStore::new(config.service.image_dir.clone());
        debug!(image_dir = %images.dir().display(), "Image store ready");

        Ok(Self { engine, images })
    }
}

/// Stand-in used when no `[face_matcher]` section is configured
struct UnconfiguredFaceMatcher;

#[async_trait]
impl FaceMatcher for UnconfiguredFaceMatcher {
    async fn compare(&self, _reference: &str, _capture: &str) -> VerifyResult<FaceMatch> {
        Err(VerifyError::Unavailable(
            "no face matcher configured".to_string(),
        ))
    }
}

fn print_error(err: &anyhow::Error) {
    let (kind, message) = match err.downcast_ref::<RollcallError>() {
        Some(e) => (e.kind(), e.message().to_string()),
        None => ("internal", format!("{:#}", err)),
    };
    let body = serde_json::json!({ "error": { "kind": kind, "message": message } });
    println!("{}", body);
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    debug!(version = env!("CARGO_PKG_VERSION"), "rollcall starting");
    if rollcall_util::is_mock_time_active() {
        warn!("Mock time is active, deadlines and lateness use the overridden clock");
    }

    let result = match App::open(&args) {
        Ok(app) => commands::run(&app, args.command).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            warn!(error = %format!("{:#}", e), "Command failed");
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}
