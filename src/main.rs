//! insurance-predictor - health insurance cost prediction service

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use insurance_predictor::{server, AppState, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("insurance_predictor={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!("======================================");
    info!("  insurance-predictor v{}", env!("CARGO_PKG_VERSION"));
    info!("======================================");
    info!("Listen: {}", config.listen);
    info!("Data dir: {}", config.data_dir.display());
    info!("Dataset: {}", config.dataset_path.display());
    info!("Users: {}", config.users_path().display());
    info!("History: {}", config.history_path().display());
    info!("Reports: {}", config.reports_path().display());
    info!("Password scheme: {:?}", config.auth.password_scheme);
    info!(
        "Model: {} trees, seed {}, test fraction {}",
        config.model.n_trees, config.model.seed, config.model.test_fraction
    );
    info!("======================================");

    if !config.dataset_path.exists() {
        warn!(
            "Dataset {} not found; predictions will fail until it exists",
            config.dataset_path.display()
        );
    }

    let state = Arc::new(AppState::new(config));

    if let Err(e) = server::run(state).await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
