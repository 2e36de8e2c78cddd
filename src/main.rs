//! Ultimad - UltimaLearning backend server

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ultimad::{config::Args, server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("ultimad={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  Ultimad - UltimaLearning Backend");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {}", args.mongodb_uri);
    info!("AI service: {}", args.ai_base_url);
    info!("AI models: {} / {} (level >= 60)", args.ai_model, args.ai_model_strong);
    info!("Daily submission limit: {}", args.daily_submission_limit);
    info!(
        "Cache TTLs: tests {}d, reviews {}d",
        args.test_cache_ttl_days, args.review_cache_ttl_days
    );
    info!("======================================");

    if args.dev_mode {
        warn!("Development mode: do not use in production");
    }

    let state = match AppState::init(args).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    info!("MongoDB connected, all services initialized");

    server::run(state).await?;

    Ok(())
}
