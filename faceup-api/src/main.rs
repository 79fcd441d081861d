//! faceup-api - FaceUp backend service
//!
//! Face-scan pipeline (analysis, hairstyle suggestions), image upload and
//! Stripe subscription reconciliation over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use faceup_common::config::{self, CliOverrides, ServiceConfig};
use faceup_common::events::EventBus;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use faceup_api::models::PlanCatalog;
use faceup_api::services::{
    OpenAiClient, ReplicateClient, StripeClient, SupabaseStorage, WebhookVerifier,
};
use faceup_api::{build_router, AppState, Providers};

/// Command-line arguments for faceup-api
#[derive(Parser, Debug)]
#[command(name = "faceup-api")]
#[command(about = "FaceUp backend: face scans, hairstyle suggestions and subscriptions")]
#[command(version)]
struct Cli {
    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// TOML config file (overrides FACEUP_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides FACEUP_DATABASE)
    #[arg(long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config::log_directive())),
        )
        .init();

    info!(
        "Starting FaceUp API (faceup-api) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let toml_config = config::load_toml_config(cli.config.as_deref())?;
    let overrides = CliOverrides {
        port: cli.port,
        database_path: cli.database,
    };
    let config = ServiceConfig::resolve(&overrides, &toml_config)?;

    info!("Database: {}", config.database_path.display());
    let db_pool = faceup_api::db::init_database_pool(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    info!("Database connection established");

    let event_bus = EventBus::new(100);

    let providers = Providers {
        analyzer: Arc::new(ReplicateClient::new(
            config.replicate_api_key.clone(),
            config.replicate_model_version.clone(),
        )?),
        generator: Arc::new(OpenAiClient::new(
            config.openai_api_key.clone(),
            config.openai_model.clone(),
        )?),
        billing: Arc::new(StripeClient::new(
            config.stripe_secret_key.clone(),
            config.frontend_url.clone(),
        )?),
        image_store: Arc::new(SupabaseStorage::new(
            config.supabase_url.clone(),
            config.supabase_service_role_key.clone(),
            config.supabase_storage_bucket.clone(),
        )?),
    };
    let plans = PlanCatalog::new(
        config.stripe_monthly_price_id.clone(),
        config.stripe_yearly_price_id.clone(),
    );
    let verifier = WebhookVerifier::new(config.stripe_webhook_secret.clone());

    let state = AppState::new(
        db_pool,
        event_bus,
        providers,
        plans,
        verifier,
        config.frontend_url.clone(),
    );
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
