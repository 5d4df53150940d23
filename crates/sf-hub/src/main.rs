use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{HubConfig, Secrets};
use error::HubError;
use export::{ExportedFile, Exporter, EXPORT_ROUTE};
use sf_core::{Engine, PlacementId, Resolution, Resolver};
use slack::client::{ChatClient, SlackWebClient};
use slack::signature::SignatureVerifier;
use warehouse::criteria::WarehouseCriteriaSource;
use warehouse::presto::PrestoClient;
use warehouse::snowflake::SnowflakeClient;
use warehouse::{QueryOutput, Warehouse};

mod api;
mod config;
mod error;
mod export;
mod slack;
mod warehouse;

#[cfg(test)]
mod testing;

// =============================================================================
// CLI
// =============================================================================

#[derive(Parser)]
#[command(
    name = "sf-hub",
    version = "0.1.0",
    about = "SLACKFLAKE Slack bot and query service"
)]
struct Args {
    /// Server bind address
    #[arg(long, default_value = "127.0.0.1:3000")]
    bind: String,

    /// Path to config file
    #[arg(long, default_value = "sf-hub.toml")]
    config: PathBuf,
}

// =============================================================================
// Application State
// =============================================================================

struct AppState {
    config: HubConfig,
    resolver: Arc<Resolver>,
    /// Presto: ad-serving logs and criteria rows.
    warehouse: Arc<dyn Warehouse>,
    /// Snowflake: tickets and query history.
    operational: Arc<dyn Warehouse>,
    chat: Arc<dyn ChatClient>,
    exporter: Exporter,
    /// `None` disables request signing checks.
    signature: Option<SignatureVerifier>,
    start_time: Instant,
}

impl AppState {
    /// Resolve on the blocking pool; the criteria source waits on the
    /// warehouse synchronously.
    async fn resolve(&self, placement_id: PlacementId) -> Result<Resolution, HubError> {
        let resolver = self.resolver.clone();
        let resolution = tokio::task::spawn_blocking(move || resolver.resolve(placement_id)).await??;
        Ok(resolution)
    }

    fn warehouse_for(&self, engine: Engine) -> &dyn Warehouse {
        match engine {
            Engine::Presto => self.warehouse.as_ref(),
            Engine::Snowflake => self.operational.as_ref(),
        }
    }

    async fn export(&self, output: QueryOutput, sql: String) -> Result<ExportedFile, HubError> {
        let exporter = self.exporter.clone();
        let file = tokio::task::spawn_blocking(move || exporter.write(&output, &sql)).await??;
        Ok(file)
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    let slack_routes = Router::new()
        .route("/slack/commands", post(slack::handlers::slash_command))
        .route("/slack/interactions", post(slack::handlers::interactions))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            slack::signature::verify_slack_signature,
        ));

    Router::new()
        .route("/api/status", get(api::status))
        .route("/api/catalog", get(api::catalog))
        .route("/api/placements/:id/filter", get(api::placement_filter))
        .route("/api/reports/render", post(api::render_report))
        .merge(slack_routes)
        .nest_service(EXPORT_ROUTE, ServeDir::new(state.exporter.dir()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "sf_hub=info,sf_core=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = HubConfig::load(&args.config)?;
    let secrets = Secrets::from_env();
    tracing::debug!("Secrets: {:?}", secrets);

    let catalog = Arc::new(config.build_catalog()?);
    let warehouse: Arc<dyn Warehouse> = Arc::new(PrestoClient::new(
        config.warehouse.clone(),
        secrets.presto_token.clone(),
    )?);
    if config.snowflake.base_url().is_none() {
        tracing::warn!("[snowflake] account is not set; ticket reports and Query Finder will fail");
    }
    let operational: Arc<dyn Warehouse> = Arc::new(SnowflakeClient::new(
        config.snowflake.clone(),
        secrets.snowflake_token.clone(),
    )?);
    let source = WarehouseCriteriaSource::new(warehouse.clone(), tokio::runtime::Handle::current());
    let resolver = Resolver::new(catalog.clone(), Arc::new(source), config.resolver.empty_values);

    let signature = match &secrets.slack_signing_secret {
        Some(secret) => Some(SignatureVerifier::new(
            secret.as_bytes(),
            config.slack.signature_tolerance_secs,
        )),
        None => {
            tracing::warn!("SLACK_SIGNING_SECRET is not set; Slack requests are NOT verified");
            None
        }
    };

    let exporter = Exporter::new(&config.export.dir, &config.server.public_url);
    std::fs::create_dir_all(exporter.dir())?;
    tokio::spawn(export::sweep_loop(
        exporter.clone(),
        Duration::from_secs(config.export.ttl_secs),
        Duration::from_secs(config.export.sweep_interval_secs.max(1)),
    ));

    let chat = Arc::new(SlackWebClient::new(
        &config.slack.api_base,
        secrets.slack_bot_token.clone(),
    ));

    let addr: SocketAddr = args.bind.parse()?;
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    tracing::info!("  SLACKFLAKE v0.1.0");
    tracing::info!("  Slack:      http://{}/slack/commands", addr);
    tracing::info!("  API:        http://{}/api/status", addr);
    tracing::info!("  Catalog:    {} criteria types", catalog.len());
    tracing::info!("  Presto:     {}", config.warehouse.url);
    tracing::info!(
        "  Snowflake:  {}",
        config.snowflake.base_url().unwrap_or_else(|| "(not configured)".into())
    );
    tracing::info!("  Exports:    {:?} (kept {}s)", exporter.dir(), config.export.ttl_secs);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let state = Arc::new(AppState {
        config,
        resolver: Arc::new(resolver),
        warehouse,
        operational,
        chat,
        exporter,
        signature,
        start_time: Instant::now(),
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
