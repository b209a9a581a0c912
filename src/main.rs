// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Archon server entry point.

use std::sync::Arc;

use clap::Parser;

use archon::api::{self, AppState};
use archon::config::{load_server_config, SettingsCache};
use archon::crawling::PageFetcher;
use archon::embeddings::EmbeddingService;
use archon::llm::{LlmClientFactory, RateLimitConfig, RateLimiter};
use archon::orchestration::IngestContext;
use archon::search::RagService;
use archon::storage;
use archon::telemetry::{init_telemetry, TelemetryConfig};

/// Archon - knowledge ingestion and retrieval server.
#[derive(Parser)]
#[command(name = "archon-server")]
#[command(author, version, about = "Knowledge ingestion and retrieval engine", long_about = None)]
struct Cli {
    /// HTTP listen port
    #[arg(short, long, env = "ARCHON_SERVER_PORT")]
    port: Option<u16>,

    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let workspace = std::env::current_dir()?;
    let mut config = load_server_config(&workspace)?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(url) = cli.database_url {
        config.database_url = Some(url);
    }

    let mut telemetry = TelemetryConfig::default();
    if let Some(filter) = cli.log_level.or(config.log_level.clone()) {
        telemetry = telemetry.with_filter(filter);
    }
    let _guard = init_telemetry(&telemetry)?;

    let database_url = config
        .database_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required (env, --database-url, or config file)"))?;

    tracing::info!("Connecting to Postgres...");
    let pool = storage::connect(&database_url).await?;

    let settings = Arc::new(SettingsCache::new());
    let factory = LlmClientFactory::new(Arc::clone(&settings));
    let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));
    let embeddings = Arc::new(EmbeddingService::new(factory.clone(), limiter));
    let fetcher = Arc::new(PageFetcher::new(Arc::clone(&settings)));

    let ctx = IngestContext {
        pool: pool.clone(),
        settings: Arc::clone(&settings),
        factory: factory.clone(),
        embeddings: Arc::clone(&embeddings),
        fetcher,
    };

    let rag = Arc::new(RagService::from_settings(
        pool,
        Arc::clone(&settings),
        embeddings,
        factory.http().clone(),
    ));

    let app = api::router(AppState { ctx, rag });

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Archon server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
