//! pwatch-cs - Post classification service
//!
//! Searches posts for the requested keywords, filters them, classifies them in
//! throttled batches and streams every result to the client as it arrives
//! (NDJSON, SSE or WebSocket).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pwatch_common::config::load_config;
use pwatch_cs::pipeline::Pipeline;
use pwatch_cs::services::{OpenAiClassifier, RedditClient, WhatlangDetector};
use pwatch_cs::AppState;

/// Command-line arguments for pwatch-cs
#[derive(Parser, Debug)]
#[command(name = "pwatch-cs")]
#[command(about = "Batched, rate-limited post classification service")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "PWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "PWATCH_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PWATCH_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("pwatch_cs={0},pwatch_common={0},tower_http=info", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting pwatch-cs v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE"),
    );

    let pipeline_config = config.pipeline.clone();
    info!(
        batch_size = pipeline_config.batch_size,
        max_retries = pipeline_config.max_retries,
        base_delay_secs = pipeline_config.base_delay_secs,
        batch_cooldown_secs = pipeline_config.batch_cooldown_secs,
        char_budget = pipeline_config.char_budget(),
        "Pipeline configuration"
    );

    let source = RedditClient::new(&config.reddit).context(
        "Failed to create Reddit client (set PWATCH_REDDIT_CLIENT_ID and PWATCH_REDDIT_CLIENT_SECRET or [reddit] in config)",
    )?;
    let classifier = OpenAiClassifier::new(&config.openai)
        .context("Failed to create OpenAI client (set PWATCH_OPENAI_API_KEY or [openai] api_key in config)")?;

    let pipeline = Pipeline::new(
        Arc::new(source),
        Arc::new(classifier),
        Arc::new(WhatlangDetector::new()),
        pipeline_config,
    );

    let state = AppState::new(pipeline);
    let shutdown = state.shutdown.clone();
    let app = pwatch_cs::build_router(state);

    let host = args.host.unwrap_or(config.server.host);
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Ends every open stream so in-flight responses can finish
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
