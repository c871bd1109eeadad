use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use traffic_sampler::config::Config;
use traffic_sampler::refcount::RefCounter;
use traffic_sampler::service::SamplingService;
use traffic_sampler::{feed, server, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    // ── 1. Start the sampling service ────────────────────────────
    let service_config = match config.service_config() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };
    let sampler = match SamplingService::spawn(service_config) {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "cannot start sampling service");
            std::process::exit(2);
        }
    };
    let subscribers = RefCounter::new();

    // ── 2. Synthetic producer, gated on attached consumers ───────
    if config.no_feed {
        info!("synthetic feed disabled");
    } else {
        tokio::spawn(feed::run(
            subscribers.clone(),
            sampler.clone(),
            config.feed_interval(),
            config.feed_seed,
        ));
    }

    // ── 3. Build shared state & router ───────────────────────────
    let state = Arc::new(AppState {
        sampler,
        subscribers,
    });
    let app = server::create_router(state);

    // ── 4. Bind & serve ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .expect("Failed to bind listen address — is it already in use?");

    info!(addr = %config.listen, "listening");
    info!("snapshot stream → /api/traffic/stream");
    info!("snapshot JSON   → /api/traffic");

    axum::serve(listener, app)
        .await
        .expect("Server exited with error");
}
