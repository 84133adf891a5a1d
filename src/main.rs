mod config;
mod credentials;
mod download;
mod error;
mod extractor;
mod metadata;
mod routes;
mod scratch;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{
    config::{ScratchMode, Settings},
    error::ApiError,
    extractor::YtDlp,
    routes::{AppState, build_cors_layer, build_router},
    scratch::ScratchSpace,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "media_relay=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {}", error.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ApiError> {
    let settings = Settings::from_env()?;

    credentials::provision_cookie_file(settings.cookies_blob.as_deref(), &settings.cookies_file)
        .await?;
    if tokio::fs::try_exists(&settings.cookies_file)
        .await
        .unwrap_or(false)
    {
        info!("Using cookie file {}", settings.cookies_file.display());
    } else {
        warn!("No cookie file found. yt-dlp will run without credentials.");
    }

    let scratch = ScratchSpace::new(settings.scratch_dir.clone(), settings.scratch_mode);
    scratch.ensure_root().await?;
    match scratch.mode() {
        ScratchMode::Shared => warn!(
            "Scratch directory {} is shared: concurrent downloads can delete each other's files.",
            scratch.root().display()
        ),
        ScratchMode::PerRequest => info!(
            "Downloads are staged in per-request directories under {}",
            scratch.root().display()
        ),
    }

    if let Some(limit) = settings.yt_dlp_timeout {
        info!("yt-dlp calls are limited to {} seconds", limit.as_secs());
    }

    let state = AppState {
        extractor: Arc::new(YtDlp::new(
            settings.yt_dlp_bin.clone(),
            settings.cookies_file.clone(),
            settings.yt_dlp_timeout,
        )),
        scratch,
    };

    let cors = build_cors_layer(&settings.allowed_origins)?;
    let app = build_router(state, cors, settings.static_dir.as_deref());

    let addr = settings.bind_addr;
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|error| ApiError::internal(format!("Could not bind {addr}: {error}")))?;

    info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .await
        .map_err(|error| ApiError::internal(format!("HTTP server error: {error}")))
}
