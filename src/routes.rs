use std::{collections::HashSet, path::Path, sync::Arc};

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderName, HeaderValue, Method, header::CONTENT_DISPOSITION},
    response::Response,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    download::{X_DOWNLOAD_FILENAME, download},
    error::ApiError,
    extractor::Extractor,
    metadata::{VideoMetadata, get_info},
    scratch::ScratchSpace,
};

#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<dyn Extractor>,
    pub scratch: ScratchSpace,
}

#[derive(Debug, Deserialize)]
struct UrlRequest {
    #[serde(default)]
    url: Option<String>,
}

pub fn build_router(state: AppState, cors: CorsLayer, static_dir: Option<&Path>) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/info", post(fetch_info))
        .route("/download", post(start_download))
        .with_state(state);

    let router = match static_dir {
        Some(dir) => {
            info!("Serving static assets from {}", dir.display());
            router.fallback_service(ServeDir::new(dir))
        }
        None => router,
    };

    router.layer(cors).layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn fetch_info(
    State(state): State<AppState>,
    payload: Result<Json<UrlRequest>, JsonRejection>,
) -> Result<Json<VideoMetadata>, ApiError> {
    let Json(payload) = payload?;
    get_info(state.extractor.as_ref(), payload.url.as_deref())
        .await
        .map(Json)
}

async fn start_download(
    State(state): State<AppState>,
    payload: Result<Json<UrlRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    download(
        state.extractor.as_ref(),
        &state.scratch,
        payload.url.as_deref(),
    )
    .await
}

/// Builds the CORS layer. Without an allow-list every origin is accepted.
pub fn build_cors_layer(allowed_origins: &[String]) -> Result<CorsLayer, ApiError> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .expose_headers([
            CONTENT_DISPOSITION,
            HeaderName::from_static(X_DOWNLOAD_FILENAME),
        ]);

    if allowed_origins.is_empty() {
        warn!("ALLOWED_ORIGINS is not set. Accepting requests from any origin.");
        return Ok(layer.allow_origin(Any));
    }

    let normalized_origins = allowed_origins
        .iter()
        .map(|origin| {
            normalize_origin(origin).ok_or_else(|| {
                ApiError::internal(format!(
                    "Invalid origin in ALLOWED_ORIGINS: {origin}. Use values like https://example.com"
                ))
            })
        })
        .collect::<Result<HashSet<_>, _>>()?;
    info!(
        "CORS allow-list loaded with {} origin(s): {:?}",
        normalized_origins.len(),
        normalized_origins
    );

    let allowed = Arc::new(normalized_origins);
    Ok(layer.allow_origin(AllowOrigin::predicate(
        move |origin: &HeaderValue, _| {
            let normalized = origin.to_str().ok().and_then(normalize_origin);
            let accepted = normalized
                .as_ref()
                .is_some_and(|value| allowed.contains(value));
            debug!("CORS origin {:?} accepted={}", origin, accepted);
            accepted
        },
    )))
}

fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let scheme = parsed.scheme();
    let default_port = match scheme {
        "http" => 80,
        "https" => 443,
        _ => return None,
    };

    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return None;
    }

    match parsed.port() {
        Some(port) if port != default_port => Some(format!("{scheme}://{host}:{port}")),
        _ => Some(format!("{scheme}://{host}")),
    }
}
