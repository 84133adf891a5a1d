use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use axum::{
    body::Body,
    http::{
        HeaderMap, HeaderName, HeaderValue,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::{
    config::non_empty,
    error::ApiError,
    extractor::{DEFAULT_CONTAINER, ExtractError, Extractor},
    scratch::ScratchSpace,
};

pub const X_DOWNLOAD_FILENAME: &str = "x-download-filename";
const FALLBACK_FILENAME: &str = "download.mp4";

/// Downloads `url` into scratch space and returns a response streaming the
/// file as an attachment. The file is deleted once the body has been sent or
/// abandoned, and on every failure path before that.
pub async fn download(
    extractor: &dyn Extractor,
    scratch: &ScratchSpace,
    url: Option<&str>,
) -> Result<Response, ApiError> {
    let url = url.and_then(non_empty).ok_or_else(ApiError::missing_url)?;

    let mut job = scratch.begin_job().await?;

    let predicted = extractor
        .download(url, job.dir())
        .await
        .map_err(|error| download_error(url, error))?;
    let resolved = resolve_artifact(job.dir(), &predicted).await?;
    job.track(resolved.clone());

    let filename = resolved
        .file_name()
        .and_then(|name| name.to_str())
        .map(ToString::to_string)
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string());

    let file = tokio::fs::File::open(&resolved).await.map_err(|error| {
        ApiError::internal(format!("Could not open downloaded file: {error}"))
    })?;
    let content_length = file
        .metadata()
        .await
        .map_err(|error| ApiError::internal(format!("Could not read downloaded file: {error}")))?
        .len();

    info!("Serving {:?} ({content_length} bytes) for {:?}", filename, url);

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(content_type_for_filename(&filename)),
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(content_length));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&build_content_disposition(&filename))
            .map_err(|_| ApiError::internal("Could not build download headers."))?,
    );
    headers.insert(
        HeaderName::from_static(X_DOWNLOAD_FILENAME),
        HeaderValue::from_str(&sanitize_ascii_filename(&filename))
            .map_err(|_| ApiError::internal("Could not build download headers."))?,
    );

    // The job rides along with the stream so its cleanup runs when the body is dropped.
    let stream = ReaderStream::new(file).map(move |chunk| {
        let _ = &job;
        chunk
    });

    Ok((headers, Body::from_stream(stream)).into_response())
}

fn download_error(url: &str, error: ExtractError) -> ApiError {
    warn!("Download failed for {:?} ({:?}): {}", url, error.kind, error);
    ApiError::internal(error.message)
}

/// Finds the file the extractor produced. When the predicted name is missing
/// (the merge rewrote the container) the default container extension is tried
/// once on the same base name.
pub async fn resolve_artifact(job_dir: &Path, predicted: &Path) -> Result<PathBuf, ApiError> {
    let canonical_job_dir = tokio::fs::canonicalize(job_dir).await.map_err(|error| {
        ApiError::internal(format!("Could not resolve scratch directory: {error}"))
    })?;

    if let Some(path) = existing_candidate(&canonical_job_dir, predicted).await? {
        return Ok(path);
    }

    let corrected = predicted.with_extension(DEFAULT_CONTAINER);
    if let Some(path) = existing_candidate(&canonical_job_dir, &corrected).await? {
        return Ok(path);
    }

    Err(ApiError::internal(format!(
        "Downloaded file not found: {}",
        corrected.display()
    )))
}

async fn existing_candidate(
    canonical_job_dir: &Path,
    candidate: &Path,
) -> Result<Option<PathBuf>, ApiError> {
    let metadata = match tokio::fs::metadata(candidate).await {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(ApiError::internal(format!(
                "Could not inspect downloaded file: {error}"
            )));
        }
    };

    if !metadata.is_file() {
        return Ok(None);
    }

    let canonical = tokio::fs::canonicalize(candidate).await.map_err(|error| {
        ApiError::internal(format!("Could not resolve downloaded file: {error}"))
    })?;

    if !canonical.starts_with(canonical_job_dir) {
        warn!("Ignoring file outside the scratch directory: {:?}", canonical);
        return Ok(None);
    }

    Ok(Some(canonical))
}

fn content_type_for_filename(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "m4a" => "audio/mp4",
        "mp3" => "audio/mpeg",
        "opus" | "ogg" => "audio/ogg",
        _ => "application/octet-stream",
    }
}

fn build_content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitize_ascii_filename(filename),
        urlencoding::encode(filename)
    )
}

fn sanitize_ascii_filename(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric()
                || matches!(character, '.' | '-' | '_' | ' ' | '(' | ')')
            {
                character
            } else {
                '_'
            }
        })
        .collect();

    match non_empty(&sanitized) {
        Some(compact) => compact.to_string(),
        None => FALLBACK_FILENAME.to_string(),
    }
}
