use serde::Serialize;
use tracing::warn;

use crate::{
    config::non_empty,
    error::ApiError,
    extractor::{ExtractError, ExtractErrorKind, ExtractedInfo, Extractor},
};

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct VideoMetadata {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<String>,
    pub is_playlist: bool,
}

impl From<ExtractedInfo> for VideoMetadata {
    fn from(info: ExtractedInfo) -> Self {
        let is_playlist = info.entry_count() > 1;
        Self {
            title: info.title,
            thumbnail: info.thumbnail,
            duration: info.duration_string,
            is_playlist,
        }
    }
}

/// Looks up `url` without downloading it.
pub async fn get_info(extractor: &dyn Extractor, url: Option<&str>) -> Result<VideoMetadata, ApiError> {
    let url = url.and_then(non_empty).ok_or_else(ApiError::missing_url)?;

    let info = extractor
        .extract_info(url)
        .await
        .map_err(|error| info_error(url, error))?;

    Ok(info.into())
}

fn info_error(url: &str, error: ExtractError) -> ApiError {
    warn!("Metadata lookup failed for {:?}: {}", url, error);
    match error.kind {
        ExtractErrorKind::SignInRequired => ApiError::upstream_blocked(),
        _ => ApiError::bad_request(error.message),
    }
}
