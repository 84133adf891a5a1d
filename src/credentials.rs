use std::path::Path;

use tracing::info;

use crate::error::ApiError;

/// Writes the configured cookie export to `cookies_file`, replacing whatever
/// was there. Without a blob the existing file (if any) is left alone.
pub async fn provision_cookie_file(blob: Option<&str>, cookies_file: &Path) -> Result<(), ApiError> {
    let Some(blob) = blob.filter(|value| !value.is_empty()) else {
        return Ok(());
    };

    if let Some(parent) = cookies_file.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.map_err(|error| {
            ApiError::internal(format!(
                "Could not create directory for cookie file {}: {error}",
                cookies_file.display()
            ))
        })?;
    }

    tokio::fs::write(cookies_file, blob).await.map_err(|error| {
        ApiError::internal(format!(
            "Could not write cookie file {}: {error}",
            cookies_file.display()
        ))
    })?;

    info!("Cookie file written to {}", cookies_file.display());
    Ok(())
}
