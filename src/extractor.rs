use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Output,
    time::Duration,
};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{process::Command, time::timeout};
use tracing::debug;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
pub const DEFAULT_CONTAINER: &str = "mp4";
const FORMAT_SELECTOR: &str = "bestvideo+bestaudio/best";
const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";
const SIGN_IN_CHALLENGE: &str = "sign in to confirm";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractErrorKind {
    /// The upstream host wants a signed-in session before serving this server.
    SignInRequired,
    /// The extractor binary could not be started.
    Unavailable,
    TimedOut,
    /// The extractor succeeded but its output could not be interpreted.
    Malformed,
    Failed,
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ExtractError {
    pub kind: ExtractErrorKind,
    pub message: String,
}

impl ExtractError {
    pub fn new(kind: ExtractErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Subset of the yt-dlp info JSON the service projects from.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ExtractedInfo {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub duration_string: Option<String>,
    #[serde(default)]
    pub entries: Option<Vec<serde_json::Value>>,
}

impl ExtractedInfo {
    pub fn entry_count(&self) -> usize {
        self.entries.as_ref().map_or(0, Vec::len)
    }
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Resolves metadata for `url` without downloading anything.
    async fn extract_info(&self, url: &str) -> Result<ExtractedInfo, ExtractError>;

    /// Downloads and merges `url` into `output_dir` and returns the filename the
    /// extractor predicted. The merge step may have changed its extension.
    async fn download(&self, url: &str, output_dir: &Path) -> Result<PathBuf, ExtractError>;
}

pub struct YtDlp {
    binary: String,
    cookies_file: PathBuf,
    timeout: Option<Duration>,
}

impl YtDlp {
    pub fn new(binary: impl Into<String>, cookies_file: PathBuf, timeout: Option<Duration>) -> Self {
        Self {
            binary: binary.into(),
            cookies_file,
            timeout,
        }
    }

    async fn cookies(&self) -> Option<&Path> {
        match tokio::fs::metadata(&self.cookies_file).await {
            Ok(metadata) if metadata.is_file() => Some(self.cookies_file.as_path()),
            _ => None,
        }
    }

    async fn run(&self, args: Vec<String>) -> Result<Output, ExtractError> {
        debug!("Running {} {:?}", self.binary, args);

        let command_future = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output();

        let result = match self.timeout {
            Some(limit) => timeout(limit, command_future).await.map_err(|_| {
                ExtractError::new(
                    ExtractErrorKind::TimedOut,
                    format!("yt-dlp did not finish within {} seconds", limit.as_secs()),
                )
            })?,
            None => command_future.await,
        };

        let output = result.map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                ExtractError::new(
                    ExtractErrorKind::Unavailable,
                    format!("{} is not installed or not on PATH", self.binary),
                )
            } else {
                ExtractError::new(
                    ExtractErrorKind::Unavailable,
                    format!("Could not run {}: {error}", self.binary),
                )
            }
        })?;

        if !output.status.success() {
            return Err(classify_failure(&output.stderr));
        }

        Ok(output)
    }
}

#[async_trait]
impl Extractor for YtDlp {
    async fn extract_info(&self, url: &str) -> Result<ExtractedInfo, ExtractError> {
        let args = info_args(url, self.cookies().await);
        let output = self.run(args).await?;

        serde_json::from_slice(&output.stdout).map_err(|error| {
            ExtractError::new(
                ExtractErrorKind::Malformed,
                format!("Could not parse yt-dlp metadata: {error}"),
            )
        })
    }

    async fn download(&self, url: &str, output_dir: &Path) -> Result<PathBuf, ExtractError> {
        let args = download_args(url, output_dir, self.cookies().await);
        let output = self.run(args).await?;

        extract_printed_path(&output.stdout)
            .map(PathBuf::from)
            .ok_or_else(|| {
                ExtractError::new(
                    ExtractErrorKind::Malformed,
                    "yt-dlp did not report an output filename",
                )
            })
    }
}

fn common_args(cookies: Option<&Path>) -> Vec<String> {
    let mut args = vec![
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--add-headers".to_string(),
        format!("User-Agent:{BROWSER_USER_AGENT}"),
    ];

    if let Some(path) = cookies {
        args.push("--cookies".to_string());
        args.push(path.to_string_lossy().into_owned());
    }

    args
}

fn info_args(url: &str, cookies: Option<&Path>) -> Vec<String> {
    let mut args = vec!["-J".to_string(), "--flat-playlist".to_string()];
    args.extend(common_args(cookies));
    args.push(url.to_string());
    args
}

fn download_args(url: &str, output_dir: &Path, cookies: Option<&Path>) -> Vec<String> {
    let mut args = vec![
        "-f".to_string(),
        FORMAT_SELECTOR.to_string(),
        "--merge-output-format".to_string(),
        DEFAULT_CONTAINER.to_string(),
        "--no-simulate".to_string(),
        "--print".to_string(),
        "filename".to_string(),
        "-o".to_string(),
        output_dir.join(OUTPUT_TEMPLATE).to_string_lossy().into_owned(),
    ];
    args.extend(common_args(cookies));
    args.push(url.to_string());
    args
}

fn classify_failure(stderr: &[u8]) -> ExtractError {
    let stderr = String::from_utf8_lossy(stderr);
    let message = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp exited without an error message")
        .to_string();

    let kind = if stderr.to_ascii_lowercase().contains(SIGN_IN_CHALLENGE) {
        ExtractErrorKind::SignInRequired
    } else {
        ExtractErrorKind::Failed
    };

    ExtractError::new(kind, message)
}

fn extract_printed_path(stdout: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .map(ToString::to_string)
}
