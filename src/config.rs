use std::{path::PathBuf, time::Duration};

use crate::error::ApiError;

const DEFAULT_PORT: u16 = 10000;
const DEFAULT_SCRATCH_DIR: &str = "/tmp/downloads";
const DEFAULT_COOKIES_FILE: &str = "cookies.txt";
const DEFAULT_YT_DLP_BIN: &str = "yt-dlp";

/// How download jobs share the scratch directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScratchMode {
    /// One directory for every request, purged before each download.
    Shared,
    /// A fresh `<scratch>/<uuid>` directory per download.
    PerRequest,
}

impl ScratchMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "shared" => Some(Self::Shared),
            "per-request" | "per_request" | "isolated" => Some(Self::PerRequest),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub scratch_dir: PathBuf,
    pub scratch_mode: ScratchMode,
    pub cookies_blob: Option<String>,
    pub cookies_file: PathBuf,
    pub yt_dlp_bin: String,
    pub yt_dlp_timeout: Option<Duration>,
    pub allowed_origins: Vec<String>,
    pub static_dir: Option<PathBuf>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).and_then(|value| non_empty(&value).map(str::to_string));

        let scratch_mode = match read("SCRATCH_ISOLATION") {
            Some(value) => ScratchMode::parse(&value).ok_or_else(|| {
                ApiError::internal(format!(
                    "Invalid SCRATCH_ISOLATION value {value:?}. Use \"shared\" or \"per-request\"."
                ))
            })?,
            None => ScratchMode::Shared,
        };

        let yt_dlp_timeout = read("YT_DLP_TIMEOUT_SECONDS")
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|seconds| *seconds > 0)
            .map(Duration::from_secs);

        let allowed_origins = read("ALLOWED_ORIGINS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind_addr: resolve_bind_addr(read("APP_ADDR"), read("PORT")),
            scratch_dir: read("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRATCH_DIR)),
            scratch_mode,
            cookies_blob: lookup("YOUTUBE_COOKIES").filter(|value| !value.trim().is_empty()),
            cookies_file: read("COOKIES_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_COOKIES_FILE)),
            yt_dlp_bin: read("YT_DLP_BIN").unwrap_or_else(|| DEFAULT_YT_DLP_BIN.to_string()),
            yt_dlp_timeout,
            allowed_origins,
            static_dir: read("STATIC_DIR").map(PathBuf::from),
        })
    }
}

fn resolve_bind_addr(app_addr: Option<String>, port: Option<String>) -> String {
    if let Some(configured) = app_addr {
        return configured;
    }

    let port = port
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    format!("0.0.0.0:{port}")
}

pub fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings_from(pairs: &[(&str, &str)]) -> Result<Settings, ApiError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_configured() {
        let settings = settings_from(&[]).unwrap();
        assert_eq!(settings.bind_addr, "0.0.0.0:10000");
        assert_eq!(settings.scratch_dir, PathBuf::from("/tmp/downloads"));
        assert_eq!(settings.scratch_mode, ScratchMode::Shared);
        assert_eq!(settings.cookies_blob, None);
        assert_eq!(settings.cookies_file, PathBuf::from("cookies.txt"));
        assert_eq!(settings.yt_dlp_bin, "yt-dlp");
        assert_eq!(settings.yt_dlp_timeout, None);
        assert!(settings.allowed_origins.is_empty());
        assert_eq!(settings.static_dir, None);
    }

    #[test]
    fn app_addr_wins_over_port() {
        let settings = settings_from(&[("APP_ADDR", "127.0.0.1:9000"), ("PORT", "8080")]).unwrap();
        assert_eq!(settings.bind_addr, "127.0.0.1:9000");

        let settings = settings_from(&[("PORT", "8080")]).unwrap();
        assert_eq!(settings.bind_addr, "0.0.0.0:8080");

        let settings = settings_from(&[("PORT", "not-a-port")]).unwrap();
        assert_eq!(settings.bind_addr, "0.0.0.0:10000");
    }

    #[test]
    fn blank_cookie_blob_counts_as_absent() {
        let settings = settings_from(&[("YOUTUBE_COOKIES", "   \n")]).unwrap();
        assert_eq!(settings.cookies_blob, None);
    }

    #[test]
    fn cookie_blob_is_kept_verbatim() {
        let blob = "# Netscape HTTP Cookie File\n.youtube.com\tTRUE\t/\tTRUE\t0\tSID\tabc\n";
        let settings = settings_from(&[("YOUTUBE_COOKIES", blob)]).unwrap();
        assert_eq!(settings.cookies_blob.as_deref(), Some(blob));
    }

    #[test]
    fn parses_scratch_isolation() {
        let settings = settings_from(&[("SCRATCH_ISOLATION", "Per-Request")]).unwrap();
        assert_eq!(settings.scratch_mode, ScratchMode::PerRequest);

        let error = settings_from(&[("SCRATCH_ISOLATION", "sometimes")]).unwrap_err();
        assert!(error.message.contains("SCRATCH_ISOLATION"));
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        let settings = settings_from(&[("YT_DLP_TIMEOUT_SECONDS", "0")]).unwrap();
        assert_eq!(settings.yt_dlp_timeout, None);

        let settings = settings_from(&[("YT_DLP_TIMEOUT_SECONDS", "90")]).unwrap();
        assert_eq!(settings.yt_dlp_timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn splits_allowed_origins() {
        let settings = settings_from(&[(
            "ALLOWED_ORIGINS",
            "https://a.example, ,http://localhost:5173",
        )])
        .unwrap();
        assert_eq!(
            settings.allowed_origins,
            vec!["https://a.example", "http://localhost:5173"]
        );
    }
}
