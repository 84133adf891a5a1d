use std::{
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::extractor::{ExtractError, ExtractErrorKind, ExtractedInfo, Extractor};

/// Polls `check` until it holds, for up to two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// What the fake writes when asked to download.
#[derive(Debug, Clone)]
pub struct DownloadPlan {
    /// Filename reported back as the predicted output.
    pub predicted: String,
    /// Filename actually written, if any.
    pub written: Option<String>,
    pub contents: Vec<u8>,
}

/// In-process stand-in for yt-dlp.
pub struct FakeExtractor {
    info: Result<ExtractedInfo, (ExtractErrorKind, String)>,
    download: Result<DownloadPlan, (ExtractErrorKind, String)>,
    calls: AtomicUsize,
    entries_at_download: Mutex<Vec<usize>>,
    download_dirs: Mutex<Vec<PathBuf>>,
}

impl FakeExtractor {
    fn new(
        info: Result<ExtractedInfo, (ExtractErrorKind, String)>,
        download: Result<DownloadPlan, (ExtractErrorKind, String)>,
    ) -> Self {
        Self {
            info,
            download,
            calls: AtomicUsize::new(0),
            entries_at_download: Mutex::new(Vec::new()),
            download_dirs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_info(info: ExtractedInfo) -> Self {
        Self::new(
            Ok(info),
            Err((ExtractErrorKind::Failed, "no download configured".to_string())),
        )
    }

    pub fn failing(kind: ExtractErrorKind, message: &str) -> Self {
        Self::new(
            Err((kind, message.to_string())),
            Err((kind, message.to_string())),
        )
    }

    pub fn downloading(predicted: &str, written: Option<&str>, contents: &[u8]) -> Self {
        Self::new(
            Ok(ExtractedInfo::default()),
            Ok(DownloadPlan {
                predicted: predicted.to_string(),
                written: written.map(ToString::to_string),
                contents: contents.to_vec(),
            }),
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of entries present in the output directory at each download call.
    pub fn entries_at_download(&self) -> Vec<usize> {
        self.entries_at_download.lock().unwrap().clone()
    }

    pub fn download_dirs(&self) -> Vec<PathBuf> {
        self.download_dirs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract_info(&self, _url: &str) -> Result<ExtractedInfo, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.info
            .clone()
            .map_err(|(kind, message)| ExtractError::new(kind, message))
    }

    async fn download(&self, _url: &str, output_dir: &Path) -> Result<PathBuf, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let entries = std::fs::read_dir(output_dir)
            .map(|entries| entries.count())
            .unwrap_or(0);
        self.entries_at_download.lock().unwrap().push(entries);
        self.download_dirs
            .lock()
            .unwrap()
            .push(output_dir.to_path_buf());

        let plan = self
            .download
            .clone()
            .map_err(|(kind, message)| ExtractError::new(kind, message))?;

        if let Some(written) = &plan.written {
            std::fs::write(output_dir.join(written), &plan.contents).unwrap();
        }

        Ok(output_dir.join(&plan.predicted))
    }
}
