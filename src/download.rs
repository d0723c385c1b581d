use crate::config::EngineLocations;
use crate::progress::{self, StatusRecord};
use crate::quality::{resolve_selector, QualityProfile};
use crate::result::JobResult;
use crate::{EngineError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub quality: QualityProfile,
    pub destination_dir: PathBuf,
}

impl DownloadRequest {
    pub fn new(
        url: impl Into<String>,
        quality: QualityProfile,
        destination_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            url: url.into(),
            quality,
            destination_dir: destination_dir.into(),
        }
    }
}

/// Everything a download engine is configured with for a single item.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineDownloadOptions {
    pub format_selector: String,
    /// `{destination}/%(title)s.%(ext)s`
    pub output_template: PathBuf,
    pub single_item_only: bool,
    pub merge_container: String,
    /// Local ffmpeg used by the engine for merge/remux steps.
    pub ffmpeg_location: PathBuf,
}

impl EngineDownloadOptions {
    pub fn for_request(
        request: &DownloadRequest,
        locations: &EngineLocations,
        ffmpeg_location: PathBuf,
    ) -> Self {
        Self {
            format_selector: resolve_selector(request.quality).to_string(),
            output_template: output_template(&request.destination_dir),
            single_item_only: locations.download.single_item_only,
            merge_container: locations.download.merge_container.clone(),
            ffmpeg_location,
        }
    }
}

pub fn output_template(destination_dir: &Path) -> PathBuf {
    destination_dir.join("%(title)s.%(ext)s")
}

/// Extraction/download capability: given a URL and options, produce a file
/// and report status records as it goes.
///
/// Returns the final file path when the engine reports one. Failures carry
/// the engine's own diagnostic.
pub trait DownloadEngine: Send + Sync {
    fn download(
        &self,
        url: &str,
        options: &EngineDownloadOptions,
        sink: &mut dyn FnMut(StatusRecord),
        cancel: &AtomicBool,
    ) -> Result<Option<PathBuf>>;
}

pub struct DownloadJob {
    request: DownloadRequest,
}

impl DownloadJob {
    pub fn new(request: DownloadRequest) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &DownloadRequest {
        &self.request
    }

    /// Runs the download to completion on the current thread. Never returns
    /// an error; every failure becomes `JobResult::Failure`.
    pub fn execute(
        self,
        locations: &EngineLocations,
        engine: &dyn DownloadEngine,
        cancel: &AtomicBool,
        on_progress: &mut dyn FnMut(f64),
    ) -> JobResult {
        self.run(locations, engine, cancel, on_progress).into()
    }

    fn run(
        self,
        locations: &EngineLocations,
        engine: &dyn DownloadEngine,
        cancel: &AtomicBool,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<PathBuf> {
        let ffmpeg = locations.require_ffmpeg()?;
        let url = validate_media_url(&self.request.url)?;
        ensure_directory(&self.request.destination_dir)?;

        if cancel.load(Ordering::SeqCst) {
            return Err(EngineError::Canceled);
        }

        let options = EngineDownloadOptions::for_request(&self.request, locations, ffmpeg);
        let mut sink = |record: StatusRecord| {
            if let Some(percent) = progress::parse(&record) {
                on_progress(percent);
            }
        };
        let reported = engine.download(&url, &options, &mut sink, cancel)?;

        Ok(reported.unwrap_or(self.request.destination_dir))
    }
}

/// Accepts YouTube watch/short links, with or without scheme.
pub fn validate_media_url(url: &str) -> Result<String> {
    static MEDIA_URL_RE: OnceLock<Regex> = OnceLock::new();
    let re = MEDIA_URL_RE.get_or_init(|| {
        Regex::new(r"^(https?://)?(www\.|m\.|music\.)?(youtube\.com|youtu\.be)/\S+$").unwrap()
    });

    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidRequest("url is empty".to_string()));
    }
    if !re.is_match(trimmed) {
        return Err(EngineError::InvalidRequest(format!(
            "not a recognized media url: {trimmed}"
        )));
    }
    Ok(trimmed.to_string())
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(EngineError::InvalidRequest(
            "destination directory is empty".to_string(),
        ));
    }
    if path.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(path).map_err(|e| {
        EngineError::InvalidRequest(format!(
            "cannot create destination directory {}: {e}",
            path.display()
        ))
    })
}
