use crate::paths::AppPaths;
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeDefaults {
    /// ffmpeg encoder name; hardware encoders such as `h264_nvenc` are preferred.
    pub video_codec: String,
    pub audio_codec: String,
    pub preset: String,
    pub output_suffix: String,
    pub output_extension: String,
}

impl Default for TranscodeDefaults {
    fn default() -> Self {
        Self {
            video_codec: "h264_nvenc".to_string(),
            audio_codec: "aac".to_string(),
            preset: "fast".to_string(),
            output_suffix: "_converted".to_string(),
            output_extension: "mp4".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadOptions {
    pub merge_container: String,
    pub single_item_only: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            merge_container: "mp4".to_string(),
            single_item_only: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ytdlp_path: Option<PathBuf>,
    pub transcode: TranscodeDefaults,
    pub download: DownloadOptions,
    /// Opt-in per-job JSONL diagnostics under `logs/jobs`.
    pub job_logs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ytdlp_path: None,
            transcode: TranscodeDefaults::default(),
            download: DownloadOptions::default(),
            job_logs: false,
        }
    }
}

pub fn load_engine_config(paths: &AppPaths) -> Result<EngineConfig> {
    let path = paths.engine_config_path();
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    let bytes = std::fs::read(&path)?;
    let parsed: EngineConfig = serde_json::from_slice(&bytes).map_err(|e| {
        EngineError::InstallFailed(format!(
            "failed to parse engine config at {}: {e}",
            path.to_string_lossy()
        ))
    })?;
    Ok(parsed)
}

pub fn save_engine_config(paths: &AppPaths, config: &EngineConfig) -> Result<()> {
    let path = paths.engine_config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, format!("{json}\n"))?;
    Ok(())
}

/// Read-only engine configuration shared by every job a runner executes.
#[derive(Debug, Clone)]
pub struct EngineLocations {
    pub ffmpeg: PathBuf,
    pub ytdlp: PathBuf,
    pub job_logs_dir: Option<PathBuf>,
    pub transcode: TranscodeDefaults,
    pub download: DownloadOptions,
}

impl EngineLocations {
    pub fn resolve(paths: &AppPaths, config: &EngineConfig) -> Self {
        let ffmpeg = match &config.ffmpeg_path {
            Some(path) => path.clone(),
            None => {
                let bundled = paths.ffmpeg_bin_path();
                if bundled.exists() {
                    bundled
                } else {
                    PathBuf::from("ffmpeg")
                }
            }
        };

        let ytdlp = match &config.ytdlp_path {
            Some(path) => path.clone(),
            None => {
                let bundled = paths.ytdlp_bin_path();
                if bundled.exists() {
                    bundled
                } else {
                    PathBuf::from("yt-dlp")
                }
            }
        };

        Self {
            ffmpeg,
            ytdlp,
            job_logs_dir: config.job_logs.then(|| paths.job_logs_dir()),
            transcode: config.transcode.clone(),
            download: config.download.clone(),
        }
    }

    /// Locations with default options and no job log.
    pub fn new(ffmpeg: impl Into<PathBuf>, ytdlp: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ytdlp: ytdlp.into(),
            job_logs_dir: None,
            transcode: TranscodeDefaults::default(),
            download: DownloadOptions::default(),
        }
    }

    pub fn with_job_logs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.job_logs_dir = Some(dir.into());
        self
    }

    /// The transcoding engine must exist before any job starts work. A bare
    /// program name such as `ffmpeg` is looked up on `PATH`.
    pub fn require_ffmpeg(&self) -> Result<PathBuf> {
        self.find_ffmpeg(std::env::var_os("PATH"))
    }

    fn find_ffmpeg(&self, search_path: Option<OsString>) -> Result<PathBuf> {
        if self.ffmpeg.is_file() {
            return Ok(self.ffmpeg.clone());
        }
        if is_bare_program_name(&self.ffmpeg) {
            let cwd = std::env::current_dir().unwrap_or_default();
            if let Ok(found) = which::which_in(&self.ffmpeg, search_path, cwd) {
                return Ok(found);
            }
        }
        Err(EngineError::EngineNotFound {
            tool: "ffmpeg".to_string(),
            path: self.ffmpeg.clone(),
        })
    }
}

fn is_bare_program_name(path: &Path) -> bool {
    path.parent() == Some(Path::new("")) && !path.as_os_str().is_empty()
}
