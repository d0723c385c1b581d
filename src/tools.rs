use crate::config::EngineLocations;
use crate::paths::AppPaths;
use crate::{EngineError, Result};
use serde::Serialize;
use std::ffi::OsStr;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct FfmpegToolsStatus {
    /// The configured ffmpeg answers `-version`.
    pub available: bool,
    pub bundled_installed: bool,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub ffmpeg_version: Option<String>,
}

pub fn ffmpeg_tools_status(paths: &AppPaths, locations: &EngineLocations) -> FfmpegToolsStatus {
    let resolved = locations.require_ffmpeg().ok();
    let ffmpeg_version = resolved
        .as_ref()
        .and_then(|path| tool_version_first_line(path, "-version"));
    let ffmpeg_path = resolved.unwrap_or_else(|| locations.ffmpeg.clone());

    FfmpegToolsStatus {
        available: ffmpeg_version.is_some(),
        bundled_installed: paths.ffmpeg_bin_path().exists() && paths.ffprobe_bin_path().exists(),
        ffmpeg_path: ffmpeg_path.to_string_lossy().to_string(),
        ffprobe_path: paths.ffprobe_bin_path().to_string_lossy().to_string(),
        ffmpeg_version,
    }
}

/// Downloads the platform ffmpeg build into `tools/ffmpeg`. Skipped when a
/// bundled copy is already present unless `force` is set.
pub fn install_ffmpeg_tools(
    paths: &AppPaths,
    locations: &EngineLocations,
    force: bool,
) -> Result<FfmpegToolsStatus> {
    paths.ensure_dirs()?;

    if !force && paths.ffmpeg_bin_path().exists() {
        log::info!("ffmpeg already installed at {}", paths.ffmpeg_bin_path().display());
        return Ok(ffmpeg_tools_status(paths, locations));
    }

    let destination = paths.ffmpeg_dir();
    std::fs::create_dir_all(&destination)?;

    let download_url = ffmpeg_sidecar::download::ffmpeg_download_url()
        .map_err(|e| EngineError::InstallFailed(e.to_string()))?;
    log::info!("downloading ffmpeg from {download_url}");
    let archive_path =
        ffmpeg_sidecar::download::download_ffmpeg_package(download_url, &destination)
            .map_err(|e| EngineError::InstallFailed(format!("ffmpeg download failed: {e}")))?;
    ffmpeg_sidecar::download::unpack_ffmpeg(&archive_path, &destination)
        .map_err(|e| EngineError::InstallFailed(format!("ffmpeg unpack failed: {e}")))?;

    if !paths.ffmpeg_bin_path().exists() {
        return Err(EngineError::InstallFailed(format!(
            "ffmpeg archive did not contain {}",
            paths.ffmpeg_bin_path().display()
        )));
    }

    Ok(ffmpeg_tools_status(paths, locations))
}

#[derive(Debug, Clone, Serialize)]
pub struct YtDlpToolsStatus {
    pub available: bool,
    pub bundled_installed: bool,
    pub bundled_path: String,
    pub ytdlp_path: String,
    pub ytdlp_version: Option<String>,
}

pub fn ytdlp_tools_status(paths: &AppPaths, locations: &EngineLocations) -> YtDlpToolsStatus {
    let bundled = paths.ytdlp_bin_path();
    let ytdlp_version = tool_version_first_line(&locations.ytdlp, "--version");

    YtDlpToolsStatus {
        available: ytdlp_version.is_some(),
        bundled_installed: bundled.exists(),
        bundled_path: bundled.to_string_lossy().to_string(),
        ytdlp_path: locations.ytdlp.to_string_lossy().to_string(),
        ytdlp_version,
    }
}

pub fn install_ytdlp_tools(
    paths: &AppPaths,
    locations: &EngineLocations,
    force: bool,
) -> Result<YtDlpToolsStatus> {
    paths.ensure_dirs()?;

    let destination = paths.ytdlp_bin_path();
    if !force && destination.exists() {
        log::info!("yt-dlp already installed at {}", destination.display());
        return Ok(ytdlp_tools_status(paths, locations));
    }

    #[cfg(not(windows))]
    {
        let _ = locations;
        return Err(EngineError::InstallFailed(
            "automatic yt-dlp install is only supported on Windows; install yt-dlp with your package manager"
                .to_string(),
        ));
    }

    #[cfg(windows)]
    {
        use std::io::Write;

        const YT_DLP_WINDOWS_DOWNLOAD_URL: &str =
            "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp.exe";

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = destination.with_extension("download");

        log::info!("downloading yt-dlp from {YT_DLP_WINDOWS_DOWNLOAD_URL}");
        let resp = ureq::get(YT_DLP_WINDOWS_DOWNLOAD_URL)
            .call()
            .map_err(|e| EngineError::InstallFailed(format!("yt-dlp download failed: {e}")))?;
        let status = resp.status();
        if status.as_u16() >= 400 {
            return Err(EngineError::InstallFailed(format!(
                "yt-dlp download failed (status={status})"
            )));
        }

        {
            let mut reader = resp.into_body().into_reader();
            let mut file = std::fs::File::create(&tmp_path)?;
            std::io::copy(&mut reader, &mut file)?;
            file.flush()?;
        }

        let downloaded_size = std::fs::metadata(&tmp_path).map(|m| m.len()).unwrap_or(0);
        if downloaded_size < 512 * 1024 {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(EngineError::InstallFailed(
                "downloaded yt-dlp is unexpectedly small".to_string(),
            ));
        }

        if destination.exists() {
            let _ = std::fs::remove_file(&destination);
        }
        if std::fs::rename(&tmp_path, &destination).is_err() {
            std::fs::copy(&tmp_path, &destination)?;
            let _ = std::fs::remove_file(&tmp_path);
        }

        Ok(ytdlp_tools_status(paths, locations))
    }
}

fn tool_version_first_line(program: impl AsRef<OsStr>, arg: &str) -> Option<String> {
    let program = program.as_ref();
    let output = crate::cmd::command(program).arg(arg).output().ok()?;
    if !output.status.success() {
        log::debug!(
            "{} {arg} exited with {:?}",
            Path::new(program).display(),
            output.status.code()
        );
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let first = text.lines().next()?.trim();
    if first.is_empty() {
        return None;
    }
    Some(first.to_string())
}
