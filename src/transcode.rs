use crate::cmd::{self, CommandRunError, OutputStream};
use crate::config::{EngineLocations, TranscodeDefaults};
use crate::ffmpeg::{self, FfmpegProgress};
use crate::result::JobResult;
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

pub const SUPPORTED_INPUT_EXTENSIONS: [&str; 4] = ["mp4", "mkv", "avi", "mov"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeRequest {
    pub input_path: PathBuf,
    pub video_codec: String,
    pub audio_codec: String,
    pub preset: String,
    pub output_suffix: String,
    pub output_extension: String,
}

impl TranscodeRequest {
    /// Request using the built-in codec defaults (`h264_nvenc`, `aac`, `fast`).
    pub fn new(input_path: impl Into<PathBuf>) -> Self {
        Self::with_defaults(input_path, &TranscodeDefaults::default())
    }

    pub fn with_defaults(input_path: impl Into<PathBuf>, defaults: &TranscodeDefaults) -> Self {
        Self {
            input_path: input_path.into(),
            video_codec: defaults.video_codec.clone(),
            audio_codec: defaults.audio_codec.clone(),
            preset: defaults.preset.clone(),
            output_suffix: defaults.output_suffix.clone(),
            output_extension: defaults.output_extension.clone(),
        }
    }

    pub fn video_codec(mut self, codec: impl Into<String>) -> Self {
        self.video_codec = codec.into();
        self
    }

    pub fn audio_codec(mut self, codec: impl Into<String>) -> Self {
        self.audio_codec = codec.into();
        self
    }

    pub fn preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    pub fn output_path(&self) -> PathBuf {
        derive_output_path(&self.input_path, &self.output_suffix, &self.output_extension)
    }
}

/// `<dir>/<stem><suffix>.<extension>` next to the input.
pub fn derive_output_path(input: &Path, suffix: &str, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}{suffix}.{extension}"))
}

pub fn is_supported_input(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| SUPPORTED_INPUT_EXTENSIONS.contains(&e.as_str()))
}

pub struct TranscodeJob {
    request: TranscodeRequest,
}

impl TranscodeJob {
    pub fn new(request: TranscodeRequest) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &TranscodeRequest {
        &self.request
    }

    /// Runs ffmpeg to completion on the current thread. Progress is derived
    /// from ffmpeg's stderr when the input duration is known.
    pub fn execute(
        self,
        locations: &EngineLocations,
        cancel: &AtomicBool,
        on_progress: &mut dyn FnMut(f64),
    ) -> JobResult {
        self.run(locations, cancel, on_progress).into()
    }

    fn run(
        self,
        locations: &EngineLocations,
        cancel: &AtomicBool,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<PathBuf> {
        validate_request(&self.request)?;
        let ffmpeg_path = locations.require_ffmpeg()?;

        if cancel.load(Ordering::SeqCst) {
            return Err(EngineError::Canceled);
        }

        let request = &self.request;
        let output = request.output_path();
        let mut cmd = cmd::command(&ffmpeg_path);
        cmd.args(ffmpeg::transcode_args(
            &request.input_path,
            &request.video_codec,
            &request.audio_codec,
            &request.preset,
            &output,
        ));

        log::debug!(
            "transcoding {} -> {} ({}/{}/{})",
            request.input_path.display(),
            output.display(),
            request.video_codec,
            request.audio_codec,
            request.preset
        );

        let mut tracker = FfmpegProgress::new();
        let mut on_line = |stream: OutputStream, line: &str| {
            if stream == OutputStream::Stderr {
                if let Some(percent) = tracker.observe(line) {
                    on_progress(percent);
                }
            }
        };

        let streamed = match cmd::run_streaming(&mut cmd, cancel, &mut on_line) {
            Ok(v) => v,
            Err(CommandRunError::Spawn(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::EngineNotFound {
                    tool: "ffmpeg".to_string(),
                    path: ffmpeg_path,
                });
            }
            Err(CommandRunError::Spawn(e)) => {
                return Err(EngineError::engine_failure(
                    "ffmpeg",
                    None,
                    format!("ffmpeg could not start: {e}"),
                ));
            }
            Err(CommandRunError::Wait(e)) => return Err(EngineError::Io(e)),
            Err(CommandRunError::Canceled) => return Err(EngineError::Canceled),
        };

        if !streamed.status.success() {
            return Err(EngineError::engine_failure(
                "ffmpeg",
                streamed.status.code(),
                streamed.diagnostic(),
            ));
        }

        Ok(output)
    }
}

fn validate_request(request: &TranscodeRequest) -> Result<()> {
    let input = &request.input_path;
    if !input.is_file() {
        return Err(EngineError::InvalidRequest(format!(
            "input file does not exist: {}",
            input.display()
        )));
    }
    if !is_supported_input(input) {
        return Err(EngineError::InvalidRequest(format!(
            "unsupported input type (expected one of {}): {}",
            SUPPORTED_INPUT_EXTENSIONS.join(", "),
            input.display()
        )));
    }
    for (name, value) in [
        ("video codec", &request.video_codec),
        ("audio codec", &request.audio_codec),
        ("preset", &request.preset),
        ("output extension", &request.output_extension),
    ] {
        if value.trim().is_empty() {
            return Err(EngineError::InvalidRequest(format!("{name} is empty")));
        }
    }
    if request.output_path() == *input {
        return Err(EngineError::InvalidRequest(
            "output path would overwrite the input".to_string(),
        ));
    }
    Ok(())
}
