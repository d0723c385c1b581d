//! Normalizes free-form engine progress text into a percentage.
//!
//! yt-dlp reports `_percent_str` values such as `" 45.2%"` or, on a color
//! terminal, `"\x1b[0;94m 45.2%\x1b[0m"`. Escape sequences are removed
//! first (their parameters are digits too), then everything except digits and
//! `.` is discarded before parsing.

use crate::result::JobResult;
use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;

/// Marker prefixed to every progress line yt-dlp prints for us.
pub const PROGRESS_LINE_PREFIX: &str = "MFETCH_PROGRESS|";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Starting,
    Downloading,
    Finished,
    Error,
}

impl FromStr for EngineStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "starting" => Ok(EngineStatus::Starting),
            "downloading" => Ok(EngineStatus::Downloading),
            "finished" => Ok(EngineStatus::Finished),
            "error" => Ok(EngineStatus::Error),
            _ => Err(()),
        }
    }
}

/// One raw status record emitted by a download engine.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRecord {
    pub status: EngineStatus,
    pub percent_text: String,
}

impl StatusRecord {
    pub fn new(status: EngineStatus, percent_text: impl Into<String>) -> Self {
        Self {
            status,
            percent_text: percent_text.into(),
        }
    }

    pub fn downloading(percent_text: impl Into<String>) -> Self {
        Self::new(EngineStatus::Downloading, percent_text)
    }
}

/// Returns the percentage carried by a `downloading` record.
///
/// Malformed samples yield `None` and are meant to be dropped silently. The
/// value is not clamped; engines already report within `[0, 100]`.
pub fn parse(record: &StatusRecord) -> Option<f64> {
    if record.status != EngineStatus::Downloading {
        return None;
    }
    parse_percent_text(&record.percent_text)
}

pub fn parse_percent_text(text: &str) -> Option<f64> {
    let cleaned: String = strip_ansi_escapes(text)
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let value: f64 = cleaned.parse().ok()?;
    value.is_finite().then_some(value)
}

fn strip_ansi_escapes(text: &str) -> std::borrow::Cow<'_, str> {
    static ANSI_RE: OnceLock<Regex> = OnceLock::new();
    let re = ANSI_RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").unwrap());
    re.replace_all(text, "")
}

/// Decodes a `MFETCH_PROGRESS|<status>|<percent>` line printed through
/// yt-dlp's `--progress-template`.
pub fn parse_template_line(line: &str) -> Option<StatusRecord> {
    let rest = line.trim_end_matches(['\r', '\n']).strip_prefix(PROGRESS_LINE_PREFIX)?;
    let (status, percent_text) = rest.split_once('|').unwrap_or((rest, ""));
    let status = status.parse::<EngineStatus>().ok()?;
    Some(StatusRecord::new(status, percent_text))
}

/// yt-dlp template that produces lines understood by [`parse_template_line`].
pub fn progress_template() -> String {
    format!("download:{PROGRESS_LINE_PREFIX}%(progress.status)s|%(progress._percent_str)s")
}

/// Formats a percentage for display with one fixed decimal.
pub fn format_progress(percent: f64) -> String {
    format!("{percent:.1}%")
}

pub fn downloading_status_line(percent: f64) -> String {
    format!("Downloading... {}", format_progress(percent))
}

pub fn converting_status_line(percent: f64) -> String {
    format!("Converting... {}", format_progress(percent))
}

pub fn download_finished_status_line(result: &JobResult) -> String {
    match result {
        JobResult::Success { .. } => "Download complete!".to_string(),
        JobResult::Failure { message, .. } => format!("Error during download: {message}"),
    }
}

pub fn conversion_finished_status_line(result: &JobResult) -> String {
    match result {
        JobResult::Success { output_path } => {
            format!("Conversion complete: {}", output_path.display())
        }
        JobResult::Failure { message, .. } => format!("Error during conversion: {message}"),
    }
}
