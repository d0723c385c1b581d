use std::path::PathBuf;
use thiserror::Error;

use crate::result::FailureKind;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{tool} executable not found at {}", .path.display())]
    EngineNotFound { tool: String, path: PathBuf },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Display is the engine's own diagnostic text, unmodified.
    #[error("{diagnostic}")]
    EngineFailure {
        tool: String,
        code: Option<i32>,
        diagnostic: String,
    },

    #[error("job canceled")]
    Canceled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tool install failed: {0}")]
    InstallFailed(String),
}

impl EngineError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            EngineError::EngineNotFound { .. } => FailureKind::EngineNotFound,
            EngineError::InvalidRequest(_) => FailureKind::InvalidRequest,
            EngineError::EngineFailure { .. } => FailureKind::EngineFailure,
            EngineError::Canceled => FailureKind::Canceled,
            EngineError::Io(_) | EngineError::Json(_) | EngineError::InstallFailed(_) => {
                FailureKind::Internal
            }
        }
    }

    pub(crate) fn engine_failure(tool: &str, code: Option<i32>, diagnostic: String) -> Self {
        let diagnostic = if diagnostic.trim().is_empty() {
            format!("{tool} failed (code={code:?})")
        } else {
            diagnostic
        };
        EngineError::EngineFailure {
            tool: tool.to_string(),
            code,
            diagnostic,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_failure_displays_diagnostic_verbatim() {
        let err = EngineError::engine_failure(
            "yt-dlp",
            Some(1),
            "ERROR: [youtube] abc: Video unavailable".to_string(),
        );
        assert_eq!(err.to_string(), "ERROR: [youtube] abc: Video unavailable");
        assert_eq!(err.failure_kind(), FailureKind::EngineFailure);
    }

    #[test]
    fn empty_diagnostic_falls_back_to_exit_code() {
        let err = EngineError::engine_failure("ffmpeg", Some(234), "  ".to_string());
        assert_eq!(err.to_string(), "ffmpeg failed (code=Some(234))");
    }
}
