use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    EngineNotFound,
    InvalidRequest,
    EngineFailure,
    Canceled,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::EngineNotFound => "engine_not_found",
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::EngineFailure => "engine_failure",
            FailureKind::Canceled => "canceled",
            FailureKind::Internal => "internal",
        }
    }
}

/// Terminal outcome of one job. Produced exactly once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobResult {
    Success { output_path: PathBuf },
    Failure { kind: FailureKind, message: String },
}

impl JobResult {
    pub fn success(output_path: impl Into<PathBuf>) -> Self {
        JobResult::Success {
            output_path: output_path.into(),
        }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        JobResult::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success { .. })
    }

    pub fn output_path(&self) -> Option<&Path> {
        match self {
            JobResult::Success { output_path } => Some(output_path),
            JobResult::Failure { .. } => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            JobResult::Success { .. } => None,
            JobResult::Failure { message, .. } => Some(message),
        }
    }
}

impl From<EngineError> for JobResult {
    fn from(err: EngineError) -> Self {
        JobResult::failure(err.failure_kind(), err.to_string())
    }
}

impl From<crate::Result<PathBuf>> for JobResult {
    fn from(res: crate::Result<PathBuf>) -> Self {
        match res {
            Ok(path) => JobResult::success(path),
            Err(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_convert_to_failures_with_kind() {
        let res: JobResult = EngineError::EngineNotFound {
            tool: "ffmpeg".to_string(),
            path: PathBuf::from("/opt/tools/ffmpeg"),
        }
        .into();
        match res {
            JobResult::Failure { kind, message } => {
                assert_eq!(kind, FailureKind::EngineNotFound);
                assert!(message.contains("/opt/tools/ffmpeg"), "{message}");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn serializes_with_status_tag() {
        let json = serde_json::to_value(JobResult::success("/tmp/a.mp4")).expect("json");
        assert_eq!(json["status"], "success");
        assert_eq!(json["output_path"], "/tmp/a.mp4");

        let json = serde_json::to_value(JobResult::failure(FailureKind::Canceled, "job canceled"))
            .expect("json");
        assert_eq!(json["status"], "failure");
        assert_eq!(json["kind"], "canceled");
    }
}
