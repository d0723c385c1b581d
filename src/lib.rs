pub mod cmd;
pub mod config;
pub mod download;
mod error;
pub mod ffmpeg;
pub mod joblog;
pub mod jobs;
pub mod paths;
pub mod progress;
pub mod quality;
pub mod result;
pub mod tools;
pub mod transcode;
pub mod ytdlp;

pub use error::{EngineError, Result};
pub use jobs::{Job, JobHandle, JobKind, JobRunner, JobState};
pub use result::{FailureKind, JobResult};
