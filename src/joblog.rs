//! Opt-in per-job JSON-lines event log.
//!
//! Each job appends to `<dir>/<job_id>.jsonl`. Old files are pruned by age and
//! total size. Write failures are reported through `log` and never affect the
//! job itself.

use crate::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

const JOB_LOG_MAX_AGE_DAYS: u64 = 30;
const JOB_LOG_TOTAL_CAP_BYTES: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct JobLog {
    path: Option<PathBuf>,
    job_id: String,
    kind: &'static str,
}

impl JobLog {
    pub fn new(dir: Option<&Path>, job_id: &str, kind: &'static str) -> Self {
        Self {
            path: dir.map(|d| d.join(format!("{job_id}.jsonl"))),
            job_id: job_id.to_string(),
            kind,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn info(&self, event: &str, data: serde_json::Value) {
        self.write("info", event, data);
    }

    pub fn error(&self, event: &str, data: serde_json::Value) {
        self.write("error", event, data);
    }

    fn write(&self, level: &str, event: &str, data: serde_json::Value) {
        let Some(path) = &self.path else {
            return;
        };
        let line = serde_json::json!({
            "ts_ms": now_ms(),
            "job_id": self.job_id,
            "kind": self.kind,
            "level": level,
            "event": event,
            "data": data
        })
        .to_string();
        if let Err(e) = append_line(path, &line) {
            log::warn!("job log write failed for {}: {e}", self.job_id);
        }
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?
        .write_all(format!("{line}\n").as_bytes())?;
    Ok(())
}

/// Drops logs older than 30 days, then the oldest ones until the directory
/// fits under 1 GiB. Returns the number of files removed.
pub fn prune_job_logs(dir: &Path) -> Result<usize> {
    prune_job_logs_with_limits(
        dir,
        Duration::from_secs(JOB_LOG_MAX_AGE_DAYS * 24 * 60 * 60),
        JOB_LOG_TOTAL_CAP_BYTES,
    )
}

fn prune_job_logs_with_limits(dir: &Path, max_age: Duration, total_cap: u64) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;
    let mut candidates: Vec<(PathBuf, SystemTime, u64)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(v) => v,
            Err(_) => continue,
        };
        let meta = match entry.metadata() {
            Ok(v) => v,
            Err(_) => continue,
        };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let path = entry.path();

        if modified < cutoff {
            if std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
            continue;
        }

        candidates.push((path, modified, meta.len()));
    }

    candidates.sort_by_key(|(_, modified, _)| *modified);
    let mut total: u64 = candidates.iter().map(|(_, _, size)| *size).sum();
    for (path, _modified, size) in candidates {
        if total <= total_cap {
            break;
        }
        if std::fs::remove_file(&path).is_ok() {
            removed += 1;
        }
        total = total.saturating_sub(size);
    }

    Ok(removed)
}

/// Keeps only scheme and host so video ids and tokens stay out of logs.
pub fn redact_url_for_log(value: &str) -> String {
    let trimmed = value.trim();
    let parsed = Url::parse(trimmed).or_else(|_| Url::parse(&format!("https://{trimmed}")));
    match parsed {
        Ok(url) => match url.host_str() {
            Some(host) => format!("{}://{host}/...", url.scheme()),
            None => "[invalid-url]".to_string(),
        },
        Err(_) => "[invalid-url]".to_string(),
    }
}

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};

    #[test]
    fn writes_one_json_object_per_event() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = JobLog::new(Some(dir.path()), "job-1", "download");
        log.info("job_started", serde_json::json!({ "url": "https://youtu.be/..." }));
        log.error("job_failed", serde_json::json!({ "message": "boom" }));

        let text = std::fs::read_to_string(dir.path().join("job-1.jsonl")).expect("read");
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "job_started");
        assert_eq!(lines[0]["kind"], "download");
        assert_eq!(lines[1]["level"], "error");
        assert_eq!(lines[1]["data"]["message"], "boom");
    }

    #[test]
    fn disabled_log_writes_nothing() {
        let log = JobLog::new(None, "job-2", "transcode");
        assert!(log.path().is_none());
        log.info("job_started", serde_json::json!({}));
    }

    #[test]
    fn prune_enforces_total_cap() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["a.jsonl", "b.jsonl", "c.jsonl"] {
            std::fs::write(dir.path().join(name), vec![b'x'; 100]).expect("write");
        }
        let removed = prune_job_logs_with_limits(dir.path(), Duration::from_secs(3600), 150)
            .expect("prune");
        assert_eq!(removed, 2);
        assert_eq!(std::fs::read_dir(dir.path()).expect("read_dir").count(), 1);
    }

    #[test]
    fn prune_removes_logs_older_than_thirty_days() {
        let dir = tempfile::tempdir().expect("tempdir");
        let old_path = dir.path().join("old.jsonl");
        let recent_path = dir.path().join("recent.jsonl");
        std::fs::write(&old_path, "{}\n").expect("write old");
        std::fs::write(&recent_path, "{}\n").expect("write recent");

        let forty_days = Duration::from_secs(40 * 24 * 60 * 60);
        let old_time = SystemTime::now().checked_sub(forty_days).expect("checked_sub");
        set_file_mtime(&old_path, FileTime::from_system_time(old_time)).expect("set mtime");

        assert_eq!(prune_job_logs(dir.path()).expect("prune"), 1);
        assert!(!old_path.exists(), "old log should be removed");
        assert!(recent_path.exists(), "recent log should be kept");
    }

    #[test]
    fn prune_missing_dir_is_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(prune_job_logs(&dir.path().join("nope")).expect("prune"), 0);
    }

    #[test]
    fn redaction_keeps_only_host() {
        assert_eq!(
            redact_url_for_log("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            "https://www.youtube.com/..."
        );
        assert_eq!(redact_url_for_log("youtu.be/abc"), "https://youtu.be/...");
        assert_eq!(redact_url_for_log(""), "[invalid-url]");
    }
}
