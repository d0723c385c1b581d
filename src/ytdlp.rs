use crate::cmd::{self, CommandRunError, OutputStream};
use crate::download::{DownloadEngine, EngineDownloadOptions};
use crate::progress::{self, StatusRecord};
use crate::{EngineError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

const OUTPUT_LINE_PREFIX: &str = "MFETCH_OUTPUT|";

/// Drives the `yt-dlp` executable as the download engine.
#[derive(Debug, Clone)]
pub struct YtDlpEngine {
    program: PathBuf,
}

impl YtDlpEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

pub fn build_args(url: &str, options: &EngineDownloadOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    args.push(
        if options.single_item_only {
            "--no-playlist"
        } else {
            "--yes-playlist"
        }
        .into(),
    );
    for flag in ["--newline", "--progress", "--no-warnings", "--no-color"] {
        args.push(flag.into());
    }
    args.push("--progress-template".into());
    args.push(progress::progress_template().into());
    args.push("--print".into());
    args.push(format!("after_move:{OUTPUT_LINE_PREFIX}%(filepath)s").into());
    args.push("-f".into());
    args.push(options.format_selector.clone().into());
    args.push("--merge-output-format".into());
    args.push(options.merge_container.clone().into());
    args.push("--ffmpeg-location".into());
    args.push(options.ffmpeg_location.clone().into_os_string());
    args.push("-o".into());
    args.push(options.output_template.clone().into_os_string());
    args.push("--".into());
    args.push(url.into());
    args
}

fn parse_output_line(line: &str, output_dir: Option<&Path>) -> Option<PathBuf> {
    let raw = line.trim().strip_prefix(OUTPUT_LINE_PREFIX)?.trim();
    if raw.is_empty() || raw == "NA" {
        return None;
    }
    let path = PathBuf::from(raw);
    match output_dir {
        Some(dir) if path.is_relative() => Some(dir.join(path)),
        _ => Some(path),
    }
}

impl DownloadEngine for YtDlpEngine {
    fn download(
        &self,
        url: &str,
        options: &EngineDownloadOptions,
        sink: &mut dyn FnMut(StatusRecord),
        cancel: &AtomicBool,
    ) -> Result<Option<PathBuf>> {
        let output_dir = options.output_template.parent();
        let mut cmd = cmd::command(&self.program);
        cmd.env("PYTHONIOENCODING", "UTF-8")
            .env("PYTHONUTF8", "1")
            .args(build_args(url, options));

        log::debug!(
            "starting {} for {}",
            self.program.display(),
            crate::joblog::redact_url_for_log(url)
        );

        let mut output_path: Option<PathBuf> = None;
        // Some builds print progress on stderr.
        let mut on_line = |stream: OutputStream, line: &str| {
            if let Some(record) = progress::parse_template_line(line) {
                sink(record);
            } else if stream == OutputStream::Stdout {
                if let Some(path) = parse_output_line(line, output_dir) {
                    output_path = Some(path);
                }
            }
        };

        let res = cmd::run_streaming(&mut cmd, cancel, &mut on_line);
        let output = match res {
            Ok(output) => output,
            Err(CommandRunError::Spawn(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::EngineNotFound {
                    tool: "yt-dlp".to_string(),
                    path: self.program.clone(),
                });
            }
            Err(CommandRunError::Spawn(e)) => {
                return Err(EngineError::engine_failure(
                    "yt-dlp",
                    None,
                    format!("yt-dlp could not start: {e}"),
                ));
            }
            Err(CommandRunError::Wait(e)) => return Err(EngineError::Io(e)),
            Err(CommandRunError::Canceled) => return Err(EngineError::Canceled),
        };

        if !output.status.success() {
            return Err(EngineError::engine_failure(
                "yt-dlp",
                output.status.code(),
                output.diagnostic(),
            ));
        }

        Ok(output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::EngineStatus;

    fn options(dir: &Path) -> EngineDownloadOptions {
        EngineDownloadOptions {
            format_selector: "bestvideo[height<=1080]+bestaudio".to_string(),
            output_template: dir.join("%(title)s.%(ext)s"),
            single_item_only: true,
            merge_container: "mp4".to_string(),
            ffmpeg_location: dir.join("ffmpeg"),
        }
    }

    #[test]
    fn args_carry_every_engine_option() {
        let dir = PathBuf::from("/media/out");
        let args: Vec<String> = build_args("https://youtu.be/abc", &options(&dir))
            .into_iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        let value_after = |flag: &str| {
            let idx = args.iter().position(|a| a == flag).expect(flag);
            args[idx + 1].clone()
        };
        assert_eq!(args[0], "--no-playlist");
        assert_eq!(value_after("-f"), "bestvideo[height<=1080]+bestaudio");
        assert_eq!(value_after("--merge-output-format"), "mp4");
        assert_eq!(value_after("--ffmpeg-location"), "/media/out/ffmpeg");
        assert_eq!(value_after("-o"), "/media/out/%(title)s.%(ext)s");
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/abc"));
        assert_eq!(args[args.len() - 2], "--");
    }

    #[test]
    fn output_lines_resolve_against_destination() {
        let dir = Path::new("/media/out");
        assert_eq!(
            parse_output_line("MFETCH_OUTPUT|/media/out/Song.mp4", Some(dir)),
            Some(PathBuf::from("/media/out/Song.mp4"))
        );
        assert_eq!(
            parse_output_line("MFETCH_OUTPUT|Song.mp4", Some(dir)),
            Some(PathBuf::from("/media/out/Song.mp4"))
        );
        assert_eq!(parse_output_line("MFETCH_OUTPUT|NA", Some(dir)), None);
        assert_eq!(parse_output_line("[Merger] Merging formats", Some(dir)), None);
    }

    #[test]
    fn missing_executable_is_engine_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = YtDlpEngine::new(dir.path().join("no-such-yt-dlp"));
        let cancel = AtomicBool::new(false);
        let res = engine.download("https://youtu.be/x", &options(dir.path()), &mut |_| {}, &cancel);
        assert!(matches!(res, Err(EngineError::EngineNotFound { .. })), "{res:?}");
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        let mut perms = std::fs::metadata(&path).expect("meta").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).expect("chmod");
        path
    }

    #[cfg(unix)]
    #[test]
    fn streams_progress_and_reports_output_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = write_script(
            dir.path(),
            "yt-dlp",
            r#"echo 'MFETCH_PROGRESS|downloading|  5.0%'
echo 'MFETCH_PROGRESS|downloading| 50.0%'
echo 'MFETCH_PROGRESS|finished|100.0%'
echo 'MFETCH_OUTPUT|Clip.mp4'"#,
        );
        let engine = YtDlpEngine::new(script);
        let cancel = AtomicBool::new(false);
        let mut records = Vec::new();
        let res = engine
            .download(
                "https://youtu.be/x",
                &options(dir.path()),
                &mut |r| records.push(r),
                &cancel,
            )
            .expect("download");

        assert_eq!(res, Some(dir.path().join("Clip.mp4")));
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].status, EngineStatus::Finished);
        assert_eq!(progress::parse(&records[1]), Some(50.0));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_carries_error_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = write_script(
            dir.path(),
            "yt-dlp",
            "echo 'ERROR: [generic] Unable to download webpage' 1>&2\nexit 1",
        );
        let engine = YtDlpEngine::new(script);
        let cancel = AtomicBool::new(false);
        let err = engine
            .download("https://youtu.be/x", &options(dir.path()), &mut |_| {}, &cancel)
            .expect_err("should fail");
        assert_eq!(err.to_string(), "ERROR: [generic] Unable to download webpage");
    }
}
