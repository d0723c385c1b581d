use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

use mediafetch_engine::config::{self, EngineLocations};
use mediafetch_engine::paths::AppPaths;
use mediafetch_engine::progress;
use mediafetch_engine::quality::QualityProfile;
use mediafetch_engine::tools;
use mediafetch_engine::transcode::{TranscodeJob, TranscodeRequest};
use mediafetch_engine::{JobResult, JobRunner};

enum Command {
    Download {
        url: String,
        quality: QualityProfile,
        out: Option<PathBuf>,
    },
    Transcode {
        input: PathBuf,
        video_codec: Option<String>,
        audio_codec: Option<String>,
        preset: Option<String>,
    },
    Setup {
        install_ffmpeg: bool,
        install_ytdlp: bool,
        force: bool,
    },
    Status,
}

fn main() -> Result<(), String> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        return Ok(());
    }

    let mut base_dir: Option<PathBuf> = None;
    let mut positional: Vec<String> = Vec::new();
    let mut quality = QualityProfile::HighestQuality;
    let mut out: Option<PathBuf> = None;
    let mut video_codec: Option<String> = None;
    let mut audio_codec: Option<String> = None;
    let mut preset: Option<String> = None;
    let mut install_ffmpeg = false;
    let mut install_ytdlp = false;
    let mut force = false;

    let mut i = 1;
    while i < args.len() {
        let arg = args[i].as_str();
        let mut value = |name: &str| -> Result<String, String> {
            i += 1;
            args.get(i)
                .cloned()
                .ok_or_else(|| format!("{name} requires a value"))
        };
        match arg {
            "--base-dir" => base_dir = Some(PathBuf::from(value("--base-dir")?)),
            "--quality" => {
                quality = QualityProfile::from_str(&value("--quality")?).map_err(|e| e.to_string())?
            }
            "--out" => out = Some(PathBuf::from(value("--out")?)),
            "--video-codec" => video_codec = Some(value("--video-codec")?),
            "--audio-codec" => audio_codec = Some(value("--audio-codec")?),
            "--preset" => preset = Some(value("--preset")?),
            "--install-ffmpeg" => install_ffmpeg = true,
            "--install-ytdlp" => install_ytdlp = true,
            "--force" => force = true,
            other if other.starts_with("--") => {
                return Err(format!("unknown arg: {other} (try --help)"))
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let command = match positional.first().map(String::as_str) {
        Some("download") => Command::Download {
            url: positional
                .get(1)
                .cloned()
                .ok_or_else(|| "download requires a url".to_string())?,
            quality,
            out,
        },
        Some("transcode") => Command::Transcode {
            input: positional
                .get(1)
                .map(PathBuf::from)
                .ok_or_else(|| "transcode requires an input file".to_string())?,
            video_codec,
            audio_codec,
            preset,
        },
        Some("setup") => {
            if !install_ffmpeg && !install_ytdlp {
                return Err("nothing to do (pass --install-ffmpeg and/or --install-ytdlp)".to_string());
            }
            Command::Setup {
                install_ffmpeg,
                install_ytdlp,
                force,
            }
        }
        Some("status") => Command::Status,
        Some(other) => return Err(format!("unknown command: {other} (try --help)")),
        None => return Err("missing command (try --help)".to_string()),
    };

    let base_dir = base_dir
        .or_else(default_base_dir)
        .ok_or_else(|| "could not determine base dir; pass --base-dir".to_string())?;
    let paths = AppPaths::new(AppPaths::normalize_base_dir(&base_dir));
    paths.ensure_dirs().map_err(|e| e.to_string())?;

    let engine_config = config::load_engine_config(&paths).map_err(|e| e.to_string())?;
    let locations = EngineLocations::resolve(&paths, &engine_config);

    match command {
        Command::Download { url, quality, out } => {
            let destination = out.unwrap_or_else(|| paths.default_download_dir());
            let runner = JobRunner::new(locations);
            let handle = runner.submit_download(
                url,
                quality,
                destination,
                |percent| print_progress(&progress::downloading_status_line(percent)),
                |result| println!("\n{}", progress::download_finished_status_line(&result)),
            );
            finish(handle.wait())
        }
        Command::Transcode {
            input,
            video_codec,
            audio_codec,
            preset,
        } => {
            let mut request = TranscodeRequest::with_defaults(input, &locations.transcode);
            if let Some(codec) = video_codec {
                request = request.video_codec(codec);
            }
            if let Some(codec) = audio_codec {
                request = request.audio_codec(codec);
            }
            if let Some(preset) = preset {
                request = request.preset(preset);
            }

            let runner = JobRunner::new(locations);
            let handle = runner.submit(
                TranscodeJob::new(request),
                |percent| print_progress(&progress::converting_status_line(percent)),
                |result| println!("\n{}", progress::conversion_finished_status_line(&result)),
            );
            finish(handle.wait())
        }
        Command::Setup {
            install_ffmpeg,
            install_ytdlp,
            force,
        } => {
            println!("Base dir: {}", paths.base_dir.to_string_lossy());
            if install_ffmpeg {
                println!("FFmpeg: installing...");
                let status = tools::install_ffmpeg_tools(&paths, &locations, force)
                    .map_err(|e| e.to_string())?;
                println!("FFmpeg: installed ({})", status.ffmpeg_path);
            }
            if install_ytdlp {
                println!("yt-dlp: installing...");
                let status = tools::install_ytdlp_tools(&paths, &locations, force)
                    .map_err(|e| e.to_string())?;
                println!("yt-dlp: installed ({})", status.bundled_path);
            }
            Ok(())
        }
        Command::Status => {
            let report = serde_json::json!({
                "base_dir": paths.base_dir.to_string_lossy(),
                "ffmpeg": tools::ffmpeg_tools_status(&paths, &locations),
                "ytdlp": tools::ytdlp_tools_status(&paths, &locations),
            });
            let text = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
            println!("{text}");
            Ok(())
        }
    }
}

fn print_progress(line: &str) {
    let mut stdout = std::io::stdout();
    let _ = write!(stdout, "\r{line}");
    let _ = stdout.flush();
}

fn finish(result: JobResult) -> Result<(), String> {
    match result {
        JobResult::Success { .. } => Ok(()),
        JobResult::Failure { kind, message } => Err(format!("{} ({})", message, kind.as_str())),
    }
}

fn default_base_dir() -> Option<PathBuf> {
    if let Ok(v) = std::env::var("MEDIAFETCH_BASE_DIR") {
        let t = v.trim();
        if !t.is_empty() {
            return Some(PathBuf::from(t));
        }
    }

    if cfg!(windows) {
        if let Ok(appdata) = std::env::var("APPDATA") {
            let t = appdata.trim();
            if !t.is_empty() {
                return Some(PathBuf::from(t).join("mediafetch"));
            }
        }
        return None;
    }

    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        let t = data_home.trim();
        if !t.is_empty() {
            return Some(PathBuf::from(t).join("mediafetch"));
        }
    }
    std::env::var("HOME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .map(|h| PathBuf::from(h).join(".local").join("share").join("mediafetch"))
}

fn print_help() {
    println!(
        r#"mediafetch

Downloads online video through yt-dlp and converts local files with ffmpeg.

Usage:
  mediafetch download <url> [--quality <label>] [--out <dir>]
  mediafetch transcode <file> [--video-codec <codec>] [--audio-codec <codec>] [--preset <preset>]
  mediafetch setup [--install-ffmpeg] [--install-ytdlp] [--force]
  mediafetch status

Options:
  --base-dir <path>   Override base dir (default: $MEDIAFETCH_BASE_DIR, then the platform data dir)
  --quality <label>   Highest Quality, 2160p, 1440p, 1080p, 720p, 480p, 360p, 240p, 144p, Audio Only
  --out <dir>         Download destination (default: downloads next to the executable)
  --force             Reinstall tools even if present

Set RUST_LOG=debug for engine diagnostics.
"#
    );
}
