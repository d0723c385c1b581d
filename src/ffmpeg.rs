use regex::Regex;
use std::ffi::OsString;
use std::path::Path;
use std::sync::OnceLock;

/// Argument vector for one transcode, in the order ffmpeg expects:
/// `-i <input> -c:v <video> -c:a <audio> -preset <preset> <output>`.
pub fn transcode_args(
    input: &Path,
    video_codec: &str,
    audio_codec: &str,
    preset: &str,
    output: &Path,
) -> Vec<OsString> {
    vec![
        "-i".into(),
        input.as_os_str().to_os_string(),
        "-c:v".into(),
        video_codec.into(),
        "-c:a".into(),
        audio_codec.into(),
        "-preset".into(),
        preset.into(),
        output.as_os_str().to_os_string(),
    ]
}

/// Turns ffmpeg's stderr chatter into percentages.
///
/// The first `Duration:` line (the input's) fixes the total length; each
/// subsequent `time=` counter is reported relative to it.
#[derive(Debug, Default)]
pub struct FfmpegProgress {
    duration_secs: Option<f64>,
}

impl FfmpegProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_secs
    }

    pub fn observe(&mut self, line: &str) -> Option<f64> {
        static DURATION_RE: OnceLock<Regex> = OnceLock::new();
        static TIME_RE: OnceLock<Regex> = OnceLock::new();

        if self.duration_secs.is_none() {
            let re = DURATION_RE
                .get_or_init(|| Regex::new(r"Duration:\s*(\d+:\d{2}:\d{2}(?:\.\d+)?)").unwrap());
            if let Some(caps) = re.captures(line) {
                self.duration_secs = parse_timestamp_secs(&caps[1]).filter(|d| *d > 0.0);
                return None;
            }
        }

        let total = self.duration_secs?;
        let re = TIME_RE.get_or_init(|| Regex::new(r"time=\s*(-?\d+:\d{2}:\d{2}(?:\.\d+)?)").unwrap());
        let caps = re.captures(line)?;
        let elapsed = parse_timestamp_secs(&caps[1])?;
        Some((elapsed / total * 100.0).clamp(0.0, 100.0))
    }
}

/// Parses `HH:MM:SS(.frac)` into seconds.
fn parse_timestamp_secs(value: &str) -> Option<f64> {
    let mut parts = value.trim().splitn(3, ':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    let total = hours * 3600.0 + minutes * 60.0 + seconds;
    if !total.is_finite() || total < 0.0 {
        return None;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_follow_fixed_order() {
        let args = transcode_args(
            Path::new("/v/in.mkv"),
            "h264_nvenc",
            "aac",
            "fast",
            Path::new("/v/in_converted.mp4"),
        );
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            args,
            vec![
                "-i",
                "/v/in.mkv",
                "-c:v",
                "h264_nvenc",
                "-c:a",
                "aac",
                "-preset",
                "fast",
                "/v/in_converted.mp4"
            ]
        );
    }

    #[test]
    fn progress_follows_time_counter() {
        let mut progress = FfmpegProgress::new();
        assert_eq!(progress.observe("frame=  10 fps=0.0 time=00:00:01.00"), None);
        assert_eq!(
            progress.observe("  Duration: 00:00:40.00, start: 0.000000, bitrate: 1205 kb/s"),
            None
        );
        assert_eq!(progress.duration_secs(), Some(40.0));
        assert_eq!(
            progress.observe("frame= 240 fps=60 q=23.0 size=512kB time=00:00:10.00 bitrate=..."),
            Some(25.0)
        );
        assert_eq!(progress.observe("time=00:00:40.00"), Some(100.0));
        assert_eq!(progress.observe("time=00:00:41.50"), Some(100.0));
        assert_eq!(progress.observe("time=N/A bitrate=N/A"), None);
    }

    #[test]
    fn only_the_first_duration_counts() {
        let mut progress = FfmpegProgress::new();
        progress.observe("  Duration: 01:00:00.00, start: 0.0");
        progress.observe("  Duration: 00:00:10.00, start: 0.0");
        assert_eq!(progress.duration_secs(), Some(3600.0));
        assert_eq!(progress.observe("time=00:30:00.00"), Some(50.0));
    }

    #[test]
    fn unknown_duration_yields_nothing() {
        let mut progress = FfmpegProgress::new();
        progress.observe("  Duration: N/A, bitrate: N/A");
        assert_eq!(progress.observe("time=00:00:10.00"), None);
    }

    #[test]
    fn timestamps() {
        assert_eq!(parse_timestamp_secs("01:02:03.5"), Some(3723.5));
        assert_eq!(parse_timestamp_secs("00:00:00"), Some(0.0));
        assert_eq!(parse_timestamp_secs("bogus"), None);
    }
}
