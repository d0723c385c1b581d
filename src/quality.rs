use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::EngineError;

/// Quality tier offered to the user. Each variant maps to exactly one
/// yt-dlp format selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityProfile {
    #[serde(rename = "Highest Quality")]
    HighestQuality,
    #[serde(rename = "2160p")]
    P2160,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "240p")]
    P240,
    #[serde(rename = "144p")]
    P144,
    #[serde(rename = "Audio Only")]
    AudioOnly,
}

impl QualityProfile {
    pub const ALL: [QualityProfile; 10] = [
        QualityProfile::HighestQuality,
        QualityProfile::P2160,
        QualityProfile::P1440,
        QualityProfile::P1080,
        QualityProfile::P720,
        QualityProfile::P480,
        QualityProfile::P360,
        QualityProfile::P240,
        QualityProfile::P144,
        QualityProfile::AudioOnly,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            QualityProfile::HighestQuality => "Highest Quality",
            QualityProfile::P2160 => "2160p",
            QualityProfile::P1440 => "1440p",
            QualityProfile::P1080 => "1080p",
            QualityProfile::P720 => "720p",
            QualityProfile::P480 => "480p",
            QualityProfile::P360 => "360p",
            QualityProfile::P240 => "240p",
            QualityProfile::P144 => "144p",
            QualityProfile::AudioOnly => "Audio Only",
        }
    }

    pub fn max_height(&self) -> Option<u32> {
        match self {
            QualityProfile::P2160 => Some(2160),
            QualityProfile::P1440 => Some(1440),
            QualityProfile::P1080 => Some(1080),
            QualityProfile::P720 => Some(720),
            QualityProfile::P480 => Some(480),
            QualityProfile::P360 => Some(360),
            QualityProfile::P240 => Some(240),
            QualityProfile::P144 => Some(144),
            QualityProfile::HighestQuality | QualityProfile::AudioOnly => None,
        }
    }

    pub fn format_selector(&self) -> &'static str {
        resolve_selector(*self)
    }
}

/// Fixed profile -> selector table. Total over `QualityProfile`.
pub fn resolve_selector(profile: QualityProfile) -> &'static str {
    match profile {
        QualityProfile::HighestQuality => "bestvideo+bestaudio",
        QualityProfile::P2160 => "bestvideo[height<=2160]+bestaudio",
        QualityProfile::P1440 => "bestvideo[height<=1440]+bestaudio",
        QualityProfile::P1080 => "bestvideo[height<=1080]+bestaudio",
        QualityProfile::P720 => "bestvideo[height<=720]+bestaudio",
        QualityProfile::P480 => "bestvideo[height<=480]+bestaudio",
        QualityProfile::P360 => "bestvideo[height<=360]+bestaudio",
        QualityProfile::P240 => "bestvideo[height<=240]+bestaudio",
        QualityProfile::P144 => "bestvideo[height<=144]+bestaudio",
        QualityProfile::AudioOnly => "bestaudio",
    }
}

impl fmt::Display for QualityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for QualityProfile {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        let found = match normalized.as_str() {
            "highest quality" | "highest" | "best" => Some(QualityProfile::HighestQuality),
            "audio only" | "audio" | "audio-only" => Some(QualityProfile::AudioOnly),
            other => QualityProfile::ALL
                .iter()
                .copied()
                .find(|p| p.label() == other),
        };
        found.ok_or_else(|| {
            EngineError::InvalidRequest(format!("unknown quality profile: {value}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_profile_resolves_to_a_non_empty_selector() {
        for profile in QualityProfile::ALL {
            let selector = resolve_selector(profile);
            assert!(!selector.is_empty(), "{profile}");
            assert_eq!(selector, resolve_selector(profile));
        }
    }

    #[test]
    fn height_capped_profiles_embed_their_height() {
        for profile in QualityProfile::ALL {
            if let Some(height) = profile.max_height() {
                assert_eq!(
                    resolve_selector(profile),
                    format!("bestvideo[height<={height}]+bestaudio")
                );
            }
        }
        assert_eq!(resolve_selector(QualityProfile::HighestQuality), "bestvideo+bestaudio");
        assert_eq!(resolve_selector(QualityProfile::AudioOnly), "bestaudio");
    }

    #[test]
    fn parses_ui_labels_and_aliases() {
        for profile in QualityProfile::ALL {
            assert_eq!(profile.label().parse::<QualityProfile>().expect("parse"), profile);
        }
        assert_eq!("best".parse::<QualityProfile>().expect("best"), QualityProfile::HighestQuality);
        assert_eq!(" AUDIO ".parse::<QualityProfile>().expect("audio"), QualityProfile::AudioOnly);
        assert_eq!("1080P".parse::<QualityProfile>().expect("1080p"), QualityProfile::P1080);
        assert!("4k".parse::<QualityProfile>().is_err());
    }

    #[test]
    fn serde_uses_ui_labels() {
        let json = serde_json::to_string(&QualityProfile::AudioOnly).expect("json");
        assert_eq!(json, "\"Audio Only\"");
        let parsed: QualityProfile = serde_json::from_str("\"720p\"").expect("parse");
        assert_eq!(parsed, QualityProfile::P720);
    }
}
