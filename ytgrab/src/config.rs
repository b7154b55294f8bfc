use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use crate::formats::FormatMode;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub download_dir: PathBuf,
    pub ytdlp_path: PathBuf,
    /// Explicit ffmpeg binary or directory; skips the bootstrap when set.
    pub ffmpeg_location: Option<PathBuf>,
    pub ffmpeg_dir: PathBuf,
    pub ffmpeg_auto_download: bool,
    pub format_mode: FormatMode,
    pub session_retention: Duration
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            download_dir: PathBuf::from("./downloads"),
            ytdlp_path: PathBuf::from("yt-dlp"),
            ffmpeg_location: None,
            ffmpeg_dir: PathBuf::from("./ffmpeg"),
            ffmpeg_auto_download: true,
            format_mode: FormatMode::default(),
            session_retention: Duration::from_secs(300)
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(port) = var("PORT") {
            config.port = port.parse().with_context(|| format!("invalid PORT: {port}"))?;
        }

        if let Some(dir) = var("DOWNLOAD_DIR") {
            config.download_dir = PathBuf::from(dir);
        }

        if let Some(path) = var("YTDLP_PATH") {
            config.ytdlp_path = PathBuf::from(path);
        }

        config.ffmpeg_location = var("FFMPEG_LOCATION").map(PathBuf::from);

        if let Some(dir) = var("FFMPEG_DIR") {
            config.ffmpeg_dir = PathBuf::from(dir);
        }

        if let Some(flag) = var("FFMPEG_AUTO_DOWNLOAD") {
            config.ffmpeg_auto_download = parse_flag(&flag)
                .with_context(|| format!("invalid FFMPEG_AUTO_DOWNLOAD: {flag}"))?;
        }

        if let Some(mode) = var("FORMAT_MODE") {
            config.format_mode = mode.parse().map_err(anyhow::Error::msg)?;
        }

        if let Some(secs) = var("SESSION_RETENTION_SECS") {
            let secs: u64 = secs
                .parse()
                .with_context(|| format!("invalid SESSION_RETENTION_SECS: {secs}"))?;
            config.session_retention = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.download_dir, PathBuf::from("./downloads"));
        assert_eq!(config.ytdlp_path, PathBuf::from("yt-dlp"));
        assert!(config.ffmpeg_location.is_none());
        assert!(config.ffmpeg_auto_download);
        assert_eq!(config.format_mode, FormatMode::Targets);
        assert_eq!(config.session_retention, Duration::from_secs(300));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "9090"),
            ("DOWNLOAD_DIR", "/srv/media"),
            ("FFMPEG_LOCATION", "/usr/bin/ffmpeg"),
            ("FFMPEG_AUTO_DOWNLOAD", "off"),
            ("FORMAT_MODE", "mp4"),
            ("SESSION_RETENTION_SECS", "10")
        ])
        .unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.download_dir, PathBuf::from("/srv/media"));
        assert_eq!(config.ffmpeg_location, Some(PathBuf::from("/usr/bin/ffmpeg")));
        assert!(!config.ffmpeg_auto_download);
        assert_eq!(config.format_mode, FormatMode::Mp4);
        assert_eq!(config.session_retention, Duration::from_secs(10));
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = config_from(&[("PORT", "  "), ("FFMPEG_LOCATION", "")]).unwrap();
        assert_eq!(config.port, 8000);
        assert!(config.ffmpeg_location.is_none());
    }

    #[test]
    fn test_invalid_values() {
        assert!(config_from(&[("PORT", "eighty")]).is_err());
        assert!(config_from(&[("FORMAT_MODE", "webm")]).is_err());
        assert!(config_from(&[("FFMPEG_AUTO_DOWNLOAD", "maybe")]).is_err());
    }
}
