//! Turns the raw format list reported by yt-dlp into the options offered to the user.

use std::str::FromStr;

use serde::Serialize;
use yt_dlp::{AUDIO_ONLY_SELECTOR, DEFAULT_VIDEO_SELECTOR, Format, VideoInfo};

/// Heights offered in [`FormatMode::Targets`], in display order.
pub const TARGET_HEIGHTS: [u32; 4] = [1080, 720, 360, 144];

pub const BEST_QUALITY_LABEL: &str = "Best Quality";
pub const AUDIO_ONLY_LABEL: &str = "Audio Only (MP3)";

/// Which formats `POST /api/formats` exposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FormatMode {
    /// Every format that already carries both video and audio.
    All,
    /// Every MP4 video stream, paired with the best m4a audio.
    Mp4,
    /// The MP4 streams closest to [`TARGET_HEIGHTS`], plus an audio-only option.
    #[default]
    Targets
}

impl FormatMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FormatMode::All => "all",
            FormatMode::Mp4 => "mp4",
            FormatMode::Targets => "targets"
        }
    }
}

impl FromStr for FormatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(FormatMode::All),
            "mp4" => Ok(FormatMode::Mp4),
            "targets" => Ok(FormatMode::Targets),
            other => Err(format!("unknown format mode: {other}"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatDescriptor {
    pub format_id: String,
    #[serde(rename = "resolution")]
    pub resolution_label: String,
    #[serde(rename = "ext")]
    pub extension: String,
    #[serde(rename = "filesize")]
    pub size_label: String,
    pub size_bytes: Option<u64>,
    #[serde(rename = "vcodec")]
    pub video_codec: String,
    #[serde(rename = "acodec")]
    pub audio_codec: String,
    pub height: u32,
    #[serde(rename = "tbr")]
    pub bitrate: f64
}

impl FormatDescriptor {
    /// Lets yt-dlp pick on its own; the size is not known up front.
    pub fn best_effort() -> Self {
        Self {
            format_id: DEFAULT_VIDEO_SELECTOR.to_string(),
            resolution_label: BEST_QUALITY_LABEL.to_string(),
            extension: "mp4".to_string(),
            size_label: "Automatic".to_string(),
            size_bytes: None,
            video_codec: "best".to_string(),
            audio_codec: "best".to_string(),
            height: 0,
            bitrate: 0.0
        }
    }

    /// Leading entry of the unfiltered listing: plain `best`, container left to yt-dlp.
    pub fn best_muxed() -> Self {
        Self {
            format_id: "best".to_string(),
            resolution_label: BEST_QUALITY_LABEL.to_string(),
            extension: "Automatic".to_string(),
            size_label: String::new(),
            size_bytes: None,
            video_codec: "best".to_string(),
            audio_codec: "best".to_string(),
            height: 0,
            bitrate: 0.0
        }
    }

    pub fn audio_only(size_bytes: Option<u64>) -> Self {
        Self {
            format_id: AUDIO_ONLY_SELECTOR.to_string(),
            resolution_label: AUDIO_ONLY_LABEL.to_string(),
            extension: "mp3".to_string(),
            size_label: format_size(size_bytes),
            size_bytes,
            video_codec: "none".to_string(),
            audio_codec: "mp3".to_string(),
            height: 0,
            bitrate: 0.0
        }
    }

    fn from_muxed(format: &Format) -> Self {
        Self {
            format_id: format.format_id.clone(),
            resolution_label: format.resolution.clone().unwrap_or_else(|| "N/A".to_string()),
            extension: format.ext.clone().unwrap_or_else(|| "N/A".to_string()),
            size_label: format_size(format.filesize),
            size_bytes: format.filesize,
            video_codec: codec_or_none(format.vcodec.as_ref()),
            audio_codec: codec_or_none(format.acodec.as_ref()),
            height: format.height.unwrap_or(0),
            bitrate: format.tbr.unwrap_or(0.0)
        }
    }

    fn from_mp4_video(format: &Format, width: u32, height: u32, audio_size: u64) -> Self {
        let total = format.estimated_size().unwrap_or(0).saturating_add(audio_size);
        let size_bytes = (total > 0).then_some(total);
        Self {
            format_id: format!("{}+bestaudio[ext=m4a]/bestaudio", format.format_id),
            resolution_label: format!("{width}x{height}"),
            extension: "mp4".to_string(),
            size_label: format_size(size_bytes),
            size_bytes,
            video_codec: codec_or_none(format.vcodec.as_ref()),
            audio_codec: codec_or_none(format.acodec.as_ref()),
            height,
            bitrate: format.tbr.unwrap_or(0.0)
        }
    }
}

fn codec_or_none(codec: Option<&String>) -> String {
    codec.cloned().unwrap_or_else(|| "none".to_string())
}

/// Human readable byte count, one decimal, binary units up to TB.
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: Option<u64>) -> String {
    let Some(bytes) = bytes.filter(|b| *b > 0) else {
        return "N/A".to_string();
    };

    let mut value = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if value < 1024.0 {
            return format!("{value:.1} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1} TB")
}

/// Keeps the first descriptor seen for each resolution label.
pub fn dedupe_by_resolution(formats: Vec<FormatDescriptor>) -> Vec<FormatDescriptor> {
    let mut seen = std::collections::HashSet::new();
    formats
        .into_iter()
        .filter(|f| seen.insert(f.resolution_label.clone()))
        .collect()
}

/// Picks, for every target height, the candidate whose height is closest to it.
///
/// Ties go to the candidate listed first. Without candidates each target gets
/// [`FormatDescriptor::best_effort`].
pub fn match_targets(
    candidates: &[(u32, FormatDescriptor)],
    targets: &[u32]
) -> Vec<FormatDescriptor> {
    targets
        .iter()
        .map(|&target| {
            candidates
                .iter()
                .min_by_key(|(height, _)| height.abs_diff(target))
                .map_or_else(FormatDescriptor::best_effort, |(_, descriptor)| descriptor.clone())
        })
        .collect()
}

pub fn build_format_list(info: &VideoInfo, mode: FormatMode) -> Vec<FormatDescriptor> {
    match mode {
        FormatMode::All => {
            let mut formats = vec![FormatDescriptor::best_muxed()];
            formats.extend(
                info.formats
                    .iter()
                    .filter(|f| f.has_video() && f.has_audio())
                    .map(FormatDescriptor::from_muxed)
            );
            dedupe_by_resolution(formats)
        }
        FormatMode::Mp4 => {
            let mut formats = vec![FormatDescriptor::best_effort()];
            formats.extend(mp4_candidates(info));
            dedupe_by_resolution(formats)
        }
        FormatMode::Targets => {
            let candidates: Vec<(u32, FormatDescriptor)> = dedupe_by_resolution(mp4_candidates(info))
                .into_iter()
                .map(|d| (d.height, d))
                .collect();
            let mut formats = dedupe_by_resolution(match_targets(&candidates, &TARGET_HEIGHTS));
            formats.push(FormatDescriptor::audio_only(best_m4a_size(info)));
            formats
        }
    }
}

fn best_m4a_size(info: &VideoInfo) -> Option<u64> {
    info.first_audio_with_ext("m4a").and_then(Format::estimated_size)
}

/// MP4 video streams with known dimensions, tallest first, then highest frame rate.
fn mp4_candidates(info: &VideoInfo) -> Vec<FormatDescriptor> {
    let audio_size = best_m4a_size(info).unwrap_or(0);

    let mut streams: Vec<(f64, FormatDescriptor)> = info
        .formats
        .iter()
        .filter(|f| f.has_video() && f.ext.as_deref() == Some("mp4"))
        .filter_map(|f| {
            let width = f.width.filter(|w| *w > 0)?;
            let height = f.height.filter(|h| *h > 0)?;
            Some((
                f.fps.unwrap_or(0.0),
                FormatDescriptor::from_mp4_video(f, width, height, audio_size)
            ))
        })
        .collect();

    streams.sort_by(|(fps_a, a), (fps_b, b)| {
        b.height
            .cmp(&a.height)
            .then_with(|| fps_b.total_cmp(fps_a))
    });

    streams.into_iter().map(|(_, descriptor)| descriptor).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn descriptor(label: &str, height: u32) -> FormatDescriptor {
        FormatDescriptor {
            format_id: format!("id-{label}"),
            resolution_label: label.to_string(),
            extension: "mp4".to_string(),
            size_label: "N/A".to_string(),
            size_bytes: None,
            video_codec: "avc1".to_string(),
            audio_codec: "none".to_string(),
            height,
            bitrate: 0.0
        }
    }

    fn video(id: &str, height: u32, ext: &str, fps: f64, size: u64) -> Format {
        Format {
            format_id: id.to_string(),
            ext: Some(ext.to_string()),
            width: Some(height * 16 / 9),
            height: Some(height),
            fps: Some(fps),
            vcodec: Some("avc1".to_string()),
            acodec: Some("none".to_string()),
            filesize: Some(size),
            ..Default::default()
        }
    }

    fn sample_info() -> VideoInfo {
        serde_json::from_value(serde_json::json!({
            "id": "abc",
            "title": "Sample",
            "formats": [
                {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "filesize": 1024},
                {"format_id": "18", "ext": "mp4", "resolution": "640x360", "width": 640, "height": 360,
                 "vcodec": "avc1", "acodec": "mp4a", "filesize": 2048}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(None), "N/A");
        assert_eq!(format_size(Some(0)), "N/A");
        assert_eq!(format_size(Some(512)), "512.0 B");
        assert_eq!(format_size(Some(1536)), "1.5 KB");
        assert_eq!(format_size(Some(5 * 1024 * 1024)), "5.0 MB");
        assert_eq!(format_size(Some(3 * 1024 * 1024 * 1024)), "3.0 GB");
        assert_eq!(format_size(Some(2048 * 1024 * 1024 * 1024 * 1024)), "2048.0 TB");
    }

    #[test]
    fn test_dedupe_keeps_first() {
        let formats = vec![
            descriptor("1920x1080", 1080),
            descriptor("1280x720", 720),
            FormatDescriptor {
                format_id: "other".to_string(),
                ..descriptor("1920x1080", 1080)
            }
        ];
        let deduped = dedupe_by_resolution(formats);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].format_id, "id-1920x1080");
    }

    #[test]
    fn test_match_targets_closest_height() {
        let candidates = vec![
            (1440, descriptor("2560x1440", 1440)),
            (720, descriptor("1280x720", 720)),
            (240, descriptor("426x240", 240))
        ];
        let matched = match_targets(&candidates, &TARGET_HEIGHTS);
        let labels: Vec<&str> = matched.iter().map(|d| d.resolution_label.as_str()).collect();
        assert_eq!(labels, vec!["1280x720", "1280x720", "426x240", "426x240"]);
    }

    #[test]
    fn test_match_targets_tie_goes_to_first_seen() {
        let candidates = vec![
            (480, descriptor("854x480", 480)),
            (240, descriptor("426x240", 240))
        ];
        let matched = match_targets(&candidates, &[360]);
        assert_eq!(matched[0].resolution_label, "854x480");

        let reversed = vec![candidates[1].clone(), candidates[0].clone()];
        let matched = match_targets(&reversed, &[360]);
        assert_eq!(matched[0].resolution_label, "426x240");
    }

    #[test]
    fn test_match_targets_empty_falls_back() {
        let matched = match_targets(&[], &TARGET_HEIGHTS);
        assert_eq!(matched.len(), TARGET_HEIGHTS.len());
        assert!(matched.iter().all(|d| *d == FormatDescriptor::best_effort()));
        assert_eq!(matched[0].size_label, "Automatic");
        assert_eq!(matched[0].size_bytes, None);
    }

    #[test]
    fn test_build_all_mode_keeps_muxed_only() {
        let formats = build_format_list(&sample_info(), FormatMode::All);
        assert_eq!(formats.len(), 2);
        assert_eq!(formats[0], FormatDescriptor::best_muxed());
        assert_eq!(formats[0].format_id, "best");
        assert_eq!(formats[0].extension, "Automatic");
        assert_eq!(formats[0].size_label, "");
        assert_eq!(formats[1].format_id, "18");
        assert_eq!(formats[1].size_label, "2.0 KB");
    }

    #[test]
    fn test_build_mp4_mode_sorts_and_adds_audio_size() {
        let mut info = sample_info();
        info.formats.push(video("137", 1080, "mp4", 30.0, 10 * 1024));
        info.formats.push(video("299", 1080, "mp4", 60.0, 20 * 1024));
        info.formats.push(video("248", 1080, "webm", 30.0, 1));

        let formats = build_format_list(&info, FormatMode::Mp4);
        let ids: Vec<&str> = formats.iter().map(|f| f.format_id.as_str()).collect();
        assert_eq!(ids, vec![
            DEFAULT_VIDEO_SELECTOR,
            "299+bestaudio[ext=m4a]/bestaudio",
            "18+bestaudio[ext=m4a]/bestaudio"
        ]);
        assert_eq!(formats[1].size_bytes, Some(21 * 1024));
        assert_eq!(formats[1].size_label, "21.0 KB");
    }

    #[test]
    fn test_build_targets_mode() {
        let mut info = sample_info();
        info.formats.push(video("137", 1080, "mp4", 30.0, 4096));
        info.formats.push(video("136", 720, "mp4", 30.0, 2048));
        info.formats.push(video("160", 144, "mp4", 30.0, 512));

        let formats = build_format_list(&info, FormatMode::Targets);
        let heights: Vec<u32> = formats.iter().map(|f| f.height).collect();
        assert_eq!(heights, vec![1080, 720, 360, 144, 0]);
        let last = formats.last().unwrap();
        assert_eq!(last.format_id, AUDIO_ONLY_SELECTOR);
        assert_eq!(last.size_bytes, Some(1024));
    }

    #[test]
    fn test_build_targets_mode_without_video() {
        let info: VideoInfo = serde_json::from_value(serde_json::json!({"id": "x", "formats": []})).unwrap();
        let formats = build_format_list(&info, FormatMode::Targets);
        assert_eq!(formats, vec![FormatDescriptor::best_effort(), FormatDescriptor::audio_only(None)]);
    }

    #[test]
    fn test_format_mode_from_str() {
        assert_eq!("ALL".parse::<FormatMode>(), Ok(FormatMode::All));
        assert_eq!(" mp4 ".parse::<FormatMode>(), Ok(FormatMode::Mp4));
        assert_eq!("targets".parse::<FormatMode>(), Ok(FormatMode::Targets));
        assert!("webm".parse::<FormatMode>().is_err());
    }

    proptest! {
        #[test]
        fn prop_format_size_picks_smallest_unit(bytes in 1u64..u64::MAX) {
            let rendered = format_size(Some(bytes));
            let unit = rendered.rsplit(' ').next().unwrap();
            let units = ["B", "KB", "MB", "GB", "TB"];
            let mut expected = 4;
            for (k, _) in units.iter().enumerate().take(4) {
                if bytes / 1024u64.pow(u32::try_from(k).unwrap()) < 1024 {
                    expected = k;
                    break;
                }
            }
            prop_assert_eq!(unit, units[expected]);
        }

        #[test]
        fn prop_match_targets_minimizes_distance(
            heights in proptest::collection::vec(1u32..4400, 1..12),
            target in 1u32..4400
        ) {
            let candidates: Vec<(u32, FormatDescriptor)> = heights
                .iter()
                .enumerate()
                .map(|(i, h)| (*h, descriptor(&format!("c{i}"), *h)))
                .collect();
            let matched = &match_targets(&candidates, &[target])[0];
            let best = heights.iter().map(|h| h.abs_diff(target)).min().unwrap();
            let first = heights.iter().position(|h| h.abs_diff(target) == best).unwrap();
            prop_assert_eq!(&matched.resolution_label, &format!("c{first}"));
        }
    }
}
