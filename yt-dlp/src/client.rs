use std::path::PathBuf;
use std::pin::Pin;

use futures_core::Stream;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::command::{CommandBuilder, PROGRESS_TEMPLATE};
use crate::error::{Error, Result};
use crate::types::{DownloadEvent, DownloadOptions, DownloadProgress, VideoInfo};

/// Marker that opens every line produced by [`PROGRESS_TEMPLATE`].
const PROGRESS_PREFIX: &str = "[progress]";

pub type EventStream = Pin<Box<dyn Stream<Item = Result<DownloadEvent>> + Send + 'static>>;

#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
    ffmpeg_location: Option<PathBuf>
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new()
    }
}

impl YtDlp {
    pub fn new() -> Self {
        Self::with_binary("yt-dlp")
    }

    pub fn with_binary(path: impl Into<PathBuf>) -> Self {
        Self {
            binary: path.into(),
            ffmpeg_location: None
        }
    }

    pub fn set_ffmpeg_location(&mut self, path: Option<PathBuf>) {
        self.ffmpeg_location = path;
    }

    pub async fn check_binary(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(Error::BinaryNotExecutable(self.binary.clone()))
        }
    }

    pub async fn get_video_info(&self, url: &str) -> Result<VideoInfo> {
        validate_url(url)?;

        let output = self
            .command()
            .json_output()
            .skip_download()
            .no_playlist()
            .no_warnings()
            .url(url)
            .build()
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(Error::CommandFailed {
                code: output.status.code().unwrap_or(-1),
                stderr
            });
        }

        let info: VideoInfo = serde_json::from_slice(&output.stdout)?;
        Ok(info)
    }

    /// Runs a download and reports what yt-dlp is doing as a stream of events.
    ///
    /// The URL and options are checked before anything is spawned. Dropping the
    /// stream kills the child process. A failed run ends with
    /// [`DownloadEvent::Error`] carrying the last `ERROR:` line yt-dlp printed.
    pub fn download_with_progress(&self, url: &str, options: &DownloadOptions) -> EventStream {
        let url = url.to_string();
        let options = options.clone();
        let binary = self.binary.clone();
        let ffmpeg_location = self.ffmpeg_location.clone();

        Box::pin(async_stream::try_stream! {
            validate_url(&url)?;
            options.validate()?;

            yield DownloadEvent::Extracting { url: url.clone() };

            let builder = CommandBuilder::new(&binary)
                .ffmpeg_location_opt(ffmpeg_location.as_ref())
                .with_options(&options)
                .no_playlist()
                .newline_progress()
                .progress_template(progress_template_arg())
                .url(&url);

            tracing::debug!(
                binary = %binary.display(),
                args = ?builder.get_args(),
                "spawning yt-dlp"
            );

            let mut cmd = builder.build();
            cmd.stdout(std::process::Stdio::piped());
            cmd.stderr(std::process::Stdio::piped());
            cmd.kill_on_drop(true);

            let mut child = cmd.spawn()?;

            let stderr = child
                .stderr
                .take()
                .ok_or_else(|| std::io::Error::other("stderr not captured"))?;
            let stderr_task = tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                let mut last_error = None;
                while let Ok(Some(line)) = reader.next_line().await {
                    tracing::trace!(line = %line, "yt-dlp stderr");
                    if let Some(message) = line.trim().strip_prefix("ERROR:") {
                        last_error = Some(message.trim().to_string());
                    }
                }
                last_error
            });

            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| std::io::Error::other("stdout not captured"))?;
            let mut reader = BufReader::new(stdout).lines();

            let mut current_filename: Option<String> = None;

            while let Some(line) = reader.next_line().await? {
                tracing::trace!(line = %line, "yt-dlp stdout");
                if let Some(event) = parse_progress_line(&line, &mut current_filename) {
                    yield event;
                }
            }

            let status = child.wait().await?;
            let stderr_error = stderr_task.await.ok().flatten();

            if status.success() {
                yield DownloadEvent::Finished {
                    filename: current_filename.unwrap_or_default()
                };
            } else {
                let message = stderr_error.unwrap_or_else(|| {
                    format!("yt-dlp exited with code {}", status.code().unwrap_or(-1))
                });
                yield DownloadEvent::Error { message };
            }
        })
    }

    fn command(&self) -> CommandBuilder {
        CommandBuilder::new(&self.binary).ffmpeg_location_opt(self.ffmpeg_location.as_ref())
    }
}

/// Value for `--progress-template`. yt-dlp strips the leading `download:` key,
/// so printed lines start with [`PROGRESS_PREFIX`].
fn progress_template_arg() -> String {
    format!("download:{PROGRESS_PREFIX} {PROGRESS_TEMPLATE}")
}

/// Accepts absolute `http`/`https` URLs with a host.
pub fn validate_url(input: &str) -> Result<()> {
    let parsed = url::Url::parse(input.trim()).map_err(|e| Error::InvalidUrl(format!("{input}: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::InvalidUrl(format!("{input}: unsupported scheme")));
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(Error::InvalidUrl(format!("{input}: missing host")));
    }

    Ok(())
}

fn parse_progress_line(line: &str, current_filename: &mut Option<String>) -> Option<DownloadEvent> {
    let line = line.trim();

    if let Some(progress) = parse_template_progress(line) {
        return Some(DownloadEvent::Progress(progress));
    }

    if let Some(filename) = line.strip_prefix("[download] Destination:") {
        let filename = filename.trim();
        *current_filename = Some(filename.to_string());
        return Some(DownloadEvent::DownloadStarted {
            filename: filename.to_string()
        });
    }

    if let Some(rest) = line.strip_prefix("[download]")
        && let Some(filename) = rest.trim().strip_suffix("has already been downloaded")
    {
        let filename = filename.trim();
        *current_filename = Some(filename.to_string());
        return Some(DownloadEvent::DownloadStarted {
            filename: filename.to_string()
        });
    }

    if line.starts_with("[download]")
        && line.contains('%')
        && let Some(progress) = parse_download_progress(line)
    {
        return Some(DownloadEvent::Progress(progress));
    }

    if line.starts_with("[Merger]") || line.contains("Merging formats") {
        if let Some(start) = line.find('"')
            && let Some(end) = line.rfind('"')
            && end > start
        {
            *current_filename = Some(line[start + 1..end].to_string());
        }
        return Some(DownloadEvent::MergingFormats);
    }

    if line.starts_with("[ExtractAudio]")
        || line.starts_with("[VideoConvertor]")
        || line.starts_with("[ffmpeg]")
    {
        if let Some((_, destination)) = line.split_once("Destination:") {
            *current_filename = Some(destination.trim().to_string());
        }
        return Some(DownloadEvent::PostProcessing {
            status: line.to_string()
        });
    }

    if let Some(message) = line.strip_prefix("WARNING:") {
        return Some(DownloadEvent::Warning {
            message: message.trim().to_string()
        });
    }

    if let Some(message) = line.strip_prefix("ERROR:") {
        return Some(DownloadEvent::Error {
            message: message.trim().to_string()
        });
    }

    None
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_template_progress(line: &str) -> Option<DownloadProgress> {
    let content = line.strip_prefix(PROGRESS_PREFIX)?;
    let values: Vec<Option<f64>> = content.split_whitespace().map(parse_number).collect();

    if values.len() < 5 {
        return None;
    }

    Some(DownloadProgress {
        downloaded_bytes: values[0].map_or(0, |v| v as u64),
        total_bytes: values[1].map(|v| v as u64),
        total_bytes_estimate: values[2].map(|v| v as u64),
        speed: values[3],
        eta: values[4],
        percent: None
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn parse_download_progress(line: &str) -> Option<DownloadProgress> {
    let parts: Vec<&str> = line.split_whitespace().collect();

    let mut percent: Option<f64> = None;
    let mut total_bytes: Option<u64> = None;
    let mut speed: Option<f64> = None;
    let mut eta: Option<f64> = None;

    for (i, part) in parts.iter().enumerate() {
        let previous = i.checked_sub(1).and_then(|j| parts.get(j)).copied();
        if let Some(value) = part.strip_suffix('%') {
            percent = value.parse().ok();
        } else if part.ends_with("/s") {
            speed = parse_speed(part);
        } else if part.ends_with('B') && previous.is_some_and(|p| p.ends_with('%') || p == "of") {
            total_bytes = parse_size(part);
        } else if part.contains(':') && !part.starts_with('[') {
            eta = parse_eta(part);
        }
    }

    let percent = percent?;

    let downloaded_bytes = match total_bytes {
        Some(t) => ((percent / 100.0) * t as f64) as u64,
        None => 0
    };

    Some(DownloadProgress {
        downloaded_bytes,
        total_bytes,
        total_bytes_estimate: None,
        speed,
        eta,
        percent: Some(percent)
    })
}

fn parse_number(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim().trim_start_matches('~');
    if s == "N/A" || s.is_empty() {
        return None;
    }

    let multipliers = [
        ("TiB", 1024u64 * 1024 * 1024 * 1024),
        ("GiB", 1024 * 1024 * 1024),
        ("MiB", 1024 * 1024),
        ("KiB", 1024),
        ("GB", 1000 * 1000 * 1000),
        ("MB", 1000 * 1000),
        ("KB", 1000),
        ("B", 1)
    ];

    for (suffix, mult) in multipliers {
        if let Some(num_str) = s.strip_suffix(suffix)
            && let Ok(num) = num_str.trim().parse::<f64>()
        {
            return Some((num * mult as f64) as u64);
        }
    }

    None
}

#[allow(clippy::cast_precision_loss)]
fn parse_speed(s: &str) -> Option<f64> {
    let s = s.trim().trim_end_matches("/s");
    parse_size(s).map(|b| b as f64)
}

fn parse_eta(s: &str) -> Option<f64> {
    let s = s.trim();
    if s == "N/A" || s == "Unknown" || s.is_empty() {
        return None;
    }

    let parts: Vec<&str> = s.split(':').collect();
    match parts.len() {
        1 => parts[0].parse::<f64>().ok(),
        2 => {
            let mins: f64 = parts[0].parse().ok()?;
            let secs: f64 = parts[1].parse().ok()?;
            Some(mins * 60.0 + secs)
        }
        3 => {
            let hours: f64 = parts[0].parse().ok()?;
            let mins: f64 = parts[1].parse().ok()?;
            let secs: f64 = parts[2].parse().ok()?;
            Some(hours * 3600.0 + mins * 60.0 + secs)
        }
        _ => None
    }
}
