use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::types::{DownloadOptions, PostProcessor};

/// Raw progress fields separated by spaces; yt-dlp prints `NA` for unknown values.
pub const PROGRESS_TEMPLATE: &str = "%(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s %(progress.speed)s %(progress.eta)s";

pub struct CommandBuilder {
    binary: PathBuf,
    args: Vec<String>
}

impl CommandBuilder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn url(self, url: impl Into<String>) -> Self {
        self.arg(url)
    }

    pub fn json_output(self) -> Self {
        self.arg("--dump-json")
    }

    pub fn skip_download(self) -> Self {
        self.arg("--skip-download")
    }

    pub fn output(self, template: impl Into<String>) -> Self {
        self.arg("-o").arg(template)
    }

    pub fn format(self, format: impl Into<String>) -> Self {
        self.arg("-f").arg(format)
    }

    pub fn extract_audio(self) -> Self {
        self.arg("-x")
    }

    pub fn audio_format(self, format: impl Into<String>) -> Self {
        self.arg("--audio-format").arg(format)
    }

    pub fn audio_quality(self, quality: impl Into<String>) -> Self {
        self.arg("--audio-quality").arg(quality)
    }

    pub fn recode_video(self, container: impl Into<String>) -> Self {
        self.arg("--recode-video").arg(container)
    }

    pub fn merge_output_format(self, format: impl Into<String>) -> Self {
        self.arg("--merge-output-format").arg(format)
    }

    pub fn temp_path(self, dir: impl AsRef<Path>) -> Self {
        self.arg("-P")
            .arg(format!("temp:{}", dir.as_ref().to_string_lossy()))
    }

    pub fn progress_template(self, template: impl Into<String>) -> Self {
        self.arg("--progress-template").arg(template)
    }

    pub fn newline_progress(self) -> Self {
        self.arg("--newline")
    }

    pub fn no_warnings(self) -> Self {
        self.arg("--no-warnings")
    }

    pub fn no_playlist(self) -> Self {
        self.arg("--no-playlist")
    }

    pub fn ffmpeg_location(self, path: impl AsRef<Path>) -> Self {
        self.arg("--ffmpeg-location").arg(path.as_ref().to_string_lossy().to_string())
    }

    pub fn ffmpeg_location_opt(self, path: Option<&PathBuf>) -> Self {
        match path {
            Some(p) => self.ffmpeg_location(p),
            None => self
        }
    }

    pub fn with_options(mut self, options: &DownloadOptions) -> Self {
        if let Some(format_arg) = options.format.as_arg() {
            self = self.format(format_arg);
        }

        if let Some(container) = options.container.as_str() {
            self = self.merge_output_format(container);
        }

        if let Some(ref template) = options.output_template {
            self = self.output(template.clone());
        }

        match options.post_processor {
            Some(PostProcessor::ExtractAudio { codec, ref quality }) => {
                self = self
                    .extract_audio()
                    .audio_format(codec.as_str())
                    .audio_quality(quality.clone());
            }
            Some(PostProcessor::ConvertVideo { container }) => {
                if let Some(target) = container.as_str() {
                    self = self.recode_video(target);
                }
            }
            None => {}
        }

        if let Some(ref dir) = options.temp_dir {
            self = self.temp_path(dir);
        }

        self
    }

    pub fn build(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.args);
        cmd
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }
}
