use std::path::PathBuf;

use crate::error::{Error, Result};

/// Selector used when the caller does not pick a specific format.
pub const DEFAULT_VIDEO_SELECTOR: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best";

/// Selector that routes a download through audio extraction.
pub const AUDIO_ONLY_SELECTOR: &str = "bestaudio/best";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Default,
    Best,
    BestAudio,
    Custom(String)
}

impl OutputFormat {
    pub fn as_arg(&self) -> Option<String> {
        match self {
            OutputFormat::Default => None,
            OutputFormat::Best => Some("best".to_string()),
            OutputFormat::BestAudio => Some(AUDIO_ONLY_SELECTOR.to_string()),
            OutputFormat::Custom(s) => Some(s.clone())
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Container {
    #[default]
    Default,
    Mp4,
    Mkv,
    Webm
}

impl Container {
    pub fn as_str(self) -> Option<&'static str> {
        match self {
            Container::Default => None,
            Container::Mp4 => Some("mp4"),
            Container::Mkv => Some("mkv"),
            Container::Webm => Some("webm")
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AudioCodec {
    #[default]
    Mp3,
    M4a,
    Opus,
    Flac
}

impl AudioCodec {
    pub fn as_str(self) -> &'static str {
        match self {
            AudioCodec::Mp3 => "mp3",
            AudioCodec::M4a => "m4a",
            AudioCodec::Opus => "opus",
            AudioCodec::Flac => "flac"
        }
    }
}

/// Post-processing step handed to yt-dlp's ffmpeg integration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostProcessor {
    ExtractAudio { codec: AudioCodec, quality: String },
    ConvertVideo { container: Container }
}

impl PostProcessor {
    pub fn is_audio(&self) -> bool {
        matches!(self, PostProcessor::ExtractAudio { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    pub format: OutputFormat,
    pub container: Container,
    pub output_template: Option<String>,
    pub post_processor: Option<PostProcessor>,
    pub temp_dir: Option<PathBuf>
}

impl DownloadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn container(mut self, container: Container) -> Self {
        self.container = container;
        self
    }

    pub fn output_template(mut self, template: impl Into<String>) -> Self {
        self.output_template = Some(template.into());
        self
    }

    pub fn post_processor(mut self, post_processor: PostProcessor) -> Self {
        self.post_processor = Some(post_processor);
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn is_audio_only(&self) -> bool {
        self.post_processor.as_ref().is_some_and(PostProcessor::is_audio)
    }

    /// Checks the option set before it is turned into command-line arguments.
    pub fn validate(&self) -> Result<()> {
        if let Some(selector) = self.format.as_arg() {
            if selector.is_empty() {
                return Err(Error::InvalidOptions("format selector is empty".to_string()));
            }
            if selector.chars().any(|c| c.is_whitespace() || c.is_control()) {
                return Err(Error::InvalidOptions(format!(
                    "format selector contains whitespace: {selector:?}"
                )));
            }
        }

        if let Some(ref template) = self.output_template
            && !template.contains("%(ext)s")
        {
            return Err(Error::InvalidOptions(format!(
                "output template must contain %(ext)s: {template}"
            )));
        }

        if self.is_audio_only() && self.container != Container::Default {
            return Err(Error::InvalidOptions(
                "audio extraction cannot be combined with a merge container".to_string()
            ));
        }

        if let Some(PostProcessor::ExtractAudio { ref quality, .. }) = self.post_processor
            && quality.trim().is_empty()
        {
            return Err(Error::InvalidOptions("audio quality is empty".to_string()));
        }

        if let Some(PostProcessor::ConvertVideo {
            container: Container::Default
        }) = self.post_processor
        {
            return Err(Error::InvalidOptions(
                "video conversion needs a target container".to_string()
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_are_valid() {
        assert!(DownloadOptions::new().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_whitespace_selector() {
        let options = DownloadOptions::new().format(OutputFormat::Custom("best video".to_string()));
        assert!(matches!(options.validate(), Err(Error::InvalidOptions(_))));

        let options = DownloadOptions::new().format(OutputFormat::Custom(String::new()));
        assert!(matches!(options.validate(), Err(Error::InvalidOptions(_))));
    }

    #[test]
    fn test_validate_requires_ext_in_template() {
        let options = DownloadOptions::new().output_template("downloads/%(title)s.mp4");
        assert!(options.validate().is_err());

        let options = DownloadOptions::new().output_template("downloads/%(title)s.%(ext)s");
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_audio_with_container() {
        let options = DownloadOptions::new()
            .format(OutputFormat::BestAudio)
            .container(Container::Mp4)
            .post_processor(PostProcessor::ExtractAudio {
                codec: AudioCodec::Mp3,
                quality: "192K".to_string()
            });
        assert!(options.validate().is_err());
        assert!(options.is_audio_only());
    }

    #[test]
    fn test_validate_rejects_conversion_without_container() {
        let options = DownloadOptions::new().post_processor(PostProcessor::ConvertVideo {
            container: Container::Default
        });
        assert!(options.validate().is_err());
    }
}
