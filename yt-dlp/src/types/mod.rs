mod options;
mod progress;
mod video_info;

pub use options::{
    AUDIO_ONLY_SELECTOR, AudioCodec, Container, DEFAULT_VIDEO_SELECTOR, DownloadOptions,
    OutputFormat, PostProcessor
};
pub use progress::{DownloadEvent, DownloadProgress};
pub use video_info::{Format, Thumbnail, VideoInfo};
