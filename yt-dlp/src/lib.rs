//! Async Rust wrapper for yt-dlp CLI.
//!
//! This library provides an async interface to the yt-dlp command-line tool
//! for extracting stream formats and downloading media with live progress.
//!
//! # Example
//!
//! ```no_run
//! use tokio_stream::StreamExt;
//! use yt_dlp::{DownloadEvent, DownloadOptions, OutputFormat, YtDlp};
//!
//! #[tokio::main]
//! async fn main() -> yt_dlp::Result<()> {
//!     let client = YtDlp::new();
//!
//!     // Check that yt-dlp is available
//!     let version = client.check_binary().await?;
//!     println!("yt-dlp version: {}", version);
//!
//!     // Get video info without downloading
//!     let info = client.get_video_info("https://www.youtube.com/watch?v=dQw4w9WgXcQ").await?;
//!     println!("{} formats", info.formats.len());
//!
//!     // Download and follow progress
//!     let options = DownloadOptions::new()
//!         .format(OutputFormat::Best)
//!         .output_template("%(title)s.%(ext)s");
//!     let mut events = client.download_with_progress("https://www.youtube.com/watch?v=dQw4w9WgXcQ", &options);
//!     while let Some(event) = events.next().await {
//!         if let DownloadEvent::Finished { filename } = event? {
//!             println!("saved {filename}");
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

mod client;
mod command;
pub mod error;
pub mod types;

pub use client::{EventStream, YtDlp, validate_url};
pub use error::{Error, Result};
pub use types::{
    AUDIO_ONLY_SELECTOR, AudioCodec, Container, DEFAULT_VIDEO_SELECTOR, DownloadEvent,
    DownloadOptions, DownloadProgress, Format, OutputFormat, PostProcessor, Thumbnail, VideoInfo
};
