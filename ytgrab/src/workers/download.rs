use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc, oneshot};
use tokio_stream::StreamExt;
use yt_dlp::{DownloadEvent, DownloadOptions, YtDlp};

use crate::progress::ProgressStore;

pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '%' => '_',
            c if c.is_whitespace() => '_',
            _ => c
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

#[derive(Debug, Clone)]
pub enum DownloadCommand {
    Start {
        session_id: String,
        url: String,
        options: DownloadOptions
    },
    Cancel { session_id: String }
}

pub struct DownloadWorker {
    yt_dlp: Arc<YtDlp>,
    rx: mpsc::Receiver<DownloadCommand>,
    sessions: ProgressStore,
    retention: Duration,
    active_downloads: Arc<RwLock<HashMap<String, oneshot::Sender<()>>>>
}

impl DownloadWorker {
    pub fn new(
        yt_dlp: Arc<YtDlp>,
        rx: mpsc::Receiver<DownloadCommand>,
        sessions: ProgressStore,
        retention: Duration
    ) -> Self {
        Self {
            yt_dlp,
            rx,
            sessions,
            retention,
            active_downloads: Arc::new(RwLock::new(HashMap::new()))
        }
    }

    pub async fn run(mut self) {
        tracing::info!("Download worker started");

        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                DownloadCommand::Start {
                    session_id,
                    url,
                    options
                } => {
                    let yt_dlp = self.yt_dlp.clone();
                    let sessions = self.sessions.clone();
                    let retention = self.retention;
                    let active_downloads = self.active_downloads.clone();

                    let (cancel_tx, cancel_rx) = oneshot::channel();
                    {
                        let mut downloads = active_downloads.write().await;
                        downloads.insert(session_id.clone(), cancel_tx);
                    }

                    tokio::spawn(async move {
                        process_download(&yt_dlp, &sessions, &session_id, &url, &options, cancel_rx)
                            .await;

                        active_downloads.write().await.remove(&session_id);
                        sessions.schedule_eviction(session_id, retention);
                    });
                }
                DownloadCommand::Cancel { session_id } => {
                    let mut downloads = self.active_downloads.write().await;
                    if let Some(cancel_tx) = downloads.remove(&session_id) {
                        let _ = cancel_tx.send(());
                        tracing::info!("Sent cancel signal for session {}", session_id);
                    }
                }
            }
        }

        tracing::info!("Download worker stopped");
    }
}

async fn process_download(
    yt_dlp: &YtDlp,
    sessions: &ProgressStore,
    session_id: &str,
    url: &str,
    options: &DownloadOptions,
    mut cancel_rx: oneshot::Receiver<()>
) {
    tracing::info!("Starting download {} for {}", session_id, url);

    if let Some(ref temp_dir) = options.temp_dir {
        if let Err(e) = tokio::fs::create_dir_all(temp_dir).await {
            tracing::error!("Failed to create working directory for {}: {}", session_id, e);
            sessions
                .fail(session_id, &format!("Failed to create directory: {e}"))
                .await;
            return;
        }
    }

    let mut stream = yt_dlp.download_with_progress(url, options);

    loop {
        tokio::select! {
            Ok(()) = &mut cancel_rx => {
                tracing::info!("Download {} cancelled", session_id);
                sessions.fail(session_id, "Cancelled by user").await;
                break;
            }
            event = stream.next() => {
                match event {
                    Some(Ok(event)) => {
                        log_event(session_id, &event);
                        sessions.apply(session_id, &event).await;
                    }
                    Some(Err(e)) => {
                        tracing::error!("Stream error for download {}: {}", session_id, e);
                        sessions.fail(session_id, &e.to_string()).await;
                        break;
                    }
                    None => break
                }
            }
        }
    }

    // dropping the stream kills yt-dlp if it is still running
    drop(stream);

    if let Some(ref temp_dir) = options.temp_dir {
        remove_working_dir(temp_dir).await;
    }
}

fn log_event(session_id: &str, event: &DownloadEvent) {
    match event {
        DownloadEvent::Progress(progress) => {
            tracing::debug!(
                "Download {} progress: {} of {:?} bytes at {}, eta {}",
                session_id,
                progress.downloaded_bytes,
                progress.total_bytes.or(progress.total_bytes_estimate),
                progress.format_speed().unwrap_or_else(|| "?".to_string()),
                progress.format_eta().unwrap_or_else(|| "?".to_string())
            );
        }
        DownloadEvent::DownloadStarted { filename } => {
            tracing::info!("Download {} started: {}", session_id, filename);
        }
        DownloadEvent::PostProcessing { status } => {
            tracing::info!("Download {} post-processing: {}", session_id, status);
        }
        DownloadEvent::Finished { filename } => {
            tracing::info!("Download {} finished: {}", session_id, filename);
        }
        DownloadEvent::Error { message } => {
            tracing::error!("Download {} error: {}", session_id, message);
        }
        DownloadEvent::Warning { message } => {
            tracing::warn!("Download {} warning: {}", session_id, message);
        }
        DownloadEvent::Extracting { .. } | DownloadEvent::MergingFormats => {
            tracing::debug!("Download {} event: {:?}", session_id, event);
        }
    }
}

async fn remove_working_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => tracing::debug!("Removed working directory {}", dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove working directory {}: {}", dir.display(), e)
    }
}
