use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use yt_dlp::{DownloadEvent, DownloadProgress};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    #[default]
    Idle,
    Starting,
    Downloading,
    Finished,
    Error
}

impl ProgressStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Error)
    }
}

/// Latest known state of one transfer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressState {
    pub status: ProgressStatus,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub speed: Option<f64>,
    pub eta: Option<f64>,
    pub percentage: f64,
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>
}

impl ProgressState {
    pub fn starting() -> Self {
        Self {
            status: ProgressStatus::Starting,
            ..Self::default()
        }
    }

    pub fn apply(&mut self, event: &DownloadEvent) {
        match event {
            DownloadEvent::DownloadStarted { filename } => {
                self.status = ProgressStatus::Downloading;
                self.filename = Some(filename.clone());
            }
            DownloadEvent::Progress(progress) => self.record_progress(progress),
            DownloadEvent::Finished { filename } => {
                self.status = ProgressStatus::Finished;
                self.percentage = 100.0;
                if !filename.is_empty() {
                    self.filename = Some(filename.clone());
                }
            }
            DownloadEvent::Error { message } => self.fail(message.clone()),
            DownloadEvent::Extracting { .. }
            | DownloadEvent::PostProcessing { .. }
            | DownloadEvent::MergingFormats
            | DownloadEvent::Warning { .. } => {}
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = ProgressStatus::Error;
        self.error_message = Some(message.into());
    }

    fn record_progress(&mut self, progress: &DownloadProgress) {
        self.status = ProgressStatus::Downloading;
        self.downloaded_bytes = progress.downloaded_bytes;
        self.total_bytes = progress.total_bytes;
        self.speed = progress.speed;
        self.eta = progress.eta;

        // exact total, then yt-dlp's estimate, then its own percentage; otherwise keep the last value
        if let Some(total) = progress.total_bytes.filter(|t| *t > 0) {
            self.percentage = percentage_of(progress.downloaded_bytes, total);
        } else if let Some(estimate) = progress.total_bytes_estimate.filter(|t| *t > 0) {
            self.percentage = percentage_of(progress.downloaded_bytes, estimate);
        } else if let Some(percent) = progress.percent {
            self.percentage = percent;
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn percentage_of(downloaded: u64, total: u64) -> f64 {
    downloaded as f64 / total as f64 * 100.0
}

#[derive(Debug, Default)]
struct Sessions {
    states: HashMap<String, ProgressState>,
    latest: Option<String>
}

/// Progress records keyed by transfer session id.
#[derive(Debug, Clone, Default)]
pub struct ProgressStore {
    inner: Arc<RwLock<Sessions>>
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn start(&self, session_id: &str) {
        let mut sessions = self.inner.write().await;
        sessions.states.insert(session_id.to_string(), ProgressState::starting());
        sessions.latest = Some(session_id.to_string());
    }

    pub async fn get(&self, session_id: &str) -> Option<ProgressState> {
        self.inner.read().await.states.get(session_id).cloned()
    }

    /// Snapshot of the most recently started session, idle when there is none.
    pub async fn latest(&self) -> ProgressState {
        let sessions = self.inner.read().await;
        sessions
            .latest
            .as_ref()
            .and_then(|id| sessions.states.get(id))
            .cloned()
            .unwrap_or_default()
    }

    pub async fn apply(&self, session_id: &str, event: &DownloadEvent) -> Option<ProgressState> {
        let mut sessions = self.inner.write().await;
        let state = sessions.states.get_mut(session_id)?;
        state.apply(event);
        Some(state.clone())
    }

    pub async fn fail(&self, session_id: &str, message: &str) {
        let mut sessions = self.inner.write().await;
        if let Some(state) = sessions.states.get_mut(session_id) {
            state.fail(message);
        }
    }

    pub async fn remove(&self, session_id: &str) {
        let mut sessions = self.inner.write().await;
        sessions.states.remove(session_id);
        if sessions.latest.as_deref() == Some(session_id) {
            sessions.latest = None;
        }
    }

    pub fn schedule_eviction(&self, session_id: String, after: Duration) {
        let store = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            store.remove(&session_id).await;
            tracing::debug!("Evicted progress for session {}", session_id);
        });
    }
}
