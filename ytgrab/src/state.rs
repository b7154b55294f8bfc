use std::sync::Arc;
use tokio::sync::mpsc;
use yt_dlp::YtDlp;

use crate::config::Config;
use crate::progress::ProgressStore;
use crate::workers::download::DownloadCommand;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub yt_dlp: Arc<YtDlp>,
    pub download_tx: mpsc::Sender<DownloadCommand>,
    pub sessions: ProgressStore
}
