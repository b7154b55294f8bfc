mod config;
mod error;
mod ffmpeg;
mod formats;
mod handlers;
mod progress;
mod state;
mod workers;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post}
};
use tokio::sync::mpsc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yt_dlp::YtDlp;

use config::Config;
use handlers::{api, pages};
use progress::ProgressStore;
use state::AppState;
use workers::download::DownloadWorker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ytgrab=info,yt_dlp=info,tower_http=debug".into())
        )
        .init();

    let config = Config::from_env()?;

    tokio::fs::create_dir_all(&config.download_dir).await?;
    tracing::info!("Saving downloads to {}", config.download_dir.display());

    let mut yt_dlp = YtDlp::with_binary(config.ytdlp_path.clone());

    match ffmpeg::resolve_location(&config).await {
        Ok(Some(location)) => {
            tracing::info!("Using ffmpeg from {}", location.display());
            yt_dlp.set_ffmpeg_location(Some(location));
        }
        Ok(None) => tracing::info!("Using ffmpeg from PATH"),
        Err(e) => tracing::warn!("ffmpeg is unavailable, post-processing may fail: {:#}", e)
    }

    match yt_dlp.check_binary().await {
        Ok(version) => tracing::info!("yt-dlp version: {}", version),
        Err(e) => tracing::warn!("yt-dlp not found or not executable: {}", e)
    }

    let yt_dlp = Arc::new(yt_dlp);
    let sessions = ProgressStore::new();
    let (download_tx, download_rx) = mpsc::channel(100);

    let worker = DownloadWorker::new(
        yt_dlp.clone(),
        download_rx,
        sessions.clone(),
        config.session_retention
    );

    tokio::spawn(async move {
        worker.run().await;
    });

    let port = config.port;
    let files = ServeDir::new(&config.download_dir);

    let state = AppState {
        config: Arc::new(config),
        yt_dlp,
        download_tx,
        sessions
    };

    let app = Router::new()
        .route("/", get(pages::index_page))
        .route("/api/formats", post(api::list_formats))
        .route("/api/download", post(api::start_download))
        .route("/api/download/{id}/cancel", post(api::cancel_download))
        .route("/api/progress", get(api::latest_progress))
        .route("/api/progress/{id}", get(api::session_progress))
        .route("/api/progress/{id}/events", get(api::progress_events))
        .nest_service("/files", files)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
