use std::convert::Infallible;
use std::path::Path as FsPath;
use std::time::Duration;

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{
        IntoResponse, Json,
        sse::{Event, KeepAlive, Sse}
    }
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use yt_dlp::{
    AUDIO_ONLY_SELECTOR, AudioCodec, Container, DEFAULT_VIDEO_SELECTOR, DownloadOptions,
    OutputFormat, PostProcessor
};

use crate::error::AppError;
use crate::formats::{FormatDescriptor, build_format_list};
use crate::progress::ProgressState;
use crate::state::AppState;
use crate::workers::download::{DownloadCommand, sanitize_filename};

const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
pub struct FormatsRequest {
    url: Option<String>
}

#[derive(Debug, Serialize)]
pub struct FormatsResponse {
    title: String,
    duration: Option<f64>,
    thumbnail: Option<String>,
    formats: Vec<FormatDescriptor>
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    url: Option<String>,
    format_id: Option<String>,
    resolution: Option<String>
}

fn required_url(url: Option<String>) -> Result<String, AppError> {
    url.map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::bad_request("URL is required"))
}

#[tracing::instrument(skip(state, payload))]
pub async fn list_formats(
    State(state): State<AppState>,
    payload: Result<Json<FormatsRequest>, JsonRejection>
) -> Result<Json<FormatsResponse>, AppError> {
    let Json(request) = payload?;
    let url = required_url(request.url)?;

    tracing::info!("Fetching formats for {}", url);
    let info = state.yt_dlp.get_video_info(&url).await?;
    let formats = build_format_list(&info, state.config.format_mode);
    tracing::debug!("Found {} formats for {}", formats.len(), url);

    Ok(Json(FormatsResponse {
        title: info.title.clone().unwrap_or_else(|| "Unknown Title".to_string()),
        duration: info.duration,
        thumbnail: info.best_thumbnail().map(String::from),
        formats
    }))
}

/// Builds the yt-dlp options for one transfer.
///
/// `bestaudio/best` turns into an mp3 extraction; anything else is merged into mp4.
pub fn download_options(
    download_dir: &FsPath,
    session_id: &str,
    timestamp: &str,
    format_id: Option<&str>,
    resolution: Option<&str>
) -> DownloadOptions {
    let label = resolution.map(sanitize_filename).filter(|l| !l.is_empty());
    let file_name = match label {
        Some(label) => format!("%(title)s_{timestamp}_{label}.%(ext)s"),
        None => format!("%(title)s_{timestamp}.%(ext)s")
    };

    let options = DownloadOptions::new()
        .output_template(download_dir.join(file_name).to_string_lossy())
        .temp_dir(download_dir.join(".partial").join(session_id));

    match format_id.map(str::trim).filter(|f| !f.is_empty()) {
        Some(AUDIO_ONLY_SELECTOR) => options.format(OutputFormat::BestAudio).post_processor(
            PostProcessor::ExtractAudio {
                codec: AudioCodec::Mp3,
                quality: "192K".to_string()
            }
        ),
        selector => options
            .format(OutputFormat::Custom(
                selector.unwrap_or(DEFAULT_VIDEO_SELECTOR).to_string()
            ))
            .container(Container::Mp4)
            .post_processor(PostProcessor::ConvertVideo {
                container: Container::Mp4
            })
    }
}

#[tracing::instrument(skip(state, payload))]
pub async fn start_download(
    State(state): State<AppState>,
    payload: Result<Json<DownloadRequest>, JsonRejection>
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let url = required_url(request.url)?;
    yt_dlp::validate_url(&url)?;

    let session_id = uuid7::uuid7().to_string();
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let options = download_options(
        &state.config.download_dir,
        &session_id,
        &timestamp,
        request.format_id.as_deref(),
        request.resolution.as_deref()
    );
    options.validate()?;

    state.sessions.start(&session_id).await;

    if let Err(e) = state
        .download_tx
        .send(DownloadCommand::Start {
            session_id: session_id.clone(),
            url: url.clone(),
            options
        })
        .await
    {
        state.sessions.fail(&session_id, "Download worker is not running").await;
        state
            .sessions
            .schedule_eviction(session_id, state.config.session_retention);
        return Err(AppError::bad_request(format!("Failed to queue download: {e}")));
    }

    tracing::info!("Queued download {} for {}", session_id, url);

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "success": true,
            "session_id": session_id
        }))
    ))
}

pub async fn latest_progress(State(state): State<AppState>) -> Json<ProgressState> {
    Json(state.sessions.latest().await)
}

pub async fn session_progress(
    State(state): State<AppState>,
    Path(session_id): Path<String>
) -> Result<Json<ProgressState>, AppError> {
    state
        .sessions
        .get(&session_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found("Session not found"))
}

/// Pushes a snapshot whenever the session changes and closes once it is finished or failed.
pub async fn progress_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    if state.sessions.get(&session_id).await.is_none() {
        return Err(AppError::not_found("Session not found"));
    }

    let sessions = state.sessions.clone();
    let stream = async_stream::stream! {
        let mut interval = tokio::time::interval(PROGRESS_POLL_INTERVAL);
        let mut last_sent: Option<ProgressState> = None;

        loop {
            interval.tick().await;

            let Some(snapshot) = sessions.get(&session_id).await else {
                break;
            };
            let terminal = snapshot.status.is_terminal();

            if last_sent.as_ref() != Some(&snapshot) {
                match Event::default().event("progress").json_data(&snapshot) {
                    Ok(event) => yield Ok::<_, Infallible>(event),
                    Err(e) => {
                        tracing::warn!("Failed to encode progress for {}: {}", session_id, e);
                        break;
                    }
                }
                last_sent = Some(snapshot);
            }

            if terminal {
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[tracing::instrument(skip(state))]
pub async fn cancel_download(
    State(state): State<AppState>,
    Path(session_id): Path<String>
) -> Result<impl IntoResponse, AppError> {
    let progress = state
        .sessions
        .get(&session_id)
        .await
        .ok_or_else(|| AppError::not_found("Session not found"))?;

    if progress.status.is_terminal() {
        return Err(AppError::bad_request("Download is not in progress"));
    }

    state
        .download_tx
        .send(DownloadCommand::Cancel {
            session_id: session_id.clone()
        })
        .await
        .map_err(|e| AppError::bad_request(format!("Failed to cancel download: {e}")))?;

    Ok(Json(serde_json::json!({ "success": true })))
}
