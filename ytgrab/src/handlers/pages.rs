use askama::Template;
use axum::{extract::State, response::Html};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    format_mode: &'static str,
    download_dir: String
}

#[tracing::instrument(skip(state))]
pub async fn index_page(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let template = IndexTemplate {
        format_mode: state.config.format_mode.as_str(),
        download_dir: state.config.download_dir.display().to_string()
    };

    Ok(Html(template.render()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio::sync::mpsc;
    use yt_dlp::YtDlp;

    use crate::config::Config;
    use crate::progress::ProgressStore;

    #[tokio::test]
    async fn test_index_page_renders() {
        let (download_tx, _rx) = mpsc::channel(1);
        let state = AppState {
            config: Arc::new(Config::default()),
            yt_dlp: Arc::new(YtDlp::new()),
            download_tx,
            sessions: ProgressStore::new()
        };

        let Html(page) = index_page(State(state)).await.unwrap();
        assert!(page.contains("<title>ytgrab</title>"));
        assert!(page.contains("data-format-mode=\"targets\""));
        assert!(page.contains("/api/formats"));
    }
}
