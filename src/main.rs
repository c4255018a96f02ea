use anyhow::anyhow;
use axum::Router;
use bytes::Bytes;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gallerist::app::uploads::UploadEvent;
use gallerist::config::AppConfig;
use gallerist::domain::media::{content_type_from_extension, FilePayload, Snowflake};
use gallerist::domain::upload::UploadStatus;
use gallerist::http;
use gallerist::infra::http_client::HttpMediaApi;
use gallerist::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let api = Arc::new(HttpMediaApi::new(&config)?);
    let state = AppState::new(api, &config);

    match config.app_mode.as_str() {
        "api" => {
            let app: Router = http::router(state).layer(TraceLayer::new_for_http());
            let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
            info!(server = %config.server_url, "listening on {}", config.http_addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        "upload" => {
            let paths: Vec<String> = std::env::args().skip(1).collect();
            if paths.is_empty() {
                return Err(anyhow!("upload mode needs at least one file path"));
            }

            upload_until(&state, &paths, config.upload_album_id, shutdown_signal()).await?;
        }
        other => return Err(anyhow!("unknown APP_MODE: {}", other)),
    }

    Ok(())
}

/// Uploads `paths` as one batch, failing if `shutdown` fires first.
async fn upload_until(
    state: &AppState,
    paths: &[String],
    album_id: Option<Snowflake>,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    tokio::select! {
        result = upload_files(state, paths, album_id) => result,
        _ = shutdown => Err(anyhow!("interrupted before the upload batch finished")),
    }
}

async fn upload_files(
    state: &AppState,
    paths: &[String],
    album_id: Option<Snowflake>,
) -> anyhow::Result<()> {
    let files = futures::future::try_join_all(paths.iter().map(|path| read_payload(path))).await?;

    let mut events = state.uploads.subscribe();
    let batch_id = state.uploads.enqueue_with_album(files, album_id);

    let batch = loop {
        match events.recv().await {
            Ok(UploadEvent::BatchFinished(batch)) if batch.id == batch_id => break batch,
            Ok(UploadEvent::ItemFinished {
                batch_id: id,
                index,
                status,
                ..
            }) if id == batch_id => {
                debug!(index, ?status, "file finished");
            }
            Ok(_) => {}
            // The final event is the newest one, so lagging never loses it.
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "upload events lagged"),
            Err(RecvError::Closed) => {
                return Err(anyhow!("upload queue closed before batch {} finished", batch_id));
            }
        }
    };

    for item in &batch.files {
        match item.status {
            UploadStatus::Completed => info!(
                file = %item.file.name,
                media_id = ?item.media.as_ref().map(|media| media.id),
                "uploaded"
            ),
            _ => warn!(
                file = %item.file.name,
                error = item.error.as_deref().unwrap_or("unknown error"),
                "upload failed"
            ),
        }
    }

    let failed = batch.failed_count();
    if failed > 0 {
        return Err(anyhow!("{} of {} uploads failed", failed, batch.files.len()));
    }

    Ok(())
}

async fn read_payload(path: &str) -> anyhow::Result<FilePayload> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|err| anyhow!("cannot read {}: {}", path, err))?;
    let name = Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
        .to_string();
    let content_type = content_type_from_extension(&name);

    Ok(FilePayload::new(name, content_type, Bytes::from(bytes)))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
