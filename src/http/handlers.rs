use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::app::gallery::{BucketWithFiles, Direction, GalleryError, TimelineView};
use crate::domain::media::{content_type_from_extension, FilePayload, MediaType, Snowflake};
use crate::domain::upload::UploadBatch;
use crate::http::AppError;
use crate::AppState;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    pending_uploads: usize,
    processing: bool,
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        pending_uploads: state.uploads.pending(),
        processing: state.uploads.is_processing(),
    })
}

#[derive(Serialize)]
pub struct UploadAccepted {
    pub upload_id: String,
}

pub async fn create_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadAccepted>), AppError> {
    let mut files = Vec::new();
    let mut album_id = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        tracing::warn!(error = %err, "invalid multipart body");
        AppError::bad_request("invalid multipart body")
    })? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| content_type_from_extension(&file_name).to_string());
                let bytes = field.bytes().await.map_err(|err| {
                    tracing::warn!(error = %err, file = %file_name, "failed to read upload part");
                    AppError::bad_request("invalid multipart body")
                })?;
                files.push(FilePayload::new(file_name, content_type, bytes));
            }
            Some("album_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|_| AppError::bad_request("invalid multipart body"))?;
                if !value.trim().is_empty() {
                    let parsed = value
                        .parse::<Snowflake>()
                        .map_err(|_| AppError::bad_request("invalid album_id"))?;
                    album_id = Some(parsed);
                }
            }
            _ => {}
        }
    }

    let upload_id = state.uploads.enqueue_with_album(files, album_id);
    Ok((StatusCode::ACCEPTED, Json(UploadAccepted { upload_id })))
}

pub async fn get_upload(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<UploadBatch>, AppError> {
    match state.uploads.status(&id) {
        Some(batch) => Ok(Json(batch)),
        None => Err(AppError::not_found("upload not found")),
    }
}

#[derive(Serialize)]
pub struct GalleryWindow {
    pub media_type: MediaType,
    pub buckets: Vec<BucketWithFiles>,
}

#[derive(Deserialize)]
pub struct JumpRequest {
    pub bucket: String,
}

fn parse_media_type(value: &str) -> Result<MediaType, AppError> {
    MediaType::parse(value).ok_or_else(|| AppError::bad_request("unknown media type"))
}

fn gallery_error(err: GalleryError, media_type: MediaType) -> AppError {
    match err {
        GalleryError::EmptyWindow => AppError::conflict("gallery window is empty"),
        GalleryError::UnknownBucket(key) => AppError::not_found(format!("bucket not found: {}", key)),
        GalleryError::Api(err) => {
            tracing::error!(error = %err, media_type = %media_type, "gallery server request failed");
            AppError::bad_gateway(err.to_string())
        }
        GalleryError::InvalidBucket(message) => {
            tracing::error!(error = %message, media_type = %media_type, "gallery server sent an invalid bucket");
            AppError::bad_gateway("invalid bucket from gallery server")
        }
    }
}

pub async fn get_gallery(
    Path(media_type): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<GalleryWindow>, AppError> {
    let media_type = parse_media_type(&media_type)?;
    let buckets = state
        .galleries
        .window(media_type)
        .await
        .map_err(|err| gallery_error(err, media_type))?;

    Ok(Json(GalleryWindow { media_type, buckets }))
}

pub async fn advance_newer(
    Path(media_type): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<GalleryWindow>, AppError> {
    advance(state, &media_type, Direction::Newer).await
}

pub async fn advance_older(
    Path(media_type): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<GalleryWindow>, AppError> {
    advance(state, &media_type, Direction::Older).await
}

async fn advance(
    state: AppState,
    media_type: &str,
    direction: Direction,
) -> Result<Json<GalleryWindow>, AppError> {
    let media_type = parse_media_type(media_type)?;
    let buckets = state
        .galleries
        .advance(media_type, direction)
        .await
        .map_err(|err| gallery_error(err, media_type))?;

    Ok(Json(GalleryWindow { media_type, buckets }))
}

pub async fn jump_gallery(
    Path(media_type): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<JumpRequest>,
) -> Result<Json<GalleryWindow>, AppError> {
    let media_type = parse_media_type(&media_type)?;
    let buckets = state
        .galleries
        .jump(media_type, &payload.bucket)
        .await
        .map_err(|err| gallery_error(err, media_type))?;

    Ok(Json(GalleryWindow { media_type, buckets }))
}

pub async fn get_timeline(
    Path(media_type): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TimelineView>, AppError> {
    let media_type = parse_media_type(&media_type)?;
    let view = state
        .galleries
        .timeline(media_type)
        .await
        .map_err(|err| gallery_error(err, media_type))?;

    Ok(Json(view))
}
