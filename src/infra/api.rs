use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::bucket::TimeBucket;
use crate::domain::media::{FilePayload, MediaFile, MediaType, Snowflake};

/// Failure talking to the gallery server.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(String),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    Request(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if err.is_builder() {
            Self::Request(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Operations the gallery server offers to the upload queue and the pager.
#[async_trait]
pub trait MediaApi: Send + Sync {
    async fn upload(
        &self,
        file: &FilePayload,
        album_id: Option<Snowflake>,
    ) -> Result<MediaFile, ApiError>;

    /// All month buckets for a media type, newest first.
    async fn list_buckets(&self, media_type: MediaType) -> Result<Vec<TimeBucket>, ApiError>;

    /// Files of the calendar month containing `date`, newest first.
    async fn list_bucket_files(
        &self,
        media_type: MediaType,
        date: OffsetDateTime,
    ) -> Result<Vec<MediaFile>, ApiError>;
}
