use serde::Serialize;

use crate::domain::media::{FilePayload, MediaFile, Snowflake};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Queued,
    Uploading,
    Completed,
    Error,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadItem {
    pub file: FilePayload,
    pub status: UploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaFile>,
}

impl UploadItem {
    pub fn new(file: FilePayload) -> Self {
        Self {
            file,
            status: UploadStatus::Queued,
            error: None,
            media: None,
        }
    }

    pub(crate) fn start(&mut self) {
        debug_assert_eq!(self.status, UploadStatus::Queued);
        self.status = UploadStatus::Uploading;
    }

    pub(crate) fn complete(&mut self, media: MediaFile) {
        debug_assert_eq!(self.status, UploadStatus::Uploading);
        self.status = UploadStatus::Completed;
        self.media = Some(media);
    }

    pub(crate) fn fail(&mut self, message: String) {
        debug_assert_eq!(self.status, UploadStatus::Uploading);
        self.status = UploadStatus::Error;
        self.error = Some(message);
    }

    /// Fails the item from any non-terminal state. Terminal items are kept.
    pub(crate) fn abandon(&mut self, message: &str) {
        if !self.status.is_terminal() {
            self.status = UploadStatus::Error;
            self.error = Some(message.to_string());
        }
    }
}

/// A group of files submitted together and processed as one FIFO unit.
#[derive(Debug, Clone, Serialize)]
pub struct UploadBatch {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_id: Option<Snowflake>,
    pub files: Vec<UploadItem>,
    pub status: UploadStatus,
}

impl UploadBatch {
    pub fn new(id: String, album_id: Option<Snowflake>, files: Vec<FilePayload>) -> Self {
        Self {
            id,
            album_id,
            files: files.into_iter().map(UploadItem::new).collect(),
            status: UploadStatus::Queued,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.files.iter().all(|item| item.status.is_terminal())
    }

    /// Final status once every item is terminal: any failure marks the batch.
    pub fn settle(&mut self) {
        self.status = if self
            .files
            .iter()
            .any(|item| item.status == UploadStatus::Error)
        {
            UploadStatus::Error
        } else {
            UploadStatus::Completed
        };
    }

    pub fn failed_count(&self) -> usize {
        self.files
            .iter()
            .filter(|item| item.status == UploadStatus::Error)
            .count()
    }
}
