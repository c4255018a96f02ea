pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod jobs;

use std::sync::Arc;

use axum::http::HeaderValue;

use crate::app::gallery::Galleries;
use crate::app::uploads::UploadQueue;
use crate::config::AppConfig;
use crate::infra::api::MediaApi;

#[derive(Clone)]
pub struct AppState {
    pub uploads: UploadQueue,
    pub galleries: Galleries,
    pub upload_max_bytes: usize,
    pub cors_allow_origin: Option<HeaderValue>,
}

impl AppState {
    pub fn new(api: Arc<dyn MediaApi>, config: &AppConfig) -> Self {
        Self {
            uploads: UploadQueue::new(Arc::clone(&api), config.upload_event_buffer),
            galleries: Galleries::new(api),
            upload_max_bytes: config.upload_max_bytes,
            cors_allow_origin: config.cors_allow_origin.clone(),
        }
    }
}
