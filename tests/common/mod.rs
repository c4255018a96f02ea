#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{broadcast, Notify};
use tower::ServiceExt;

use gallerist::app::uploads::UploadEvent;
use gallerist::config::AppConfig;
use gallerist::domain::bucket::{bucket_key, month_window, TimeBucket};
use gallerist::domain::media::{FilePayload, MediaFile, MediaType, Snowflake};
use gallerist::domain::upload::UploadBatch;
use gallerist::infra::api::{ApiError, MediaApi};
use gallerist::AppState;

// ---------------------------------------------------------------------------
// FakeMediaApi: in-memory stand-in for the gallery server
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeMediaApi {
    buckets: Mutex<HashMap<MediaType, Vec<TimeBucket>>>,
    files: Mutex<Vec<MediaFile>>,
    failing_uploads: Mutex<HashMap<String, ApiError>>,
    failing_buckets: Mutex<HashSet<String>>,
    held_buckets: Mutex<HashMap<String, Arc<Notify>>>,
    uploads: Mutex<Vec<(String, Option<Snowflake>)>>,
    bucket_fetches: Mutex<Vec<String>>,
    bucket_listings: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    next_id: AtomicI64,
}

impl FakeMediaApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a month bucket and `count` files inside it.
    pub fn add_bucket(&self, media_type: MediaType, month_start: OffsetDateTime, count: usize) {
        self.buckets
            .lock()
            .unwrap()
            .entry(media_type)
            .or_default()
            .push(TimeBucket {
                date: month_start,
                count: count as i64,
            });

        let mut files = self.files.lock().unwrap();
        for offset in 0..count {
            let created_at = month_start + time::Duration::hours(offset as i64 + 1);
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            files.push(media_file(id, media_type, created_at));
        }
    }

    pub fn fail_upload(&self, file_name: &str, error: ApiError) {
        self.failing_uploads
            .lock()
            .unwrap()
            .insert(file_name.to_string(), error);
    }

    pub fn fail_bucket(&self, key: &str) {
        self.failing_buckets.lock().unwrap().insert(key.to_string());
    }

    pub fn heal_bucket(&self, key: &str) {
        self.failing_buckets.lock().unwrap().remove(key);
    }

    /// Makes fetches of `key` wait until the returned handle is notified.
    pub fn hold_bucket(&self, key: &str) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        self.held_buckets
            .lock()
            .unwrap()
            .insert(key.to_string(), release.clone());
        release
    }

    pub fn uploaded_names(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn uploaded_albums(&self) -> Vec<Option<Snowflake>> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|(_, album)| *album)
            .collect()
    }

    pub fn bucket_fetches(&self) -> Vec<String> {
        self.bucket_fetches.lock().unwrap().clone()
    }

    pub fn bucket_listings(&self) -> usize {
        self.bucket_listings.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaApi for FakeMediaApi {
    async fn upload(
        &self,
        file: &FilePayload,
        album_id: Option<Snowflake>,
    ) -> Result<MediaFile, ApiError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        // Give concurrently spawned work a chance to interleave.
        tokio::time::sleep(Duration::from_millis(2)).await;

        self.uploads
            .lock()
            .unwrap()
            .push((file.name.clone(), album_id));
        let failure = self.failing_uploads.lock().unwrap().get(&file.name).cloned();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(err) = failure {
            return Err(err);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut media = media_file(
            id,
            file.media_type().unwrap_or(MediaType::Image),
            OffsetDateTime::now_utc(),
        );
        media.file_name = file.name.clone();
        media.mime_type = file.content_type.clone();
        media.size = file.size as i64;
        media.album_id = album_id;
        Ok(media)
    }

    async fn list_buckets(&self, media_type: MediaType) -> Result<Vec<TimeBucket>, ApiError> {
        self.bucket_listings.fetch_add(1, Ordering::SeqCst);
        let mut buckets = self
            .buckets
            .lock()
            .unwrap()
            .get(&media_type)
            .cloned()
            .unwrap_or_default();
        buckets.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(buckets)
    }

    async fn list_bucket_files(
        &self,
        media_type: MediaType,
        date: OffsetDateTime,
    ) -> Result<Vec<MediaFile>, ApiError> {
        let key = bucket_key(date).unwrap();
        self.bucket_fetches.lock().unwrap().push(key.clone());

        let held = self.held_buckets.lock().unwrap().remove(&key);
        if let Some(release) = held {
            release.notified().await;
        }

        if self.failing_buckets.lock().unwrap().contains(&key) {
            return Err(ApiError::Status {
                status: 503,
                message: "bucket unavailable".into(),
            });
        }

        let window = month_window(date).unwrap();
        let mut files: Vec<MediaFile> = self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|file| file.file_type == media_type && window.contains(file.created_at))
            .cloned()
            .collect();
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(files)
    }
}

pub fn media_file(id: i64, media_type: MediaType, created_at: OffsetDateTime) -> MediaFile {
    MediaFile {
        id: Snowflake(id),
        user_id: Snowflake(1),
        album_id: None,
        file_name: format!("file-{}.jpg", id),
        file_type: media_type,
        mime_type: "image/jpeg".into(),
        size: 1024,
        s3_key: format!("{}s/{}", media_type, id),
        width: Some(800),
        height: Some(600),
        duration: None,
        exif_data: None,
        waveform: None,
        created_at,
        updated_at: created_at,
    }
}

pub fn payload(name: &str) -> FilePayload {
    FilePayload::new(name, "image/jpeg", bytes::Bytes::from(name.as_bytes().to_vec()))
}

/// Collects `count` finished batches, in completion order.
pub async fn finished_batches(
    events: &mut broadcast::Receiver<UploadEvent>,
    count: usize,
) -> Vec<UploadBatch> {
    tokio::time::timeout(Duration::from_secs(5), async {
        let mut finished = Vec::with_capacity(count);
        while finished.len() < count {
            match events.recv().await {
                Ok(UploadEvent::BatchFinished(batch)) => finished.push(batch),
                Ok(_) => {}
                Err(err) => panic!("upload event stream failed: {err}"),
            }
        }
        finished
    })
    .await
    .expect("timed out waiting for upload batches")
}

// ---------------------------------------------------------------------------
// TestApp: the local API router over a FakeMediaApi
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub api: Arc<FakeMediaApi>,
}

pub struct TestResponse {
    pub status: StatusCode,
    body_bytes: bytes::Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }
}

pub struct MultipartPart<'a> {
    pub name: &'a str,
    pub file_name: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub data: &'a [u8],
}

const BOUNDARY: &str = "gallerist-test-boundary";

impl TestApp {
    pub fn new(api: Arc<FakeMediaApi>) -> Self {
        // Same code path as production.
        std::env::set_var("SERVER_URL", "http://gallery.invalid");
        std::env::set_var("APP_MODE", "api");
        std::env::set_var("UPLOAD_MAX_BYTES", "1048576");

        let config = AppConfig::from_env().expect("failed to build AppConfig");
        let state = AppState::new(api.clone(), &config);
        let router = gallerist::http::router(state.clone());

        TestApp { router, state, api }
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Body,
        content_type: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .expect("oneshot failed");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse { status, body_bytes }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(Method::GET, path, Body::empty(), None).await
    }

    pub async fn post(&self, path: &str) -> TestResponse {
        self.request(Method::POST, path, Body::empty(), None).await
    }

    pub async fn post_json(&self, path: &str, body: Value) -> TestResponse {
        self.request(
            Method::POST,
            path,
            Body::from(serde_json::to_string(&body).unwrap()),
            Some("application/json"),
        )
        .await
    }

    pub async fn post_multipart(&self, path: &str, parts: &[MultipartPart<'_>]) -> TestResponse {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
            if let Some(file_name) = part.file_name {
                disposition.push_str(&format!("; filename=\"{}\"", file_name));
            }
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(b"\r\n");
            if let Some(content_type) = part.content_type {
                body.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
            }
            body.extend_from_slice(b"\r\n");
            body.extend_from_slice(part.data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        let content_type = format!("multipart/form-data; boundary={}", BOUNDARY);
        self.request(Method::POST, path, Body::from(body), Some(&content_type))
            .await
    }
}
