use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use serde::Serialize;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::bucket::{unix_millis, LoadedBucket};
use crate::domain::media::{MediaFile, MediaType};
use crate::infra::api::{ApiError, MediaApi};

#[derive(Debug, Error)]
pub enum GalleryError {
    /// Advancing needs at least one loaded bucket to step from.
    #[error("gallery window is empty")]
    EmptyWindow,

    #[error("bucket not in timeline: {0}")]
    UnknownBucket(String),

    #[error("invalid bucket: {0}")]
    InvalidBucket(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Storage for the files of buckets that have already been fetched.
pub trait BucketCache: Send + Sync {
    fn get(&self, key: &str) -> Option<&[MediaFile]>;
    fn insert(&mut self, key: String, files: Vec<MediaFile>);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps every fetched bucket for the pager's lifetime.
#[derive(Debug, Default)]
pub struct UnboundedCache {
    files: HashMap<String, Vec<MediaFile>>,
}

impl BucketCache for UnboundedCache {
    fn get(&self, key: &str) -> Option<&[MediaFile]> {
        self.files.get(key).map(Vec::as_slice)
    }

    fn insert(&mut self, key: String, files: Vec<MediaFile>) {
        self.files.insert(key, files);
    }

    fn len(&self) -> usize {
        self.files.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketWithFiles {
    pub bucket_id: String,
    pub count: i64,
    pub files: Vec<MediaFile>,
}

/// A movable window over one media type's month buckets.
///
/// The timeline is fetched once, newest first, and never refreshed. The
/// loaded set is a subset of it kept newest first without duplicates.
pub struct GalleryPager {
    api: Arc<dyn MediaApi>,
    media_type: MediaType,
    timeline: Vec<LoadedBucket>,
    loaded: Vec<LoadedBucket>,
    cache: Box<dyn BucketCache>,
    focused: Option<String>,
}

impl GalleryPager {
    pub async fn initialize(
        api: Arc<dyn MediaApi>,
        media_type: MediaType,
    ) -> Result<Self, GalleryError> {
        Self::initialize_with_cache(api, media_type, Box::new(UnboundedCache::default())).await
    }

    pub async fn initialize_with_cache(
        api: Arc<dyn MediaApi>,
        media_type: MediaType,
        cache: Box<dyn BucketCache>,
    ) -> Result<Self, GalleryError> {
        let buckets = api.list_buckets(media_type).await?;
        let mut timeline = buckets
            .into_iter()
            .map(LoadedBucket::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| GalleryError::InvalidBucket(err.to_string()))?;
        timeline.sort_by(|a, b| b.date_ms.cmp(&a.date_ms));
        timeline.dedup_by(|a, b| a.key == b.key);

        let mut pager = Self {
            api,
            media_type,
            timeline,
            loaded: Vec::new(),
            cache,
            focused: None,
        };

        if let Some(newest) = pager.timeline.first().map(|bucket| bucket.key.clone()) {
            pager.load_bucket(&newest);
        }

        info!(
            media_type = %media_type,
            buckets = pager.timeline.len(),
            "gallery timeline loaded"
        );
        Ok(pager)
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn timeline(&self) -> &[LoadedBucket] {
        &self.timeline
    }

    pub fn loaded(&self) -> &[LoadedBucket] {
        &self.loaded
    }

    pub fn focused(&self) -> Option<&LoadedBucket> {
        let key = self.focused.as_deref()?;
        self.loaded.iter().find(|bucket| bucket.key == key)
    }

    pub fn cached_buckets(&self) -> usize {
        self.cache.len()
    }

    /// Files of every loaded bucket, newest bucket first.
    ///
    /// Buckets missing from the cache are fetched and cached. A failed fetch
    /// aborts the call and caches nothing for that bucket.
    pub async fn current_window(&mut self) -> Result<Vec<BucketWithFiles>, GalleryError> {
        let mut window = Vec::with_capacity(self.loaded.len());

        for bucket in self.loaded.clone() {
            let cached = self.cache.get(&bucket.key).map(<[MediaFile]>::to_vec);
            let files = match cached {
                Some(files) => files,
                None => {
                    debug!(media_type = %self.media_type, bucket = %bucket.key, "fetching bucket");
                    let files = self
                        .api
                        .list_bucket_files(self.media_type, bucket.date)
                        .await?;
                    self.cache.insert(bucket.key.clone(), files.clone());
                    files
                }
            };

            window.push(BucketWithFiles {
                bucket_id: bucket.key,
                count: bucket.count,
                files,
            });
        }

        Ok(window)
    }

    /// Loads the closest bucket newer than the newest loaded one.
    ///
    /// Returns whether the window grew.
    pub fn advance_newer(&mut self) -> Result<bool, GalleryError> {
        let newest = self.loaded.first().ok_or(GalleryError::EmptyWindow)?.date_ms;
        let next = self
            .timeline
            .iter()
            .rev()
            .find(|bucket| bucket.date_ms > newest)
            .map(|bucket| bucket.key.clone());

        Ok(match next {
            Some(key) => self.load_bucket(&key),
            None => false,
        })
    }

    /// Loads the closest bucket older than the oldest loaded one.
    ///
    /// Returns whether the window grew.
    pub fn advance_older(&mut self) -> Result<bool, GalleryError> {
        let oldest = self.loaded.last().ok_or(GalleryError::EmptyWindow)?.date_ms;
        let next = self
            .timeline
            .iter()
            .find(|bucket| bucket.date_ms < oldest)
            .map(|bucket| bucket.key.clone());

        Ok(match next {
            Some(key) => self.load_bucket(&key),
            None => false,
        })
    }

    /// Replaces the window with a single bucket. Cached files are kept.
    ///
    /// `key` may be any RFC 3339 spelling of the bucket's date, such as the
    /// server's `2024-03-01T00:00:00.000Z`.
    pub fn jump_to(&mut self, key: &str) -> Result<(), GalleryError> {
        let resolved = self
            .resolve(key)
            .ok_or_else(|| GalleryError::UnknownBucket(key.to_string()))?;

        self.loaded.clear();
        self.load_bucket(&resolved);
        Ok(())
    }

    fn resolve(&self, key: &str) -> Option<String> {
        let date_ms = unix_millis(OffsetDateTime::parse(key, &Rfc3339).ok()?);
        self.timeline
            .iter()
            .find(|bucket| bucket.date_ms == date_ms)
            .map(|bucket| bucket.key.clone())
    }

    /// Adds a timeline bucket to the window and focuses it.
    ///
    /// Returns false for keys outside the timeline and for buckets that are
    /// already loaded.
    pub fn load_bucket(&mut self, key: &str) -> bool {
        let Some(bucket) = self.timeline.iter().find(|bucket| bucket.key == key) else {
            return false;
        };

        self.focused = Some(bucket.key.clone());
        if self.loaded.iter().any(|loaded| loaded.key == key) {
            return false;
        }

        self.loaded.push(bucket.clone());
        self.loaded.sort_by(|a, b| b.date_ms.cmp(&a.date_ms));
        debug!(
            media_type = %self.media_type,
            bucket = %key,
            loaded = self.loaded.len(),
            "bucket loaded"
        );
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Newer,
    Older,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineView {
    pub media_type: MediaType,
    pub timeline: Vec<LoadedBucket>,
    pub loaded: Vec<LoadedBucket>,
    pub focused: Option<String>,
}

/// One pager per media type, created on first use.
///
/// Each media type has its own lock, so a slow fetch for one type does not
/// hold up the others. A failed initialization is not stored, so the next
/// call retries it.
#[derive(Clone)]
pub struct Galleries {
    api: Arc<dyn MediaApi>,
    pagers: Arc<StdMutex<HashMap<MediaType, PagerSlot>>>,
}

type PagerSlot = Arc<Mutex<Option<GalleryPager>>>;

impl Galleries {
    pub fn new(api: Arc<dyn MediaApi>) -> Self {
        Self {
            api,
            pagers: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    pub async fn window(&self, media_type: MediaType) -> Result<Vec<BucketWithFiles>, GalleryError> {
        let slot = self.slot(media_type);
        let mut slot = slot.lock().await;
        let pager = ready(&mut slot, &self.api, media_type).await?;
        pager.current_window().await
    }

    pub async fn advance(
        &self,
        media_type: MediaType,
        direction: Direction,
    ) -> Result<Vec<BucketWithFiles>, GalleryError> {
        let slot = self.slot(media_type);
        let mut slot = slot.lock().await;
        let pager = ready(&mut slot, &self.api, media_type).await?;
        let grew = match direction {
            Direction::Newer => pager.advance_newer()?,
            Direction::Older => pager.advance_older()?,
        };
        debug!(media_type = %media_type, ?direction, grew, "gallery advanced");
        pager.current_window().await
    }

    pub async fn jump(
        &self,
        media_type: MediaType,
        key: &str,
    ) -> Result<Vec<BucketWithFiles>, GalleryError> {
        let slot = self.slot(media_type);
        let mut slot = slot.lock().await;
        let pager = ready(&mut slot, &self.api, media_type).await?;
        pager.jump_to(key)?;
        pager.current_window().await
    }

    pub async fn timeline(&self, media_type: MediaType) -> Result<TimelineView, GalleryError> {
        let slot = self.slot(media_type);
        let mut slot = slot.lock().await;
        let pager = ready(&mut slot, &self.api, media_type).await?;
        Ok(TimelineView {
            media_type,
            timeline: pager.timeline().to_vec(),
            loaded: pager.loaded().to_vec(),
            focused: pager.focused().map(|bucket| bucket.key.clone()),
        })
    }

    fn slot(&self, media_type: MediaType) -> PagerSlot {
        let mut pagers = self.pagers.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(pagers.entry(media_type).or_default())
    }
}

async fn ready<'a>(
    slot: &'a mut Option<GalleryPager>,
    api: &Arc<dyn MediaApi>,
    media_type: MediaType,
) -> Result<&'a mut GalleryPager, GalleryError> {
    let pager = match slot.take() {
        Some(pager) => pager,
        None => GalleryPager::initialize(Arc::clone(api), media_type).await?,
    };
    Ok(slot.insert(pager))
}
