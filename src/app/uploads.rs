use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::media::{FilePayload, MediaFile, Snowflake};
use crate::domain::upload::{UploadBatch, UploadStatus};
use crate::infra::api::MediaApi;
use crate::jobs::upload_processor;

#[derive(Debug, Clone)]
pub enum UploadEvent {
    BatchStarted {
        batch_id: String,
        files: usize,
    },
    ItemFinished {
        batch_id: String,
        index: usize,
        status: UploadStatus,
        error: Option<String>,
    },
    /// The batch has left the queue; carries its final record.
    BatchFinished(UploadBatch),
}

/// FIFO upload queue with a single consumer.
///
/// Batches are uploaded one at a time and the files of a batch strictly in
/// submission order. The consumer is a Tokio task spawned by [`enqueue`]
/// when none is running; `enqueue` must therefore be called from within a
/// Tokio runtime.
///
/// [`enqueue`]: UploadQueue::enqueue
#[derive(Clone)]
pub struct UploadQueue {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn MediaApi>,
    state: Mutex<QueueState>,
    events: broadcast::Sender<UploadEvent>,
}

#[derive(Default)]
struct QueueState {
    batches: VecDeque<UploadBatch>,
    // Checked and set under the same lock as `batches`, so an enqueue never
    // races a consumer that is about to go idle.
    processing: bool,
}

/// The head batch's work, copied out so no lock is held while uploading.
pub(crate) struct BatchJob {
    pub batch_id: String,
    pub album_id: Option<Snowflake>,
    pub files: Vec<FilePayload>,
}

impl UploadQueue {
    pub fn new(api: Arc<dyn MediaApi>, event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            inner: Arc::new(Inner {
                api,
                state: Mutex::new(QueueState::default()),
                events,
            }),
        }
    }

    pub fn enqueue(&self, files: Vec<FilePayload>) -> String {
        self.enqueue_with_album(files, None)
    }

    pub fn enqueue_with_album(&self, files: Vec<FilePayload>, album_id: Option<Snowflake>) -> String {
        let batch_id = Uuid::new_v4().to_string();
        let batch = UploadBatch::new(batch_id.clone(), album_id, files);
        let file_count = batch.files.len();

        let start_consumer = self.push_batch(batch);

        info!(batch_id = %batch_id, files = file_count, "upload batch queued");
        if start_consumer {
            tokio::spawn(upload_processor::run(self.clone()));
        }

        batch_id
    }

    /// Appends a batch and claims the consumer flag. Returns true when the
    /// caller must start the consumer.
    fn push_batch(&self, batch: UploadBatch) -> bool {
        let mut state = self.lock();
        state.batches.push_back(batch);
        !std::mem::replace(&mut state.processing, true)
    }

    /// Snapshot of a batch that is still queued or uploading.
    pub fn status(&self, batch_id: &str) -> Option<UploadBatch> {
        self.lock()
            .batches
            .iter()
            .find(|batch| batch.id == batch_id)
            .cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.inner.events.subscribe()
    }

    pub fn pending(&self) -> usize {
        self.lock().batches.len()
    }

    pub fn is_processing(&self) -> bool {
        self.lock().processing
    }

    pub(crate) fn api(&self) -> Arc<dyn MediaApi> {
        Arc::clone(&self.inner.api)
    }

    /// Marks the head batch as uploading, or releases the consumer flag when
    /// the queue is empty.
    pub(crate) fn begin_next(&self) -> Option<BatchJob> {
        let job = {
            let mut state = self.lock();
            if state.batches.is_empty() {
                state.processing = false;
                return None;
            }

            let batch = state.batches.front_mut()?;
            batch.status = UploadStatus::Uploading;
            BatchJob {
                batch_id: batch.id.clone(),
                album_id: batch.album_id,
                files: batch.files.iter().map(|item| item.file.clone()).collect(),
            }
        };

        self.emit(UploadEvent::BatchStarted {
            batch_id: job.batch_id.clone(),
            files: job.files.len(),
        });
        Some(job)
    }

    pub(crate) fn start_item(&self, batch_id: &str, index: usize) {
        let mut state = self.lock();
        if let Some(item) = state
            .batches
            .iter_mut()
            .find(|batch| batch.id == batch_id)
            .and_then(|batch| batch.files.get_mut(index))
        {
            item.start();
        }
    }

    pub(crate) fn finish_item(&self, batch_id: &str, index: usize, result: Result<MediaFile, String>) {
        let event = {
            let mut state = self.lock();
            let Some(item) = state
                .batches
                .iter_mut()
                .find(|batch| batch.id == batch_id)
                .and_then(|batch| batch.files.get_mut(index))
            else {
                return;
            };

            match result {
                Ok(media) => item.complete(media),
                Err(message) => item.fail(message),
            }

            UploadEvent::ItemFinished {
                batch_id: batch_id.to_string(),
                index,
                status: item.status,
                error: item.error.clone(),
            }
        };

        self.emit(event);
    }

    /// Removes a fully processed batch and publishes its final record.
    pub(crate) fn finish_batch(&self, batch_id: &str) -> Option<UploadBatch> {
        let batch = {
            let mut state = self.lock();
            let position = state.batches.iter().position(|batch| batch.id == batch_id)?;
            let mut batch = state.batches.remove(position)?;
            batch.settle();
            batch
        };

        self.emit(UploadEvent::BatchFinished(batch.clone()));
        Some(batch)
    }

    /// Cleans up after a consumer that stopped before draining the queue.
    ///
    /// The batch it was working on is finished with its unfinished items
    /// failed, and a new consumer is started when batches remain.
    pub(crate) fn recover(&self, interrupted: Option<&str>) {
        if let Some(batch_id) = interrupted {
            {
                let mut state = self.lock();
                if let Some(batch) = state.batches.iter_mut().find(|batch| batch.id == batch_id) {
                    if !batch.is_finished() {
                        for item in &mut batch.files {
                            item.abandon("upload interrupted");
                        }
                    }
                }
            }
            self.finish_batch(batch_id);
        }

        let restart = {
            let mut state = self.lock();
            state.processing = !state.batches.is_empty();
            state.processing
        };
        if !restart {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(pending = self.pending(), "restarting upload processor");
                handle.spawn(upload_processor::run(self.clone()));
            }
            Err(_) => {
                // Outside a runtime; the next enqueue starts a consumer.
                self.lock().processing = false;
            }
        }
    }

    fn emit(&self, event: UploadEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
