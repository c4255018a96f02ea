use tracing::{debug, error, info, warn};

use crate::app::uploads::UploadQueue;

/// Drains the queue head-first until it is empty.
///
/// Spawned by `UploadQueue::enqueue` only when no consumer is running.
/// Files are uploaded one after another; a failed file is recorded and the
/// next one starts. Each upload runs in its own task, so a panicking
/// `MediaApi` fails that file only.
pub(crate) async fn run(queue: UploadQueue) {
    debug!("upload processor started");
    let api = queue.api();
    let mut guard = ConsumerGuard {
        queue: queue.clone(),
        batch_id: None,
        drained: false,
    };

    while let Some(job) = queue.begin_next() {
        info!(batch_id = %job.batch_id, files = job.files.len(), "processing upload batch");
        guard.batch_id = Some(job.batch_id.clone());

        for (index, file) in job.files.iter().enumerate() {
            queue.start_item(&job.batch_id, index);

            let upload = {
                let api = api.clone();
                let file = file.clone();
                let album_id = job.album_id;
                tokio::spawn(async move { api.upload(&file, album_id).await })
            };

            let result = match upload.await {
                Ok(Ok(media)) => {
                    debug!(
                        batch_id = %job.batch_id,
                        file = %file.name,
                        media_id = %media.id,
                        "file uploaded"
                    );
                    Ok(media)
                }
                Ok(Err(err)) => {
                    warn!(
                        batch_id = %job.batch_id,
                        file = %file.name,
                        error = %err,
                        "file upload failed"
                    );
                    Err(err.to_string())
                }
                Err(err) => {
                    error!(
                        batch_id = %job.batch_id,
                        file = %file.name,
                        error = %err,
                        "upload task failed"
                    );
                    Err(format!("upload task failed: {}", err))
                }
            };

            queue.finish_item(&job.batch_id, index, result);
        }

        if let Some(batch) = queue.finish_batch(&job.batch_id) {
            info!(
                batch_id = %batch.id,
                status = ?batch.status,
                failed = batch.failed_count(),
                "upload batch finished"
            );
        }
        guard.batch_id = None;
    }

    guard.drained = true;
    debug!("upload processor idle");
}

/// Hands the queue back if the consumer stops early (panic or abort).
struct ConsumerGuard {
    queue: UploadQueue,
    batch_id: Option<String>,
    drained: bool,
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        if self.drained {
            return;
        }

        warn!(batch_id = ?self.batch_id, "upload processor stopped early");
        self.queue.recover(self.batch_id.as_deref());
    }
}
