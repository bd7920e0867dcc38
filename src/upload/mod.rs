//! Serialized media uploads.
//!
//! A single background worker consumes a FIFO queue and runs at most one
//! upload at a time: the chunked upload protocol wants ordered requests
//! per file, so there is nothing to win by uploading concurrently. Status
//! and progress land on the event hub as the task moves through its
//! lifecycle.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::client::MediaUploader;
use crate::events::{CoreEvent, EventHub};

pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;

/// Lifecycle of one media upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadStatus {
    Queued,
    Uploading,
    Finalizing,
    Success,
    Error,
}

/// One queued media upload. `index` correlates the task to the job slot
/// the presentation layer shows the user.
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub index: usize,
    pub media_path: PathBuf,
}

/// Queue message. `Shutdown` is the poison pill: the worker exits when it
/// dequeues one, and it never produces a status event.
#[derive(Debug)]
enum WorkerMessage {
    Task(UploadTask),
    Shutdown,
}

/// Handle for enqueuing work onto the upload worker.
#[derive(Clone)]
pub struct UploadWorkerHandle {
    tx: mpsc::UnboundedSender<WorkerMessage>,
    events: Arc<EventHub>,
}

impl UploadWorkerHandle {
    /// Queue an upload. Non-blocking; the task runs in FIFO order after
    /// everything queued before it.
    pub fn enqueue(&self, task: UploadTask) {
        let index = task.index;
        if self.tx.send(WorkerMessage::Task(task)).is_err() {
            warn!(index, "upload worker is gone, dropping task");
            return;
        }
        self.events.emit(CoreEvent::MediaUploadStatus {
            index,
            status: UploadStatus::Queued,
            detail: None,
        });
    }

    /// Ask the worker to exit once everything queued before this call has
    /// finished. In-flight work is never abandoned mid-write.
    pub fn shutdown(&self) {
        let _ = self.tx.send(WorkerMessage::Shutdown);
    }
}

pub struct UploadWorker {
    rx: mpsc::UnboundedReceiver<WorkerMessage>,
    uploader: Arc<dyn MediaUploader>,
    events: Arc<EventHub>,
    chunk_size: usize,
}

impl UploadWorker {
    pub fn new(
        uploader: Arc<dyn MediaUploader>,
        events: Arc<EventHub>,
        chunk_size: usize,
    ) -> (Self, UploadWorkerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = UploadWorkerHandle {
            tx,
            events: Arc::clone(&events),
        };
        let worker = Self {
            rx,
            uploader,
            events,
            chunk_size: chunk_size.max(1),
        };
        (worker, handle)
    }

    /// Consume the queue until the shutdown sentinel arrives.
    ///
    /// Individual task failures are reported as an `Error` status and
    /// absorbed; the loop itself survives them indefinitely.
    pub async fn run(mut self) {
        info!("upload worker started");
        while let Some(msg) = self.rx.recv().await {
            match msg {
                WorkerMessage::Task(task) => {
                    let index = task.index;
                    match self.execute(task).await {
                        Ok(media_id) => {
                            info!(index, media_id = %media_id, "media upload finished");
                            self.status(index, UploadStatus::Success, Some(media_id));
                        }
                        Err(err) => {
                            error!(index, error = %err, "media upload failed");
                            self.status(index, UploadStatus::Error, Some(err.to_string()));
                        }
                    }
                }
                WorkerMessage::Shutdown => {
                    info!("upload worker shutting down");
                    break;
                }
            }
        }
    }

    async fn execute(&self, task: UploadTask) -> anyhow::Result<String> {
        let index = task.index;
        self.status(index, UploadStatus::Uploading, None);

        let data = tokio::fs::read(&task.media_path).await?;
        let digest = hex::encode(Sha256::digest(&data));
        let filename = task
            .media_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("media")
            .to_string();

        let session = self
            .uploader
            .begin(&filename, data.len() as u64, &digest)
            .await?;

        let total = data.len().max(1);
        for (i, chunk) in data.chunks(self.chunk_size).enumerate() {
            self.uploader.append(&session, chunk, i).await?;
            let sent = (i * self.chunk_size + chunk.len()).min(total);
            self.events.emit(CoreEvent::MediaUploadProgress {
                index,
                progress: sent as f64 / total as f64,
            });
        }

        self.status(index, UploadStatus::Finalizing, None);
        self.uploader.finalize(&session).await
    }

    fn status(&self, index: usize, status: UploadStatus, detail: Option<String>) {
        self.events.emit(CoreEvent::MediaUploadStatus {
            index,
            status,
            detail,
        });
    }
}

/// Spawn the worker loop on tokio and return the enqueue handle.
pub fn spawn_upload_worker(
    uploader: Arc<dyn MediaUploader>,
    events: Arc<EventHub>,
    chunk_size: usize,
) -> UploadWorkerHandle {
    let (worker, handle) = UploadWorker::new(uploader, events, chunk_size);
    tokio::spawn(async move {
        worker.run().await;
    });
    handle
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Uploader that records every protocol call and can be told to fail.
    #[derive(Default)]
    struct RecordingUploader {
        calls: Mutex<Vec<String>>,
        fail_finalize: bool,
    }

    impl RecordingUploader {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MediaUploader for RecordingUploader {
        async fn begin(
            &self,
            filename: &str,
            total_bytes: u64,
            _sha256: &str,
        ) -> anyhow::Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("begin {filename} {total_bytes}"));
            Ok(format!("session-{filename}"))
        }

        async fn append(&self, session: &str, chunk: &[u8], index: usize) -> anyhow::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("append {session} {index} {}", chunk.len()));
            Ok(())
        }

        async fn finalize(&self, session: &str) -> anyhow::Result<String> {
            self.calls.lock().unwrap().push(format!("finalize {session}"));
            if self.fail_finalize {
                anyhow::bail!("finalize rejected");
            }
            Ok(format!("media-{session}"))
        }
    }

    fn media_file(dir: &tempfile::TempDir, name: &str, bytes: usize) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&vec![7u8; bytes]).unwrap();
        path
    }

    fn statuses_for(events: &[CoreEvent], index: usize) -> Vec<UploadStatus> {
        events
            .iter()
            .filter_map(|e| match e {
                CoreEvent::MediaUploadStatus {
                    index: i, status, ..
                } if *i == index => Some(*status),
                _ => None,
            })
            .collect()
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<CoreEvent>) -> Vec<CoreEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_tasks_run_in_order_and_sentinel_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = Arc::new(RecordingUploader::default());
        let events = Arc::new(EventHub::new());
        let mut rx = events.subscribe();

        let (worker, handle) =
            UploadWorker::new(uploader.clone() as Arc<dyn MediaUploader>, events, 4);
        handle.enqueue(UploadTask {
            index: 1,
            media_path: media_file(&dir, "one.png", 10),
        });
        handle.enqueue(UploadTask {
            index: 2,
            media_path: media_file(&dir, "two.png", 3),
        });
        handle.shutdown();

        // Run the whole queue to completion; the sentinel ends the loop.
        worker.run().await;

        let calls = uploader.calls();
        assert_eq!(
            calls,
            vec![
                "begin one.png 10",
                "append session-one.png 0 4",
                "append session-one.png 1 4",
                "append session-one.png 2 2",
                "finalize session-one.png",
                "begin two.png 3",
                "append session-two.png 0 3",
                "finalize session-two.png",
            ]
        );

        let all = drain(&mut rx);
        assert_eq!(
            statuses_for(&all, 1),
            vec![
                UploadStatus::Queued,
                UploadStatus::Uploading,
                UploadStatus::Finalizing,
                UploadStatus::Success,
            ]
        );
        assert_eq!(
            statuses_for(&all, 2),
            vec![
                UploadStatus::Queued,
                UploadStatus::Uploading,
                UploadStatus::Finalizing,
                UploadStatus::Success,
            ]
        );

        // Task 1 fully resolves before task 2 starts uploading.
        let success_1 = all
            .iter()
            .position(|e| {
                matches!(
                    e,
                    CoreEvent::MediaUploadStatus {
                        index: 1,
                        status: UploadStatus::Success,
                        ..
                    }
                )
            })
            .unwrap();
        let uploading_2 = all
            .iter()
            .position(|e| {
                matches!(
                    e,
                    CoreEvent::MediaUploadStatus {
                        index: 2,
                        status: UploadStatus::Uploading,
                        ..
                    }
                )
            })
            .unwrap();
        assert!(success_1 < uploading_2);

        // The sentinel produced nothing: every status event belongs to a
        // real task.
        assert!(all.iter().all(|e| matches!(
            e,
            CoreEvent::MediaUploadStatus { index: 1 | 2, .. }
                | CoreEvent::MediaUploadProgress { index: 1 | 2, .. }
        )));
    }

    #[tokio::test]
    async fn test_progress_reaches_one() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = Arc::new(RecordingUploader::default());
        let events = Arc::new(EventHub::new());
        let mut rx = events.subscribe();

        let (worker, handle) =
            UploadWorker::new(uploader as Arc<dyn MediaUploader>, events, 4);
        handle.enqueue(UploadTask {
            index: 0,
            media_path: media_file(&dir, "pic.png", 9),
        });
        handle.shutdown();
        worker.run().await;

        let progress: Vec<f64> = drain(&mut rx)
            .iter()
            .filter_map(|e| match e {
                CoreEvent::MediaUploadProgress { progress, .. } => Some(*progress),
                _ => None,
            })
            .collect();
        assert_eq!(progress.len(), 3);
        assert!(progress.windows(2).all(|w| w[0] < w[1]));
        assert!((progress.last().unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_failed_task_does_not_stop_the_worker() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = Arc::new(RecordingUploader::default());
        let events = Arc::new(EventHub::new());
        let mut rx = events.subscribe();

        let (worker, handle) =
            UploadWorker::new(uploader.clone() as Arc<dyn MediaUploader>, events, 4);
        // First task points at a file that does not exist.
        handle.enqueue(UploadTask {
            index: 1,
            media_path: dir.path().join("missing.png"),
        });
        handle.enqueue(UploadTask {
            index: 2,
            media_path: media_file(&dir, "ok.png", 2),
        });
        handle.shutdown();
        worker.run().await;

        let all = drain(&mut rx);
        assert_eq!(
            statuses_for(&all, 1),
            vec![
                UploadStatus::Queued,
                UploadStatus::Uploading,
                UploadStatus::Error,
            ]
        );
        assert_eq!(
            *statuses_for(&all, 2).last().unwrap(),
            UploadStatus::Success
        );
    }

    #[tokio::test]
    async fn test_upstream_error_carries_detail() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = Arc::new(RecordingUploader {
            fail_finalize: true,
            ..Default::default()
        });
        let events = Arc::new(EventHub::new());
        let mut rx = events.subscribe();

        let (worker, handle) =
            UploadWorker::new(uploader as Arc<dyn MediaUploader>, events, 4);
        handle.enqueue(UploadTask {
            index: 0,
            media_path: media_file(&dir, "pic.png", 2),
        });
        handle.shutdown();
        worker.run().await;

        let detail = drain(&mut rx)
            .into_iter()
            .find_map(|e| match e {
                CoreEvent::MediaUploadStatus {
                    status: UploadStatus::Error,
                    detail,
                    ..
                } => detail,
                _ => None,
            })
            .unwrap();
        assert!(detail.contains("finalize rejected"));
    }
}
