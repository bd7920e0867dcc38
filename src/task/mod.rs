//! Tracking of cancelable asynchronous search/fetch jobs.
//!
//! Each started job gets an opaque handle mapped to the caller's logical
//! request id, so results and cancellations can be routed back to the
//! right place no matter which concurrency primitive did the work. An
//! entry leaves the map exactly once — on delivery or on cancellation,
//! never both.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::client::{FeedClient, FeedError};
use crate::domain::{Message, SourceSpec};
use crate::events::{CoreEvent, EventHub};

/// Opaque identifier for one tracked unit of asynchronous work. Never
/// reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

/// Status forwarded to the presentation layer for tracked tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    InProgress,
    Failed,
}

struct TaskEntry {
    logical_id: String,
    abort: Option<AbortHandle>,
}

pub struct TaskTracker {
    next_handle: AtomicU64,
    tasks: Mutex<HashMap<TaskHandle, TaskEntry>>,
    events: Arc<EventHub>,
}

impl TaskTracker {
    pub fn new(events: Arc<EventHub>) -> Self {
        Self {
            next_handle: AtomicU64::new(0),
            tasks: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Start a tracked unit of work and return its handle.
    ///
    /// The `handle -> logical_id` mapping is recorded before the future is
    /// spawned, so a result can never arrive for a handle the tracker does
    /// not know yet.
    pub fn start<F>(self: &Arc<Self>, logical_id: impl Into<String>, work: F) -> TaskHandle
    where
        F: Future<Output = std::result::Result<Vec<Message>, FeedError>> + Send + 'static,
    {
        let handle = TaskHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.lock().insert(
            handle,
            TaskEntry {
                logical_id: logical_id.into(),
                abort: None,
            },
        );

        let tracker = Arc::clone(self);
        let join = tokio::spawn(async move {
            match work.await {
                Ok(messages) => tracker.on_result(handle, messages),
                Err(err) => tracker.fail(handle, &err),
            }
        });

        // The task may already have finished; only still-tracked entries
        // get the abort handle.
        if let Some(entry) = self.lock().get_mut(&handle) {
            entry.abort = Some(join.abort_handle());
        }
        handle
    }

    /// Start a tracked one-page message search — the canonical caller.
    pub fn search_messages(
        self: &Arc<Self>,
        client: Arc<dyn FeedClient>,
        logical_id: impl Into<String>,
        query: impl Into<String>,
    ) -> TaskHandle {
        let spec = SourceSpec::Search {
            query: query.into(),
        };
        self.start(logical_id, async move {
            client
                .fetch_messages(&spec, None)
                .await
                .map(|page| page.messages)
        })
    }

    /// Deliver results for a handle, exactly once. A handle that was
    /// already resolved or cancelled is a silent no-op — the result
    /// arrived after the caller stopped caring.
    pub fn on_result(&self, handle: TaskHandle, messages: Vec<Message>) {
        match self.lock().remove(&handle) {
            Some(entry) => {
                debug!(logical_id = %entry.logical_id, count = messages.len(), "task results delivered");
                self.events.emit(CoreEvent::TaskResults {
                    logical_id: entry.logical_id,
                    messages,
                });
            }
            None => debug!(handle = handle.0, "dropping result for untracked task"),
        }
    }

    /// Stop tracking a handle and request best-effort cancellation of the
    /// underlying work. Cancelling an already-finished or unknown handle
    /// is a no-op. The remote operation may still complete; only delivery
    /// is prevented.
    pub fn cancel(&self, handle: TaskHandle) {
        if let Some(entry) = self.lock().remove(&handle) {
            info!(logical_id = %entry.logical_id, "tracked task cancelled");
            if let Some(abort) = entry.abort {
                abort.abort();
            }
        }
    }

    /// Forward a status change; only handles still in the map produce an
    /// event.
    pub fn on_status_changed(&self, handle: TaskHandle, status: TaskStatus) {
        let logical_id = self.lock().get(&handle).map(|e| e.logical_id.clone());
        if let Some(logical_id) = logical_id {
            self.events.emit(CoreEvent::TaskStatus { logical_id, status });
        }
    }

    /// Number of tasks currently in flight.
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    fn fail(&self, handle: TaskHandle, err: &FeedError) {
        if let Some(entry) = self.lock().remove(&handle) {
            warn!(logical_id = %entry.logical_id, error = %err, "tracked task failed");
            self.events.emit(CoreEvent::TaskStatus {
                logical_id: entry.logical_id,
                status: TaskStatus::Failed,
            });
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskHandle, TaskEntry>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;
    use crate::domain::MessageKind;

    fn message(id: &str) -> Message {
        Message::new(
            id,
            "text",
            "alice",
            DateTime::from_timestamp(0, 0).unwrap(),
            MessageKind::Tweet,
        )
    }

    fn tracker() -> (Arc<TaskTracker>, Arc<EventHub>) {
        let events = Arc::new(EventHub::new());
        (Arc::new(TaskTracker::new(Arc::clone(&events))), events)
    }

    #[tokio::test]
    async fn test_result_is_delivered_exactly_once() {
        let (tracker, events) = tracker();
        let mut rx = events.subscribe();

        let handle = tracker.start("search-1", std::future::pending());
        assert_eq!(tracker.in_flight(), 1);

        tracker.on_result(handle, vec![message("m1")]);
        tracker.on_result(handle, vec![message("m1")]);

        let event = rx.try_recv().unwrap();
        match event {
            CoreEvent::TaskResults {
                logical_id,
                messages,
            } => {
                assert_eq!(logical_id, "search-1");
                assert_eq!(messages.len(), 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        // The duplicate delivery produced nothing.
        assert!(rx.try_recv().is_err());
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancel_prevents_delivery() {
        let (tracker, events) = tracker();
        let mut rx = events.subscribe();

        let handle = tracker.start("search-1", std::future::pending());
        tracker.cancel(handle);
        tracker.on_result(handle, vec![message("m1")]);

        assert!(rx.try_recv().is_err());

        // Cancelling again, or cancelling garbage, is harmless.
        tracker.cancel(handle);
        tracker.cancel(TaskHandle(999));
    }

    #[tokio::test]
    async fn test_status_fans_out_only_for_tracked_handles() {
        let (tracker, events) = tracker();
        let mut rx = events.subscribe();

        let handle = tracker.start("search-1", std::future::pending());
        tracker.on_status_changed(handle, TaskStatus::InProgress);
        assert!(matches!(
            rx.try_recv().unwrap(),
            CoreEvent::TaskStatus {
                status: TaskStatus::InProgress,
                ..
            }
        ));

        tracker.cancel(handle);
        tracker.on_status_changed(handle, TaskStatus::InProgress);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_spawned_work_flows_back_as_results() {
        let (tracker, events) = tracker();
        let mut rx = events.subscribe();

        tracker.start("search-9", async { Ok(vec![message("m1"), message("m2")]) });

        let event = rx.recv().await.unwrap();
        match event {
            CoreEvent::TaskResults {
                logical_id,
                messages,
            } => {
                assert_eq!(logical_id, "search-9");
                assert_eq!(messages.len(), 2);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failed_work_reports_failed_status() {
        let (tracker, events) = tracker();
        let mut rx = events.subscribe();

        tracker.start("search-2", async { Err(FeedError::RateLimited) });

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            CoreEvent::TaskStatus {
                status: TaskStatus::Failed,
                ..
            }
        ));
        assert_eq!(tracker.in_flight(), 0);
    }
}
