use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::domain::Message;
use crate::task::TaskStatus;
use crate::upload::UploadStatus;

/// Notifications pushed to the presentation layer.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    StreamListChanged,
    AccountListChanged,
    UserListCreated {
        account: String,
    },
    UserListDestroyed {
        account: String,
    },
    MediaUploadStatus {
        index: usize,
        status: UploadStatus,
        detail: Option<String>,
    },
    MediaUploadProgress {
        index: usize,
        progress: f64,
    },
    TaskResults {
        logical_id: String,
        messages: Vec<Message>,
    },
    TaskStatus {
        logical_id: String,
        status: TaskStatus,
    },
}

/// Fan-out hub for core change notifications.
///
/// Emission never blocks: each subscriber gets an unbounded channel, so a
/// slow consumer buffers on its own receiver instead of stalling the
/// mutation path. Closed subscribers are pruned on the next emit.
#[derive(Default)]
pub struct EventHub {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<CoreEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<CoreEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    pub fn emit(&self, event: CoreEvent) {
        let mut subscribers = self.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<CoreEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
