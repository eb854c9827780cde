//! Live event sources.
//!
//! A [`LiveEventSource`] is a factory for subscriptions. The follower calls
//! [`subscribe`](LiveEventSource::subscribe) once per attempt and consumes
//! the returned [`EventStream`] until it ends, fails, or the follower is
//! cancelled. Dropping a stream cancels the subscription, so sources must
//! release their transport resources on drop.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use jtail_journal::JournalEvent;

use crate::error::SourceError;

/// A live subscription: raw journal events in arrival order.
pub type EventStream = BoxStream<'static, Result<JournalEvent, SourceError>>;

#[async_trait]
pub trait LiveEventSource: Send + Sync {
    /// Open a new subscription.
    async fn subscribe(&self) -> Result<EventStream, SourceError>;
}

#[async_trait]
impl<S: LiveEventSource + ?Sized> LiveEventSource for Arc<S> {
    async fn subscribe(&self) -> Result<EventStream, SourceError> {
        (**self).subscribe().await
    }
}

type Item = Result<JournalEvent, SourceError>;

struct SharedQueue {
    rx: Mutex<mpsc::UnboundedReceiver<Item>>,
    failing_subscribes: AtomicU32,
    subscriptions: AtomicU32,
}

/// Channel-backed source for tests and embedding.
///
/// All subscriptions read from one shared queue, so a resubscription picks
/// up exactly where the failed one stopped. Items pushed through the
/// matching [`MemoryEventSender`] can be events or injected transport
/// errors. The stream ends once every sender is dropped.
#[derive(Clone)]
pub struct MemoryEventSource {
    shared: Arc<SharedQueue>,
}

/// Producer half of a [`MemoryEventSource`].
#[derive(Clone, Debug)]
pub struct MemoryEventSender {
    tx: mpsc::UnboundedSender<Item>,
}

/// Create a connected sender/source pair.
pub fn memory_source() -> (MemoryEventSender, MemoryEventSource) {
    let (tx, rx) = mpsc::unbounded_channel();
    let source = MemoryEventSource {
        shared: Arc::new(SharedQueue {
            rx: Mutex::new(rx),
            failing_subscribes: AtomicU32::new(0),
            subscriptions: AtomicU32::new(0),
        }),
    };
    (MemoryEventSender { tx }, source)
}

impl MemoryEventSender {
    /// Queue an event. Returns `false` if the source is gone.
    pub fn send(&self, event: JournalEvent) -> bool {
        self.tx.send(Ok(event)).is_ok()
    }

    /// Queue a transport failure: the subscription reading it fails.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.tx
            .send(Err(SourceError::Transport(reason.into())))
            .is_ok()
    }

    /// Queue an arbitrary error.
    pub fn send_error(&self, err: SourceError) -> bool {
        self.tx.send(Err(err)).is_ok()
    }
}

impl MemoryEventSource {
    /// Make the next `n` calls to `subscribe` fail with a transport error.
    pub fn fail_next_subscribes(&self, n: u32) {
        self.shared.failing_subscribes.store(n, Ordering::SeqCst);
    }

    /// Number of subscriptions successfully opened so far.
    pub fn subscriptions(&self) -> u32 {
        self.shared.subscriptions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveEventSource for MemoryEventSource {
    async fn subscribe(&self) -> Result<EventStream, SourceError> {
        let refused = self
            .shared
            .failing_subscribes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(SourceError::Transport("subscription refused".into()));
        }

        let n = self.shared.subscriptions.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(subscription = n, "memory source subscribed");

        let shared = Arc::clone(&self.shared);
        let stream = stream::unfold(shared, |shared| async move {
            let next = {
                let mut rx = shared.rx.lock().await;
                rx.recv().await
            };
            next.map(|item| (item, shared))
        });
        Ok(stream.boxed())
    }
}

impl std::fmt::Debug for MemoryEventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEventSource")
            .field("subscriptions", &self.subscriptions())
            .finish()
    }
}
