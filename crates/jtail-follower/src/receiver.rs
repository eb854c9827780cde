//! The live receiver: owns the subscription and feeds the event queue.

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use jtail_journal::JournalEvent;

use crate::error::{FollowerError, SourceError};
use crate::retry::{with_retry, Failure, RetryError, RetryPolicy};
use crate::source::LiveEventSource;
use crate::status::FollowerStatus;
use crate::walker::CatchupTarget;

/// Element of the live event queue.
#[derive(Debug)]
pub(crate) enum LiveItem {
    Event(JournalEvent),
    /// The receiver gave up; this is the last item it sends.
    Failed(FollowerError),
    /// Sent on cancellation to wake a pending queue read.
    Abort,
}

pub(crate) struct LiveReceiver {
    source: Arc<dyn LiveEventSource>,
    retry: RetryPolicy,
    queue: mpsc::UnboundedSender<LiveItem>,
    head_tx: Mutex<Option<oneshot::Sender<CatchupTarget>>>,
    status: Arc<FollowerStatus>,
    cancel: CancellationToken,
}

impl LiveReceiver {
    pub(crate) fn new(
        source: Arc<dyn LiveEventSource>,
        retry: RetryPolicy,
        queue: mpsc::UnboundedSender<LiveItem>,
        head_tx: Option<oneshot::Sender<CatchupTarget>>,
        status: Arc<FollowerStatus>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            retry,
            queue,
            head_tx: Mutex::new(head_tx),
            status,
            cancel,
        }
    }

    /// Task body. Returns once the subscription ends, the retry budget is
    /// spent, or the follower is cancelled.
    pub(crate) async fn run(self) {
        let cancel = self.cancel.clone();
        let failure = |e: &SourceError| classify(&cancel, e);

        let result = tokio::select! {
            _ = self.cancel.cancelled() => Err(RetryError::Cancelled),
            result = with_retry(&self.retry, failure, |attempt| self.consume(attempt)) => result,
        };

        match result {
            Ok(()) => debug!("live receiver finished"),
            Err(RetryError::Cancelled) => debug!("live receiver cancelled"),
            Err(RetryError::Exhausted { attempts, last }) => {
                self.report(FollowerError::RetriesExhausted { attempts, last });
            }
            Err(RetryError::Fatal(e)) => {
                self.report(FollowerError::Source(e));
            }
        }
    }

    /// One subscription attempt: open, then forward events until the stream
    /// ends or fails.
    async fn consume(&self, attempt: u32) -> Result<(), SourceError> {
        let mut stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(()),
            stream = self.source.subscribe() => stream?,
        };
        debug!(attempt, "live subscription open");

        loop {
            let item = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                item = stream.next() => item,
            };
            let event = match item {
                None => {
                    info!(attempt, "live subscription ended");
                    return Ok(());
                }
                Some(Err(e)) => return Err(e),
                Some(Ok(event)) => event,
            };
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            if self.status.mark_first_event() {
                self.seed_catchup(&event);
            }
            if self.queue.send(LiveItem::Event(event)).is_err() {
                debug!("event queue closed, stopping receiver");
                return Ok(());
            }
        }
    }

    fn seed_catchup(&self, first: &JournalEvent) {
        let target = match first {
            JournalEvent::BlockBoundary { reference } => CatchupTarget::Head(reference.clone()),
            _ => CatchupTarget::Genesis,
        };
        let sender = match self.head_tx.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(sender) = sender {
            debug!(?target, "seeding catchup");
            // The walker may already be gone (cancelled); nothing to do then.
            let _ = sender.send(target);
        }
    }

    fn report(&self, err: FollowerError) {
        warn!(error = %err, "live receiver giving up");
        let _ = self.queue.send(LiveItem::Failed(err));
    }
}

/// Only our own token makes a failure a quiet stop. A `Cancelled` reported
/// by the source while the follower is still running is retried like any
/// other transport failure.
fn classify(cancel: &CancellationToken, e: &SourceError) -> Failure {
    if cancel.is_cancelled() {
        Failure::Cancelled
    } else if e.is_fatal() {
        Failure::Fatal
    } else {
        if e.is_cancellation() {
            debug!("source cancelled the subscription on its own");
        }
        Failure::Transient
    }
}
