use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use jtail_follower::EventStream;
use jtail_types::ContentRef;

use crate::client::TransactorClient;
use crate::error::{TransactorError, TransactorResult};

/// Per-call deadline applied by [`TimedTransactor`] unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Wraps a client and fails any call that takes longer than the timeout.
///
/// For `journal_stream` the deadline covers opening the stream, not
/// reading from it.
#[derive(Clone, Debug)]
pub struct TimedTransactor<C> {
    inner: C,
    timeout: Duration,
}

impl<C: TransactorClient> TimedTransactor<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    async fn deadline<T>(
        &self,
        call: &'static str,
        fut: impl Future<Output = TransactorResult<T>>,
    ) -> TransactorResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(call, timeout_ms = self.timeout.as_millis() as u64, "transactor call timed out");
                Err(TransactorError::Timeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl<C: TransactorClient> TransactorClient for TimedTransactor<C> {
    async fn insert_canonical(&self, record: &[u8]) -> TransactorResult<ContentRef> {
        self.deadline("insert_canonical", self.inner.insert_canonical(record))
            .await
    }

    async fn update_chain(&self, cell: &[u8]) -> TransactorResult<ContentRef> {
        self.deadline("update_chain", self.inner.update_chain(cell)).await
    }

    async fn journal_stream(&self) -> TransactorResult<EventStream> {
        self.deadline("journal_stream", self.inner.journal_stream())
            .await
    }
}
