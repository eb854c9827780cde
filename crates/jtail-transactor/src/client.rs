use std::sync::Arc;

use async_trait::async_trait;

use jtail_follower::EventStream;
use jtail_types::ContentRef;

use crate::error::TransactorResult;

/// Write and subscribe surface of a journal transactor.
#[async_trait]
pub trait TransactorClient: Send + Sync {
    /// Submit a new canonical record. Returns its reference.
    async fn insert_canonical(&self, record: &[u8]) -> TransactorResult<ContentRef>;

    /// Append a chain cell to an existing canonical. Returns the new chain
    /// head's reference.
    async fn update_chain(&self, cell: &[u8]) -> TransactorResult<ContentRef>;

    /// Open a journal subscription. When the journal has a committed head,
    /// the stream starts with that block's `BlockBoundary`.
    async fn journal_stream(&self) -> TransactorResult<EventStream>;
}

#[async_trait]
impl<C: TransactorClient + ?Sized> TransactorClient for Arc<C> {
    async fn insert_canonical(&self, record: &[u8]) -> TransactorResult<ContentRef> {
        (**self).insert_canonical(record).await
    }

    async fn update_chain(&self, cell: &[u8]) -> TransactorResult<ContentRef> {
        (**self).update_chain(cell).await
    }

    async fn journal_stream(&self) -> TransactorResult<EventStream> {
        (**self).journal_stream().await
    }
}
