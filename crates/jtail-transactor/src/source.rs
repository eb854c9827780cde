use async_trait::async_trait;

use jtail_follower::{EventStream, LiveEventSource, SourceError};

use crate::client::TransactorClient;

/// Feeds a follower from a transactor's journal stream.
#[derive(Clone, Debug)]
pub struct TransactorSource<C> {
    client: C,
}

impl<C: TransactorClient> TransactorSource<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

#[async_trait]
impl<C: TransactorClient> LiveEventSource for TransactorSource<C> {
    async fn subscribe(&self) -> Result<EventStream, SourceError> {
        self.client
            .journal_stream()
            .await
            .map_err(|e| e.into_source_error())
    }
}
