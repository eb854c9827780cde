use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use jtail_follower::{EventStream, SourceError};
use jtail_journal::{Block, JournalEvent};
use jtail_store::{BlockCache, InMemoryBlockCache};
use jtail_types::ContentRef;

use crate::client::TransactorClient;
use crate::error::{TransactorError, TransactorResult};

/// Default number of live events a slow subscriber may fall behind by.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Body of an `update_chain` request: JSON naming the canonical record the
/// cell extends. Any other content is opaque to the transactor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainCell {
    pub canonical: ContentRef,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

impl ChainCell {
    pub fn new(canonical: ContentRef) -> Self {
        Self {
            canonical,
            payload: serde_json::Value::Null,
        }
    }

    pub fn to_bytes(&self) -> TransactorResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| TransactorError::InvalidRecord(e.to_string()))
    }
}

#[derive(Default)]
struct State {
    records: HashMap<ContentRef, Vec<u8>>,
    chain_heads: HashMap<ContentRef, ContentRef>,
    pending: Vec<JournalEvent>,
    head: Option<ContentRef>,
}

/// In-process transactor for tests and embedding.
///
/// Inserts and updates are appended to a pending block and broadcast to
/// every open journal stream. [`commit_block`](Self::commit_block) seals the
/// pending entries into a [`Block`] linked to the previous head, stores it
/// in the transactor's block cache, and broadcasts its `BlockBoundary`.
pub struct MemoryTransactor {
    state: Mutex<State>,
    blocks: Arc<InMemoryBlockCache>,
    events: broadcast::Sender<JournalEvent>,
}

impl MemoryTransactor {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` bounds how far a subscriber may lag before its stream
    /// reports an error.
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            state: Mutex::new(State::default()),
            blocks: Arc::new(InMemoryBlockCache::new()),
            events,
        }
    }

    /// The cache committed blocks are written to.
    pub fn block_cache(&self) -> Arc<InMemoryBlockCache> {
        Arc::clone(&self.blocks)
    }

    /// The most recently committed block.
    pub fn head(&self) -> Option<ContentRef> {
        self.lock().head.clone()
    }

    /// Raw bytes of an inserted canonical record or chain cell.
    pub fn record(&self, reference: &ContentRef) -> Option<Vec<u8>> {
        self.lock().records.get(reference).cloned()
    }

    /// Current chain head of a canonical record, if it has been updated.
    pub fn chain_head(&self, canonical: &ContentRef) -> Option<ContentRef> {
        self.lock().chain_heads.get(canonical).cloned()
    }

    /// Number of journal streams currently open.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Seal pending entries into a new block. Returns `None` when there is
    /// nothing to commit.
    pub fn commit_block(&self) -> TransactorResult<Option<ContentRef>> {
        let mut state = self.lock();
        if state.pending.is_empty() {
            return Ok(None);
        }

        let block = Block::new(&state.pending, state.head.as_ref());
        let reference = self.blocks.put(&block)?;
        info!(
            block = %reference,
            entries = state.pending.len(),
            parent = ?state.head.as_ref().map(ContentRef::to_base58),
            "committed block"
        );

        state.pending.clear();
        state.head = Some(reference.clone());
        self.publish(JournalEvent::boundary(reference.clone()));
        Ok(Some(reference))
    }

    fn append(&self, state: &mut State, event: JournalEvent) {
        state.pending.push(event.clone());
        self.publish(event);
    }

    /// Callers hold the state lock, so subscription and publication are
    /// serialized.
    fn publish(&self, event: JournalEvent) {
        let receivers = self.events.send(event).unwrap_or(0);
        debug!(receivers, "published journal event");
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryTransactor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryTransactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryTransactor")
            .field("head", &state.head)
            .field("pending", &state.pending.len())
            .field("blocks", &self.blocks.len())
            .finish()
    }
}

#[async_trait]
impl TransactorClient for MemoryTransactor {
    async fn insert_canonical(&self, record: &[u8]) -> TransactorResult<ContentRef> {
        if record.is_empty() {
            return Err(TransactorError::InvalidRecord("empty canonical record".into()));
        }
        let reference = ContentRef::digest(record);
        let mut state = self.lock();
        state.records.insert(reference.clone(), record.to_vec());
        self.append(&mut state, JournalEvent::insert(reference.clone()));
        Ok(reference)
    }

    async fn update_chain(&self, cell: &[u8]) -> TransactorResult<ContentRef> {
        let parsed: ChainCell = serde_json::from_slice(cell)
            .map_err(|e| TransactorError::InvalidRecord(format!("chain cell: {e}")))?;
        let chain = ContentRef::digest(cell);

        let mut state = self.lock();
        if !state.records.contains_key(&parsed.canonical) {
            return Err(TransactorError::UnknownCanonical(parsed.canonical));
        }
        state.records.insert(chain.clone(), cell.to_vec());
        let previous = state
            .chain_heads
            .insert(parsed.canonical.clone(), chain.clone());
        self.append(
            &mut state,
            JournalEvent::update(parsed.canonical, chain.clone(), previous),
        );
        Ok(chain)
    }

    async fn journal_stream(&self) -> TransactorResult<EventStream> {
        let (head, rx) = {
            let state = self.lock();
            (state.head.clone(), self.events.subscribe())
        };
        debug!(head = ?head.as_ref().map(ContentRef::to_base58), "journal stream opened");

        let announce = stream::iter(head.map(|h| Ok(JournalEvent::boundary(h))));
        // Events skipped by a lagging reader are gone for good, so lag is
        // reported as such rather than as a retryable transport failure.
        let live = BroadcastStream::new(rx).map(|item| {
            item.map_err(|BroadcastStreamRecvError::Lagged(skipped)| {
                warn!(skipped, "journal stream reader lagged");
                SourceError::Lagged { skipped }
            })
        });
        Ok(announce.chain(live).boxed())
    }
}
