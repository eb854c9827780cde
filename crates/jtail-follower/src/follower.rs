//! The public follower: history replay spliced onto the live tail.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use jtail_journal::JournalEvent;
use jtail_store::BlockCache;
use jtail_types::ContentRef;

use crate::config::FollowerConfig;
use crate::error::{FollowerError, FollowerResult};
use crate::mapper::{EventMapper, IdentityMapper};
use crate::receiver::{LiveItem, LiveReceiver};
use crate::source::LiveEventSource;
use crate::status::{FollowerStatus, StatusSnapshot};
use crate::walker::{ChainWalker, ReplayPlan, WalkOutcome};

/// A follower that has not started yet.
///
/// ```ignore
/// let mut running = JournalFollower::new(cache, source)
///     .with_config(config)
///     .with_mapper(KindFilter::new([EventKind::Insert]))
///     .start();
/// while let Some(event) = running.next().await {
///     println!("{}", event?);
/// }
/// ```
pub struct JournalFollower {
    cache: Arc<dyn BlockCache>,
    source: Arc<dyn LiveEventSource>,
    config: FollowerConfig,
    mapper: Arc<dyn EventMapper>,
}

impl JournalFollower {
    pub fn new(cache: Arc<dyn BlockCache>, source: Arc<dyn LiveEventSource>) -> Self {
        Self {
            cache,
            source,
            config: FollowerConfig::default(),
            mapper: Arc::new(IdentityMapper),
        }
    }

    pub fn with_config(mut self, config: FollowerConfig) -> Self {
        self.config = config;
        self
    }

    /// Mapper applied to every emitted event, historical and live.
    pub fn with_mapper(mut self, mapper: impl EventMapper + 'static) -> Self {
        self.mapper = Arc::new(mapper);
        self
    }

    pub fn config(&self) -> &FollowerConfig {
        &self.config
    }

    /// Launch the live receiver and chain walker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> RunningFollower {
        let token = CancellationToken::new();
        let status = Arc::new(FollowerStatus::default());
        let (live_tx, live_rx) = mpsc::unbounded_channel();

        let (head_tx, head_rx) = if self.config.catchup {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let walker = ChainWalker::new(Arc::clone(&self.cache), &self.config);
        let walker_task = tokio::spawn(walker.run(head_rx, token.clone(), Arc::clone(&status)));

        let receiver = LiveReceiver::new(
            self.source,
            self.config.retry_policy(),
            live_tx.clone(),
            head_tx,
            Arc::clone(&status),
            token.clone(),
        );
        let receiver_task = tokio::spawn(receiver.run());

        info!(
            catchup = self.config.catchup,
            max_retry = self.config.max_retry,
            "follower started"
        );

        RunningFollower {
            cache: self.cache,
            mapper: self.mapper,
            poll_interval: self.config.poll_interval(),
            handle: CancelHandle { token, live_tx },
            status,
            phase: Phase::AwaitCatchup(walker_task),
            receiver_task,
            live_rx,
        }
    }
}

impl std::fmt::Debug for JournalFollower {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalFollower")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Cancels a running follower from anywhere. Cheap to clone.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    token: CancellationToken,
    live_tx: mpsc::UnboundedSender<LiveItem>,
}

impl CancelHandle {
    /// Stop both background tasks and end the event sequence.
    /// Calling it more than once has no further effect.
    pub fn cancel(&self) {
        if self.token.is_cancelled() {
            return;
        }
        debug!("cancelling follower");
        self.token.cancel();
        let _ = self.live_tx.send(LiveItem::Abort);
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

enum Phase {
    AwaitCatchup(JoinHandle<FollowerResult<WalkOutcome>>),
    Replay {
        blocks: std::vec::IntoIter<ContentRef>,
        pending: VecDeque<JournalEvent>,
    },
    Live,
    Done,
}

/// A started follower. Pull events with [`next`](Self::next) or turn it
/// into a [`Stream`] with [`into_stream`](Self::into_stream).
///
/// The sequence is: every historical block, oldest first (its entries
/// followed by its `BlockBoundary`), then the live tail in arrival order.
/// It ends on cancellation or after one reported error. Dropping the
/// follower cancels it.
pub struct RunningFollower {
    cache: Arc<dyn BlockCache>,
    mapper: Arc<dyn EventMapper>,
    poll_interval: Duration,
    handle: CancelHandle,
    status: Arc<FollowerStatus>,
    phase: Phase,
    receiver_task: JoinHandle<()>,
    live_rx: mpsc::UnboundedReceiver<LiveItem>,
}

impl RunningFollower {
    /// Next event, or `None` once the sequence has ended.
    pub async fn next(&mut self) -> Option<FollowerResult<JournalEvent>> {
        loop {
            if self.handle.is_cancelled() {
                self.phase = Phase::Done;
                return None;
            }

            match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::Done => return None,

                Phase::AwaitCatchup(walker) => {
                    let plan = match walker.await {
                        Ok(Ok(outcome)) => outcome.plan,
                        Ok(Err(e)) => return self.fail(e),
                        Err(e) => {
                            error!(error = %e, "chain walker did not finish, skipping history");
                            ReplayPlan::default()
                        }
                    };
                    if !plan.is_empty() {
                        info!(blocks = plan.len(), "replaying history");
                    }
                    self.phase = Phase::Replay {
                        blocks: plan.into_iter(),
                        pending: VecDeque::new(),
                    };
                }

                Phase::Replay {
                    mut blocks,
                    mut pending,
                } => {
                    if let Some(event) = pending.pop_front() {
                        self.phase = Phase::Replay { blocks, pending };
                        if let Some(event) = self.mapper.map(event) {
                            return Some(Ok(event));
                        }
                        continue;
                    }
                    match blocks.next() {
                        Some(reference) => match self.load_block(&reference) {
                            Ok(events) => {
                                pending.extend(events);
                                self.phase = Phase::Replay { blocks, pending };
                            }
                            Err(e) => return self.fail(e),
                        },
                        None => {
                            debug!("history replayed, following live tail");
                            self.phase = Phase::Live;
                        }
                    }
                }

                Phase::Live => {
                    match tokio::time::timeout(self.poll_interval, self.live_rx.recv()).await {
                        Err(_) => self.phase = Phase::Live,
                        Ok(Some(LiveItem::Event(event))) => {
                            self.phase = Phase::Live;
                            if let Some(event) = self.mapper.map(event) {
                                return Some(Ok(event));
                            }
                        }
                        Ok(Some(LiveItem::Failed(e))) => return self.fail(e),
                        Ok(Some(LiveItem::Abort)) | Ok(None) => {
                            self.handle.cancel();
                            return None;
                        }
                    }
                }
            }
        }
    }

    /// Consume the follower as a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = FollowerResult<JournalEvent>> + Send {
        stream::unfold(self, |mut follower| async move {
            let item = follower.next().await?;
            Some((item, follower))
        })
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            caught_up: self.status.is_caught_up(),
            first_event_seen: self.status.first_event_seen(),
            cancelled: self.handle.is_cancelled(),
        }
    }

    /// A block's events as replayed: its entries, then its boundary.
    fn load_block(&self, reference: &ContentRef) -> FollowerResult<Vec<JournalEvent>> {
        let block = self
            .cache
            .get(reference)?
            .ok_or_else(|| FollowerError::MissingBlock {
                reference: reference.clone(),
            })?;
        let mut events = block.decode_entries()?;
        events.push(JournalEvent::boundary(reference.clone()));
        Ok(events)
    }

    fn fail(&mut self, err: FollowerError) -> Option<FollowerResult<JournalEvent>> {
        error!(error = %err, "follower stopped");
        self.phase = Phase::Done;
        self.handle.cancel();
        Some(Err(err))
    }
}

impl Drop for RunningFollower {
    fn drop(&mut self) {
        self.handle.cancel();
        self.receiver_task.abort();
        if let Phase::AwaitCatchup(walker) = &self.phase {
            walker.abort();
        }
    }
}

impl std::fmt::Debug for RunningFollower {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningFollower")
            .field("poll_interval", &self.poll_interval)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MissingBlockPolicy, ParentLinkPolicy};
    use crate::error::SourceError;
    use crate::source::{memory_source, MemoryEventSender, MemoryEventSource};
    use futures::StreamExt;
    use jtail_journal::{Block, EventKind, JournalError};
    use jtail_store::InMemoryBlockCache;
    use serde_json::json;
    use std::time::Instant;

    const PATIENCE: Duration = Duration::from_secs(5);

    fn name(s: &str) -> ContentRef {
        ContentRef::from_bytes(s.as_bytes().to_vec())
    }

    fn entry(s: &str) -> JournalEvent {
        JournalEvent::insert(ContentRef::digest(s.as_bytes()))
    }

    fn boundary(s: &str) -> JournalEvent {
        JournalEvent::boundary(name(s))
    }

    /// G[e0, e1] <- A[e2] <- B[e3]
    fn history() -> Arc<InMemoryBlockCache> {
        let cache = InMemoryBlockCache::new();
        cache.insert_as(name("G"), Block::genesis(&[entry("e0"), entry("e1")]));
        cache.insert_as(name("A"), Block::new(&[entry("e2")], Some(&name("G"))));
        cache.insert_as(name("B"), Block::new(&[entry("e3")], Some(&name("A"))));
        Arc::new(cache)
    }

    fn replayed_history() -> Vec<JournalEvent> {
        vec![
            entry("e0"),
            entry("e1"),
            boundary("G"),
            entry("e2"),
            boundary("A"),
            entry("e3"),
            boundary("B"),
        ]
    }

    fn fast_config() -> FollowerConfig {
        FollowerConfig {
            max_retry: 5,
            retry_base_delay_ms: 1,
            retry_max_delay_ms: 5,
            poll_interval_ms: 10,
            ..Default::default()
        }
    }

    fn follower(
        cache: Arc<InMemoryBlockCache>,
        source: &MemoryEventSource,
        config: FollowerConfig,
    ) -> JournalFollower {
        JournalFollower::new(cache, Arc::new(source.clone())).with_config(config)
    }

    fn live() -> (MemoryEventSender, MemoryEventSource) {
        memory_source()
    }

    async fn pull(f: &mut RunningFollower) -> Option<FollowerResult<JournalEvent>> {
        tokio::time::timeout(PATIENCE, f.next())
            .await
            .expect("follower stalled")
    }

    async fn take(f: &mut RunningFollower, n: usize) -> Vec<JournalEvent> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(pull(f).await.expect("sequence ended early").unwrap());
        }
        out
    }

    async fn assert_idle(f: &mut RunningFollower) {
        let pending = tokio::time::timeout(Duration::from_millis(50), f.next()).await;
        assert!(pending.is_err(), "unexpected item: {pending:?}");
    }

    #[tokio::test]
    async fn replays_history_oldest_first_then_live() {
        let (tx, source) = live();
        tx.send(boundary("B"));
        tx.send(entry("x"));
        let mut f = follower(history(), &source, fast_config()).start();

        let mut expected = replayed_history();
        expected.push(boundary("B"));
        expected.push(entry("x"));
        assert_eq!(take(&mut f, expected.len()).await, expected);
        assert_idle(&mut f).await;

        let status = f.status();
        assert!(status.caught_up);
        assert!(status.first_event_seen);
        assert!(!status.cancelled);
    }

    #[tokio::test]
    async fn live_events_after_catchup_keep_arrival_order() {
        let (tx, source) = live();
        tx.send(boundary("B"));
        let mut f = follower(history(), &source, fast_config()).start();
        take(&mut f, 8).await;

        for i in 0..5 {
            tx.send(entry(&format!("live{i}")));
        }
        let got = take(&mut f, 5).await;
        let want: Vec<_> = (0..5).map(|i| entry(&format!("live{i}"))).collect();
        assert_eq!(got, want);
    }

    #[tokio::test]
    async fn genesis_start_skips_history() {
        let (tx, source) = live();
        tx.send(entry("x"));
        tx.send(entry("y"));
        let mut f = follower(history(), &source, fast_config()).start();

        assert_eq!(take(&mut f, 2).await, vec![entry("x"), entry("y")]);
        assert!(f.status().caught_up);
    }

    #[tokio::test]
    async fn missing_block_truncates_history() {
        let cache = history();
        cache.remove(&name("A"));
        let (tx, source) = live();
        tx.send(boundary("B"));
        tx.send(entry("x"));
        let mut f = follower(cache, &source, fast_config()).start();

        assert_eq!(
            take(&mut f, 4).await,
            vec![entry("e3"), boundary("B"), boundary("B"), entry("x")]
        );
        assert!(!f.status().caught_up);
    }

    #[tokio::test]
    async fn missing_block_is_reported_under_fail_policy() {
        let cache = history();
        cache.remove(&name("A"));
        let (tx, source) = live();
        tx.send(boundary("B"));
        let config = FollowerConfig {
            missing_block: MissingBlockPolicy::Fail,
            ..fast_config()
        };
        let mut f = follower(cache, &source, config).start();

        match pull(&mut f).await {
            Some(Err(FollowerError::MissingBlock { reference })) => assert_eq!(reference, name("A")),
            other => panic!("expected MissingBlock, got {other:?}"),
        }
        assert!(pull(&mut f).await.is_none());
    }

    #[tokio::test]
    async fn malformed_parent_policies() {
        let cache = history();
        cache.insert_as(
            name("A"),
            Block {
                entries: Block::genesis(&[entry("e2")]).entries,
                chain: Some(json!({ "@link": "0OIl" })),
            },
        );

        let (tx, source) = live();
        tx.send(boundary("B"));
        let mut lenient = follower(Arc::clone(&cache), &source, fast_config()).start();
        assert_eq!(
            take(&mut lenient, 5).await,
            vec![entry("e2"), boundary("A"), entry("e3"), boundary("B"), boundary("B")]
        );
        assert!(lenient.status().caught_up);
        drop(lenient);

        let (tx, source) = live();
        tx.send(boundary("B"));
        let config = FollowerConfig {
            malformed_parent: ParentLinkPolicy::Fail,
            ..fast_config()
        };
        let mut strict = follower(cache, &source, config).start();
        assert!(matches!(
            pull(&mut strict).await,
            Some(Err(FollowerError::MalformedParent { .. }))
        ));
        assert!(pull(&mut strict).await.is_none());
    }

    #[tokio::test]
    async fn unknown_kind_in_history_ends_sequence() {
        let cache = history();
        let bad: Block = serde_json::from_value(json!({
            "entries": [{ "type": "delete", "reference": ContentRef::digest(b"d").to_base58() }],
            "chain": { "@link": name("A").to_base58() },
        }))
        .unwrap();
        cache.insert_as(name("B"), bad);

        let (tx, source) = live();
        tx.send(boundary("B"));
        tx.send(entry("x"));
        let mut f = follower(cache, &source, fast_config()).start();

        take(&mut f, 5).await;
        match pull(&mut f).await {
            Some(Err(FollowerError::Journal(JournalError::InvalidEventKind(tag)))) => {
                assert_eq!(tag, "delete")
            }
            other => panic!("expected InvalidEventKind, got {other:?}"),
        }
        assert!(pull(&mut f).await.is_none());
    }

    #[tokio::test]
    async fn mapper_filters_history_and_live() {
        let cache = history();
        let update = JournalEvent::update(name("c"), name("n"), Some(name("p")));
        cache.insert_as(
            name("A"),
            Block::new(&[entry("e2"), update.clone()], Some(&name("G"))),
        );

        let (tx, source) = live();
        tx.send(boundary("B"));
        tx.send(update);
        tx.send(entry("x"));
        let drop_updates = |e: JournalEvent| (e.kind() != EventKind::Update).then_some(e);
        let mut f = follower(cache, &source, fast_config())
            .with_mapper(drop_updates)
            .start();

        let mut expected = replayed_history();
        expected.push(boundary("B"));
        expected.push(entry("x"));
        assert_eq!(take(&mut f, expected.len()).await, expected);
        assert_idle(&mut f).await;
    }

    #[tokio::test]
    async fn catchup_disabled_only_follows_live() {
        let (tx, source) = live();
        tx.send(boundary("B"));
        tx.send(entry("x"));
        let config = FollowerConfig {
            catchup: false,
            ..fast_config()
        };
        let mut f = follower(history(), &source, config).start();

        assert_eq!(take(&mut f, 2).await, vec![boundary("B"), entry("x")]);
        assert!(f.status().caught_up);
    }

    #[tokio::test]
    async fn cancel_while_waiting_ends_within_a_poll_interval() {
        let (tx, source) = live();
        tx.send(entry("x"));
        let config = FollowerConfig {
            poll_interval_ms: 200,
            ..fast_config()
        };
        let mut f = follower(history(), &source, config).start();
        take(&mut f, 1).await;

        let handle = f.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });

        let started = Instant::now();
        assert!(pull(&mut f).await.is_none());
        assert!(started.elapsed() < Duration::from_millis(400));
        assert!(f.status().cancelled);
    }

    #[tokio::test]
    async fn sequence_is_single_pass() {
        let (tx, source) = live();
        tx.send(entry("x"));
        tx.send(entry("y"));
        let mut f = follower(history(), &source, fast_config()).start();
        take(&mut f, 1).await;

        f.cancel();
        f.cancel();
        assert!(pull(&mut f).await.is_none());
        assert!(pull(&mut f).await.is_none());
        tx.send(entry("z"));
        assert!(pull(&mut f).await.is_none());
    }

    #[tokio::test]
    async fn transient_subscribe_failures_are_invisible() {
        let (tx, source) = live();
        source.fail_next_subscribes(3);
        tx.send(entry("x"));
        let mut f = follower(history(), &source, fast_config()).start();

        assert_eq!(take(&mut f, 1).await, vec![entry("x")]);
        assert_eq!(source.subscriptions(), 1);
    }

    #[tokio::test]
    async fn resubscribes_after_mid_stream_failure() {
        let (tx, source) = live();
        tx.send(entry("x"));
        tx.fail("connection reset");
        tx.send(entry("y"));
        let mut f = follower(history(), &source, fast_config()).start();

        assert_eq!(take(&mut f, 2).await, vec![entry("x"), entry("y")]);
        assert_eq!(source.subscriptions(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_end_the_sequence() {
        let (_tx, source) = live();
        source.fail_next_subscribes(100);
        let config = FollowerConfig {
            max_retry: 3,
            ..fast_config()
        };
        let mut f = follower(history(), &source, config).start();

        match pull(&mut f).await {
            Some(Err(FollowerError::RetriesExhausted { attempts, last })) => {
                assert_eq!(attempts, 3);
                assert!(matches!(last, SourceError::Transport(_)));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert!(pull(&mut f).await.is_none());
    }

    #[tokio::test]
    async fn undecodable_live_event_is_not_retried() {
        let (tx, source) = live();
        tx.send(entry("x"));
        tx.send_error(SourceError::Decode(JournalError::InvalidEventKind(
            "delete".into(),
        )));
        let mut f = follower(history(), &source, fast_config()).start();

        assert_eq!(take(&mut f, 1).await, vec![entry("x")]);
        assert!(matches!(
            pull(&mut f).await,
            Some(Err(FollowerError::Source(SourceError::Decode(_))))
        ));
        assert!(pull(&mut f).await.is_none());
        assert_eq!(source.subscriptions(), 1);
    }

    #[tokio::test]
    async fn cancellation_reported_by_the_source_is_retried() {
        let (tx, source) = live();
        tx.send(entry("x"));
        tx.send_error(SourceError::Cancelled);
        tx.send(entry("y"));
        let mut f = follower(history(), &source, fast_config()).start();

        assert_eq!(take(&mut f, 2).await, vec![entry("x"), entry("y")]);
        assert_eq!(source.subscriptions(), 2);
        assert!(!f.status().cancelled);
    }

    #[tokio::test]
    async fn source_errors_after_cancel_are_neither_retried_nor_reported() {
        let (tx, source) = live();
        tx.send(entry("x"));
        let mut f = follower(history(), &source, fast_config()).start();
        assert_eq!(take(&mut f, 1).await, vec![entry("x")]);

        f.cancel();
        tx.fail("connection reset");
        tx.send_error(SourceError::Cancelled);
        tx.send(entry("y"));

        assert!(pull(&mut f).await.is_none());
        assert!(pull(&mut f).await.is_none());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(source.subscriptions(), 1);
        assert!(f.status().cancelled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn replays_from_a_directory_cache() {
        use jtail_store::DirBlockCache;

        let dir = tempfile::tempdir().unwrap();
        let cache = DirBlockCache::open(dir.path()).unwrap();
        let g = cache.put(&Block::genesis(&[entry("e0")])).unwrap();
        let a = cache.put(&Block::new(&[entry("e1")], Some(&g))).unwrap();

        let (tx, source) = live();
        tx.send(JournalEvent::boundary(a.clone()));
        let mut f = JournalFollower::new(Arc::new(cache), Arc::new(source.clone()))
            .with_config(fast_config())
            .start();

        assert_eq!(
            take(&mut f, 5).await,
            vec![
                entry("e0"),
                JournalEvent::boundary(g),
                entry("e1"),
                JournalEvent::boundary(a.clone()),
                JournalEvent::boundary(a),
            ]
        );
        assert!(f.status().caught_up);
    }

    #[tokio::test]
    async fn into_stream_yields_the_same_sequence() {
        let (tx, source) = live();
        tx.send(boundary("B"));
        let f = follower(history(), &source, fast_config()).start();

        let got: Vec<_> = f
            .into_stream()
            .take(7)
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(got, replayed_history());
    }

    #[tokio::test]
    async fn dropping_the_follower_cancels_it() {
        let (tx, source) = live();
        tx.send(entry("x"));
        let mut f = follower(history(), &source, fast_config()).start();
        take(&mut f, 1).await;

        let handle = f.cancel_handle();
        assert!(!handle.is_cancelled());
        drop(f);
        assert!(handle.is_cancelled());
    }
}
