//! Backward walk from the journal head to genesis.
//!
//! # Preconditions
//!
//! Journals are acyclic by construction: every block links to a block that
//! existed before it was written. The walker relies on this and does not
//! track visited references; a cyclic cache would make it walk forever
//! (until cancelled).

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use jtail_journal::ParentLink;
use jtail_store::BlockCache;
use jtail_types::ContentRef;

use crate::config::{FollowerConfig, MissingBlockPolicy, ParentLinkPolicy};
use crate::error::{FollowerError, FollowerResult};
use crate::status::FollowerStatus;

/// What the live receiver hands the walker, once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CatchupTarget {
    /// Walk back from this block.
    Head(ContentRef),
    /// The first live event carried no head; there is no history to walk.
    Genesis,
}

/// Block references to replay, oldest first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplayPlan {
    blocks: Vec<ContentRef>,
}

impl ReplayPlan {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn as_slice(&self) -> &[ContentRef] {
        &self.blocks
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ContentRef> {
        self.blocks.iter()
    }
}

impl IntoIterator for ReplayPlan {
    type Item = ContentRef;
    type IntoIter = std::vec::IntoIter<ContentRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.into_iter()
    }
}

impl From<VecDeque<ContentRef>> for ReplayPlan {
    fn from(blocks: VecDeque<ContentRef>) -> Self {
        Self {
            blocks: blocks.into(),
        }
    }
}

/// Result of a walk that did not fail.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WalkOutcome {
    pub plan: ReplayPlan,
    /// `false` when the walk stopped early (truncated or cancelled).
    pub reached_genesis: bool,
}

pub struct ChainWalker {
    cache: Arc<dyn BlockCache>,
    missing_block: MissingBlockPolicy,
    malformed_parent: ParentLinkPolicy,
}

impl ChainWalker {
    pub fn new(cache: Arc<dyn BlockCache>, config: &FollowerConfig) -> Self {
        Self {
            cache,
            missing_block: config.missing_block,
            malformed_parent: config.malformed_parent,
        }
    }

    /// Walk from `head` back to genesis.
    pub async fn walk(
        &self,
        head: ContentRef,
        cancel: &CancellationToken,
    ) -> FollowerResult<WalkOutcome> {
        let mut plan = VecDeque::new();
        let mut current = head;

        loop {
            if cancel.is_cancelled() {
                debug!(blocks = plan.len(), "walk cancelled");
                return Ok(WalkOutcome {
                    plan: plan.into(),
                    reached_genesis: false,
                });
            }

            let block = match self.cache.get(&current) {
                Ok(Some(block)) => block,
                Ok(None) => {
                    return self.stop_missing(plan, current, None);
                }
                Err(e) => {
                    return self.stop_missing(plan, current, Some(e));
                }
            };

            plan.push_front(current.clone());

            match block.parent_link() {
                ParentLink::Genesis => {
                    info!(blocks = plan.len(), genesis = %current, "reached genesis");
                    return Ok(WalkOutcome {
                        plan: plan.into(),
                        reached_genesis: true,
                    });
                }
                ParentLink::Parent(parent) => {
                    debug!(
                        block = %current.short_hex(),
                        parent = %parent.short_hex(),
                        "following parent link"
                    );
                    current = parent;
                }
                ParentLink::Malformed(reason) => match self.malformed_parent {
                    ParentLinkPolicy::Genesis => {
                        warn!(block = %current, %reason, "malformed parent link, treating as genesis");
                        return Ok(WalkOutcome {
                            plan: plan.into(),
                            reached_genesis: true,
                        });
                    }
                    ParentLinkPolicy::Fail => {
                        return Err(FollowerError::MalformedParent {
                            reference: current,
                            reason,
                        });
                    }
                },
            }

            tokio::task::yield_now().await;
        }
    }

    fn stop_missing(
        &self,
        plan: VecDeque<ContentRef>,
        reference: ContentRef,
        cause: Option<jtail_store::StoreError>,
    ) -> FollowerResult<WalkOutcome> {
        match (self.missing_block, cause) {
            (MissingBlockPolicy::Truncate, cause) => {
                let cause = cause.map(|e| e.to_string());
                warn!(
                    block = %reference,
                    kept = plan.len(),
                    cause = cause.as_deref().unwrap_or("not in cache"),
                    "could not fetch block, history truncated"
                );
                Ok(WalkOutcome {
                    plan: plan.into(),
                    reached_genesis: false,
                })
            }
            (MissingBlockPolicy::Fail, Some(e)) => Err(FollowerError::Store(e)),
            (MissingBlockPolicy::Fail, None) => Err(FollowerError::MissingBlock { reference }),
        }
    }

    /// Background task body: wait for the catchup target, then walk.
    ///
    /// `target` is `None` when catchup is disabled.
    pub(crate) async fn run(
        self,
        target: Option<oneshot::Receiver<CatchupTarget>>,
        cancel: CancellationToken,
        status: Arc<FollowerStatus>,
    ) -> FollowerResult<WalkOutcome> {
        let Some(target) = target else {
            debug!("catchup disabled");
            status.mark_caught_up();
            return Ok(WalkOutcome::default());
        };

        let target = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("cancelled before catchup target arrived");
                return Ok(WalkOutcome::default());
            }
            target = target => target,
        };

        let head = match target {
            Ok(CatchupTarget::Head(head)) => head,
            Ok(CatchupTarget::Genesis) => {
                info!("live tail starts at genesis, nothing to catch up");
                status.mark_caught_up();
                return Ok(WalkOutcome {
                    plan: ReplayPlan::default(),
                    reached_genesis: true,
                });
            }
            Err(_) => {
                debug!("live receiver stopped before the first event");
                return Ok(WalkOutcome::default());
            }
        };

        info!(head = %head, "catching up from head");
        let outcome = self.walk(head, &cancel).await?;
        if outcome.reached_genesis {
            status.mark_caught_up();
        }
        Ok(outcome)
    }
}
