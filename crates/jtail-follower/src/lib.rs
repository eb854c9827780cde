//! Journal follower for jtail.
//!
//! A follower turns a live journal subscription into a complete, ordered
//! event sequence. The first live event names the current head block; the
//! follower walks parent links from there back to genesis, replays that
//! history oldest first, and then continues with the live tail.
//!
//! - [`JournalFollower`] -- configure, then [`start`](JournalFollower::start)
//! - [`RunningFollower`] -- the pull-based event sequence
//! - [`ChainWalker`] -- head-to-genesis walk over a [`BlockCache`](jtail_store::BlockCache)
//! - [`LiveEventSource`] -- where live events come from
//! - [`EventMapper`] -- per-event transform/filter
//!
//! # Design Rules
//!
//! 1. All historical events precede all live events.
//! 2. Blocks replay oldest to newest; each block's entries are followed by
//!    its `BlockBoundary`.
//! 3. The sequence ends on cancellation or after one reported error, and
//!    cannot be restarted.
//! 4. Each status flag has exactly one writer task.

pub mod config;
pub mod error;
pub mod follower;
pub mod mapper;
mod receiver;
pub mod retry;
pub mod source;
pub mod status;
pub mod walker;

pub use config::{FollowerConfig, MissingBlockPolicy, ParentLinkPolicy};
pub use error::{FollowerError, FollowerResult, SourceError};
pub use follower::{CancelHandle, JournalFollower, RunningFollower};
pub use mapper::{EventMapper, IdentityMapper, KindFilter};
pub use retry::{with_retry, Failure, RetryError, RetryPolicy};
pub use source::{memory_source, EventStream, LiveEventSource, MemoryEventSender, MemoryEventSource};
pub use status::{FollowerStatus, StatusSnapshot};
pub use walker::{CatchupTarget, ChainWalker, ReplayPlan, WalkOutcome};
