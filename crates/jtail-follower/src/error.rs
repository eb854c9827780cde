use jtail_journal::JournalError;
use jtail_store::StoreError;
use jtail_types::ContentRef;

/// Errors raised by a live event source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The subscription was cancelled.
    #[error("subscription cancelled")]
    Cancelled,

    /// The transport dropped or refused the subscription.
    #[error("transport error: {0}")]
    Transport(String),

    /// The source delivered an event that does not decode.
    #[error("undecodable event: {0}")]
    Decode(#[from] JournalError),

    /// The source dropped events it could not buffer for a slow reader.
    #[error("subscriber lagged, {skipped} events lost")]
    Lagged { skipped: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Failures that a resubscription cannot repair: a decode error recurs
    /// on every attempt, and lost events cannot be recovered. Malformed
    /// bytes reported by the I/O layer count as a decode error.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Decode(_) | Self::Lagged { .. } => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::InvalidData,
            Self::Cancelled | Self::Transport(_) => false,
        }
    }
}

/// Errors delivered to the consumer of a follower's event sequence.
#[derive(Debug, thiserror::Error)]
pub enum FollowerError {
    #[error("block {reference} is not in the block cache")]
    MissingBlock { reference: ContentRef },

    #[error("block {reference} has a malformed parent link: {reason}")]
    MalformedParent {
        reference: ContentRef,
        reason: String,
    },

    #[error("block cache error: {0}")]
    Store(#[from] StoreError),

    #[error("journal decode error: {0}")]
    Journal(#[from] JournalError),

    #[error("live subscription failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: SourceError,
    },

    #[error("live subscription failed: {0}")]
    Source(#[from] SourceError),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type FollowerResult<T> = Result<T, FollowerError>;
