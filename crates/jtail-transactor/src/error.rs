use std::time::Duration;

use jtail_follower::SourceError;
use jtail_store::StoreError;
use jtail_types::ContentRef;

#[derive(Debug, thiserror::Error)]
pub enum TransactorError {
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("no canonical record {0}")]
    UnknownCanonical(ContentRef),

    #[error("transactor call timed out after {0:?}")]
    Timeout(Duration),

    #[error("block cache error: {0}")]
    Store(#[from] StoreError),
}

impl TransactorError {
    /// View of this error as a live-source failure. Every transactor error
    /// is a transport problem from the follower's point of view.
    pub fn into_source_error(self) -> SourceError {
        SourceError::Transport(self.to_string())
    }
}

pub type TransactorResult<T> = Result<T, TransactorError>;
