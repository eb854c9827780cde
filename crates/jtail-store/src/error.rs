use jtail_types::ContentRef;

/// Errors from block cache operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Stored bytes do not hash to the reference they were filed under.
    #[error("hash mismatch for {reference}: content hashes to {computed}")]
    HashMismatch {
        reference: ContentRef,
        computed: ContentRef,
    },

    /// The stored block cannot be decoded.
    #[error("corrupt block {reference}: {reason}")]
    CorruptBlock {
        reference: ContentRef,
        reason: String,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
