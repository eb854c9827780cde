use jtail_journal::Block;
use jtail_types::ContentRef;

use crate::error::StoreResult;

/// Content-addressed block lookup.
///
/// Implementations must satisfy:
/// - Blocks are immutable once stored; a reference always names the same block.
/// - Reads are safe from several tasks at once (the follower's chain walker
///   and its merge stage both read).
/// - `get` is called inline on async tasks, once per block during catchup
///   and replay. Backends may do synchronous local I/O (see
///   [`DirBlockCache`](crate::DirBlockCache)) but must not wait on the
///   network or on other tasks.
pub trait BlockCache: Send + Sync {
    /// Look up a block by reference.
    ///
    /// Returns `Ok(None)` if the block is not present.
    /// Returns `Err` on I/O failure or data corruption.
    fn get(&self, reference: &ContentRef) -> StoreResult<Option<Block>>;

    /// Store a block and return the reference it is filed under.
    ///
    /// Storing the same block twice is a no-op.
    fn put(&self, block: &Block) -> StoreResult<ContentRef>;

    fn contains(&self, reference: &ContentRef) -> StoreResult<bool> {
        Ok(self.get(reference)?.is_some())
    }
}

impl<T: BlockCache + ?Sized> BlockCache for std::sync::Arc<T> {
    fn get(&self, reference: &ContentRef) -> StoreResult<Option<Block>> {
        (**self).get(reference)
    }

    fn put(&self, block: &Block) -> StoreResult<ContentRef> {
        (**self).put(block)
    }

    fn contains(&self, reference: &ContentRef) -> StoreResult<bool> {
        (**self).contains(reference)
    }
}
