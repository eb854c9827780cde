use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use jtail_journal::Block;
use jtail_types::ContentRef;

use crate::error::{StoreError, StoreResult};
use crate::traits::BlockCache;

/// In-memory, HashMap-based block cache.
///
/// Intended for tests and embedding. Blocks are cloned on read and write.
pub struct InMemoryBlockCache {
    blocks: RwLock<HashMap<ContentRef, Block>>,
}

impl InMemoryBlockCache {
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
        }
    }

    /// Number of blocks currently stored.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// File `block` under an arbitrary reference, bypassing content
    /// addressing. Useful for fixtures that need stable, readable names.
    pub fn insert_as(&self, reference: ContentRef, block: Block) {
        self.write().insert(reference, block);
    }

    /// Drop a block, returning whether it was present.
    pub fn remove(&self, reference: &ContentRef) -> bool {
        self.write().remove(reference).is_some()
    }

    // Entries are whole blocks, so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ContentRef, Block>> {
        self.blocks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ContentRef, Block>> {
        self.blocks.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryBlockCache {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockCache for InMemoryBlockCache {
    fn get(&self, reference: &ContentRef) -> StoreResult<Option<Block>> {
        Ok(self.read().get(reference).cloned())
    }

    fn put(&self, block: &Block) -> StoreResult<ContentRef> {
        let reference = block
            .content_ref()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.write()
            .entry(reference.clone())
            .or_insert_with(|| block.clone());
        Ok(reference)
    }
}

impl std::fmt::Debug for InMemoryBlockCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlockCache")
            .field("block_count", &self.len())
            .finish()
    }
}
