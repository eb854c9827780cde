use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use jtail_journal::Block;
use jtail_types::ContentRef;

use crate::error::{StoreError, StoreResult};
use crate::traits::BlockCache;

/// Directory-backed block cache.
///
/// Layout: one `<base58 reference>.json` file per block, holding the
/// block's JSON. Writes go to a temporary file that is renamed into place,
/// so readers never observe a half-written block.
///
/// `get` reads the file with blocking `std::fs` calls and, with
/// verification on, re-hashes it, all on the calling thread. That is fine
/// for a local disk under a multi-threaded runtime. A cache on slow or
/// network storage should be wrapped in a backend that prefetches off the
/// runtime instead.
#[derive(Clone, Debug)]
pub struct DirBlockCache {
    root: PathBuf,
    verify: bool,
}

impl DirBlockCache {
    /// Open (creating if needed) a cache rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root, verify: true })
    }

    /// Enable or disable hash verification on read (on by default).
    ///
    /// With verification off, blocks may be filed under any name, which is
    /// handy for hand-written fixtures.
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, reference: &ContentRef) -> PathBuf {
        self.root.join(format!("{}.json", reference.to_base58()))
    }
}

impl BlockCache for DirBlockCache {
    fn get(&self, reference: &ContentRef) -> StoreResult<Option<Block>> {
        let bytes = match fs::read(self.path_for(reference)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let block = Block::from_bytes(&bytes).map_err(|e| StoreError::CorruptBlock {
            reference: reference.clone(),
            reason: e.to_string(),
        })?;
        if self.verify {
            let computed = block
                .content_ref()
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            if &computed != reference {
                return Err(StoreError::HashMismatch {
                    reference: reference.clone(),
                    computed,
                });
            }
        }
        Ok(Some(block))
    }

    fn put(&self, block: &Block) -> StoreResult<ContentRef> {
        let bytes = block
            .to_bytes()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let reference = ContentRef::digest(&bytes);
        let path = self.path_for(&reference);
        if path.exists() {
            return Ok(reference);
        }

        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        debug!(block = %reference.short_hex(), path = %path.display(), "stored block");
        Ok(reference)
    }
}
