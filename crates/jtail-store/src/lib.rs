//! Block storage for jtail.
//!
//! The follower only ever reads blocks, through the [`BlockCache`] trait.
//! Two backends are provided:
//!
//! - [`InMemoryBlockCache`] -- `HashMap`-based cache for tests and embedding
//! - [`DirBlockCache`] -- one JSON file per block in a directory
//!
//! # Design Rules
//!
//! 1. Blocks are immutable once stored (content addressing guarantees this).
//! 2. Concurrent reads are always safe.
//! 3. A missing block is `Ok(None)`; only I/O failure or corruption is `Err`.

pub mod dir;
pub mod error;
pub mod memory;
pub mod traits;

pub use dir::DirBlockCache;
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryBlockCache;
pub use traits::BlockCache;
