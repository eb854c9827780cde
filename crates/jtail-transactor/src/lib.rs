//! Transactor side of jtail.
//!
//! A transactor accepts canonical records and chain updates, groups them
//! into blocks, and publishes a journal stream. This crate defines the
//! client interface a follower needs from one and ships:
//!
//! - [`MemoryTransactor`] -- in-process transactor for tests and embedding
//! - [`TimedTransactor`] -- per-call deadline wrapper for any client
//! - [`TransactorSource`] -- adapts a client into a follower live source

pub mod client;
pub mod error;
pub mod memory;
pub mod source;
pub mod timed;

pub use client::TransactorClient;
pub use error::{TransactorError, TransactorResult};
pub use memory::{ChainCell, MemoryTransactor, DEFAULT_CAPACITY};
pub use source::TransactorSource;
pub use timed::{TimedTransactor, DEFAULT_TIMEOUT};
