//! Journal model for jtail.
//!
//! - [`JournalEvent`] -- the typed events a follower emits
//! - [`EventRecord`] -- the tagged wire record those events travel as
//! - [`Block`] -- an immutable batch of records linked to its predecessor
//!
//! Decoding is strict: an unknown event tag is an error
//! ([`JournalError::InvalidEventKind`]), never a placeholder event.

pub mod block;
pub mod error;
pub mod event;
pub mod record;

pub use block::{Block, ParentLink};
pub use error::{JournalError, JournalResult};
pub use event::{EventKind, JournalEvent};
pub use record::EventRecord;
