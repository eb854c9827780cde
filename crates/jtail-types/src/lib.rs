//! Foundation types for jtail.
//!
//! Every other jtail crate depends on `jtail-types` for [`ContentRef`], the
//! content address that names blocks, canonical records and chain cells.

pub mod error;
pub mod reference;

pub use error::TypeError;
pub use reference::ContentRef;
