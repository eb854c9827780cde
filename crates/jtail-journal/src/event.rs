use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use jtail_types::ContentRef;

use crate::error::JournalError;

/// Classification of journal events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A canonical record was inserted.
    Insert,
    /// A record's revision chain advanced.
    Update,
    /// Every entry of a block has been emitted.
    BlockBoundary,
}

impl EventKind {
    /// The tag used for this kind in the wire record.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::BlockBoundary => "blockBoundary",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "blockBoundary" => Some(Self::BlockBoundary),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for EventKind {
    type Err = JournalError;

    /// Accepts wire tags plus the short `boundary` alias.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "boundary" => Ok(Self::BlockBoundary),
            other => {
                Self::from_tag(other).ok_or_else(|| JournalError::InvalidEventKind(other.into()))
            }
        }
    }
}

/// A single event in the journal, historical or live.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum JournalEvent {
    /// A new canonical record was created.
    InsertCanonical { reference: ContentRef },
    /// The revision chain of a canonical record advanced.
    UpdateChain {
        canonical: ContentRef,
        chain: ContentRef,
        previous_chain: Option<ContentRef>,
    },
    /// Synthetic marker: all entries up to and including this block have
    /// been emitted.
    BlockBoundary { reference: ContentRef },
}

impl JournalEvent {
    pub fn insert(reference: ContentRef) -> Self {
        Self::InsertCanonical { reference }
    }

    pub fn update(
        canonical: ContentRef,
        chain: ContentRef,
        previous_chain: Option<ContentRef>,
    ) -> Self {
        Self::UpdateChain {
            canonical,
            chain,
            previous_chain,
        }
    }

    pub fn boundary(reference: ContentRef) -> Self {
        Self::BlockBoundary { reference }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::InsertCanonical { .. } => EventKind::Insert,
            Self::UpdateChain { .. } => EventKind::Update,
            Self::BlockBoundary { .. } => EventKind::BlockBoundary,
        }
    }

    /// The block this event announces, if it is a block boundary.
    pub fn block_reference(&self) -> Option<&ContentRef> {
        match self {
            Self::BlockBoundary { reference } => Some(reference),
            _ => None,
        }
    }
}

impl fmt::Display for JournalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsertCanonical { reference } => write!(f, "insert {reference}"),
            Self::UpdateChain {
                canonical,
                chain,
                previous_chain: Some(prev),
            } => write!(f, "update {canonical} -> {chain} (was {prev})"),
            Self::UpdateChain {
                canonical, chain, ..
            } => write!(f, "update {canonical} -> {chain}"),
            Self::BlockBoundary { reference } => write!(f, "block {reference}"),
        }
    }
}
