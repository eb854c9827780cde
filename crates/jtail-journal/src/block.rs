use serde::{Deserialize, Serialize};
use serde_json::Value;

use jtail_types::ContentRef;

use crate::error::{JournalError, JournalResult};
use crate::event::JournalEvent;
use crate::record::EventRecord;

/// Key under which a parent link stores its target.
const LINK_KEY: &str = "@link";

/// An immutable batch of journal entries plus an optional link to the
/// block before it.
///
/// The `chain` field is kept as raw JSON: stored blocks come from outside
/// the follower and a corrupted link must be distinguishable from an
/// absent one (see [`ParentLink`]).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub entries: Vec<EventRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<Value>,
}

/// How a block's parent link reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParentLink {
    /// No `chain` field: this is the first block of the journal.
    Genesis,
    /// A well-formed link to the previous block.
    Parent(ContentRef),
    /// A `chain` field is present but does not hold a valid link.
    Malformed(String),
}

impl Block {
    /// Build a block from events, linked to `parent` when given.
    pub fn new(events: &[JournalEvent], parent: Option<&ContentRef>) -> Self {
        Self {
            entries: events.iter().map(EventRecord::from).collect(),
            chain: parent.map(|p| {
                let mut link = serde_json::Map::new();
                link.insert(LINK_KEY.to_string(), Value::String(p.to_base58()));
                Value::Object(link)
            }),
        }
    }

    /// The genesis block: no parent.
    pub fn genesis(events: &[JournalEvent]) -> Self {
        Self::new(events, None)
    }

    pub fn parent_link(&self) -> ParentLink {
        let Some(chain) = &self.chain else {
            return ParentLink::Genesis;
        };
        let Some(link) = chain.get(LINK_KEY) else {
            return ParentLink::Malformed(format!("chain field has no `{LINK_KEY}` entry"));
        };
        let Some(text) = link.as_str() else {
            return ParentLink::Malformed(format!("`{LINK_KEY}` is not a string"));
        };
        match ContentRef::from_base58(text) {
            Ok(parent) => ParentLink::Parent(parent),
            Err(e) => ParentLink::Malformed(e.to_string()),
        }
    }

    /// Decode every stored entry, in order. The first undecodable entry
    /// fails the whole block.
    pub fn decode_entries(&self) -> JournalResult<Vec<JournalEvent>> {
        self.entries.iter().map(EventRecord::decode).collect()
    }

    /// Canonical JSON bytes of the block.
    pub fn to_bytes(&self) -> JournalResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| JournalError::Json(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> JournalResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| JournalError::Json(e.to_string()))
    }

    /// The content address of this block.
    pub fn content_ref(&self) -> JournalResult<ContentRef> {
        Ok(ContentRef::digest(&self.to_bytes()?))
    }
}
