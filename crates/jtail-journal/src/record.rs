//! Wire form of journal events.
//!
//! An [`EventRecord`] is the tagged record that travels over the journal
//! stream, sits inside stored blocks, and fills JSON-lines event files.
//! The `type` tag is kept as free text so that an unknown tag survives
//! deserialization and is rejected by [`EventRecord::decode`] with
//! [`JournalError::InvalidEventKind`] instead of being lost as a generic
//! parse failure.

use serde::{Deserialize, Serialize};

use jtail_types::ContentRef;

use crate::error::{JournalError, JournalResult};
use crate::event::{EventKind, JournalEvent};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_chain_reference: Option<String>,
}

impl EventRecord {
    /// Convert the record to a [`JournalEvent`].
    pub fn decode(&self) -> JournalResult<JournalEvent> {
        let kind = EventKind::from_tag(&self.kind)
            .ok_or_else(|| JournalError::InvalidEventKind(self.kind.clone()))?;
        let event = match kind {
            EventKind::Insert => JournalEvent::InsertCanonical {
                reference: required(&self.reference, "reference")?,
            },
            EventKind::Update => JournalEvent::UpdateChain {
                canonical: required(&self.canonical_reference, "canonicalReference")?,
                chain: required(&self.chain_reference, "chainReference")?,
                previous_chain: optional(
                    &self.previous_chain_reference,
                    "previousChainReference",
                )?,
            },
            EventKind::BlockBoundary => JournalEvent::BlockBoundary {
                reference: required(&self.reference, "reference")?,
            },
        };
        Ok(event)
    }

    /// Parse one JSON line and decode it.
    pub fn decode_json(line: &str) -> JournalResult<JournalEvent> {
        let record: Self =
            serde_json::from_str(line).map_err(|e| JournalError::Json(e.to_string()))?;
        record.decode()
    }

    pub fn to_json(&self) -> JournalResult<String> {
        serde_json::to_string(self).map_err(|e| JournalError::Json(e.to_string()))
    }

    fn empty(kind: EventKind) -> Self {
        Self {
            kind: kind.tag().to_string(),
            reference: None,
            canonical_reference: None,
            chain_reference: None,
            previous_chain_reference: None,
        }
    }
}

impl From<&JournalEvent> for EventRecord {
    fn from(event: &JournalEvent) -> Self {
        let mut record = Self::empty(event.kind());
        match event {
            JournalEvent::InsertCanonical { reference }
            | JournalEvent::BlockBoundary { reference } => {
                record.reference = Some(reference.to_base58());
            }
            JournalEvent::UpdateChain {
                canonical,
                chain,
                previous_chain,
            } => {
                record.canonical_reference = Some(canonical.to_base58());
                record.chain_reference = Some(chain.to_base58());
                record.previous_chain_reference = previous_chain.as_ref().map(ContentRef::to_base58);
            }
        }
        record
    }
}

impl TryFrom<&EventRecord> for JournalEvent {
    type Error = JournalError;

    fn try_from(record: &EventRecord) -> Result<Self, Self::Error> {
        record.decode()
    }
}

fn required(value: &Option<String>, field: &'static str) -> JournalResult<ContentRef> {
    optional(value, field)?.ok_or(JournalError::MissingField(field))
}

fn optional(value: &Option<String>, field: &'static str) -> JournalResult<Option<ContentRef>> {
    value
        .as_deref()
        .map(|s| {
            ContentRef::from_base58(s).map_err(|source| JournalError::InvalidReference {
                field,
                source,
            })
        })
        .transpose()
}
