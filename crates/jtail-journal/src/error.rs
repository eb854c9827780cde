use jtail_types::TypeError;

/// Errors produced while decoding journal events and blocks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JournalError {
    #[error("invalid journal event kind: {0}")]
    InvalidEventKind(String),

    #[error("event record is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid reference in field `{field}`: {source}")]
    InvalidReference {
        field: &'static str,
        source: TypeError,
    },

    #[error("json error: {0}")]
    Json(String),
}

pub type JournalResult<T> = Result<T, JournalError>;
