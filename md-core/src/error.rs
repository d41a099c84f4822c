use thiserror::Error;

use crate::types::{MdType, Meta};

/// Why a record could not be turned into a typed payload.
#[derive(Error, Debug)]
pub enum ParseErrorKind {
    #[error("{md_type} decode error: {source}")]
    Decode {
        md_type: MdType,
        #[source]
        source: serde_json::Error,
    },

    #[error("type mismatch: expected {expected} ({}), found tag {found}", .expected.tag())]
    TypeMismatch { expected: MdType, found: i64 },

    #[error("unknown key {0:?}")]
    UnknownKey(String),

    #[error("key is empty")]
    EmptyKey,

    #[error("envelope is missing")]
    MissingEnvelope,

    #[error("envelope type is unknown (tag {0})")]
    UnknownEnvelopeType(i64),
}

/// A parse failure together with whatever provenance was recovered.
#[derive(Error, Debug)]
#[error("offset({}) key({:?}): {}", .meta.offset, .meta.key, .kind)]
pub struct ParseError {
    pub meta: Meta,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(meta: Meta, kind: ParseErrorKind) -> Self {
        Self { meta, kind }
    }

    pub fn is_type_mismatch(&self) -> bool {
        matches!(self.kind, ParseErrorKind::TypeMismatch { .. })
    }

    pub fn is_decode(&self) -> bool {
        matches!(self.kind, ParseErrorKind::Decode { .. })
    }

    pub fn is_unknown_key(&self) -> bool {
        matches!(self.kind, ParseErrorKind::UnknownKey(_))
    }
}

/// Invalid [`TimeScale`](crate::TimeScale) configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeScaleError {
    #[error("bucket size must be positive")]
    ZeroBucket,

    #[error("session end {end} is before session start {start}")]
    InvertedSession { start: String, end: String },

    #[error("invalid time of day {0:?}, expected HH:MM:SS")]
    InvalidTime(String),
}
