//! Error types shared across capfix-core.
//!
//! Parser-phase errors (`TranscriptError`) are fatal to a single parse and
//! carry the 1-based block position so callers can point at the broken part
//! of the file. `ServiceError` covers every way a call to the generative
//! service can fail; the suggestion pipeline absorbs these and degrades
//! instead of propagating them.

use thiserror::Error;

/// Errors raised while decoding or encoding a transcript.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("malformed timestamp {value:?}{}", block_suffix(.block))]
    MalformedTimestamp { value: String, block: Option<usize> },

    #[error("subtitle file appears to be empty")]
    EmptyTranscript,

    #[error("no subtitle segments were detected in the file")]
    NoSegmentsFound,

    #[error("malformed block {block}: {reason}")]
    MalformedBlock { block: usize, reason: &'static str },

    #[error("block {block} repeats cue index {index}")]
    DuplicateIndex { block: usize, index: u32 },

    #[error("at least one segment is required to build a transcript")]
    EmptySegments,
}

fn block_suffix(block: &Option<usize>) -> String {
    match block {
        Some(block) => format!(" in block {block}"),
        None => String::new(),
    }
}

impl TranscriptError {
    /// Attaches a block position to a timestamp error raised by the codec.
    pub(crate) fn in_block(self, position: usize) -> Self {
        match self {
            Self::MalformedTimestamp { value, .. } => Self::MalformedTimestamp {
                value,
                block: Some(position),
            },
            other => other,
        }
    }
}

/// A failed round trip to the external generative service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response did not match the expected shape: {0}")]
    MalformedResponse(String),

    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("request cancelled")]
    Cancelled,

    #[error("no API key configured (expected in ${0})")]
    MissingApiKey(String),
}

/// Errors from a `ProjectStore` backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),

    #[error("project {project} not found for owner {owner}")]
    NotFound { owner: String, project: String },

    #[error("project {project} has more than one segment with index {index}")]
    DuplicateSegment { project: String, index: u32 },
}
