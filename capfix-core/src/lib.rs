//! Caption correction core: transcript codec, word diff, rewrite validation,
//! the suggestion pipeline, and project storage.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod config;
pub mod db;
pub mod diff;
pub mod error;
pub mod export;
pub mod schema;
pub mod store;
pub mod suggest;
pub mod timestamp;
pub mod transcript;
pub mod types;
pub mod validate;

pub use config::{ServiceConfig, SuggestConfig};
pub use db::SqliteStore;
pub use diff::{diff_words, DiffKind, DiffToken};
pub use error::{ServiceError, StoreError, TranscriptError};
pub use export::{apply_candidates, export_file_name, export_transcript};
pub use store::{MemoryStore, ProjectStore, ProjectSummary};
pub use transcript::{parse, serialize, TimedText};
pub use types::{
    resolve_display_text, Project, ProjectStatus, RewriteCandidate, Segment, SegmentUpdate, Severity,
    SeverityAssessment,
};
pub use validate::{evaluate, is_acceptable, AcceptanceLimits, Rejection};

/// Returns the current Unix timestamp in seconds.
pub(crate) fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
