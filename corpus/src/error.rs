//! Pipeline error taxonomy.
//!
//! Lower layers have their own error types; this is what they fold into once
//! the pipeline decides how far a failure reaches. Record-level errors
//! (`MalformedRecord`, `IllegalMove`, `UnencodableMove`) are recorded on the
//! game and never stop a source. `SourceUnreadable` fails one source.
//! `StorageUnavailable` is raised only after retries are exhausted.

use chess::{CodecError, PgnError, ReplayError};

use crate::archive::ArchiveError;
use crate::persistence::PersistenceError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Source {uri} is unreadable: {reason}")]
    SourceUnreadable { uri: String, reason: String },
    #[error("Malformed record: {0}")]
    MalformedRecord(String),
    #[error("Illegal move {token:?} at ply {ply}: {reason}")]
    IllegalMove {
        ply: u32,
        token: String,
        reason: String,
    },
    #[error("Unencodable move: {0}")]
    UnencodableMove(#[from] CodecError),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] PersistenceError),
}

impl PipelineError {
    pub fn unreadable(uri: &str, reason: impl ToString) -> Self {
        Self::SourceUnreadable {
            uri: uri.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<PgnError> for PipelineError {
    fn from(e: PgnError) -> Self {
        Self::MalformedRecord(e.to_string())
    }
}

impl From<ReplayError> for PipelineError {
    fn from(e: ReplayError) -> Self {
        Self::MalformedRecord(e.to_string())
    }
}

impl From<ArchiveError> for PipelineError {
    fn from(e: ArchiveError) -> Self {
        let uri = match &e {
            ArchiveError::NotFound(uri) => uri.clone(),
            ArchiveError::Io { uri, .. } | ArchiveError::Http { uri, .. } => uri.clone(),
        };
        Self::SourceUnreadable {
            uri,
            reason: e.to_string(),
        }
    }
}
