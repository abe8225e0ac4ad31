//! Turns PGN archives into a resumable SQLite corpus of training snapshots.

pub mod archive;
pub mod config;
pub mod dataset;
pub mod error;
pub mod manifest;
pub mod persistence;
pub mod pipeline;
pub mod retry;

pub use config::PipelineConfig;
pub use dataset::{DatasetError, SnapshotDataset, TrainingExample};
pub use error::PipelineError;
pub use manifest::{load_manifest, ManifestError};
pub use persistence::sqlite::{Database, SqlitePersistence};
pub use persistence::{CorpusCounts, NewSource, PersistenceError, SourceFile, SourceStatus};
pub use pipeline::{Pipeline, RunSummary, SourceOutcome, SourceReport};
pub use retry::RetryPolicy;
