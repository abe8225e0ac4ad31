use serde::Serialize;

use crate::persistence::{CorpusCounts, SourceFile};

/// How far one source got during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOutcome {
    Processed,
    /// The archive could not be read; the source is marked failed.
    Failed,
    /// Storage kept failing; the source was released and can be resumed.
    StorageUnavailable,
    /// Shutdown was requested; the source was released and can be resumed.
    Interrupted,
    /// The claim expired and another run took the source over.
    ClaimLost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub source_id: i64,
    pub uri: String,
    pub worker: String,
    pub outcome: SourceOutcome,
    pub error: Option<String>,
    pub games_inserted: u64,
    pub duplicates: u64,
    pub malformed: u64,
    pub skipped: u64,
    pub discarded_records: u64,
    pub games_processed: u64,
    pub games_partial: u64,
    pub snapshots_written: u64,
    pub plies_dropped: u64,
}

impl SourceReport {
    pub fn new(source: &SourceFile, worker: &str) -> Self {
        Self {
            source_id: source.id,
            uri: source.uri.clone(),
            worker: worker.to_string(),
            outcome: SourceOutcome::Processed,
            error: None,
            games_inserted: 0,
            duplicates: 0,
            malformed: 0,
            skipped: 0,
            discarded_records: 0,
            games_processed: 0,
            games_partial: 0,
            snapshots_written: 0,
            plies_dropped: 0,
        }
    }
}

/// Result of [`Pipeline::run`](super::Pipeline::run).
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub reports: Vec<SourceReport>,
    /// Registered sources not in the processed state after the run.
    pub unfinished_sources: Vec<String>,
    pub counts: CorpusCounts,
}

impl RunSummary {
    /// True when every registered source is processed.
    pub fn all_processed(&self) -> bool {
        self.unfinished_sources.is_empty()
            && self
                .reports
                .iter()
                .all(|r| r.outcome == SourceOutcome::Processed)
    }

    pub fn count(&self, outcome: SourceOutcome) -> usize {
        self.reports.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn total_snapshots_written(&self) -> u64 {
        self.reports.iter().map(|r| r.snapshots_written).sum()
    }

    pub fn total_plies_dropped(&self) -> u64 {
        self.reports.iter().map(|r| r.plies_dropped).sum()
    }
}
