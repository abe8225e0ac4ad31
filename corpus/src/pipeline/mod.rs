//! Ingestion orchestrator.
//!
//! Workers claim one source at a time and drive it through
//! `Registered -> Splitting -> Snapshotting -> Processed`. All progress lives
//! in storage, so a run that stops for any reason resumes where it left off.

pub mod snapshot;
pub mod split;
mod summary;


pub use snapshot::{encode_game, EncodedGame};
pub use split::{prepare_record, produce_records, GameFilter, SplitStats};
pub use summary::{RunSummary, SourceOutcome, SourceReport};

use std::sync::Arc;

use chess::move_index;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::persistence::{
    GameSnapshotBatch, GameStatus, MoveIndexRepository, NewRawGame, NewSource, Persistence,
    PersistenceError, RawGameRepository, SnapshotRepository, SourceFile, SourceRepository,
    SourceStatus,
};

/// Why a source stopped before reaching `Processed`.
enum Halt {
    Failed(PipelineError),
    Interrupted,
    /// Another worker holds the source now; leave it alone.
    ClaimLost,
}

impl From<PipelineError> for Halt {
    fn from(e: PipelineError) -> Self {
        Self::Failed(e)
    }
}

impl From<PersistenceError> for Halt {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::GameNotPending(_) => Self::ClaimLost,
            e => Self::Failed(PipelineError::StorageUnavailable(e)),
        }
    }
}

pub struct Pipeline<D: Persistence> {
    store: Arc<D>,
    config: PipelineConfig,
    sources: Vec<NewSource>,
    shutdown: watch::Receiver<bool>,
}

impl<D: Persistence> Pipeline<D> {
    pub fn new(store: Arc<D>, config: PipelineConfig) -> Self {
        // A receiver whose sender is gone reads `false` forever.
        let (_tx, shutdown) = watch::channel(false);
        Self {
            store,
            config,
            sources: Vec::new(),
            shutdown,
        }
    }

    /// Sources to register before claiming work.
    pub fn with_sources(mut self, sources: Vec<NewSource>) -> Self {
        self.sources = sources;
        self
    }

    /// Stop at the next batch boundary once the channel holds `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Process every non-terminal source.
    ///
    /// Only setup and the final accounting can fail the run; per-source
    /// problems are reported in the summary.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let retry = &self.config.retry;
        let index = move_index();
        retry
            .run("ensure move index", || self.store.move_index().ensure_move_index(index))
            .await?;

        for source in &self.sources {
            let registered = retry
                .run("register source", || self.store.sources().register_source(source))
                .await?;
            tracing::info!(source_id = registered.id, uri = %registered.uri, status = ?registered.status, "Registered source");
        }

        let timeout = self.config.claim_timeout;
        let released = retry
            .run("release stale claims", || self.store.sources().release_stale_claims(timeout))
            .await?;
        if released > 0 {
            tracing::warn!(released, timeout_secs = timeout.as_secs(), "Released stale claims");
        }

        let workers = self.config.workers.max(1);
        tracing::info!(workers, batch_size = self.config.batch_size, "Starting ingestion");

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let worker = Worker {
                name: format!("worker-{}-{}", worker_id, uuid::Uuid::new_v4()),
                worker_id,
                store: Arc::clone(&self.store),
                config: self.config.clone(),
                shutdown: self.shutdown.clone(),
            };
            handles.push(tokio::spawn(async move { worker.run().await }));
        }

        let mut summary = RunSummary::default();
        for handle in handles {
            match handle.await {
                Ok(reports) => summary.reports.extend(reports),
                Err(e) => tracing::error!("Worker task failed: {}", e),
            }
        }
        summary.reports.sort_by_key(|r| r.source_id);

        let sources = retry
            .run("list sources", || self.store.sources().list_sources())
            .await?;
        summary.unfinished_sources = sources
            .into_iter()
            .filter(|s| s.status != SourceStatus::Processed)
            .map(|s| s.uri)
            .collect();
        summary.counts = retry
            .run("count rows", || self.store.games().count_rows())
            .await?;

        tracing::info!(
            processed = summary.count(SourceOutcome::Processed),
            failed = summary.count(SourceOutcome::Failed),
            storage_unavailable = summary.count(SourceOutcome::StorageUnavailable),
            interrupted = summary.count(SourceOutcome::Interrupted),
            claim_lost = summary.count(SourceOutcome::ClaimLost),
            unfinished = summary.unfinished_sources.len(),
            snapshots = summary.total_snapshots_written(),
            "Ingestion finished"
        );
        Ok(summary)
    }
}

struct Worker<D: Persistence> {
    name: String,
    worker_id: usize,
    store: Arc<D>,
    config: PipelineConfig,
    shutdown: watch::Receiver<bool>,
}

impl<D: Persistence> Worker<D> {
    async fn run(&self) -> Vec<SourceReport> {
        let worker_id = self.worker_id;
        tracing::info!(worker_id, worker = %self.name, "Worker started");
        let mut reports = Vec::new();

        loop {
            if self.shutdown_requested() {
                tracing::info!(worker_id, "Shutdown requested, worker exiting");
                break;
            }

            let claimed = self
                .config
                .retry
                .run("claim source", || self.store.sources().claim_next_source(&self.name))
                .await;
            let source = match claimed {
                Ok(Some(source)) => source,
                Ok(None) => {
                    tracing::info!(worker_id, "No sources left, worker exiting");
                    break;
                }
                Err(e) => {
                    tracing::error!(worker_id, "Could not claim a source: {}", e);
                    break;
                }
            };

            let span = tracing::info_span!("source", worker_id, source_id = source.id, uri = %source.uri);
            let report = self.process_source(source).instrument(span).await;
            let stop = matches!(
                report.outcome,
                SourceOutcome::StorageUnavailable | SourceOutcome::Interrupted
            );
            reports.push(report);
            if stop {
                break;
            }
        }

        reports
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn process_source(&self, source: SourceFile) -> SourceReport {
        let mut report = SourceReport::new(&source, &self.name);
        tracing::info!(status = ?source.status, games_split = source.games_split, "Claimed source");

        let result = self.drive(&source, &mut report).await;
        let retry = &self.config.retry;

        match result {
            Ok(()) => {
                if let Err(e) = retry
                    .run("mark processed", || {
                        self.store
                            .sources()
                            .set_source_status(source.id, SourceStatus::Processed, None)
                    })
                    .await
                {
                    tracing::error!("Could not mark source processed: {}", e);
                    report.outcome = SourceOutcome::StorageUnavailable;
                    report.error = Some(PipelineError::StorageUnavailable(e).to_string());
                } else {
                    tracing::info!(
                        games = report.games_processed,
                        partial = report.games_partial,
                        snapshots = report.snapshots_written,
                        "Source processed"
                    );
                }
            }
            Err(Halt::Failed(e @ PipelineError::StorageUnavailable(_))) => {
                tracing::error!("Giving up on source: {}", e);
                report.outcome = SourceOutcome::StorageUnavailable;
                report.error = Some(e.to_string());
            }
            Err(Halt::Failed(e)) => {
                tracing::error!("Source failed: {}", e);
                let message = e.to_string();
                if let Err(store_err) = retry
                    .run("mark failed", || {
                        self.store.sources().set_source_status(
                            source.id,
                            SourceStatus::Failed,
                            Some(message.as_str()),
                        )
                    })
                    .await
                {
                    tracing::error!("Could not mark source failed: {}", store_err);
                }
                report.outcome = SourceOutcome::Failed;
                report.error = Some(message);
            }
            Err(Halt::Interrupted) => {
                tracing::info!("Source interrupted at a batch boundary");
                report.outcome = SourceOutcome::Interrupted;
            }
            Err(Halt::ClaimLost) => {
                tracing::warn!("Claim was taken over by another worker, abandoning source");
                report.outcome = SourceOutcome::ClaimLost;
            }
        }

        if let Err(e) = retry
            .run("release claim", || {
                self.store.sources().release_claim(source.id, &self.name)
            })
            .await
        {
            tracing::error!("Could not release claim: {}", e);
        }
        report
    }

    async fn drive(&self, source: &SourceFile, report: &mut SourceReport) -> Result<(), Halt> {
        if matches!(source.status, SourceStatus::Registered | SourceStatus::Splitting) {
            self.split_source(source, report).await?;
            self.set_status(source.id, SourceStatus::Snapshotting).await?;
        }
        self.snapshot_source(source, report).await
    }

    /// Refresh the lease before writing on behalf of the source.
    async fn renew_claim(&self, source_id: i64) -> Result<(), Halt> {
        let held = self
            .config
            .retry
            .run("renew claim", || self.store.sources().renew_claim(source_id, &self.name))
            .await?;
        if held {
            Ok(())
        } else {
            Err(Halt::ClaimLost)
        }
    }

    async fn set_status(&self, id: i64, status: SourceStatus) -> Result<(), Halt> {
        self.config
            .retry
            .run("set source status", || {
                self.store.sources().set_source_status(id, status, None)
            })
            .await?;
        tracing::info!(?status, "Source status changed");
        Ok(())
    }

    async fn split_source(&self, source: &SourceFile, report: &mut SourceReport) -> Result<(), Halt> {
        if self.shutdown_requested() {
            return Err(Halt::Interrupted);
        }
        if source.status == SourceStatus::Registered {
            self.set_status(source.id, SourceStatus::Splitting).await?;
        }

        let batch_size = self.config.batch_size.max(1);
        let (tx, mut rx) = mpsc::channel(batch_size);
        let uri = source.uri.clone();
        let skip = source.games_split;
        let filter = GameFilter {
            min_elo: self.config.min_elo,
            max_elo: self.config.max_elo,
        };
        let producer =
            tokio::task::spawn_blocking(move || produce_records(&uri, skip, filter, tx));

        let mut batch: Vec<NewRawGame> = Vec::with_capacity(batch_size);
        let mut outcome = Ok(());
        loop {
            let next = rx.recv().await;
            let done = next.is_none();
            if let Some(game) = next {
                batch.push(game);
            }

            if batch.len() >= batch_size || (done && !batch.is_empty()) {
                if let Err(e) = self.commit_games(source.id, &batch, report).await {
                    outcome = Err(e);
                    break;
                }
                batch.clear();
                if self.shutdown_requested() {
                    outcome = Err(Halt::Interrupted);
                    break;
                }
            }
            if done {
                break;
            }
        }

        // Unblocks the producer if we stopped early.
        drop(rx);
        let produced = producer
            .await
            .unwrap_or_else(|e| Err(PipelineError::unreadable(&source.uri, e)));
        outcome?;
        let stats = produced?;

        report.discarded_records += stats.discarded;
        tracing::info!(
            records = stats.records,
            inserted = report.games_inserted,
            duplicates = report.duplicates,
            malformed = report.malformed,
            skipped = report.skipped,
            discarded = stats.discarded,
            bytes_read = stats.bytes_read,
            "Split phase complete"
        );
        Ok(())
    }

    async fn commit_games(
        &self,
        source_id: i64,
        batch: &[NewRawGame],
        report: &mut SourceReport,
    ) -> Result<(), Halt> {
        let Some(last) = batch.last() else {
            return Ok(());
        };
        let cursor = last.ordinal + 1;
        self.renew_claim(source_id).await?;
        let commit = self
            .config
            .retry
            .run("commit raw games", || {
                self.store.games().commit_raw_games(source_id, batch, cursor)
            })
            .await?;

        report.games_inserted += commit.inserted;
        report.duplicates += commit.duplicates;
        for game in batch {
            match game.status {
                GameStatus::Malformed => report.malformed += 1,
                GameStatus::Skipped => report.skipped += 1,
                _ => {}
            }
        }
        tracing::debug!(
            games = batch.len(),
            inserted = commit.inserted,
            duplicates = commit.duplicates,
            games_split = cursor,
            "Committed raw game batch"
        );
        Ok(())
    }

    async fn snapshot_source(&self, source: &SourceFile, report: &mut SourceReport) -> Result<(), Halt> {
        let batch_size = self.config.batch_size.max(1);
        let limit = u32::try_from(batch_size).unwrap_or(u32::MAX);

        loop {
            if self.shutdown_requested() {
                return Err(Halt::Interrupted);
            }

            let games = self
                .config
                .retry
                .run("list pending games", || {
                    self.store.games().list_unprocessed_games(source.id, limit)
                })
                .await?;
            if games.is_empty() {
                break;
            }

            let encoded = tokio::task::spawn_blocking(move || {
                games.iter().map(encode_game).collect::<Vec<_>>()
            })
            .await
            .map_err(|e| PipelineError::MalformedRecord(format!("encoder task failed: {e}")))?;

            let mut pending: Vec<GameSnapshotBatch> = Vec::new();
            let mut rows = 0;
            for game in encoded {
                report.plies_dropped += game.plies_dropped;
                rows += game.batch.snapshots.len();
                pending.push(game.batch);

                if rows >= batch_size {
                    self.commit_snapshots(source.id, &pending, report).await?;
                    pending.clear();
                    rows = 0;
                    if self.shutdown_requested() {
                        return Err(Halt::Interrupted);
                    }
                }
            }
            if !pending.is_empty() {
                self.commit_snapshots(source.id, &pending, report).await?;
            }
        }

        tracing::info!(
            games = report.games_processed + report.games_partial,
            snapshots = report.snapshots_written,
            plies_dropped = report.plies_dropped,
            "Snapshot phase complete"
        );
        Ok(())
    }

    async fn commit_snapshots(
        &self,
        source_id: i64,
        batches: &[GameSnapshotBatch],
        report: &mut SourceReport,
    ) -> Result<(), Halt> {
        self.renew_claim(source_id).await?;
        let written = self
            .config
            .retry
            .run("commit snapshots", || self.store.snapshots().commit_snapshots(batches))
            .await?;

        report.snapshots_written += written;
        for batch in batches {
            match batch.status {
                GameStatus::Processed => report.games_processed += 1,
                GameStatus::Partial => report.games_partial += 1,
                GameStatus::Malformed => report.malformed += 1,
                _ => {}
            }
        }
        tracing::debug!(games = batches.len(), snapshots = written, "Committed snapshot batch");
        Ok(())
    }
}
