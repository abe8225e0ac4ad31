//! Split phase: archive → game records → `NewRawGame`s.
//!
//! Runs on the blocking pool and hands records to the async side through a
//! bounded channel, so a slow database throttles decompression.

use chess::pgn::{parse_pgn, GameMetadata, GameSplitter};
use tokio::sync::mpsc;

use crate::archive::ArchiveReader;
use crate::error::PipelineError;
use crate::persistence::{GameStatus, NewRawGame};

/// Rating window; games with a known rating outside it are skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GameFilter {
    pub min_elo: Option<i32>,
    pub max_elo: Option<i32>,
}

impl GameFilter {
    /// Reason to skip the game, if any.
    pub fn rejects(&self, meta: &GameMetadata) -> Option<String> {
        if !meta.is_standard_variant() {
            return Some(format!(
                "unsupported variant {}",
                meta.variant.as_deref().unwrap_or("?")
            ));
        }
        for elo in [meta.white_elo.known(), meta.black_elo.known()].into_iter().flatten() {
            if self.min_elo.is_some_and(|min| elo < min) {
                return Some(format!("rating {elo} below minimum"));
            }
            if self.max_elo.is_some_and(|max| elo > max) {
                return Some(format!("rating {elo} above maximum"));
            }
        }
        None
    }
}

/// What the producer saw of the archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitStats {
    /// Records sent after the resume cursor.
    pub records: u64,
    pub discarded: u64,
    pub bytes_read: u64,
    /// The receiver went away before the archive was exhausted.
    pub stopped_early: bool,
}

/// Classify one record and extract its statistics.
pub fn prepare_record(ordinal: u64, text: String, filter: &GameFilter) -> NewRawGame {
    let mut game = NewRawGame::new(ordinal, text);

    let parsed = match parse_pgn(&game.pgn) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(ordinal, "Malformed record: {}", e);
            game.status = GameStatus::Malformed;
            game.error = Some(PipelineError::from(e).to_string());
            return game;
        }
    };

    let meta = GameMetadata::from_game(&parsed);
    if let Some(reason) = filter.rejects(&meta) {
        tracing::debug!(ordinal, %reason, "Skipping game");
        game.status = GameStatus::Skipped;
        game.error = Some(reason);
    }
    game.metadata = Some(meta);
    game
}

/// Read `uri` and send every record after the first `skip` into `tx`.
///
/// Blocking; call through `spawn_blocking`.
pub fn produce_records(
    uri: &str,
    skip: u64,
    filter: GameFilter,
    tx: mpsc::Sender<NewRawGame>,
) -> Result<SplitStats, PipelineError> {
    let reader = ArchiveReader::open(uri)?;
    let progress = reader.progress();
    let mut splitter = GameSplitter::new(reader);
    let mut stats = SplitStats::default();
    let mut ordinal = 0u64;

    for record in splitter.by_ref() {
        let text = record.map_err(|e| PipelineError::unreadable(uri, e))?;
        let current = ordinal;
        ordinal += 1;
        if current < skip {
            continue;
        }

        let game = prepare_record(current, text, &filter);
        if tx.blocking_send(game).is_err() {
            stats.stopped_early = true;
            break;
        }
        stats.records += 1;
    }

    stats.discarded = splitter.discarded();
    stats.bytes_read = progress.load(std::sync::atomic::Ordering::Relaxed);
    if skip > 0 && ordinal < skip && !stats.stopped_early {
        tracing::warn!(uri, skip, found = ordinal, "Archive has fewer records than already split");
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess::Rating;

    const GOOD: &str = "[Event \"x\"]\n[WhiteElo \"1500\"]\n[BlackElo \"2100\"]\n\n1. e4 e5 1-0";

    #[test]
    fn malformed_records_are_kept_with_reason() {
        let game = prepare_record(3, "[Event \"x\"]\n\n1. e4 e".to_string(), &GameFilter::default());
        assert_eq!(game.ordinal, 3);
        assert_eq!(game.status, GameStatus::Malformed);
        assert!(game.error.unwrap().contains("Malformed"));
        assert!(game.metadata.is_none());
    }

    #[test]
    fn good_records_are_pending_with_metadata() {
        let game = prepare_record(0, GOOD.to_string(), &GameFilter::default());
        assert_eq!(game.status, GameStatus::Pending);
        let meta = game.metadata.unwrap();
        assert_eq!(meta.white_elo, Rating::Known(1500));
        assert_eq!(meta.total_moves, 2);
    }

    #[test]
    fn rating_window_skips_games() {
        let filter = GameFilter {
            min_elo: Some(1600),
            max_elo: None,
        };
        let game = prepare_record(0, GOOD.to_string(), &filter);
        assert_eq!(game.status, GameStatus::Skipped);
        assert!(game.error.unwrap().contains("below minimum"));

        let filter = GameFilter {
            min_elo: None,
            max_elo: Some(2000),
        };
        assert_eq!(prepare_record(0, GOOD.to_string(), &filter).status, GameStatus::Skipped);
    }

    #[test]
    fn unknown_ratings_pass_the_filter() {
        let record = "[Event \"x\"]\n[WhiteElo \"?\"]\n\n1. e4 *";
        let filter = GameFilter {
            min_elo: Some(1000),
            max_elo: Some(1200),
        };
        assert_eq!(prepare_record(0, record.to_string(), &filter).status, GameStatus::Pending);
    }

    #[test]
    fn variants_are_skipped() {
        let record = "[Event \"x\"]\n[Variant \"Atomic\"]\n\n1. e4 *";
        let game = prepare_record(0, record.to_string(), &GameFilter::default());
        assert_eq!(game.status, GameStatus::Skipped);
        assert!(game.error.unwrap().contains("Atomic"));
    }

    #[test]
    fn producer_skips_already_split_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games.pgn");
        std::fs::write(
            &path,
            "[Event \"a\"]\n\n1. e4 1-0\n\n[Event \"b\"]\n\n1. d4 0-1\n\n[Event \"c\"]\n\n1. c4 *\n",
        )
        .unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let stats = produce_records(path.to_str().unwrap(), 1, GameFilter::default(), tx).unwrap();
        assert_eq!(stats.records, 2);
        assert!(!stats.stopped_early);

        let mut ordinals = Vec::new();
        while let Ok(game) = rx.try_recv() {
            ordinals.push(game.ordinal);
        }
        assert_eq!(ordinals, vec![1, 2]);
    }

    #[test]
    fn producer_reports_missing_archive() {
        let (tx, _rx) = mpsc::channel(1);
        let err = produce_records("/no/such/file.pgn", 0, GameFilter::default(), tx).unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnreadable { .. }));
    }
}
