use std::time::Duration;

use chess::{move_index, GameMetadata, Rating};

use super::{
    Database, SqliteMoveIndexRepository, SqliteRawGameRepository, SqliteSnapshotRepository,
    SqliteSourceRepository,
};
use crate::persistence::traits::{
    MoveIndexRepository, RawGameRepository, SnapshotRepository, SourceRepository,
};
use crate::persistence::{
    GameSnapshotBatch, GameStatus, NewRawGame, NewSnapshot, NewSource, PersistenceError,
    SourceStatus,
};

async fn setup() -> (Database, SqliteSourceRepository, SqliteRawGameRepository, SqliteSnapshotRepository) {
    let db = Database::new_in_memory().await.unwrap();
    let pool = db.pool().clone();
    (
        db,
        SqliteSourceRepository::new(pool.clone()),
        SqliteRawGameRepository::new(pool.clone()),
        SqliteSnapshotRepository::new(pool),
    )
}

fn sample_game(ordinal: u64, moves: &str) -> NewRawGame {
    let pgn = format!("[Event \"game {ordinal}\"]\n[WhiteElo \"1700\"]\n\n{moves} *");
    let mut game = NewRawGame::new(ordinal, pgn);
    game.metadata = Some(GameMetadata {
        event: Some(format!("game {ordinal}")),
        white_elo: Rating::Known(1700),
        total_moves: 2,
        ..GameMetadata::default()
    });
    game
}

fn sample_snapshot(ply: u32, uci: &str) -> NewSnapshot {
    NewSnapshot {
        ply,
        move_number: (ply + 1) / 2,
        side_to_move: if ply % 2 == 1 { 'w' } else { 'b' },
        move_uci: uci.to_string(),
        move_san: uci.to_string(),
        fen_before: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1".to_string(),
        move_index: move_index().encode_move(uci.parse().unwrap()).unwrap(),
        legal_moves: vec![3, 17, 1900],
    }
}

// ── Sources ────────────────────────────────────────────────────────────

#[tokio::test]
async fn register_source_is_idempotent() {
    let (_db, sources, _, _) = setup().await;

    let first = sources.register_source(&NewSource::new("a.pgn")).await.unwrap();
    let again = sources
        .register_source(&NewSource {
            uri: "a.pgn".to_string(),
            declared_games: Some(10),
            size_bytes: None,
        })
        .await
        .unwrap();

    assert_eq!(first.id, again.id);
    assert_eq!(again.declared_games, Some(10));
    assert_eq!(again.status, SourceStatus::Registered);
    assert_eq!(sources.list_sources().await.unwrap().len(), 1);
}

#[tokio::test]
async fn claims_are_exclusive_and_releasable() {
    let (_db, sources, _, _) = setup().await;
    let a = sources.register_source(&NewSource::new("a.pgn")).await.unwrap();
    let b = sources.register_source(&NewSource::new("b.pgn")).await.unwrap();

    let first = sources.claim_next_source("w1").await.unwrap().unwrap();
    let second = sources.claim_next_source("w2").await.unwrap().unwrap();
    assert_eq!(first.id, a.id);
    assert_eq!(first.claimed_by.as_deref(), Some("w1"));
    assert_eq!(second.id, b.id);
    assert!(sources.claim_next_source("w3").await.unwrap().is_none());

    // only the holder can release
    sources.release_claim(a.id, "w2").await.unwrap();
    assert!(sources.claim_next_source("w3").await.unwrap().is_none());

    sources.release_claim(a.id, "w1").await.unwrap();
    let reclaimed = sources.claim_next_source("w3").await.unwrap().unwrap();
    assert_eq!(reclaimed.id, a.id);
    assert!(reclaimed.claimed_at.is_some());
}

#[tokio::test]
async fn only_stale_claims_are_released() {
    let (db, sources, _, _) = setup().await;
    let a = sources.register_source(&NewSource::new("a.pgn")).await.unwrap();
    let b = sources.register_source(&NewSource::new("b.pgn")).await.unwrap();
    sources.claim_next_source("old").await.unwrap().unwrap();
    sources.claim_next_source("live").await.unwrap().unwrap();

    // age the first lease by an hour
    sqlx::query("UPDATE source_files SET claimed_at = claimed_at - 3600 WHERE id = ?")
        .bind(a.id)
        .execute(db.pool())
        .await
        .unwrap();

    let released = sources
        .release_stale_claims(Duration::from_secs(600))
        .await
        .unwrap();
    assert_eq!(released, 1);
    assert!(sources.load_source(a.id).await.unwrap().unwrap().claimed_by.is_none());
    assert_eq!(
        sources.load_source(b.id).await.unwrap().unwrap().claimed_by.as_deref(),
        Some("live")
    );

    // the old holder finds out on its next renewal
    assert!(!sources.renew_claim(a.id, "old").await.unwrap());
    assert!(sources.renew_claim(b.id, "live").await.unwrap());

    assert_eq!(sources.release_stale_claims(Duration::ZERO).await.unwrap(), 1);
    assert!(sources.claim_next_source("next").await.unwrap().is_some());
}

#[tokio::test]
async fn terminal_sources_are_never_claimed() {
    let (_db, sources, _, _) = setup().await;
    let a = sources.register_source(&NewSource::new("a.pgn")).await.unwrap();
    let b = sources.register_source(&NewSource::new("b.pgn")).await.unwrap();
    let c = sources.register_source(&NewSource::new("c.pgn")).await.unwrap();

    sources
        .set_source_status(a.id, SourceStatus::Processed, None)
        .await
        .unwrap();
    sources
        .set_source_status(b.id, SourceStatus::Failed, Some("missing"))
        .await
        .unwrap();

    let unprocessed = sources.list_unprocessed_sources().await.unwrap();
    assert_eq!(unprocessed.iter().map(|s| s.id).collect::<Vec<_>>(), vec![c.id]);

    let claimed = sources.claim_next_source("w").await.unwrap().unwrap();
    assert_eq!(claimed.id, c.id);

    let failed = sources.load_source(b.id).await.unwrap().unwrap();
    assert_eq!(failed.status, SourceStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("missing"));
    assert!(sources.load_source(999).await.unwrap().is_none());
}

// ── Raw games ──────────────────────────────────────────────────────────

#[tokio::test]
async fn commit_raw_games_deduplicates_and_advances_cursor() {
    let (_db, sources, games, _) = setup().await;
    let source = sources.register_source(&NewSource::new("a.pgn")).await.unwrap();

    let batch = vec![sample_game(0, "1. e4 e5"), sample_game(1, "1. d4 d5")];
    let commit = games.commit_raw_games(source.id, &batch, 2).await.unwrap();
    assert_eq!(commit.inserted, 2);
    assert_eq!(commit.duplicates, 0);

    let again = games.commit_raw_games(source.id, &batch, 2).await.unwrap();
    assert_eq!(again.inserted, 0);
    assert_eq!(again.duplicates, 2);

    // the cursor never moves backwards
    games.commit_raw_games(source.id, &[], 1).await.unwrap();
    let source = sources.load_source(source.id).await.unwrap().unwrap();
    assert_eq!(source.games_split, 2);

    let pending = games.list_unprocessed_games(source.id, 10).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].ordinal, 0);
    assert_eq!(pending[1].ordinal, 1);
    assert!(pending.iter().all(|g| g.status == GameStatus::Pending));

    let limited = games.list_unprocessed_games(source.id, 1).await.unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn malformed_games_are_stored_but_not_pending() {
    let (_db, sources, games, _) = setup().await;
    let source = sources.register_source(&NewSource::new("a.pgn")).await.unwrap();

    let mut bad = NewRawGame::new(0, "[Event \"x\"]\n\n1. e4 e".to_string());
    bad.status = GameStatus::Malformed;
    bad.error = Some("truncated".to_string());
    games.commit_raw_games(source.id, &[bad], 1).await.unwrap();

    assert!(games.list_unprocessed_games(source.id, 10).await.unwrap().is_empty());
    let counts = games.count_rows().await.unwrap();
    assert_eq!(counts.raw_games, 1);
    assert_eq!(counts.malformed_games, 1);
}

// ── Snapshots ──────────────────────────────────────────────────────────

#[tokio::test]
async fn commit_snapshots_updates_game_status_atomically() {
    let (_db, sources, games, snapshots) = setup().await;
    let source = sources.register_source(&NewSource::new("a.pgn")).await.unwrap();
    games
        .commit_raw_games(source.id, &[sample_game(0, "1. e4 e5"), sample_game(1, "1. d4")], 2)
        .await
        .unwrap();
    let pending = games.list_unprocessed_games(source.id, 10).await.unwrap();

    let batches = vec![
        GameSnapshotBatch {
            raw_game_id: pending[0].id,
            snapshots: vec![sample_snapshot(1, "e2e4"), sample_snapshot(2, "e7e5")],
            status: GameStatus::Processed,
            error: None,
        },
        GameSnapshotBatch {
            raw_game_id: pending[1].id,
            snapshots: vec![],
            status: GameStatus::Partial,
            error: Some("illegal move at ply 1".to_string()),
        },
    ];
    assert_eq!(snapshots.commit_snapshots(&batches).await.unwrap(), 2);
    assert_eq!(snapshots.snapshot_count().await.unwrap(), 2);
    assert!(games.list_unprocessed_games(source.id, 10).await.unwrap().is_empty());

    let first = snapshots.load_snapshot(0).await.unwrap().unwrap();
    assert_eq!(first.ply, 1);
    assert_eq!(first.side_to_move, 'w');
    assert_eq!(first.move_uci, "e2e4");
    assert_eq!(first.legal_moves, vec![3, 17, 1900]);
    assert_eq!(first.white_elo, Rating::Known(1700));
    assert_eq!(first.black_elo, Rating::Unknown);

    let second = snapshots.load_snapshot(1).await.unwrap().unwrap();
    assert_eq!(second.side_to_move, 'b');
    assert!(snapshots.load_snapshot(2).await.unwrap().is_none());

    let counts = games.count_rows().await.unwrap();
    assert_eq!(counts.processed_games, 1);
    assert_eq!(counts.partial_games, 1);
    assert_eq!(counts.snapshots, 2);
}

#[tokio::test]
async fn failed_snapshot_commit_leaves_game_pending() {
    let (_db, sources, games, snapshots) = setup().await;
    let source = sources.register_source(&NewSource::new("a.pgn")).await.unwrap();
    games
        .commit_raw_games(source.id, &[sample_game(0, "1. e4")], 1)
        .await
        .unwrap();
    let pending = games.list_unprocessed_games(source.id, 10).await.unwrap();

    // duplicate ply violates UNIQUE(raw_game_id, ply) and rolls back the batch
    let batch = GameSnapshotBatch {
        raw_game_id: pending[0].id,
        snapshots: vec![sample_snapshot(1, "e2e4"), sample_snapshot(1, "e2e4")],
        status: GameStatus::Processed,
        error: None,
    };
    let err = snapshots.commit_snapshots(&[batch]).await.unwrap_err();
    assert!(matches!(err, PersistenceError::Database(_)));
    assert!(!err.is_transient());

    assert_eq!(snapshots.snapshot_count().await.unwrap(), 0);
    assert_eq!(games.list_unprocessed_games(source.id, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn finished_game_cannot_be_committed_twice() {
    let (_db, sources, games, snapshots) = setup().await;
    let source = sources.register_source(&NewSource::new("a.pgn")).await.unwrap();
    games
        .commit_raw_games(source.id, &[sample_game(0, "1. e4")], 1)
        .await
        .unwrap();
    let pending = games.list_unprocessed_games(source.id, 10).await.unwrap();
    let batch = GameSnapshotBatch {
        raw_game_id: pending[0].id,
        snapshots: vec![sample_snapshot(1, "e2e4")],
        status: GameStatus::Processed,
        error: None,
    };

    assert_eq!(snapshots.commit_snapshots(&[batch.clone()]).await.unwrap(), 1);
    let err = snapshots.commit_snapshots(&[batch]).await.unwrap_err();
    assert!(matches!(err, PersistenceError::GameNotPending(id) if id == pending[0].id));
    assert_eq!(snapshots.snapshot_count().await.unwrap(), 1);
}

// ── Move index ─────────────────────────────────────────────────────────

#[tokio::test]
async fn move_index_is_stored_once_and_verified() {
    let db = Database::new_in_memory().await.unwrap();
    let repo = SqliteMoveIndexRepository::new(db.pool().clone());

    repo.ensure_move_index(move_index()).await.unwrap();
    repo.ensure_move_index(move_index()).await.unwrap();

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM legal_move_index")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(count.0, chess::MOVE_SPACE_SIZE as i64);

    let promotion: (String, Option<String>) =
        sqlx::query_as("SELECT uci, promotion FROM legal_move_index WHERE idx = ?")
            .bind(i64::from(move_index().encode_move("e7e8q".parse().unwrap()).unwrap()))
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(promotion, ("e7e8q".to_string(), Some("q".to_string())));
}

#[tokio::test]
async fn incompatible_move_index_is_rejected() {
    let db = Database::new_in_memory().await.unwrap();
    let repo = SqliteMoveIndexRepository::new(db.pool().clone());
    repo.ensure_move_index(move_index()).await.unwrap();

    sqlx::query("UPDATE corpus_meta SET value = '2104' WHERE key = 'move_index_size'")
        .execute(db.pool())
        .await
        .unwrap();

    let err = repo.ensure_move_index(move_index()).await.unwrap_err();
    assert!(matches!(err, PersistenceError::IncompatibleMoveIndex { .. }));
}
