//! Snapshot phase: pending raw game → per-ply training rows.

use chess::pgn::{parse_pgn, start_position};
use chess::{
    format_uci_move, move_index, replay_game, CodecError, Move, PieceColor, PlySnapshot,
    ReplayStatus,
};

use crate::error::PipelineError;
use crate::persistence::{GameSnapshotBatch, GameStatus, NewSnapshot, RawGame};

/// A game's snapshot rows plus the plies that had to be left out.
#[derive(Debug, Clone)]
pub struct EncodedGame {
    pub batch: GameSnapshotBatch,
    /// Plies whose move (or a legal alternative) has no move-class index.
    pub plies_dropped: u64,
}

/// Replay one stored game and encode every ply it reaches.
///
/// Never fails: problems are recorded on the returned batch's status. A game
/// that loses any ply (or any legal alternative) to encoding is stored as
/// partial with the losses listed in its error text.
pub fn encode_game(game: &RawGame) -> EncodedGame {
    let index = move_index();
    encode_game_with(game, |mv| index.encode_move(mv))
}

fn encode_game_with<F>(game: &RawGame, encode: F) -> EncodedGame
where
    F: Fn(Move) -> Result<u16, CodecError>,
{
    let malformed = |err: PipelineError| {
        tracing::warn!(raw_game_id = game.id, "Game could not be replayed: {}", err);
        EncodedGame {
            batch: GameSnapshotBatch {
                raw_game_id: game.id,
                snapshots: Vec::new(),
                status: GameStatus::Malformed,
                error: Some(err.to_string()),
            },
            plies_dropped: 0,
        }
    };

    let parsed = match parse_pgn(&game.pgn) {
        Ok(parsed) => parsed,
        Err(e) => return malformed(e.into()),
    };
    let outcome = match replay_game(&start_position(&parsed), &parsed.tokens) {
        Ok(outcome) => outcome,
        Err(e) => return malformed(e.into()),
    };

    let mut snapshots = Vec::with_capacity(outcome.snapshots.len());
    let mut plies_dropped = 0;
    let mut losses = Vec::new();
    for ply in &outcome.snapshots {
        match encode_ply(ply, &encode) {
            Ok((snapshot, omitted)) => {
                if omitted > 0 {
                    tracing::warn!(
                        raw_game_id = game.id,
                        ply = ply.ply,
                        omitted,
                        "Legal moves without a move class"
                    );
                    losses.push(format!(
                        "ply {}: {} legal moves without a move class",
                        ply.ply, omitted
                    ));
                }
                snapshots.push(snapshot);
            }
            Err(e) => {
                tracing::warn!(raw_game_id = game.id, ply = ply.ply, "Dropping ply: {}", e);
                losses.push(format!("ply {} dropped: {}", ply.ply, e));
                plies_dropped += 1;
            }
        }
    }

    let (status, error) = match outcome.status {
        ReplayStatus::Complete if losses.is_empty() => (GameStatus::Processed, None),
        ReplayStatus::Complete => (GameStatus::Partial, Some(losses.join("; "))),
        ReplayStatus::Partial { ply, token, reason } => {
            let err = PipelineError::IllegalMove { ply, token, reason };
            tracing::debug!(raw_game_id = game.id, "Partial game: {}", err);
            losses.insert(0, err.to_string());
            (GameStatus::Partial, Some(losses.join("; ")))
        }
    };

    EncodedGame {
        batch: GameSnapshotBatch {
            raw_game_id: game.id,
            snapshots,
            status,
            error,
        },
        plies_dropped,
    }
}

/// Encode one ply. Fails only when the played move has no class; legal
/// alternatives without one are left out of the list and counted.
fn encode_ply<F>(ply: &PlySnapshot, encode: &F) -> Result<(NewSnapshot, usize), PipelineError>
where
    F: Fn(Move) -> Result<u16, CodecError>,
{
    let move_class = encode(ply.mv)?;
    let mut legal_moves: Vec<u16> = ply
        .legal_moves
        .iter()
        .filter_map(|&mv| encode(mv).ok())
        .collect();
    let omitted = ply.legal_moves.len() - legal_moves.len();
    legal_moves.sort_unstable();

    let snapshot = NewSnapshot {
        ply: ply.ply,
        move_number: ply.move_number,
        side_to_move: PieceColor::from(ply.side_to_move).fen_char(),
        move_uci: format_uci_move(ply.mv),
        move_san: ply.san.clone(),
        fen_before: ply.fen_before.clone(),
        move_index: move_class,
        legal_moves,
    };
    Ok((snapshot, omitted))
}
