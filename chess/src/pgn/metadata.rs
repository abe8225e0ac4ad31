//! Typed per-game statistics extracted from PGN tag pairs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::parser::PgnGame;
use crate::replay::StartPosition;

/// A player rating as found in a `WhiteElo` / `BlackElo` tag.
///
/// Rating tags are free text in the wild (`"?"`, `""`, `"1500?"`); anything
/// that is not a plain integer is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rating {
    Known(i32),
    #[default]
    Unknown,
}

impl Rating {
    pub fn parse(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.trim().parse::<i32>().ok())
            .map_or(Self::Unknown, Self::Known)
    }

    pub fn known(self) -> Option<i32> {
        match self {
            Self::Known(v) => Some(v),
            Self::Unknown => None,
        }
    }
}

impl From<Option<i64>> for Rating {
    fn from(value: Option<i64>) -> Self {
        value
            .and_then(|v| i32::try_from(v).ok())
            .map_or(Self::Unknown, Self::Known)
    }
}

/// Statistics for one game, taken from the Seven Tag Roster plus the
/// common lichess extensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameMetadata {
    pub event: Option<String>,
    pub site: Option<String>,
    pub date: Option<String>,
    pub round: Option<String>,
    pub white: Option<String>,
    pub black: Option<String>,
    pub result: Option<String>,
    pub white_elo: Rating,
    pub black_elo: Rating,
    pub white_rating_diff: Option<i32>,
    pub black_rating_diff: Option<i32>,
    pub time_control: Option<String>,
    pub eco: Option<String>,
    pub opening: Option<String>,
    pub termination: Option<String>,
    pub utc_date: Option<String>,
    pub utc_time: Option<String>,
    pub variant: Option<String>,
    pub total_moves: u32,
}

impl GameMetadata {
    pub fn from_game(game: &PgnGame) -> Self {
        let mut meta = Self::from_tags(&game.tags, game.tokens.len());
        if meta.result.is_none() {
            meta.result = Some(game.result.as_str().to_string());
        }
        meta
    }

    pub fn from_tags(tags: &HashMap<String, String>, move_count: usize) -> Self {
        let tag = |name: &str| tags.get(name).map(String::as_str);
        let text = |name: &str| {
            tag(name)
                .map(str::trim)
                .filter(|v| !v.is_empty() && *v != "?")
                .map(str::to_string)
        };
        let diff = |name: &str| tag(name).and_then(|v| v.trim().parse::<i32>().ok());

        Self {
            event: text("Event"),
            site: text("Site"),
            date: text("Date"),
            round: text("Round"),
            white: text("White"),
            black: text("Black"),
            result: text("Result"),
            white_elo: Rating::parse(tag("WhiteElo")),
            black_elo: Rating::parse(tag("BlackElo")),
            white_rating_diff: diff("WhiteRatingDiff"),
            black_rating_diff: diff("BlackRatingDiff"),
            time_control: text("TimeControl"),
            eco: text("ECO"),
            opening: text("Opening"),
            termination: text("Termination"),
            utc_date: text("UTCDate"),
            utc_time: text("UTCTime"),
            variant: text("Variant"),
            total_moves: u32::try_from(move_count).unwrap_or(u32::MAX),
        }
    }

    /// Whether the game is plain chess. `From Position` games are standard
    /// chess with a custom start and are accepted.
    pub fn is_standard_variant(&self) -> bool {
        match self.variant.as_deref() {
            None => true,
            Some(v) => {
                let v = v.to_ascii_lowercase();
                v == "standard" || v == "from position" || v == "chess"
            }
        }
    }
}

/// Start position declared by the `SetUp` / `FEN` tags.
pub fn start_position(game: &PgnGame) -> StartPosition {
    let set_up = game.tag("SetUp").map(str::trim);
    match (set_up, game.tag("FEN")) {
        (Some("0"), _) | (_, None) => StartPosition::Standard,
        (_, Some(fen)) => StartPosition::Fen(fen.trim().to_string()),
    }
}
