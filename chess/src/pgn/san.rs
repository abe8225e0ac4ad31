use cozy_chess::{Board, File, GameStatus, Move, Piece, Rank, Square};

use crate::rules;
use crate::types::PieceKind;

/// Parse Standard Algebraic Notation (SAN) move
pub fn parse_san(board: &Board, san: &str) -> Result<Move, SanError> {
    resolve_san(board, &rules::legal_moves(board), san)
}

/// Resolve a SAN token against an already generated legal-move list.
///
/// The returned move is in cozy-chess form (castling as king-takes-rook).
pub fn resolve_san(board: &Board, legal_moves: &[Move], san: &str) -> Result<Move, SanError> {
    let text = strip_suffixes(san);
    if text.is_empty() {
        return Err(SanError::InvalidFormat(san.to_string()));
    }

    match text {
        "O-O" | "0-0" => return resolve_castle(board, legal_moves, san, true),
        "O-O-O" | "0-0-0" => return resolve_castle(board, legal_moves, san, false),
        _ => {}
    }

    let pattern = SanPattern::parse(text).map_err(|e| match e {
        SanError::InvalidFormat(_) => SanError::InvalidFormat(san.to_string()),
        other => other,
    })?;

    let mut found: Option<Move> = None;
    for &mv in legal_moves {
        if !pattern.matches(board, mv) {
            continue;
        }
        if found.is_some() {
            return Err(SanError::AmbiguousMove(san.to_string()));
        }
        found = Some(mv);
    }

    found.ok_or_else(|| SanError::NoLegalMove(san.to_string()))
}

/// Format a move as SAN
///
/// `mv` must be legal on `board` and given in cozy-chess form.
pub fn format_san(board: &Board, mv: Move) -> String {
    let mut san = String::new();
    let Some(piece) = board.piece_on(mv.from) else {
        return crate::uci::format_uci_move(mv);
    };

    let is_castle = piece == Piece::King && board.color_on(mv.to) == Some(board.side_to_move());
    if is_castle {
        if mv.to.file() as u8 > mv.from.file() as u8 {
            san.push_str("O-O");
        } else {
            san.push_str("O-O-O");
        }
    } else {
        let is_capture = board.color_on(mv.to) == Some(!board.side_to_move())
            || (piece == Piece::Pawn && mv.from.file() != mv.to.file());

        if piece == Piece::Pawn {
            if is_capture {
                san.push(file_to_char(mv.from.file()));
            }
        } else {
            san.push(PieceKind::from(piece).to_char_upper());
            san.push_str(&disambiguation(board, mv, piece));
        }

        if is_capture {
            san.push('x');
        }
        san.push_str(&mv.to.to_string());

        if let Some(promo) = mv.promotion {
            san.push('=');
            san.push(PieceKind::from(promo).to_char_upper());
        }
    }

    let mut after = board.clone();
    after.play_unchecked(mv);
    if after.status() == GameStatus::Won {
        san.push('#');
    } else if !after.checkers().is_empty() {
        san.push('+');
    }

    san
}

/// Minimal origin qualifier distinguishing `mv` from other moves of the same
/// piece type to the same square.
fn disambiguation(board: &Board, mv: Move, piece: Piece) -> String {
    let rivals: Vec<Square> = rules::legal_moves(board)
        .into_iter()
        .filter(|other| {
            other.to == mv.to
                && other.from != mv.from
                && board.piece_on(other.from) == Some(piece)
        })
        .map(|other| other.from)
        .collect();

    if rivals.is_empty() {
        return String::new();
    }

    let shares_file = rivals.iter().any(|sq| sq.file() == mv.from.file());
    let shares_rank = rivals.iter().any(|sq| sq.rank() == mv.from.rank());

    if !shares_file {
        file_to_char(mv.from.file()).to_string()
    } else if !shares_rank {
        rank_to_char(mv.from.rank()).to_string()
    } else {
        mv.from.to_string()
    }
}

fn resolve_castle(
    board: &Board,
    legal_moves: &[Move],
    san: &str,
    kingside: bool,
) -> Result<Move, SanError> {
    let king = board.king(board.side_to_move());
    legal_moves
        .iter()
        .copied()
        .find(|mv| {
            mv.from == king
                && board.color_on(mv.to) == Some(board.side_to_move())
                && (mv.to.file() as u8 > mv.from.file() as u8) == kingside
        })
        .ok_or_else(|| SanError::NoLegalMove(san.to_string()))
}

/// Drop check, mate and annotation suffixes (`+`, `#`, `!`, `?`, `e.p.`).
fn strip_suffixes(san: &str) -> &str {
    let san = san.trim();
    let san = san.strip_suffix("e.p.").unwrap_or(san).trim_end();
    san.trim_end_matches(['+', '#', '!', '?'])
}

/// Decomposed SAN body: `[piece][file][rank][x]square[=promotion]`.
#[derive(Debug)]
struct SanPattern {
    piece: Piece,
    from_file: Option<File>,
    from_rank: Option<Rank>,
    to: Square,
    promotion: Option<Piece>,
}

impl SanPattern {
    fn parse(text: &str) -> Result<Self, SanError> {
        let mut chars: Vec<char> = text.chars().filter(|c| *c != 'x' && *c != '-' && *c != ':').collect();

        let piece = match chars.first() {
            Some(&c) if matches!(c, 'N' | 'B' | 'R' | 'Q' | 'K') => {
                let piece = PieceKind::from_char(c).map(Piece::from);
                chars.remove(0);
                piece.ok_or_else(|| SanError::InvalidFormat(text.to_string()))?
            }
            Some(_) => Piece::Pawn,
            None => return Err(SanError::InvalidFormat(text.to_string())),
        };

        let mut promotion = None;
        if let Some(eq) = chars.iter().position(|c| *c == '=') {
            let promo: String = chars[eq + 1..].iter().collect();
            promotion = Some(parse_promotion(&promo)?);
            chars.truncate(eq);
        } else if piece == Piece::Pawn {
            if let Some(last) = chars.last().copied() {
                if matches!(last, 'N' | 'B' | 'R' | 'Q') {
                    promotion = Some(parse_promotion(&last.to_string())?);
                    chars.pop();
                }
            }
        }

        if chars.len() < 2 || chars.len() > 4 {
            return Err(SanError::InvalidFormat(text.to_string()));
        }

        let split = chars.len() - 2;
        let to = parse_square(chars[split], chars[split + 1])?;

        let mut from_file = None;
        let mut from_rank = None;
        for &c in &chars[..split] {
            match c {
                'a'..='h' if from_file.is_none() && from_rank.is_none() => {
                    from_file = Some(char_to_file(c)?)
                }
                '1'..='8' if from_rank.is_none() => from_rank = Some(char_to_rank(c)?),
                'a'..='h' => return Err(SanError::InvalidFile(c)),
                _ => return Err(SanError::InvalidFormat(text.to_string())),
            }
        }

        Ok(Self {
            piece,
            from_file,
            from_rank,
            to,
            promotion,
        })
    }

    fn matches(&self, board: &Board, mv: Move) -> bool {
        if mv.to != self.to || mv.promotion != self.promotion {
            return false;
        }
        if board.piece_on(mv.from) != Some(self.piece) {
            return false;
        }
        // king-takes-own-rook is castling and only matches the O-O forms
        if board.color_on(mv.to) == Some(board.side_to_move()) {
            return false;
        }
        self.from_file.map_or(true, |f| mv.from.file() == f)
            && self.from_rank.map_or(true, |r| mv.from.rank() == r)
    }
}

fn parse_promotion(text: &str) -> Result<Piece, SanError> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if matches!(c.to_ascii_uppercase(), 'N' | 'B' | 'R' | 'Q') => {
            PieceKind::from_char(c)
                .map(Piece::from)
                .ok_or_else(|| SanError::InvalidPromotion(text.to_string()))
        }
        _ => Err(SanError::InvalidPromotion(text.to_string())),
    }
}

fn parse_square(file: char, rank: char) -> Result<Square, SanError> {
    match (char_to_file(file), char_to_rank(rank)) {
        (Ok(f), Ok(r)) => Ok(Square::new(f, r)),
        _ => Err(SanError::InvalidSquare(format!("{file}{rank}"))),
    }
}

fn char_to_file(c: char) -> Result<File, SanError> {
    match c {
        'a'..='h' => Ok(File::index(c as usize - 'a' as usize)),
        _ => Err(SanError::InvalidFile(c)),
    }
}

fn char_to_rank(c: char) -> Result<Rank, SanError> {
    match c {
        '1'..='8' => Ok(Rank::index(c as usize - '1' as usize)),
        _ => Err(SanError::InvalidRank(c)),
    }
}

fn file_to_char(file: File) -> char {
    (b'a' + file as u8) as char
}

fn rank_to_char(rank: Rank) -> char {
    (b'1' + rank as u8) as char
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SanError {
    #[error("No legal move found for: {0}")]
    NoLegalMove(String),
    #[error("Ambiguous move: {0}")]
    AmbiguousMove(String),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    #[error("Invalid square: {0}")]
    InvalidSquare(String),
    #[error("Invalid file: {0}")]
    InvalidFile(char),
    #[error("Invalid rank: {0}")]
    InvalidRank(char),
    #[error("Invalid promotion: {0}")]
    InvalidPromotion(String),
}
