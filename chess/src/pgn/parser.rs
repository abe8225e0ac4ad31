use std::collections::HashMap;

/// A parsed PGN game record: tag pairs plus the mainline move tokens.
///
/// Tokens are kept as text; resolving them to moves needs a position and is
/// the replayer's job.
#[derive(Debug, Clone)]
pub struct PgnGame {
    pub tags: HashMap<String, String>,
    pub tokens: Vec<String>,
    pub result: GameResult,
}

impl PgnGame {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    WhiteWins,
    BlackWins,
    Draw,
    Ongoing,
}

impl GameResult {
    /// Parse a movetext termination marker.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "1-0" => Some(Self::WhiteWins),
            "0-1" => Some(Self::BlackWins),
            "1/2-1/2" | "½-½" => Some(Self::Draw),
            "*" => Some(Self::Ongoing),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WhiteWins => "1-0",
            Self::BlackWins => "0-1",
            Self::Draw => "1/2-1/2",
            Self::Ongoing => "*",
        }
    }
}

/// Parse a PGN string into a game
///
/// The record must contain a tag-pair block, a movetext section and a
/// termination marker. A record that stops before its termination marker is
/// reported as [`PgnError::MissingTermination`].
pub fn parse_pgn(input: &str) -> Result<PgnGame, PgnError> {
    let mut tags = HashMap::new();
    let mut movetext = String::new();
    let mut in_movetext = false;

    for line in input.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('%') {
            continue;
        }
        if !in_movetext {
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('[') {
                let (name, value) = parse_tag(trimmed)?;
                tags.insert(name, value);
                continue;
            }
            in_movetext = true;
        }
        movetext.push_str(line);
        movetext.push('\n');
    }

    if tags.is_empty() {
        return Err(PgnError::MissingTags);
    }
    if movetext.trim().is_empty() {
        return Err(PgnError::MissingMoveText);
    }

    let (tokens, result) = tokenize_movetext(&movetext);
    let result = result.ok_or(PgnError::MissingTermination)?;

    Ok(PgnGame {
        tags,
        tokens,
        result,
    })
}

/// Parse one `[Name "value"]` line.
fn parse_tag(line: &str) -> Result<(String, String), PgnError> {
    let invalid = || PgnError::InvalidTag(line.to_string());

    let inner = line
        .strip_prefix('[')
        .and_then(|l| l.strip_suffix(']'))
        .ok_or_else(invalid)?
        .trim();

    let (name, rest) = inner.split_once(char::is_whitespace).ok_or_else(invalid)?;
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid());
    }

    let quoted = rest
        .trim()
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .ok_or_else(invalid)?;

    let mut value = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                value.push(escaped);
            }
        } else {
            value.push(c);
        }
    }

    Ok((name.to_string(), value))
}

/// Split movetext into mainline move tokens and the termination marker.
///
/// Comments, variations, NAGs, move numbers and annotation glyphs are
/// dropped. Anything after the termination marker is ignored.
fn tokenize_movetext(movetext: &str) -> (Vec<String>, Option<GameResult>) {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut chars = movetext.chars().peekable();
    let mut variation_depth = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                // unterminated comment swallows the rest of the record
                for inner in chars.by_ref() {
                    if inner == '}' {
                        break;
                    }
                }
                if variation_depth == 0 {
                    if let Some(result) = flush(&mut word, &mut tokens) {
                        return (tokens, Some(result));
                    }
                }
            }
            ';' => {
                if variation_depth == 0 {
                    if let Some(result) = flush(&mut word, &mut tokens) {
                        return (tokens, Some(result));
                    }
                }
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        break;
                    }
                }
            }
            '(' => {
                if variation_depth == 0 {
                    if let Some(result) = flush(&mut word, &mut tokens) {
                        return (tokens, Some(result));
                    }
                }
                variation_depth += 1;
            }
            ')' => {
                variation_depth = variation_depth.saturating_sub(1);
                word.clear();
            }
            '$' => {
                while chars.peek().is_some_and(|d| d.is_ascii_digit()) {
                    chars.next();
                }
            }
            c if c.is_whitespace() => {
                if variation_depth == 0 && !word.is_empty() {
                    if let Some(result) = flush(&mut word, &mut tokens) {
                        return (tokens, Some(result));
                    }
                }
                word.clear();
            }
            c => {
                if variation_depth == 0 {
                    word.push(c);
                }
            }
        }
    }

    if !word.is_empty() {
        if let Some(result) = flush(&mut word, &mut tokens) {
            return (tokens, Some(result));
        }
    }

    (tokens, None)
}

/// Push the pending word as a move token, or return the termination marker
/// it spells.
fn flush(word: &mut String, tokens: &mut Vec<String>) -> Option<GameResult> {
    let raw = std::mem::take(word);
    if let Some(result) = GameResult::from_token(&raw) {
        return Some(result);
    }
    if let Some(token) = clean_move_token(&raw) {
        tokens.push(token);
    }
    None
}

/// Strip move numbers and annotation glyphs from a raw movetext word.
fn clean_move_token(raw: &str) -> Option<String> {
    // "12." / "12..." / "12.e4"
    let digits = raw.chars().take_while(|c| c.is_ascii_digit()).count();
    let rest = if digits > 0 && raw[digits..].starts_with('.') {
        raw[digits..].trim_start_matches('.')
    } else {
        raw
    };

    if rest.chars().all(|c| c == '.') || rest == "e.p." {
        return None;
    }

    let token = rest.trim_end_matches(['!', '?']);
    (!token.is_empty()).then(|| token.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PgnError {
    #[error("Record has no tag-pair block")]
    MissingTags,
    #[error("Record has no move list")]
    MissingMoveText,
    #[error("Move list has no termination marker (truncated record)")]
    MissingTermination,
    #[error("Invalid tag: {0}")]
    InvalidTag(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAME: &str = r#"[Event "Rated Blitz game"]
[Site "https://lichess.org/abcd1234"]
[White "alice"]
[Black "bob \"the rook\""]
[Result "1-0"]
[WhiteElo "1500"]
[BlackElo "?"]

1. e4 { [%clk 0:03:00] } 1... e5 2. Nf3!? (2. Bc4 Nc6 (2... Nf6) 3. Qh5) 2... Nc6 $1
3. Bb5 a6?! ; a line comment 4. Ba4
4. Ba4 1-0
"#;

    #[test]
    fn parses_tags_with_escapes() {
        let game = parse_pgn(GAME).unwrap();
        assert_eq!(game.tag("White"), Some("alice"));
        assert_eq!(game.tag("Black"), Some("bob \"the rook\""));
        assert_eq!(game.tag("BlackElo"), Some("?"));
        assert_eq!(game.result, GameResult::WhiteWins);
    }

    #[test]
    fn tokenizes_mainline_only() {
        let game = parse_pgn(GAME).unwrap();
        assert_eq!(
            game.tokens,
            vec!["e4", "e5", "Nf3", "Nc6", "Bb5", "a6", "Ba4"]
        );
    }

    #[test]
    fn compact_move_numbers() {
        let game = parse_pgn("[Event \"x\"]\n\n1.e4 e5 2.Nf3 0-0 1/2-1/2").unwrap();
        assert_eq!(game.tokens, vec!["e4", "e5", "Nf3", "0-0"]);
        assert_eq!(game.result, GameResult::Draw);
    }

    #[test]
    fn result_only_movetext_is_valid() {
        let game = parse_pgn("[Event \"forfeit\"]\n\n0-1\n").unwrap();
        assert!(game.tokens.is_empty());
        assert_eq!(game.result, GameResult::BlackWins);
    }

    #[test]
    fn truncated_record_is_malformed() {
        let err = parse_pgn("[Event \"x\"]\n\n1. e4 e5 2. Nf").unwrap_err();
        assert_eq!(err, PgnError::MissingTermination);
    }

    #[test]
    fn missing_sections() {
        assert_eq!(parse_pgn("1. e4 e5 1-0").unwrap_err(), PgnError::MissingTags);
        assert_eq!(
            parse_pgn("[Event \"x\"]\n[Site \"y\"]\n").unwrap_err(),
            PgnError::MissingMoveText
        );
        assert!(matches!(
            parse_pgn("[Event x]\n\n1. e4 1-0").unwrap_err(),
            PgnError::InvalidTag(_)
        ));
    }

    #[test]
    fn blank_lines_inside_comments() {
        let record = "[Event \"x\"]\n\n1. e4 {a long\n\ncomment} e5 *\n";
        let game = parse_pgn(record).unwrap();
        assert_eq!(game.tokens, vec!["e4", "e5"]);
        assert_eq!(game.result, GameResult::Ongoing);
    }

    #[test]
    fn line_comment_right_after_a_move() {
        let record = "[Event \"x\"]\n\n1. e4 e5 2. Nf3; note\n2... Nc6 1-0\n";
        let game = parse_pgn(record).unwrap();
        assert_eq!(game.tokens, vec!["e4", "e5", "Nf3", "Nc6"]);
        assert_eq!(game.result, GameResult::WhiteWins);
    }
}
