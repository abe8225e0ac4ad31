//! Source manifests: JSON lists of archives to ingest.
//!
//! ```json
//! [
//!   { "uri": "https://database.lichess.org/standard/lichess_db_standard_rated_2013-01.pgn.zst",
//!     "games": 121332, "size_bytes": 17000000 },
//!   { "uri": "/data/local.pgn" }
//! ]
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::persistence::NewSource;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub games: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl From<ManifestEntry> for NewSource {
    fn from(entry: ManifestEntry) -> Self {
        Self {
            uri: entry.uri,
            declared_games: entry.games,
            size_bytes: entry.size_bytes,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse manifest {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Manifest entry {0} has an empty uri")]
    EmptyUri(usize),
}

pub fn parse_manifest(json: &str, path: &str) -> Result<Vec<NewSource>, ManifestError> {
    let entries: Vec<ManifestEntry> =
        serde_json::from_str(json).map_err(|source| ManifestError::Json {
            path: path.to_string(),
            source,
        })?;

    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            if entry.uri.trim().is_empty() {
                return Err(ManifestError::EmptyUri(i));
            }
            Ok(NewSource::from(entry))
        })
        .collect()
}

pub fn load_manifest(path: &Path) -> Result<Vec<NewSource>, ManifestError> {
    let display = path.display().to_string();
    let json = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: display.clone(),
        source,
    })?;
    parse_manifest(&json, &display)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_optional_fields() {
        let sources = parse_manifest(
            r#"[{"uri": "a.pgn.zst", "games": 12, "size_bytes": 3400}, {"uri": "b.pgn"}]"#,
            "m.json",
        )
        .unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].declared_games, Some(12));
        assert_eq!(sources[0].size_bytes, Some(3400));
        assert_eq!(sources[1], NewSource::new("b.pgn"));
    }

    #[test]
    fn rejects_bad_manifests() {
        assert!(matches!(
            parse_manifest(r#"{"uri": "a"}"#, "m.json"),
            Err(ManifestError::Json { .. })
        ));
        assert!(matches!(
            parse_manifest(r#"[{"uri": " "}]"#, "m.json"),
            Err(ManifestError::EmptyUri(0))
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, r#"[{"uri": "x.pgn"}]"#).unwrap();
        assert_eq!(load_manifest(&path).unwrap().len(), 1);
        assert!(matches!(
            load_manifest(&dir.path().join("missing.json")),
            Err(ManifestError::Io { .. })
        ));
    }
}
