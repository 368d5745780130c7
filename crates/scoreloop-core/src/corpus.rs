//! Historical corpus loader.
//!
//! The corpus file holds one event per line. Blank lines are skipped and a
//! leading markdown bullet (`- `) is stripped, so a list pasted from notes
//! loads unchanged. Loading happens once at startup and any failure is fatal.

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, warn};

use crate::domain::{EventId, HistoricalCorpus, Result, ScoreloopError};

/// Load the corpus from `path`.
pub fn load_corpus(path: &Path) -> Result<HistoricalCorpus> {
    let raw = std::fs::read_to_string(path).map_err(|e| ScoreloopError::CorpusLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let corpus = parse_corpus(&raw).map_err(|reason| ScoreloopError::CorpusLoad {
        path: path.to_path_buf(),
        reason,
    })?;

    info!(path = %path.display(), events = corpus.len(), "corpus loaded");
    Ok(corpus)
}

/// Parse corpus text. Returns the reason on malformed input.
pub fn parse_corpus(raw: &str) -> std::result::Result<HistoricalCorpus, String> {
    let mut events = Vec::new();
    let mut seen = HashSet::new();

    for (lineno, line) in raw.lines().enumerate() {
        let line = line.trim();
        let entry = line.strip_prefix('-').map(str::trim_start).unwrap_or(line);
        if entry.is_empty() {
            continue;
        }
        if entry.chars().any(char::is_whitespace) {
            return Err(format!(
                "line {}: event id must not contain whitespace: {entry:?}",
                lineno + 1
            ));
        }
        if !seen.insert(entry.to_string()) {
            warn!(line = lineno + 1, event = %entry, "duplicate corpus entry kept in place");
        }
        events.push(EventId::new(entry));
    }

    if events.is_empty() {
        return Err("corpus contains no events".to_string());
    }

    Ok(HistoricalCorpus::new(events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_strips_bullets_and_blank_lines() {
        let raw = "- https://race.netkeiba.com/race/result.html?race_id=202410020611\n\n\
                   -https://race.netkeiba.com/race/result.html?race_id=202310020611\n   \n\
                   plain-id\n";
        let corpus = parse_corpus(raw).unwrap();
        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.first().unwrap().key(), "202410020611");
        assert_eq!(corpus.prefix(3)[2].as_str(), "plain-id");
    }

    #[test]
    fn test_parse_strips_only_one_bullet() {
        let corpus = parse_corpus("- --dry-run-id\n--7\n").unwrap();
        let ids: Vec<&str> = corpus.iter().map(|e| e.as_str()).collect();
        assert_eq!(ids, vec!["--dry-run-id", "-7"]);
    }

    #[test]
    fn test_parse_keeps_duplicates_in_order() {
        let corpus = parse_corpus("a\nb\na\n").unwrap();
        let ids: Vec<&str> = corpus.iter().map(|e| e.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "a"]);
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(parse_corpus("\n - \n").is_err());
    }

    #[test]
    fn test_parse_rejects_embedded_whitespace() {
        let err = parse_corpus("ok\nnot ok\n").unwrap_err();
        assert!(err.contains("line 2"));
    }

    #[test]
    fn test_load_missing_file_is_fatal() {
        let dir = tempdir().unwrap();
        let err = load_corpus(&dir.path().join("pastRace.txt")).unwrap_err();
        assert!(matches!(err, ScoreloopError::CorpusLoad { .. }));
        assert!(err.is_fatal());
    }
}
