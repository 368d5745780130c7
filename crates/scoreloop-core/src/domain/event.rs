//! Historical event identifiers and the ordered corpus they live in.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Opaque identifier naming one historical event.
///
/// Usually a result-page URL; the id itself is never interpreted beyond
/// [`EventId::key`], which exists only to make log lines readable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short key for logs: the `race_id` query parameter when present,
    /// otherwise the full id.
    pub fn key(&self) -> &str {
        static RACE_ID: OnceLock<Regex> = OnceLock::new();
        let re = RACE_ID
            .get_or_init(|| Regex::new(r"race_id=(\d+)").expect("valid race_id pattern"));
        re.captures(&self.0)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or(&self.0)
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Ordered, read-only list of historical events.
///
/// # Invariants
///
/// Entries keep their load order (earlier entries are older events) and are
/// never added, removed or reordered after construction. Samples are always
/// prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoricalCorpus {
    events: Vec<EventId>,
}

impl HistoricalCorpus {
    pub fn new(events: Vec<EventId>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The first `size` events, or the whole corpus when it is shorter.
    pub fn prefix(&self, size: usize) -> &[EventId] {
        &self.events[..size.min(self.events.len())]
    }

    /// The oldest event, used as the verifier's probe.
    pub fn first(&self) -> Option<&EventId> {
        self.events.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventId> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(n: usize) -> HistoricalCorpus {
        HistoricalCorpus::new((0..n).map(|i| EventId::new(format!("ev-{i}"))).collect())
    }

    #[test]
    fn test_prefix_takes_leading_entries() {
        let c = corpus(200);
        let p = c.prefix(80);
        assert_eq!(p.len(), 80);
        assert_eq!(p[0].as_str(), "ev-0");
        assert_eq!(p[79].as_str(), "ev-79");
    }

    #[test]
    fn test_prefix_clamps_to_corpus_len() {
        let c = corpus(50);
        assert_eq!(c.prefix(138).len(), 50);
        assert!(corpus(0).prefix(10).is_empty());
    }

    #[test]
    fn test_key_extracts_race_id() {
        let id = EventId::new("https://race.netkeiba.com/race/result.html?race_id=202410020611&rf=race_list");
        assert_eq!(id.key(), "202410020611");

        let plain = EventId::new("kokura-2019-07");
        assert_eq!(plain.key(), "kokura-2019-07");
    }
}
