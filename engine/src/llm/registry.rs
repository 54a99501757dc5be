//! Backend registry
//!
//! Static mapping from a short backend identifier to its display label and
//! upstream model, loaded from config. Selection applies the whitelist,
//! deduplication and the fan-out cap in one place.

use crate::config::BackendEntry;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct BackendRegistry {
    entries: Vec<BackendEntry>,
}

impl BackendRegistry {
    pub fn new(entries: Vec<BackendEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[BackendEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&BackendEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the caller's selection into the backends to dispatch.
    ///
    /// Unknown identifiers are dropped before the cap is applied, duplicates
    /// keep their first position, and anything past `cap` is silently cut.
    /// `None` selects the whole registry in registry order.
    pub fn select(&self, requested: Option<&[String]>, cap: usize) -> Vec<BackendEntry> {
        let Some(requested) = requested else {
            return self.entries.iter().take(cap).cloned().collect();
        };

        let mut seen = HashSet::new();
        requested
            .iter()
            .map(|id| id.trim())
            .filter(|id| seen.insert(*id))
            .filter_map(|id| self.get(id))
            .take(cap)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn ids(selected: &[BackendEntry]) -> Vec<&str> {
        selected.iter().map(|b| b.id.as_str()).collect()
    }

    fn owned(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn registry() -> BackendRegistry {
        BackendRegistry::new(Config::default().backends)
    }

    #[test]
    fn test_five_requested_capped_at_four() {
        let requested = owned(&["deepseek", "llama", "glm", "qwen", "essential"]);
        let selected = registry().select(Some(&requested), 4);
        assert_eq!(ids(&selected), vec!["deepseek", "llama", "glm", "qwen"]);
    }

    #[test]
    fn test_unknown_ids_do_not_count_toward_cap() {
        let requested = owned(&["bogus", "llama", "nope", "glm", "qwen", "moonshot", "deepseek"]);
        let selected = registry().select(Some(&requested), 4);
        assert_eq!(ids(&selected), vec!["llama", "glm", "qwen", "moonshot"]);
    }

    #[test]
    fn test_duplicates_keep_first_position() {
        let requested = owned(&["glm", "llama", "glm", "llama"]);
        let selected = registry().select(Some(&requested), 4);
        assert_eq!(ids(&selected), vec!["glm", "llama"]);
    }

    #[test]
    fn test_none_selects_registry_up_to_cap() {
        let selected = registry().select(None, 4);
        assert_eq!(ids(&selected), vec!["deepseek", "llama", "glm", "qwen"]);
    }

    #[test]
    fn test_empty_or_unknown_selection_is_empty() {
        assert!(registry().select(Some(&[]), 4).is_empty());
        assert!(registry().select(Some(&owned(&["gpt-9"])), 4).is_empty());
    }

    #[test]
    fn test_lookup() {
        let registry = registry();
        assert_eq!(registry.get("moonshot").map(|b| b.label.as_str()), Some("Kimi"));
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.len(), 6);
    }
}
