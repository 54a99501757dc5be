use chorus_engine::config::{BackendEntry, Config};
use chorus_engine::gateway::strip_repetition;
use chorus_engine::llm::BackendRegistry;
use proptest::prelude::*;
use std::collections::HashSet;

fn registry() -> BackendRegistry {
    BackendRegistry::new(Config::default().backends)
}

proptest! {
    #[test]
    fn test_strip_repetition_is_idempotent(
        sentences in prop::collection::vec("[A-Za-z ]{1,20}[.!?]", 0..12)
    ) {
        let text = sentences.join(" ");
        let once = strip_repetition(&text);
        let twice = strip_repetition(&once);
        prop_assert_eq!(&once, &twice);
        prop_assert!(once.len() <= text.len());
    }

    #[test]
    fn test_strip_repetition_keeps_unique_text(
        words in prop::collection::hash_set("[a-z]{3,10}", 1..8)
    ) {
        let text = words
            .iter()
            .map(|w| format!("{}.", w))
            .collect::<Vec<_>>()
            .join(" ");
        prop_assert_eq!(strip_repetition(&text), text);
    }

    #[test]
    fn test_selection_invariants(
        requested in prop::collection::vec(
            prop_oneof![
                Just("deepseek".to_string()),
                Just("llama".to_string()),
                Just("glm".to_string()),
                Just("qwen".to_string()),
                Just("essential".to_string()),
                Just("moonshot".to_string()),
                "[a-z]{1,8}",
            ],
            0..12
        ),
        cap in 1usize..8,
    ) {
        let registry = registry();
        let selected = registry.select(Some(requested.as_slice()), cap);

        prop_assert!(selected.len() <= cap);

        let ids: HashSet<&str> = selected.iter().map(|b| b.id.as_str()).collect();
        prop_assert_eq!(ids.len(), selected.len());

        for backend in &selected {
            prop_assert!(registry.get(&backend.id).is_some());
            prop_assert!(requested.iter().any(|r| r == &backend.id));
        }

        // Order follows the request
        let positions: Vec<usize> = selected
            .iter()
            .map(|b| requested.iter().position(|r| r == &b.id).unwrap())
            .collect();
        prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_default_selection_is_registry_prefix(cap in 1usize..10) {
        let entries: Vec<BackendEntry> = Config::default().backends;
        let selected = registry().select(None, cap);
        let expected: Vec<BackendEntry> = entries.into_iter().take(cap).collect();
        prop_assert_eq!(selected, expected);
    }
}
