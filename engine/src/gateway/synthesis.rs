//! Synthesis gate: decides whether to reconcile and runs the call

use super::ResultSet;
use crate::config::SynthesisConfig;
use crate::llm::{GenerationRequest, LLMError, LLMProvider, Message};
use regex::Regex;
use sdk::types::{InvocationResult, SynthesisOutcome};
use std::collections::HashSet;
use std::fmt::Write;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

/// Sentence terminator plus the whitespace that follows it
static SENTENCE_END: OnceLock<Regex> = OnceLock::new();

fn sentence_end() -> &'static Regex {
    SENTENCE_END.get_or_init(|| Regex::new(r"[.!?]+(?:\s+|$)").expect("Invalid sentence pattern"))
}

/// Drop sentences that repeat an earlier one (case-insensitive, trimmed).
///
/// Survivors keep their original order and separators. Applying it twice
/// gives the same text as applying it once.
pub fn strip_repetition(text: &str) -> String {
    let mut segments = Vec::new();
    let mut start = 0;
    for m in sentence_end().find_iter(text) {
        segments.push(&text[start..m.end()]);
        start = m.end();
    }
    if start < text.len() {
        segments.push(&text[start..]);
    }

    let mut seen = HashSet::new();
    let mut kept = String::with_capacity(text.len());
    let mut dropped = false;
    for segment in segments {
        let norm = segment.trim().to_lowercase();
        if norm.is_empty() || seen.insert(norm) {
            kept.push_str(segment);
        } else {
            dropped = true;
        }
    }

    if dropped {
        kept.truncate(kept.trim_end().len());
    }
    kept
}

/// Minimum successes needed before reconciling; never below one
pub fn threshold(min_for_synthesis: i64) -> usize {
    min_for_synthesis.max(1) as usize
}

pub struct SynthesisGate {
    provider: Arc<dyn LLMProvider>,
    config: SynthesisConfig,
}

impl SynthesisGate {
    pub fn new(provider: Arc<dyn LLMProvider>, config: SynthesisConfig) -> Self {
        Self { provider, config }
    }

    /// Reconcile the successful results, or explain why not.
    ///
    /// Never fails: a failed reconciliation call is reported as an
    /// `Error` outcome and the individual answers stay valid.
    pub async fn run(
        &self,
        question: &str,
        context: Option<&str>,
        results: &ResultSet,
        min_for_synthesis: i64,
    ) -> SynthesisOutcome {
        let required = threshold(min_for_synthesis);
        let successes: Vec<&InvocationResult> = results.successes().collect();

        if successes.len() < required {
            info!(
                successful = successes.len(),
                attempted = results.attempted(),
                required,
                "Skipping synthesis"
            );
            return SynthesisOutcome::SkippedInsufficient {
                reason: format!(
                    "{}/{} successful, need {}+",
                    successes.len(),
                    results.attempted(),
                    required
                ),
                successful: successes.len(),
                attempted: results.attempted(),
                required,
            };
        }

        let prompt = build_prompt(question, context, &successes);
        let request = GenerationRequest::new(self.config.model.clone(), vec![Message::user(prompt)])
            .with_max_tokens(self.config.max_tokens)
            .with_frequency_penalty(self.config.frequency_penalty);

        let timeout = self.config.timeout();
        let outcome = match tokio::time::timeout(timeout, self.provider.generate(&request)).await {
            Err(_) => Err(LLMError::Timeout(timeout)),
            Ok(Err(e)) => Err(e),
            Ok(Ok(text)) if text.trim().is_empty() => Err(LLMError::EmptyResponse),
            Ok(Ok(text)) => Ok(text),
        };

        match outcome {
            Ok(text) => SynthesisOutcome::Completed {
                model: self.config.label.clone(),
                response: strip_repetition(&text),
            },
            Err(e) => {
                warn!(error = %e, "Synthesis call failed");
                SynthesisOutcome::Error {
                    model: self.config.label.clone(),
                    error: e.to_string(),
                }
            }
        }
    }
}

/// Build the reconciliation prompt from the question and successful answers
pub fn build_prompt(
    question: &str,
    context: Option<&str>,
    successes: &[&InvocationResult],
) -> String {
    let mut formatted = String::new();
    for result in successes {
        let _ = writeln!(
            formatted,
            "===== {} =====\n{}\n",
            result.label,
            result.text().unwrap_or_default()
        );
    }

    let mut prompt = String::from(
        "You are synthesizing multiple AI responses into ONE correct answer.\n\n",
    );
    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        let _ = write!(prompt, "CONVERSATION CONTEXT:\n{}\n\n", context.trim());
    }
    let _ = write!(
        prompt,
        "USER QUESTION:\n{}\n\nMODEL RESPONSES:\n{}\n",
        question.trim(),
        formatted
    );
    prompt.push_str(
        "RULES:\n\
         - Use only information from the model responses\n\
         - Resolve conflicts logically\n\
         - Do not invent facts\n\n\
         OUTPUT FORMAT:\n\n\
         ===REASONING===\n\
         (short explanation)\n\n\
         ===ANSWER===\n\
         (final answer)\n",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::{Reply, ScriptedProvider};
    use std::time::Duration;

    fn ok(label: &str, text: &str) -> InvocationResult {
        InvocationResult::succeeded(label.to_lowercase(), label, text, Duration::from_millis(5), false)
    }

    fn failed(label: &str) -> InvocationResult {
        InvocationResult::failed(label.to_lowercase(), label, "down", Duration::from_millis(5), true)
    }

    fn config() -> SynthesisConfig {
        SynthesisConfig {
            model: "synth".to_string(),
            timeout_secs: 5,
            ..SynthesisConfig::default()
        }
    }

    #[test]
    fn test_strip_repetition_drops_repeated_sentences() {
        let text = "Paris is the capital. It is in France. paris is the capital.  It is in France.";
        assert_eq!(strip_repetition(text), "Paris is the capital. It is in France.");
    }

    #[test]
    fn test_strip_repetition_keeps_unique_text_untouched() {
        let text = "One. Two! Three? Four";
        assert_eq!(strip_repetition(text), text);
        assert_eq!(strip_repetition("trailing space.  "), "trailing space.  ");
        assert_eq!(strip_repetition(""), "");
    }

    #[test]
    fn test_strip_repetition_is_idempotent_on_sample() {
        let text = "A. b. A. c! B. d";
        let once = strip_repetition(text);
        assert_eq!(once, "A. b. c! d");
        assert_eq!(strip_repetition(&once), once);
    }

    #[test]
    fn test_threshold_floor() {
        assert_eq!(threshold(-3), 1);
        assert_eq!(threshold(0), 1);
        assert_eq!(threshold(3), 3);
    }

    #[test]
    fn test_prompt_format() {
        let a = ok("DeepSeek", "Paris.");
        let b = ok("Llama", "It's Paris.");
        let prompt = build_prompt("Capital of France?", Some("Prefers short answers"), &[&a, &b]);

        assert!(prompt.contains("USER QUESTION:\nCapital of France?"));
        assert!(prompt.contains("===== DeepSeek =====\nParis.\n"));
        assert!(prompt.contains("===== Llama =====\nIt's Paris.\n"));
        assert!(prompt.contains("CONVERSATION CONTEXT:\nPrefers short answers"));
        assert!(prompt.contains("===ANSWER==="));
    }

    #[tokio::test]
    async fn test_insufficient_successes_skip_without_call() {
        let provider = Arc::new(ScriptedProvider::new().on("synth", vec![Reply::Text("x")]));
        let gate = SynthesisGate::new(provider.clone(), config());
        let results: ResultSet = vec![ok("A", "a"), failed("B"), failed("C")].into_iter().collect();

        let outcome = gate.run("q", None, &results, 2).await;

        assert_eq!(
            outcome,
            SynthesisOutcome::SkippedInsufficient {
                reason: "1/3 successful, need 2+".to_string(),
                successful: 1,
                attempted: 3,
                required: 2,
            }
        );
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_completed_uses_limits_and_strips_repetition() {
        let provider = Arc::new(
            ScriptedProvider::new().on("synth", vec![Reply::Text("Paris. Paris. Final.")]),
        );
        let gate = SynthesisGate::new(provider.clone(), config());
        let results: ResultSet = vec![ok("A", "a"), ok("B", "b")].into_iter().collect();

        let outcome = gate.run("q", None, &results, 2).await;

        assert_eq!(outcome.text(), Some("Paris. Final."));
        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].max_tokens, Some(1500));
        assert_eq!(calls[0].frequency_penalty, Some(1.2));
    }

    #[tokio::test]
    async fn test_call_failure_is_error_outcome() {
        let provider = Arc::new(
            ScriptedProvider::new().on("synth", vec![Reply::Fail(LLMError::RateLimitExceeded)]),
        );
        let gate = SynthesisGate::new(provider.clone(), config());
        let results: ResultSet = vec![ok("A", "a")].into_iter().collect();

        let outcome = gate.run("q", None, &results, 1).await;

        assert!(matches!(
            outcome,
            SynthesisOutcome::Error { ref model, ref error } if model == "GPT-OSS" && error == "Rate limit exceeded"
        ));
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_synthesis_is_error() {
        let provider = Arc::new(ScriptedProvider::new().on("synth", vec![Reply::Text(" ")]));
        let gate = SynthesisGate::new(provider, config());
        let results: ResultSet = vec![ok("A", "a")].into_iter().collect();

        let outcome = gate.run("q", None, &results, 1).await;
        assert!(matches!(outcome, SynthesisOutcome::Error { .. }));
    }
}
