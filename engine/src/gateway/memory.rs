//! Conversation memory condenser
//!
//! Turns an owner's stored turns into a short context for the next request
//! and decides what, if anything, is worth remembering afterwards. Every
//! failure here degrades to "no memory"; none of it can fail a request.

use crate::config::MemoryConfig;
use crate::db::ConversationStore;
use crate::llm::{GenerationRequest, LLMError, LLMProvider, Message};
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, warn};

/// Reply the extractor gives when nothing durable was learned
pub const NO_FACTS_SENTINEL: &str = "NONE";

/// True when extractor output means "nothing to persist"
pub fn is_sentinel(text: &str) -> bool {
    let trimmed = text.trim().trim_end_matches('.').trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NO_FACTS_SENTINEL)
}

/// Keep the newest `max_chars` characters of a summary
fn bound_summary(summary: &str, max_chars: usize) -> String {
    let count = summary.chars().count();
    if count <= max_chars {
        return summary.to_string();
    }
    summary.chars().skip(count - max_chars).collect()
}

pub struct MemoryCondenser {
    provider: Arc<dyn LLMProvider>,
    store: Arc<dyn ConversationStore>,
    config: MemoryConfig,
}

impl MemoryCondenser {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        store: Arc<dyn ConversationStore>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    /// Most recent `limit` turns as one transcript, oldest first
    pub async fn load(&self, owner: &str, limit: i64) -> String {
        let turns = match self.store.recent(owner, limit).await {
            Ok(turns) => turns,
            Err(e) => {
                warn!(error = %e, "Failed to load conversation turns");
                return String::new();
            }
        };

        let mut transcript = String::new();
        for turn in turns {
            let _ = write!(
                transcript,
                "User: {}\nAssistant: {}\n\n",
                turn.user_message.trim(),
                turn.model_response.trim()
            );
        }
        transcript.truncate(transcript.trim_end().len());
        transcript
    }

    /// Compress a transcript into durable preferences, goals and constraints.
    ///
    /// An empty transcript returns empty without calling the backend.
    pub async fn condense(&self, transcript: &str) -> String {
        if transcript.trim().is_empty() {
            return String::new();
        }

        let prompt = format!(
            "Summarize the conversation below for use as context in future answers.\n\
             Keep only durable facts about the user: preferences, goals and constraints.\n\
             Drop small talk and one-off questions. Stay under {} tokens.\n\
             Reply with the summary only.\n\nCONVERSATION:\n{}",
            self.config.summary_token_budget, transcript
        );

        match self.call(prompt, Some(self.config.summary_token_budget)).await {
            Ok(summary) => summary.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "Conversation summarization failed");
                String::new()
            }
        }
    }

    /// Ask for new durable facts learned from one exchange.
    ///
    /// `None` when the extractor answers with the sentinel or fails.
    pub async fn extract(&self, question: &str, answer: &str) -> Option<String> {
        let prompt = format!(
            "From the exchange below, list any NEW durable facts about the user \
             (preferences, goals, constraints) worth remembering, one per line.\n\
             If there are none, reply with exactly {}.\n\n\
             USER: {}\nASSISTANT: {}",
            NO_FACTS_SENTINEL,
            question.trim(),
            answer.trim()
        );

        match self.call(prompt, Some(self.config.summary_token_budget)).await {
            Ok(facts) if is_sentinel(&facts) => {
                debug!("No new facts to remember");
                None
            }
            Ok(facts) => Some(facts.trim().to_string()),
            Err(e) => {
                warn!(error = %e, "Fact extraction failed");
                None
            }
        }
    }

    /// Context for a new request: the durable summary plus condensed recent turns
    pub async fn context_for(&self, owner: &str) -> Option<String> {
        let durable = match self.store.latest_summary(owner).await {
            Ok(summary) => summary.filter(|s| !s.trim().is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to load memory summary");
                None
            }
        };

        let transcript = self.load(owner, self.config.recent_turns).await;
        let recent = self.condense(&transcript).await;

        let mut context = String::new();
        if let Some(durable) = durable {
            let _ = write!(context, "Known about the user:\n{}\n\n", durable.trim());
        }
        if !recent.is_empty() {
            let _ = write!(context, "Recent conversation:\n{}", recent);
        }
        let context = context.trim_end().to_string();

        (!context.is_empty()).then_some(context)
    }

    /// Persist one answered turn.
    ///
    /// A new summary is written with it only when the answer came from a
    /// completed synthesis and extraction yielded facts.
    pub async fn remember(&self, owner: &str, question: &str, answer: &str, synthesized: bool) {
        let summary = if synthesized {
            match self.extract(question, answer).await {
                Some(facts) => Some(self.merged_summary(owner, &facts).await),
                None => None,
            }
        } else {
            None
        };

        if let Err(e) = self
            .store
            .append(owner, question, answer, summary.as_deref())
            .await
        {
            warn!(error = %e, "Failed to persist conversation turn");
        }
    }

    async fn merged_summary(&self, owner: &str, facts: &str) -> String {
        let prior = self.store.latest_summary(owner).await.ok().flatten();
        let merged = match prior {
            Some(prior) if !prior.trim().is_empty() => format!("{}\n{}", prior.trim(), facts),
            _ => facts.to_string(),
        };
        bound_summary(&merged, self.config.max_summary_chars)
    }

    async fn call(&self, prompt: String, max_tokens: Option<u32>) -> Result<String, LLMError> {
        let mut request = GenerationRequest::new(self.config.model.clone(), vec![Message::user(prompt)]);
        if let Some(max_tokens) = max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let timeout = self.config.timeout();
        match tokio::time::timeout(timeout, self.provider.generate(&request)).await {
            Err(_) => Err(LLMError::Timeout(timeout)),
            Ok(result) => result,
        }
    }
}
