//! Single-backend invocation with timeout and one retry

use super::InvocationRequest;
use crate::llm::{GenerationRequest, LLMError, LLMProvider, Message};
use sdk::types::InvocationResult;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Calls one backend and always yields an `InvocationResult`.
///
/// Any failure (transport error, timeout, blank text) is followed by a
/// fixed backoff and exactly one more attempt with the same arguments.
pub struct ModelInvoker {
    provider: Arc<dyn LLMProvider>,
    backoff: Duration,
}

impl ModelInvoker {
    pub fn new(provider: Arc<dyn LLMProvider>, backoff: Duration) -> Self {
        Self { provider, backoff }
    }

    pub async fn invoke(&self, request: &InvocationRequest) -> InvocationResult {
        let generation = Self::generation_request(request);

        let (first, elapsed) = self.attempt(&generation, request.timeout).await;
        let error = match first {
            Ok(text) => {
                debug!(backend = %request.backend, elapsed_ms = elapsed.as_millis() as u64, "Backend answered");
                return InvocationResult::succeeded(
                    &request.backend,
                    &request.label,
                    text,
                    elapsed,
                    false,
                );
            }
            Err(e) => e,
        };

        warn!(backend = %request.backend, error = %error, "Backend failed, retrying once");
        tokio::time::sleep(self.backoff).await;

        let (second, elapsed) = self.attempt(&generation, request.timeout).await;
        match second {
            Ok(text) => InvocationResult::succeeded(
                &request.backend,
                &request.label,
                text,
                elapsed,
                true,
            ),
            Err(e) => {
                warn!(backend = %request.backend, error = %e, "Backend failed after retry");
                InvocationResult::failed(
                    &request.backend,
                    &request.label,
                    e.to_string(),
                    elapsed,
                    true,
                )
            }
        }
    }

    fn generation_request(request: &InvocationRequest) -> GenerationRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(context) = request.context.as_deref().filter(|c| !c.trim().is_empty()) {
            messages.push(Message::system(format!(
                "Context from earlier in this conversation:\n{}",
                context
            )));
        }
        messages.push(Message::user(request.prompt.clone()));
        GenerationRequest::new(request.model.clone(), messages)
    }

    async fn attempt(
        &self,
        generation: &GenerationRequest,
        timeout: Duration,
    ) -> (Result<String, LLMError>, Duration) {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(timeout, self.provider.generate(generation)).await
        {
            Err(_) => Err(LLMError::Timeout(timeout)),
            Ok(Err(e)) => Err(e),
            Ok(Ok(text)) if text.trim().is_empty() => Err(LLMError::EmptyResponse),
            Ok(Ok(text)) => Ok(text),
        };
        (outcome, started.elapsed())
    }
}
