//! Fan-out / fan-in gateway core
//!
//! One chat request flows through:
//!
//! 1. `MemoryCondenser` builds a bounded context from the owner's history
//! 2. `FanOutDispatcher` runs one `ModelInvoker` per selected backend
//! 3. `EventEmitter` relays every result the moment it completes
//! 4. `SynthesisGate` reconciles the successful answers once all have settled
//! 5. `MemoryCondenser` persists the turn, then the stream ends with `done`
//!
//! `ChatPipeline` wires these together.

use sdk::types::InvocationResult;
use std::time::Duration;

pub mod dispatcher;
pub mod emitter;
pub mod invoker;
pub mod memory;
pub mod pipeline;
pub mod synthesis;

pub use dispatcher::FanOutDispatcher;
pub use emitter::EventEmitter;
pub use invoker::ModelInvoker;
pub use memory::MemoryCondenser;
pub use pipeline::ChatPipeline;
pub use synthesis::{strip_repetition, SynthesisGate};

/// Everything needed to call one backend for one user request
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub backend: String,
    pub label: String,
    /// Upstream model name
    pub model: String,
    pub prompt: String,
    /// Condensed conversation memory, sent as a system message
    pub context: Option<String>,
    pub timeout: Duration,
}

/// Results of one request's dispatch phase, in completion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    results: Vec<InvocationResult>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: InvocationResult) {
        self.results.push(result);
    }

    pub fn attempted(&self) -> usize {
        self.results.len()
    }

    pub fn successes(&self) -> impl Iterator<Item = &InvocationResult> {
        self.results.iter().filter(|r| r.success)
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    /// Text of the earliest successful result
    pub fn first_answer(&self) -> Option<&str> {
        self.successes().find_map(|r| r.text())
    }

    pub fn as_slice(&self) -> &[InvocationResult] {
        &self.results
    }
}

impl FromIterator<InvocationResult> for ResultSet {
    fn from_iter<I: IntoIterator<Item = InvocationResult>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted provider shared by the gateway unit tests

    use crate::llm::{GenerationRequest, LLMError, LLMProvider, Result};
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    /// One scripted reply
    #[derive(Debug, Clone)]
    pub enum Reply {
        Text(&'static str),
        Fail(LLMError),
        /// Reply after sleeping, used to exercise timeouts and ordering
        Slow(Duration, &'static str),
    }

    /// Provider answering from per-model queues; the last reply repeats
    #[derive(Default)]
    pub struct ScriptedProvider {
        script: Mutex<HashMap<String, VecDeque<Reply>>>,
        calls: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(self, model: &str, replies: Vec<Reply>) -> Self {
            self.script
                .lock()
                .unwrap()
                .insert(model.to_string(), replies.into());
            self
        }

        pub fn calls(&self) -> Vec<GenerationRequest> {
            self.calls.lock().unwrap().clone()
        }

        pub fn calls_for(&self, model: &str) -> usize {
            self.calls().iter().filter(|c| c.model == model).count()
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<String> {
            self.calls.lock().unwrap().push(request.clone());
            let reply = {
                let mut script = self.script.lock().unwrap();
                let queue = script.get_mut(&request.model);
                match queue {
                    Some(queue) if queue.len() > 1 => queue.pop_front(),
                    Some(queue) => queue.front().cloned(),
                    None => None,
                }
            };
            match reply {
                Some(Reply::Text(text)) => Ok(text.to_string()),
                Some(Reply::Fail(err)) => Err(err),
                Some(Reply::Slow(delay, text)) => {
                    tokio::time::sleep(delay).await;
                    Ok(text.to_string())
                }
                None => Err(LLMError::InvalidRequest(format!(
                    "no script for {}",
                    request.model
                ))),
            }
        }
    }
}
