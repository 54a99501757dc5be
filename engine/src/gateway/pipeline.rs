//! The single parameterized chat pipeline

use super::{
    EventEmitter, FanOutDispatcher, InvocationRequest, MemoryCondenser, ModelInvoker, ResultSet,
    SynthesisGate,
};
use crate::config::{Config, DispatchConfig};
use crate::db::ConversationStore;
use crate::llm::{BackendRegistry, LLMProvider};
use sdk::errors::GatewayError;
use sdk::types::{ChatRequest, StreamEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// A validated request, ready to dispatch
#[derive(Debug, Clone)]
struct PreparedChat {
    request: ChatRequest,
    invocations: Vec<InvocationRequest>,
}

/// Memory → fan-out → synthesis → memory write-back, streamed as events.
#[derive(Clone)]
pub struct ChatPipeline {
    registry: Arc<BackendRegistry>,
    dispatcher: Arc<FanOutDispatcher>,
    gate: Arc<SynthesisGate>,
    memory: Option<Arc<MemoryCondenser>>,
    dispatch: DispatchConfig,
}

impl ChatPipeline {
    pub fn new(
        registry: Arc<BackendRegistry>,
        dispatcher: Arc<FanOutDispatcher>,
        gate: Arc<SynthesisGate>,
        memory: Option<Arc<MemoryCondenser>>,
        dispatch: DispatchConfig,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            gate,
            memory,
            dispatch,
        }
    }

    /// Wire a pipeline from config around one provider.
    ///
    /// Memory is active only with a store and `memory.enabled`.
    pub fn from_config(
        config: &Config,
        provider: Arc<dyn LLMProvider>,
        store: Option<Arc<dyn ConversationStore>>,
    ) -> Self {
        let invoker = ModelInvoker::new(Arc::clone(&provider), config.dispatch.retry_backoff());
        let dispatcher = FanOutDispatcher::new(Arc::new(invoker), config.dispatch.max_backends);
        let gate = SynthesisGate::new(Arc::clone(&provider), config.synthesis.clone());
        let memory = store
            .filter(|_| config.memory.enabled)
            .map(|store| Arc::new(MemoryCondenser::new(provider, store, config.memory.clone())));

        Self::new(
            Arc::new(BackendRegistry::new(config.backends.clone())),
            Arc::new(dispatcher),
            Arc::new(gate),
            memory,
            config.dispatch.clone(),
        )
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn max_backends(&self) -> usize {
        self.dispatch.max_backends
    }

    pub fn memory_enabled(&self) -> bool {
        self.memory.is_some()
    }

    /// Validate a request and build its invocations.
    ///
    /// Nothing is dispatched when this fails.
    fn prepare(&self, request: ChatRequest) -> Result<PreparedChat, GatewayError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(GatewayError::EmptyMessage);
        }

        let selected = self
            .registry
            .select(request.models.as_deref(), self.dispatch.max_backends);
        if selected.is_empty() {
            return Err(GatewayError::NoValidModels);
        }

        let prompt = match self.dispatch.prompt_suffix.trim() {
            "" => message.to_string(),
            suffix => format!("{}\n\n{}", message, suffix),
        };

        let invocations = selected
            .into_iter()
            .map(|backend| InvocationRequest {
                backend: backend.id,
                label: backend.label,
                model: backend.model,
                prompt: prompt.clone(),
                context: None,
                timeout: self.dispatch.invoke_timeout(),
            })
            .collect();

        Ok(PreparedChat {
            request,
            invocations,
        })
    }

    /// Validate and start a chat request.
    ///
    /// On success the receiver yields the request's events and always ends
    /// with `done`. Validation errors are returned before any event exists.
    pub fn run(
        &self,
        request: ChatRequest,
        owner: Option<String>,
    ) -> Result<mpsc::UnboundedReceiver<StreamEvent>, GatewayError> {
        let prepared = self.prepare(request)?;
        let (emitter, rx) = EventEmitter::channel();

        let request_id = Uuid::new_v4();
        let span = info_span!(
            "chat",
            request_id = %request_id,
            backends = prepared.invocations.len(),
            owner = owner.is_some()
        );

        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.execute(prepared, owner, emitter).await }.instrument(span));

        Ok(rx)
    }

    /// Run a request to completion and collect every event
    pub async fn run_collect(
        &self,
        request: ChatRequest,
        owner: Option<String>,
    ) -> Result<Vec<StreamEvent>, GatewayError> {
        let mut rx = self.run(request, owner)?;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            let done = event.is_done();
            events.push(event);
            if done {
                break;
            }
        }
        Ok(events)
    }

    async fn execute(&self, prepared: PreparedChat, owner: Option<String>, mut emitter: EventEmitter) {
        let PreparedChat {
            request,
            mut invocations,
        } = prepared;
        let question = request.message.trim().to_string();

        let memory = match (&self.memory, owner.as_deref()) {
            (Some(memory), Some(owner)) => Some((memory, owner)),
            _ => None,
        };

        let context = match memory {
            Some((memory, owner)) => memory.context_for(owner).await,
            None => None,
        };
        for invocation in &mut invocations {
            invocation.context = context.clone();
        }

        info!(backends = invocations.len(), "Dispatching");
        let mut rx = self.dispatcher.dispatch(invocations);
        let mut results = ResultSet::new();
        while let Some(result) = rx.recv().await {
            emitter.model_response(result.clone());
            results.push(result);
        }

        if emitter.is_closed() {
            debug!("Caller disconnected, skipping synthesis and memory");
            return;
        }

        let outcome = if request.synthesize {
            let outcome = self
                .gate
                .run(&question, context.as_deref(), &results, request.min_for_synthesis)
                .await;
            emitter.synthesis(outcome.clone());
            Some(outcome)
        } else {
            None
        };

        if let Some((memory, owner)) = memory {
            let synthesized = outcome.as_ref().and_then(|o| o.text());
            let answer = synthesized.or_else(|| results.first_answer());
            if let Some(answer) = answer {
                memory
                    .remember(owner, &question, answer, synthesized.is_some())
                    .await;
            }
        }

        info!(
            successful = results.success_count(),
            attempted = results.attempted(),
            "Chat complete"
        );
        emitter.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::{Reply, ScriptedProvider};
    use crate::llm::LLMError;
    use sdk::types::SynthesisOutcome;

    fn config() -> Config {
        let mut config = Config::default();
        config.dispatch.retry_backoff_ms = 1;
        config
    }

    fn pipeline(provider: ScriptedProvider) -> (ChatPipeline, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider);
        (ChatPipeline::from_config(&config(), provider.clone(), None), provider)
    }

    fn model_of(id: &str) -> String {
        config()
            .backends
            .into_iter()
            .find(|b| b.id == id)
            .map(|b| b.model)
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_message_rejected_without_dispatch() {
        let (pipeline, provider) = pipeline(ScriptedProvider::new());

        let err = pipeline.run(ChatRequest::new("   "), None).unwrap_err();

        assert!(matches!(err, GatewayError::EmptyMessage));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_no_valid_models_rejected() {
        let (pipeline, _) = pipeline(ScriptedProvider::new());
        let err = pipeline
            .run(ChatRequest::new("hi").with_models(["gpt-9"]), None)
            .unwrap_err();
        assert!(matches!(err, GatewayError::NoValidModels));
    }

    #[tokio::test]
    async fn test_prompt_carries_suffix() {
        let (pipeline, provider) = pipeline(
            ScriptedProvider::new().on(&model_of("llama"), vec![Reply::Text("hello")]),
        );

        pipeline
            .run_collect(
                ChatRequest::new(" hi ").with_models(["llama"]).with_synthesis(false),
                None,
            )
            .await
            .unwrap();

        let calls = provider.calls();
        assert_eq!(calls[0].messages[0].content, "hi\n\nRespond in English only.");
    }

    #[tokio::test]
    async fn test_synthesis_follows_all_responses() {
        let provider = ScriptedProvider::new()
            .on(&model_of("deepseek"), vec![Reply::Text("Paris")])
            .on(&model_of("llama"), vec![Reply::Text("Paris, France")])
            .on(&config().synthesis.model, vec![Reply::Text("Paris.")]);
        let (pipeline, _) = pipeline(provider);

        let events = pipeline
            .run_collect(ChatRequest::new("Capital?").with_models(["deepseek", "llama"]), None)
            .await
            .unwrap();

        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], StreamEvent::ModelResponse(_)));
        assert!(matches!(events[1], StreamEvent::ModelResponse(_)));
        assert!(matches!(
            events[2],
            StreamEvent::Synthesis(SynthesisOutcome::Completed { .. })
        ));
        assert!(events[3].is_done());
    }

    #[tokio::test]
    async fn test_no_synthesis_event_when_disabled() {
        let provider = ScriptedProvider::new()
            .on(&model_of("deepseek"), vec![Reply::Text("a")])
            .on(&model_of("llama"), vec![Reply::Text("b")]);
        let (pipeline, provider) = pipeline(provider);

        let events = pipeline
            .run_collect(
                ChatRequest::new("q")
                    .with_models(["deepseek", "llama"])
                    .with_synthesis(false),
                None,
            )
            .await
            .unwrap();

        assert_eq!(events.len(), 3);
        assert_eq!(provider.calls_for(&config().synthesis.model), 0);
    }

    #[tokio::test]
    async fn test_all_failures_still_end_with_done() {
        let provider = ScriptedProvider::new()
            .on(&model_of("deepseek"), vec![Reply::Fail(LLMError::NetworkError("x".into()))])
            .on(&model_of("glm"), vec![Reply::Fail(LLMError::NetworkError("y".into()))]);
        let (pipeline, provider) = pipeline(provider);

        let events = pipeline
            .run_collect(ChatRequest::new("q").with_models(["deepseek", "glm"]), None)
            .await
            .unwrap();

        assert_eq!(events.len(), 4);
        for event in &events[..2] {
            match event {
                StreamEvent::ModelResponse(r) => assert!(!r.success && r.retried),
                other => panic!("unexpected event {:?}", other),
            }
        }
        match &events[2] {
            StreamEvent::Synthesis(SynthesisOutcome::SkippedInsufficient { reason, .. }) => {
                assert_eq!(reason, "0/2 successful, need 2+")
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(events[3].is_done());
        assert_eq!(provider.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_dropped_receiver_skips_synthesis() {
        let provider = ScriptedProvider::new()
            .on(
                &model_of("deepseek"),
                vec![Reply::Slow(std::time::Duration::from_millis(50), "a")],
            )
            .on(
                &model_of("llama"),
                vec![Reply::Slow(std::time::Duration::from_millis(50), "b")],
            )
            .on(&config().synthesis.model, vec![Reply::Text("s")]);
        let (pipeline, provider) = pipeline(provider);

        let rx = pipeline
            .run(ChatRequest::new("q").with_models(["deepseek", "llama"]), None)
            .unwrap();
        drop(rx);

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(provider.calls_for(&config().synthesis.model), 0);
        assert_eq!(provider.calls().len(), 2);
    }
}
