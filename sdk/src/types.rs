//! Wire types shared between the gateway and its clients
//!
//! A chat request comes in as [`ChatRequest`]; the gateway answers with a
//! stream of [`StreamEvent`]s, each serialized as one `data: <JSON>` frame.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Inbound chat request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's question
    #[serde(default)]
    pub message: String,

    /// Backend identifiers to fan out to; `None` selects the full registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<String>>,

    /// Whether to run the reconciliation call after the fan-out
    #[serde(default = "default_true")]
    pub synthesize: bool,

    /// Minimum number of successful backends required before reconciling
    #[serde(default = "default_min_for_synthesis")]
    pub min_for_synthesis: i64,
}

fn default_true() -> bool {
    true
}

fn default_min_for_synthesis() -> i64 {
    2
}

impl ChatRequest {
    /// Create a request for the full backend set with default options
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            models: None,
            synthesize: true,
            min_for_synthesis: default_min_for_synthesis(),
        }
    }

    /// Restrict the fan-out to the given backend identifiers
    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = Some(models.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_synthesis(mut self, synthesize: bool) -> Self {
        self.synthesize = synthesize;
        self
    }

    pub fn with_min_for_synthesis(mut self, min: i64) -> Self {
        self.min_for_synthesis = min;
        self
    }
}

/// Outcome of one backend invocation
///
/// Produced exactly once per dispatched backend and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    /// Backend identifier (e.g. "deepseek")
    pub backend: String,

    /// Display label (e.g. "DeepSeek")
    #[serde(rename = "model")]
    pub label: String,

    /// Response text, present only on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    pub success: bool,

    /// Wall-clock time of the attempt that produced this result, in seconds
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,

    /// True when the first attempt failed and a second one was made
    #[serde(default)]
    pub retried: bool,

    /// Error detail of the final attempt, present only on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InvocationResult {
    pub fn succeeded(
        backend: impl Into<String>,
        label: impl Into<String>,
        response: impl Into<String>,
        elapsed: Duration,
        retried: bool,
    ) -> Self {
        Self {
            backend: backend.into(),
            label: label.into(),
            response: Some(response.into()),
            success: true,
            elapsed,
            retried,
            error: None,
        }
    }

    pub fn failed(
        backend: impl Into<String>,
        label: impl Into<String>,
        error: impl Into<String>,
        elapsed: Duration,
        retried: bool,
    ) -> Self {
        Self {
            backend: backend.into(),
            label: label.into(),
            response: None,
            success: false,
            elapsed,
            retried,
            error: Some(error.into()),
        }
    }

    /// Response text of a successful invocation
    pub fn text(&self) -> Option<&str> {
        if self.success {
            self.response.as_deref()
        } else {
            None
        }
    }
}

/// Result of the synthesis decision for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SynthesisOutcome {
    /// The reconciliation call succeeded
    Completed { model: String, response: String },

    /// Too few backends succeeded to reconcile anything
    SkippedInsufficient {
        reason: String,
        successful: usize,
        attempted: usize,
        required: usize,
    },

    /// The reconciliation call failed; fan-out results remain valid
    Error { model: String, error: String },
}

impl SynthesisOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Reconciled answer text, if the call completed
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Completed { response, .. } => Some(response),
            _ => None,
        }
    }
}

/// One event of the outbound stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    ModelResponse(InvocationResult),
    Synthesis(SynthesisOutcome),
    Done,
}

impl StreamEvent {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Serialize as a single `data: <JSON>` frame followed by a blank line
    pub fn to_frame(&self) -> serde_json::Result<String> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}

/// Serialize a `Duration` as fractional seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("elapsed must be a non-negative number"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
