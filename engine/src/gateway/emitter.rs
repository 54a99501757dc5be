//! Ordered event delivery to a single caller

use sdk::types::{InvocationResult, StreamEvent, SynthesisOutcome};
use tokio::sync::mpsc;

/// Writes one request's events to the caller's stream.
///
/// At most one `synthesis` event is sent, and `done` is sent exactly once:
/// by `finish`, or on drop if the pipeline unwinds before reaching it.
/// Sends to a departed caller are silently discarded.
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<StreamEvent>,
    synthesis_sent: bool,
    done_sent: bool,
}

impl EventEmitter {
    pub fn new(tx: mpsc::UnboundedSender<StreamEvent>) -> Self {
        Self {
            tx,
            synthesis_sent: false,
            done_sent: false,
        }
    }

    /// Create an emitter together with the caller's end of the stream
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn model_response(&self, result: InvocationResult) {
        if !self.done_sent {
            let _ = self.tx.send(StreamEvent::ModelResponse(result));
        }
    }

    /// Returns false if a synthesis event was already sent
    pub fn synthesis(&mut self, outcome: SynthesisOutcome) -> bool {
        if self.synthesis_sent || self.done_sent {
            return false;
        }
        self.synthesis_sent = true;
        let _ = self.tx.send(StreamEvent::Synthesis(outcome));
        true
    }

    /// True once the caller has dropped its receiver
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn finish(mut self) {
        self.send_done();
    }

    fn send_done(&mut self) {
        if !self.done_sent {
            self.done_sent = true;
            let _ = self.tx.send(StreamEvent::Done);
        }
    }
}

impl Drop for EventEmitter {
    fn drop(&mut self) {
        self.send_done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn drain(mut rx: mpsc::UnboundedReceiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn result() -> InvocationResult {
        InvocationResult::succeeded("a", "A", "x", Duration::from_millis(1), false)
    }

    #[test]
    fn test_finish_sends_single_done_last() {
        let (mut emitter, rx) = EventEmitter::channel();
        emitter.model_response(result());
        assert!(emitter.synthesis(SynthesisOutcome::Completed {
            model: "S".into(),
            response: "r".into(),
        }));
        assert!(!emitter.synthesis(SynthesisOutcome::Error {
            model: "S".into(),
            error: "again".into(),
        }));
        emitter.finish();

        let events = drain(rx);
        assert_eq!(events.len(), 3);
        assert!(events[2].is_done());
        assert_eq!(events.iter().filter(|e| e.is_done()).count(), 1);
    }

    #[test]
    fn test_drop_sends_done() {
        let (emitter, rx) = EventEmitter::channel();
        drop(emitter);
        assert_eq!(drain(rx), vec![StreamEvent::Done]);
    }

    #[tokio::test]
    async fn test_panicking_task_still_sends_done() {
        let (emitter, rx) = EventEmitter::channel();
        let handle = tokio::spawn(async move {
            emitter.model_response(result());
            panic!("pipeline bug");
        });
        assert!(handle.await.is_err());

        let events = drain(rx);
        assert_eq!(events.len(), 2);
        assert!(events[1].is_done());
    }

    #[test]
    fn test_closed_receiver_is_detected() {
        let (emitter, rx) = EventEmitter::channel();
        drop(rx);
        assert!(emitter.is_closed());
        emitter.model_response(result());
    }
}
