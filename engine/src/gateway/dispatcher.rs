//! Concurrent fan-out over a bounded worker pool

use super::{InvocationRequest, ModelInvoker, ResultSet};
use sdk::types::InvocationResult;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info_span, Instrument};

/// Runs one invoker per request, at most `max_workers` at a time.
pub struct FanOutDispatcher {
    invoker: Arc<ModelInvoker>,
    max_workers: usize,
}

impl FanOutDispatcher {
    pub fn new(invoker: Arc<ModelInvoker>, max_workers: usize) -> Self {
        Self {
            invoker,
            max_workers: max_workers.max(1),
        }
    }

    /// Launch every request and return results as they complete.
    ///
    /// The receiver yields exactly one result per request, in completion
    /// order, and closes once the last one has been sent. A panicking
    /// invocation still yields a failed result.
    pub fn dispatch(&self, requests: Vec<InvocationRequest>) -> mpsc::Receiver<InvocationResult> {
        let (tx, rx) = mpsc::channel(requests.len().max(1));
        let semaphore = Arc::new(Semaphore::new(self.max_workers.min(requests.len()).max(1)));

        for request in requests {
            let tx = tx.clone();
            let semaphore = Arc::clone(&semaphore);
            let invoker = Arc::clone(&self.invoker);
            let span = info_span!("invoke", backend = %request.backend);

            tokio::spawn(
                async move {
                    // The semaphore is never closed, so acquisition only fails on a bug.
                    let _permit = semaphore.acquire_owned().await.ok();
                    let started = Instant::now();
                    let backend = request.backend.clone();
                    let label = request.label.clone();

                    let task = tokio::spawn(
                        async move { invoker.invoke(&request).await }.in_current_span(),
                    );
                    let result = match task.await {
                        Ok(result) => result,
                        Err(e) => {
                            error!(error = %e, "Invocation task aborted");
                            InvocationResult::failed(
                                backend,
                                label,
                                format!("invocation aborted: {}", e),
                                started.elapsed(),
                                false,
                            )
                        }
                    };

                    // A closed receiver means the caller went away; the result is dropped.
                    let _ = tx.send(result).await;
                }
                .instrument(span),
            );
        }

        rx
    }

    /// Dispatch and wait for every result
    pub async fn dispatch_all(&self, requests: Vec<InvocationRequest>) -> ResultSet {
        let mut rx = self.dispatch(requests);
        let mut results = ResultSet::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        results
    }
}
