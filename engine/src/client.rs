//! HTTP client for a running gateway
//!
//! Posts a chat request and decodes the event stream incrementally, handing
//! each event to a callback the moment its frame is complete.

use crate::api::ErrorBody;
use futures::StreamExt;
use sdk::errors::GatewayError;
use sdk::stream::EventStreamDecoder;
use sdk::types::{ChatRequest, StreamEvent};
use std::time::Duration;

pub struct GatewayClient {
    base_url: String,
    identity_header: String,
    http: reqwest::Client,
}

impl GatewayClient {
    pub fn new(
        base_url: &str,
        identity_header: &str,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            identity_header: identity_header.to_string(),
            http,
        })
    }

    /// Send a chat request and stream its events until `done`.
    ///
    /// Returns every received event. A stream that ends without `done` is a
    /// network error.
    pub async fn chat<F>(
        &self,
        request: &ChatRequest,
        owner: Option<&str>,
        mut on_event: F,
    ) -> Result<Vec<StreamEvent>, GatewayError>
    where
        F: FnMut(&StreamEvent),
    {
        let mut builder = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(request);
        if let Some(owner) = owner {
            builder = builder.header(self.identity_header.as_str(), owner);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = match response.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => status.to_string(),
            };
            return Err(if status.is_client_error() {
                GatewayError::InvalidRequest(detail)
            } else {
                GatewayError::Provider(detail)
            });
        }

        let mut decoder = EventStreamDecoder::new();
        let mut events = Vec::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| GatewayError::Network(e.to_string()))?;
            for event in decoder.feed(&chunk) {
                on_event(&event);
                let done = event.is_done();
                events.push(event);
                if done {
                    return Ok(events);
                }
            }
        }

        Err(GatewayError::Network(
            "event stream ended before completion".to_string(),
        ))
    }
}
