//! Chorus Engine Library
//!
//! Fans one question out to several language models, streams each answer as
//! it arrives and reconciles them into one. Used by the `chorus` binary and
//! by integration tests.

/// HTTP surface: router, handlers and error bodies
pub mod api;

/// Streaming latency benchmark
pub mod bench;

/// CLI interface module
pub mod cli;

/// HTTP client for a running gateway
pub mod client;

/// Configuration management module
pub mod config;

/// Database persistence module
pub mod db;

/// Fan-out, synthesis, memory and event streaming
pub mod gateway;

/// Command handlers module
pub mod handlers;

/// LLM provider abstraction layer
pub mod llm;

/// Secret management module
pub mod secrets;

/// Telemetry and Observability
pub mod telemetry;
