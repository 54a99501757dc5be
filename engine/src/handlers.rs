//! Command handlers for the CLI
//!
//! Each handler loads what it needs from config, does its work and prints
//! either human-readable text or JSON.

use crate::api::{self, AppState};
use crate::bench::{self, TrialReport, DEFAULT_PROMPTS};
use crate::client::GatewayClient;
use crate::config::Config;
use crate::db::{ConversationStore, Database};
use crate::gateway::ChatPipeline;
use crate::llm::openai::build_http_client;
use crate::llm::{LLMProvider, OpenAICompatibleProvider};
use crate::secrets::{EnvSecretSource, SecretCache};
use anyhow::{Context, Result};
use sdk::errors::GatewayErrorExt;
use sdk::types::{ChatRequest, StreamEvent, SynthesisOutcome};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Options for a one-off question
#[derive(Debug, Clone)]
pub struct AskOptions {
    pub message: String,
    pub models: Option<Vec<String>>,
    pub synthesize: bool,
    pub min_for_synthesis: i64,
    pub owner: Option<String>,
    pub server: Option<String>,
}

impl AskOptions {
    fn request(&self) -> ChatRequest {
        let mut request = ChatRequest::new(self.message.clone())
            .with_synthesis(self.synthesize)
            .with_min_for_synthesis(self.min_for_synthesis);
        if let Some(models) = &self.models {
            request = request.with_models(models.iter().cloned());
        }
        request
    }
}

/// Provider and database wired from config
struct Services {
    provider: Arc<dyn LLMProvider>,
    database: Option<Database>,
    pipeline: ChatPipeline,
}

impl Services {
    async fn build(config: &Config, with_store: bool) -> Result<Self> {
        let secrets = Arc::new(SecretCache::new(Arc::new(EnvSecretSource::new())));
        let client = build_http_client(&config.provider)?;
        let provider: Arc<dyn LLMProvider> = Arc::new(OpenAICompatibleProvider::new(
            &config.provider,
            Arc::clone(&secrets),
            client,
        ));

        if secrets.preload(&[config.provider.api_key_env.as_str()]).is_err() {
            tracing::warn!(
                "{} is not set; every backend call will fail until it is",
                config.provider.api_key_env
            );
        }

        let database = if with_store && config.memory.enabled {
            Some(
                Database::new(&config.database_path())
                    .await
                    .context("Failed to open database")?,
            )
        } else {
            None
        };

        let store = database
            .as_ref()
            .map(|db| Arc::new(db.conversations()) as Arc<dyn ConversationStore>);
        let pipeline = ChatPipeline::from_config(config, Arc::clone(&provider), store);

        Ok(Self {
            provider,
            database,
            pipeline,
        })
    }

    async fn close(self) -> Result<()> {
        if let Some(database) = self.database {
            database.close().await?;
        }
        Ok(())
    }
}

/// Run the HTTP gateway until Ctrl-C
pub async fn handle_serve(bind: Option<String>, config: &Config) -> Result<()> {
    let services = Services::build(config, true).await?;

    let state = AppState {
        pipeline: services.pipeline.clone(),
        provider: Arc::clone(&services.provider),
        conversations: services
            .database
            .as_ref()
            .map(|db| Arc::new(db.conversations())),
        identity_header: api::identity_header(&config.server.identity_header),
        keep_alive: (config.server.keep_alive_secs > 0)
            .then(|| Duration::from_secs(config.server.keep_alive_secs)),
        synthesis_label: config.synthesis.label.clone(),
    };

    let router = api::create_router(state, &config.server.cors_origins);
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());

    api::serve(router, &bind, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
        }
    })
    .await?;

    services.close().await
}

/// Ask one question, in-process or against a running gateway
pub async fn handle_ask(options: AskOptions, config: &Config, format: OutputFormat) -> Result<()> {
    let request = options.request();

    if let Some(server) = &options.server {
        let client = GatewayClient::new(
            server,
            &config.server.identity_header,
            Duration::from_secs(config.provider.request_timeout_secs),
        )?;
        client
            .chat(&request, options.owner.as_deref(), |event| {
                print_event(event, format)
            })
            .await?;
        return Ok(());
    }

    let services = Services::build(config, options.owner.is_some()).await?;
    let mut rx = match services.pipeline.run(request, options.owner.clone()) {
        Ok(rx) => rx,
        Err(e) => {
            services.close().await?;
            anyhow::bail!("{} ({})", e, e.user_hint());
        }
    };

    while let Some(event) = rx.recv().await {
        print_event(&event, format);
        if event.is_done() {
            break;
        }
    }

    services.close().await
}

fn print_event(event: &StreamEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::error!("Failed to serialize event: {}", e),
        },
        OutputFormat::Text => match event {
            StreamEvent::ModelResponse(result) => {
                let retried = if result.retried { ", retried" } else { "" };
                println!(
                    "── {} ({:.2}s{}) ──",
                    result.label,
                    result.elapsed.as_secs_f64(),
                    retried
                );
                match (&result.response, &result.error) {
                    (Some(text), _) if result.success => println!("{}\n", text.trim()),
                    (_, Some(error)) => println!("failed: {}\n", error),
                    _ => println!("failed\n"),
                }
            }
            StreamEvent::Synthesis(SynthesisOutcome::Completed { model, response }) => {
                println!("══ Synthesis: {} ══", model);
                println!("{}\n", response.trim());
            }
            StreamEvent::Synthesis(SynthesisOutcome::SkippedInsufficient { reason, .. }) => {
                println!("Synthesis skipped: {}\n", reason);
            }
            StreamEvent::Synthesis(SynthesisOutcome::Error { model, error }) => {
                println!("Synthesis by {} failed: {}\n", model, error);
            }
            StreamEvent::Done => {}
        },
    }
}

/// List the configured backends
pub async fn handle_models(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("Backends (up to {} per request):", config.dispatch.max_backends);
            for backend in &config.backends {
                println!("  {:<10} {:<12} {}", backend.id, backend.label, backend.model);
            }
            println!();
            println!(
                "Synthesis: {} ({})",
                config.synthesis.label, config.synthesis.model
            );
        }
        OutputFormat::Json => {
            let output = json!({
                "models": config.backends,
                "max_selection": config.dispatch.max_backends,
                "synthesis": {
                    "label": config.synthesis.label,
                    "model": config.synthesis.model,
                }
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show an owner's stored turns, newest first
pub async fn handle_history(
    owner: String,
    limit: i64,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;

    let turns = database
        .conversations()
        .history(&owner, limit)
        .await
        .context("Failed to fetch conversation history")?;

    match format {
        OutputFormat::Text => {
            if turns.is_empty() {
                println!("No conversation history for {}", owner);
            } else {
                println!("Conversation history for {} (last {} turns):", owner, limit);
                println!();

                for turn in &turns {
                    let created = chrono::DateTime::from_timestamp(turn.created_at, 0)
                        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "Unknown".to_string());
                    match &turn.title {
                        Some(title) => println!("#{} {} ({})", turn.id, title, created),
                        None => println!("#{} ({})", turn.id, created),
                    }
                    println!("  Q: {}", turn.user_message);
                    println!("  A: {}", turn.model_response);
                    if let Some(summary) = &turn.memory_summary {
                        println!("  Memory: {}", summary.replace('\n', "; "));
                    }
                    println!();
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "owner": owner,
                "conversations": turns,
                "count": turns.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await
}

/// Replay prompts against a running gateway and report latencies
pub async fn handle_bench(
    server: String,
    trials: usize,
    prompts: Vec<String>,
    models: Option<Vec<String>>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let client = GatewayClient::new(
        &server,
        &config.server.identity_header,
        Duration::from_secs(config.provider.request_timeout_secs),
    )?;

    let prompts: Vec<String> = if prompts.is_empty() {
        DEFAULT_PROMPTS.iter().map(|p| p.to_string()).collect()
    } else {
        prompts
    };

    let mut reports: Vec<TrialReport> = Vec::new();
    for prompt in &prompts {
        for trial in 0..trials {
            let report = bench::run_trial(&client, prompt, models.as_deref(), trial).await;
            if let OutputFormat::Text = format {
                let fmt = |v: Option<f64>| v.map(|s| format!("{:.3}s", s)).unwrap_or("-".into());
                let short: String = prompt.chars().take(40).collect();
                println!(
                    "[{}] {}... -> {:?} first={} syn={} total={:.3}s",
                    trial,
                    short,
                    report.status,
                    fmt(report.first_model_s),
                    fmt(report.synthesis_s),
                    report.total_s
                );
            }
            reports.push(report);
        }
    }

    let summary = bench::summarize(&reports);
    match format {
        OutputFormat::Text => {
            println!();
            for entry in &summary {
                let fmt = |v: Option<f64>| v.map(|s| format!("{:.3}s", s)).unwrap_or("-".into());
                println!(
                    "{} ({} ok): first={} syn={} total={}",
                    entry.prompt,
                    entry.ok_trials,
                    fmt(entry.avg_first_model_s),
                    fmt(entry.avg_synthesis_s),
                    fmt(entry.avg_total_s)
                );
            }
        }
        OutputFormat::Json => {
            let output = json!({ "trials": reports, "summary": summary });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
