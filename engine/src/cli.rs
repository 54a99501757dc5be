//! CLI interface for Chorus
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags for running and querying the
//! gateway.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Chorus multi-model gateway
///
/// Sends one question to several language models at once, streams each
/// answer as it arrives, then merges them into a single reconciled answer.
#[derive(Parser, Debug)]
#[command(name = "chorus")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP gateway until interrupted
    Serve {
        /// Override the configured bind address
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Ask a question and print events as they arrive
    Ask {
        /// The question
        message: String,

        /// Backend identifiers, comma separated (default: all, capped)
        #[arg(short, long, value_delimiter = ',')]
        models: Option<Vec<String>>,

        /// Skip the reconciliation step
        #[arg(long)]
        no_synthesis: bool,

        /// Minimum successful backends before reconciling
        #[arg(long, default_value = "2", allow_negative_numbers = true)]
        min_for_synthesis: i64,

        /// Owner identity for conversation memory
        #[arg(long)]
        owner: Option<String>,

        /// Send to a running gateway instead of running in-process
        #[arg(long, value_name = "URL")]
        server: Option<String>,
    },

    /// List the configured backends
    Models,

    /// Show stored conversation turns
    History {
        /// Owner whose turns to show
        #[arg(long)]
        owner: String,

        /// Number of turns to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },

    /// Measure streaming latency against a running gateway
    Bench {
        /// Gateway base URL
        #[arg(long, value_name = "URL", default_value = "http://127.0.0.1:5000")]
        server: String,

        /// Trials per prompt
        #[arg(short, long, default_value = "3")]
        trials: usize,

        /// Prompt to send (repeatable; a built-in set is used when omitted)
        #[arg(short, long = "prompt")]
        prompts: Vec<String>,

        /// Backend identifiers, comma separated
        #[arg(short, long, value_delimiter = ',')]
        models: Option<Vec<String>>,
    },
}
