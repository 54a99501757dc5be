pub mod cache;
pub mod string;

pub use cache::SecretCache;
pub use string::SecretString;

use regex::Regex;
use sdk::errors::GatewayError;
use std::sync::{Once, OnceLock};

/// Resolves provider credentials from the process environment.
///
/// The working directory's `.env` file is loaded into the environment on
/// first use. Variables already set in the process win over the file.
///
/// The source also provides scrubbing, used to remove credentials from
/// upstream error bodies before they reach logs or clients.
pub struct EnvSecretSource {
    load_dotenv: bool,
}

static DOTENV_LOADED: Once = Once::new();

/// Regex patterns for detecting common secret formats.
static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

/// Patterns match:
/// - Hugging Face tokens: hf_[a-zA-Z0-9]{30,}
/// - OpenAI-style keys: sk-[a-zA-Z0-9-_]{20,}
/// - Bearer tokens: Bearer\s+[^\s]{20,}
fn get_secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"hf_[a-zA-Z0-9]{30,}").expect("Invalid Hugging Face pattern"),
            Regex::new(r"sk-[a-zA-Z0-9\-_]{20,}").expect("Invalid OpenAI pattern"),
            Regex::new(r"Bearer\s+[^\s]{20,}").expect("Invalid Bearer pattern"),
        ]
    })
}

impl EnvSecretSource {
    /// Source that loads `.env` from the working directory
    pub fn new() -> Self {
        Self { load_dotenv: true }
    }

    /// Source that only reads variables already in the environment
    pub fn without_dotenv() -> Self {
        Self { load_dotenv: false }
    }

    fn ensure_dotenv(&self) {
        if !self.load_dotenv {
            return;
        }
        DOTENV_LOADED.call_once(|| {
            match dotenvy::dotenv() {
                Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
                Err(e) if e.not_found() => {}
                Err(e) => tracing::warn!("Ignoring unreadable .env file: {}", e),
            }
        });
    }

    /// Retrieves a secret from the environment.
    ///
    /// # Errors
    /// Returns `GatewayError::MissingCredential` if the variable is unset or blank
    pub fn get_secret(&self, key: &str) -> Result<SecretString, GatewayError> {
        self.ensure_dotenv();

        match std::env::var(key) {
            Ok(value) if !value.trim().is_empty() => {
                tracing::debug!("Resolved secret '{}' from environment", key);
                Ok(SecretString::new(value.trim()))
            }
            _ => Err(GatewayError::MissingCredential(key.to_string())),
        }
    }
}

impl Default for EnvSecretSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Scrubs secrets from text by replacing them with [REDACTED].
///
/// # Examples
/// ```
/// use chorus_engine::secrets::scrub;
///
/// let scrubbed = scrub("Invalid token hf_abcdefghijklmnopqrstuvwxyz0123456789");
/// assert_eq!(scrubbed, "Invalid token [REDACTED]");
/// ```
pub fn scrub(text: &str) -> String {
    let mut result = text.to_string();

    for pattern in get_secret_patterns() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }

    result
}
