use crate::secrets::string::SecretString;
use crate::secrets::EnvSecretSource;
use sdk::errors::GatewayError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// An in-memory cache for secrets resolved from the environment.
///
/// Resolution happens once per key; later lookups never touch the process
/// environment again, so a key rotated mid-run takes effect on restart.
#[derive(Clone)]
pub struct SecretCache {
    source: Arc<EnvSecretSource>,
    cache: Arc<RwLock<HashMap<String, SecretString>>>,
}

impl SecretCache {
    pub fn new(source: Arc<EnvSecretSource>) -> Self {
        Self {
            source,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Cache pre-filled with fixed values, bypassing the environment
    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SecretString>,
    {
        let cache = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            source: Arc::new(EnvSecretSource::without_dotenv()),
            cache: Arc::new(RwLock::new(cache)),
        }
    }

    /// Retrieves a secret, checking the memory cache first.
    pub fn get_secret(&self, key: &str) -> Result<SecretString, GatewayError> {
        {
            let cache = self
                .cache
                .read()
                .map_err(|_| GatewayError::MissingCredential("secret cache poisoned".into()))?;
            if let Some(secret) = cache.get(key) {
                return Ok(secret.clone());
            }
        }

        let secret = self.source.get_secret(key)?;

        {
            let mut cache = self
                .cache
                .write()
                .map_err(|_| GatewayError::MissingCredential("secret cache poisoned".into()))?;
            cache.insert(key.to_string(), secret.clone());
        }

        Ok(secret)
    }

    /// Resolve a set of keys up front so a missing credential fails at startup.
    pub fn preload(&self, keys: &[&str]) -> Result<(), GatewayError> {
        for key in keys {
            self.get_secret(key)?;
        }
        Ok(())
    }

    pub fn has_secret(&self, key: &str) -> bool {
        self.get_secret(key).is_ok()
    }
}
