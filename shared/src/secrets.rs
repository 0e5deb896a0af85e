//! AWS Secrets Manager integration.
//!
//! Used by the ambient credential strategy: the function's IAM role reads a
//! Google credentials document without any file being shipped with the code.

use aws_sdk_secretsmanager::Client as SecretsClient;
use std::collections::HashMap;
use std::sync::OnceLock;
use tokio::sync::RwLock;

use crate::{Error, Result};

/// Cached secrets with lazy initialization.
static SECRETS_CACHE: OnceLock<RwLock<HashMap<String, String>>> = OnceLock::new();

fn get_cache() -> &'static RwLock<HashMap<String, String>> {
    SECRETS_CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Get a secret value from Secrets Manager with caching.
pub async fn get_secret(client: &SecretsClient, secret_arn: &str) -> Result<String> {
    {
        let cache = get_cache().read().await;
        if let Some(value) = cache.get(secret_arn) {
            return Ok(value.clone());
        }
    }

    let response = client
        .get_secret_value()
        .secret_id(secret_arn)
        .send()
        .await
        .map_err(|e| Error::Aws(format!("Failed to get secret: {}", e)))?;

    let secret_string = response
        .secret_string()
        .ok_or_else(|| Error::Aws("Secret has no string value".to_string()))?
        .to_string();

    {
        let mut cache = get_cache().write().await;
        cache.insert(secret_arn.to_string(), secret_string.clone());
    }

    Ok(secret_string)
}

/// Drop a cached secret so the next read goes back to Secrets Manager.
/// Called when the cached document stopped producing tokens (key rotation).
pub async fn evict(secret_arn: &str) {
    let mut cache = get_cache().write().await;
    cache.remove(secret_arn);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_evict_removes_entry() {
        {
            let mut cache = get_cache().write().await;
            cache.insert("arn:test:evict".to_string(), "{}".to_string());
        }
        evict("arn:test:evict").await;
        assert!(!get_cache().read().await.contains_key("arn:test:evict"));
    }
}
