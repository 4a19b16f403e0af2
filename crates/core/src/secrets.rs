//! Secret lookup for API keys and connection strings.
//!
//! Secrets are read once at startup. A failed lookup is fatal to startup, so
//! nothing here retries.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{PrecisError, Result};

const KEY_VAULT_API_VERSION: &str = "7.4";

#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<String>;
}

fn missing(name: &str, reason: impl Into<String>) -> PrecisError {
    PrecisError::Secret { name: name.to_string(), reason: reason.into() }
}

/// Environment variable name for a secret: `PRECIS_SECRET_` + upper snake case.
///
/// `"Excellence2Key"` maps to `PRECIS_SECRET_EXCELLENCE2_KEY`.
pub fn env_var_name(secret: &str) -> String {
    let mut out = String::from("PRECIS_SECRET_");
    let mut prev_lower = false;
    for c in secret.chars() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() && prev_lower {
                out.push('_');
            }
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            out.push(c.to_ascii_uppercase());
        } else {
            if !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    out
}

/// Secrets from the process environment.
#[derive(Debug, Default, Clone)]
pub struct EnvSecrets;

#[async_trait]
impl SecretSource for EnvSecrets {
    async fn get_secret(&self, name: &str) -> Result<String> {
        let var = env_var_name(name);
        std::env::var(&var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| missing(name, format!("{var} is not set")))
    }
}

/// Fixed secrets, for tests and scripted runs.
#[derive(Debug, Default, Clone)]
pub struct StaticSecrets(pub HashMap<String, String>);

impl StaticSecrets {
    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.0.insert(name.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl SecretSource for StaticSecrets {
    async fn get_secret(&self, name: &str) -> Result<String> {
        self.0.get(name).cloned().ok_or_else(|| missing(name, "not configured"))
    }
}

/// Service-principal credentials for Azure Key Vault.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeyVaultCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub vault_url: String,
}

/// Secrets from Azure Key Vault, authenticated with client credentials.
#[derive(Debug, Clone)]
pub struct KeyVaultSecrets {
    client: Client,
    credentials: KeyVaultCredentials,
    authority: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SecretBundle {
    value: String,
}

impl KeyVaultSecrets {
    pub fn new(client: Client, credentials: KeyVaultCredentials) -> Self {
        Self { client, credentials, authority: "https://login.microsoftonline.com".to_string() }
    }

    /// Point token requests somewhere other than the public authority.
    pub fn with_authority(mut self, authority: &str) -> Self {
        self.authority = authority.trim_end_matches('/').to_string();
        self
    }

    async fn token(&self) -> Result<String> {
        let url = format!("{}/{}/oauth2/v2.0/token", self.authority, self.credentials.tenant_id);
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("scope", "https://vault.azure.net/.default"),
        ];
        let response = self.client.post(&url).form(&form).timeout(Duration::from_secs(30)).send().await?;
        if !response.status().is_success() {
            return Err(missing("<token>", format!("token endpoint returned HTTP {}", response.status())));
        }
        Ok(response.json::<TokenResponse>().await?.access_token)
    }
}

#[async_trait]
impl SecretSource for KeyVaultSecrets {
    async fn get_secret(&self, name: &str) -> Result<String> {
        let token = self.token().await?;
        let url = format!(
            "{}/secrets/{}?api-version={}",
            self.credentials.vault_url.trim_end_matches('/'),
            name,
            KEY_VAULT_API_VERSION
        );
        debug!(secret = name, "fetching secret from key vault");

        let response = self.client.get(&url).bearer_auth(token).timeout(Duration::from_secs(30)).send().await?;
        if !response.status().is_success() {
            return Err(missing(name, format!("key vault returned HTTP {}", response.status())));
        }
        Ok(response.json::<SecretBundle>().await?.value)
    }
}
