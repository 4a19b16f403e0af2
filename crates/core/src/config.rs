//! Application configuration.
//!
//! Configuration is a TOML file (by default `<config dir>/precis/config.toml`)
//! deserialized into [`Config`]. Every field has a default, so an empty or
//! missing file yields a working setup with the stock providers. The file only
//! ever names secrets; their values come from a [`SecretSource`] when the
//! runtime pieces are built.
//!
//! ```toml
//! user = "reader"
//! assistant = "GPT for article processing"
//!
//! [[providers]]
//! name = "openrouter"
//! kind = "openai_compatible"
//! url = "https://openrouter.ai/api/v1/chat/completions"
//! key_secrets = ["OpenRouter"]
//!
//! [[models]]
//! name = "gpt4o_mini_openrouter"
//! provider = "openrouter"
//! model = "openai/gpt-4o-mini-2024-07-18"
//!
//! [assistants."GPT for article processing"]
//! models = ["gpt4o_mini_openrouter"]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::fetch::{
    DEFAULT_CRAWLER_ENDPOINT, DEFAULT_READER_ENDPOINT, FetchConfig, MIN_ARTICLE_CHARS, Scraper, http_client,
};
use crate::llm::{Assistant, DEFAULT_AZURE_API_VERSION, InvokeConfig, LlmProvider, ModelSpec};
use crate::retry::RetryPolicy;
use crate::secrets::{EnvSecrets, KeyVaultCredentials, KeyVaultSecrets, SecretSource};
use crate::storage::{AzureBlobStore, BlobStore, LocalBlobStore, MemoryBlobStore, ProfileStore};
use crate::tools;
use crate::{PrecisError, Result};

pub const DEFAULT_ASSISTANT: &str = "GPT for article processing";

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Whose profile to load and save.
    pub user: String,
    /// Assistant used to process articles.
    pub assistant: String,
    pub retry: RetrySettings,
    pub fetch: FetchSettings,
    pub llm: LlmSettings,
    pub storage: StorageSettings,
    pub secrets: SecretSettings,
    pub providers: Vec<ProviderSettings>,
    pub models: Vec<ModelSettings>,
    pub assistants: BTreeMap<String, AssistantSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_attempts: 3, initial_delay_ms: 1000 }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy { max_attempts: self.max_attempts, initial_delay: Duration::from_millis(self.initial_delay_ms) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchSettings {
    pub timeout: u64,
    pub min_chars: usize,
    pub user_agent: Option<String>,
    pub reader_endpoint: String,
    pub crawler_endpoint: String,
    /// Fall back to the crawler when the reader comes up short.
    pub use_crawler: bool,
    /// Secret holding the crawler API key.
    pub crawler_key_secret: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: 20,
            min_chars: MIN_ARTICLE_CHARS,
            user_agent: None,
            reader_endpoint: DEFAULT_READER_ENDPOINT.to_string(),
            crawler_endpoint: DEFAULT_CRAWLER_ENDPOINT.to_string(),
            use_crawler: true,
            crawler_key_secret: "Spider".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmSettings {
    pub timeout: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self { timeout: 180 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    Azure,
    /// A directory on disk, see `storage.dir`.
    Local,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSettings {
    pub kind: StorageKind,
    pub container: String,
    /// Secret holding the storage connection string.
    pub connection_secret: String,
    /// Directory for `kind = "local"`; defaults to `<data dir>/precis`.
    pub dir: Option<PathBuf>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            kind: StorageKind::Azure,
            container: "user-config".to_string(),
            connection_secret: "StorageConnectionString".to_string(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretSourceKind {
    Env,
    KeyVault,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecretSettings {
    pub source: SecretSourceKind,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub vault_url: Option<String>,
}

impl Default for SecretSettings {
    fn default() -> Self {
        Self { source: SecretSourceKind::Env, tenant_id: None, client_id: None, vault_url: None }
    }
}

impl SecretSettings {
    /// Key Vault credentials; the client secret comes from `client_secret`
    /// since it cannot itself live in the vault.
    pub fn key_vault(&self, client_secret: Option<String>) -> Result<KeyVaultCredentials> {
        let field = |value: &Option<String>, name: &str| {
            value.clone().ok_or_else(|| PrecisError::ConfigError(format!("secrets.{name} is required for key_vault")))
        };
        Ok(KeyVaultCredentials {
            tenant_id: field(&self.tenant_id, "tenant_id")?,
            client_id: field(&self.client_id, "client_id")?,
            client_secret: client_secret
                .ok_or_else(|| PrecisError::ConfigError("key vault client secret is not set".to_string()))?,
            vault_url: field(&self.vault_url, "vault_url")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenaiCompatible,
    Azure,
}

/// An LLM backend. URLs and keys may be given directly or by secret name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSettings {
    pub name: String,
    pub kind: ProviderKind,
    pub url: Option<String>,
    pub url_secret: Option<String>,
    #[serde(default)]
    pub key_secrets: Vec<String>,
    pub api_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSettings {
    pub name: String,
    pub provider: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
}

fn default_temperature() -> f64 {
    0.3
}

fn default_top_p() -> f64 {
    0.9
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssistantSettings {
    pub models: Vec<String>,
    pub response_format: Option<Value>,
    pub tools: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let provider = |name: &str, url: &str, key: &str| ProviderSettings {
            name: name.to_string(),
            kind: ProviderKind::OpenaiCompatible,
            url: Some(url.to_string()),
            url_secret: None,
            key_secrets: vec![key.to_string()],
            api_version: None,
        };
        let model = |name: &str, provider: &str, model: &str| ModelSettings {
            name: name.to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            temperature: default_temperature(),
            top_p: default_top_p(),
        };

        let models = vec![
            model("gpt4o_mini_rainboweye", "rainboweye", "gpt-4o-mini-2024-07-18"),
            model("gpt4o_mini_openrouter", "openrouter", "openai/gpt-4o-mini-2024-07-18"),
            model("gpt4o_mini_excellence2", "excellence2", "yusi-mini"),
        ];
        let assistant = AssistantSettings {
            models: models.iter().map(|m| m.name.clone()).collect(),
            response_format: None,
            tools: Vec::new(),
        };

        Self {
            user: "default".to_string(),
            assistant: DEFAULT_ASSISTANT.to_string(),
            retry: RetrySettings::default(),
            fetch: FetchSettings::default(),
            llm: LlmSettings::default(),
            storage: StorageSettings::default(),
            secrets: SecretSettings::default(),
            providers: vec![
                provider("openrouter", "https://openrouter.ai/api/v1/chat/completions", "OpenRouter"),
                provider("rainboweye", "https://gitaigc.com/v1/chat/completions", "RainbowEye"),
                ProviderSettings {
                    name: "excellence2".to_string(),
                    kind: ProviderKind::Azure,
                    url: None,
                    url_secret: Some("Excellence2Endpoint".to_string()),
                    key_secrets: vec!["Excellence2Key".to_string()],
                    api_version: Some(DEFAULT_AZURE_API_VERSION.to_string()),
                },
            ],
            models,
            assistants: BTreeMap::from([(DEFAULT_ASSISTANT.to_string(), assistant)]),
        }
    }
}

/// A user name becomes a blob and file name, so it must be a single path
/// component.
pub fn validate_user(user: &str) -> Result<()> {
    let reason = if user.trim().is_empty() {
        "must not be empty"
    } else if user != user.trim() {
        "must not start or end with whitespace"
    } else if user.contains(['/', '\\']) {
        "must not contain path separators"
    } else if user.contains("..") {
        "must not contain '..'"
    } else if user.chars().any(char::is_control) {
        "must not contain control characters"
    } else {
        return Ok(());
    };
    Err(PrecisError::ConfigError(format!("user name '{}' {reason}", user.escape_debug())))
}

impl Config {
    /// `<config dir>/precis/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("precis").join("config.toml"))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or from [`Config::default_path`] when it exists.
    ///
    /// An explicit path must exist; a missing default file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) if !path.exists() => return Err(PrecisError::FileNotFound(path.to_path_buf())),
            Some(path) => path.to_path_buf(),
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };

        Self::from_toml(&fs::read_to_string(&path)?)
    }

    /// Check that every name used in the file resolves.
    pub fn validate(&self) -> Result<()> {
        validate_user(&self.user)?;

        for model in &self.models {
            if !self.providers.iter().any(|p| p.name == model.provider) {
                return Err(PrecisError::ConfigError(format!(
                    "model '{}' uses unknown provider '{}'",
                    model.name, model.provider
                )));
            }
        }

        for (name, assistant) in &self.assistants {
            if assistant.models.is_empty() {
                return Err(PrecisError::ConfigError(format!("assistant '{name}' has no models")));
            }
            if let Some(missing) = assistant.models.iter().find(|m| !self.models.iter().any(|s| &s.name == *m)) {
                return Err(PrecisError::ConfigError(format!("assistant '{name}' uses unknown model '{missing}'")));
            }
            tools::definitions(&assistant.tools)?;
        }

        if !self.assistants.contains_key(&self.assistant) {
            return Err(PrecisError::ConfigError(format!("unknown assistant '{}'", self.assistant)));
        }

        Ok(())
    }

    pub fn fetch_config(&self) -> FetchConfig {
        let defaults = FetchConfig::default();
        FetchConfig {
            timeout: self.fetch.timeout,
            user_agent: self.fetch.user_agent.clone().unwrap_or(defaults.user_agent),
            retry: self.retry.policy(),
            min_chars: self.fetch.min_chars,
        }
    }

    pub fn invoke_config(&self) -> InvokeConfig {
        InvokeConfig { timeout: self.llm.timeout, retry: self.retry.policy() }
    }

    /// Scraper chain: reader first, then the crawler if it has a key.
    pub async fn scrapers(&self, secrets: &dyn SecretSource) -> Result<Vec<Scraper>> {
        let mut scrapers = vec![Scraper::Reader { endpoint: self.fetch.reader_endpoint.clone() }];
        if self.fetch.use_crawler {
            scrapers.push(Scraper::Crawler {
                endpoint: self.fetch.crawler_endpoint.clone(),
                api_key: secrets.get_secret(&self.fetch.crawler_key_secret).await?,
            });
        }
        Ok(scrapers)
    }

    async fn provider(&self, name: &str, secrets: &dyn SecretSource) -> Result<LlmProvider> {
        let settings = self
            .providers
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| PrecisError::ConfigError(format!("unknown provider '{name}'")))?;

        let url = match (&settings.url, &settings.url_secret) {
            (Some(url), _) => url.clone(),
            (None, Some(secret)) => secrets.get_secret(secret).await?,
            (None, None) => return Err(PrecisError::ConfigError(format!("provider '{name}' has no url"))),
        };

        let mut keys = Vec::with_capacity(settings.key_secrets.len());
        for secret in &settings.key_secrets {
            keys.push(secrets.get_secret(secret).await?);
        }

        Ok(match settings.kind {
            ProviderKind::OpenaiCompatible => LlmProvider::OpenAiCompatible { url, api_keys: keys },
            ProviderKind::Azure => LlmProvider::Azure {
                endpoint: url,
                api_key: keys
                    .into_iter()
                    .next()
                    .ok_or_else(|| PrecisError::ConfigError(format!("provider '{name}' needs a key secret")))?,
                api_version: settings.api_version.clone().unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
            },
        })
    }

    /// Resolve the named assistant into a ready model chain.
    pub async fn build_assistant(&self, name: &str, secrets: &dyn SecretSource) -> Result<Assistant> {
        let settings = self
            .assistants
            .get(name)
            .ok_or_else(|| PrecisError::ConfigError(format!("unknown assistant '{name}'")))?;

        let mut models = Vec::with_capacity(settings.models.len());
        for model_name in &settings.models {
            let model = self
                .models
                .iter()
                .find(|m| &m.name == model_name)
                .ok_or_else(|| PrecisError::ConfigError(format!("unknown model '{model_name}'")))?;
            models.push(ModelSpec {
                name: model.name.clone(),
                provider: self.provider(&model.provider, secrets).await?,
                model: model.model.clone(),
                temperature: model.temperature,
                top_p: model.top_p,
            });
        }

        let tools = if settings.tools.is_empty() { None } else { Some(tools::definitions(&settings.tools)?) };

        Ok(Assistant { name: name.to_string(), models, response_format: settings.response_format.clone(), tools })
    }

    /// The secret source named by `[secrets]`.
    ///
    /// Key Vault needs its own client secret, passed as `client_secret`.
    pub fn secret_source(&self, client_secret: Option<String>) -> Result<Box<dyn SecretSource>> {
        Ok(match self.secrets.source {
            SecretSourceKind::Env => Box::new(EnvSecrets),
            SecretSourceKind::KeyVault => {
                Box::new(KeyVaultSecrets::new(http_client()?, self.secrets.key_vault(client_secret)?))
            }
        })
    }

    /// Profile storage for [`Config::user`].
    pub async fn profile_store(&self, client: Client, secrets: &dyn SecretSource) -> Result<ProfileStore> {
        Ok(ProfileStore::new(self.blob_store(client, secrets).await?, self.user.clone()))
    }

    pub async fn blob_store(&self, client: Client, secrets: &dyn SecretSource) -> Result<Arc<dyn BlobStore>> {
        Ok(match self.storage.kind {
            StorageKind::Memory => Arc::new(MemoryBlobStore::new()),
            StorageKind::Local => {
                let dir = self
                    .storage
                    .dir
                    .clone()
                    .or_else(|| dirs::data_dir().map(|dir| dir.join("precis")))
                    .ok_or_else(|| PrecisError::ConfigError("storage.dir is required on this platform".to_string()))?;
                Arc::new(LocalBlobStore::new(dir))
            }
            StorageKind::Azure => {
                let connection = secrets.get_secret(&self.storage.connection_secret).await?;
                Arc::new(AzureBlobStore::from_connection_string(client, &connection, &self.storage.container)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::StaticSecrets;

    fn secrets() -> StaticSecrets {
        StaticSecrets::default()
            .with("OpenRouter", "or-key")
            .with("RainbowEye", "re-key")
            .with("Excellence2Key", "az-key")
            .with("Excellence2Endpoint", "https://example.openai.azure.com/")
            .with("Spider", "sp-key")
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.assistants[DEFAULT_ASSISTANT].models.len(), 3);
        assert_eq!(config.retry.policy(), RetryPolicy::default());
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn test_parse_custom_config() {
        let config = Config::from_toml(
            r#"
            user = "yijie"
            assistant = "brief"

            [retry]
            max_attempts = 2
            initial_delay_ms = 10

            [fetch]
            crawler_key_secret = "Crawl"

            [storage]
            kind = "local"
            dir = "/tmp/precis-profiles"

            [[providers]]
            name = "local"
            kind = "openai_compatible"
            url = "http://localhost:8080/v1/chat/completions"

            [[models]]
            name = "small"
            provider = "local"
            model = "llama"
            temperature = 0.1

            [assistants.brief]
            models = ["small"]
            tools = ["purify"]
            response_format = { type = "json_object" }
            "#,
        )
        .unwrap();

        assert_eq!(config.user, "yijie");
        assert_eq!(config.retry.policy(), RetryPolicy { max_attempts: 2, initial_delay: Duration::from_millis(10) });
        assert_eq!(config.models[0].top_p, 0.9);
        assert_eq!(config.storage.kind, StorageKind::Local);
        assert_eq!(config.storage.dir, Some(PathBuf::from("/tmp/precis-profiles")));
        assert_eq!(config.assistants["brief"].response_format, Some(serde_json::json!({ "type": "json_object" })));
    }

    #[test]
    fn test_rejects_dangling_names() {
        let err = Config::from_toml(
            r#"
            assistant = "x"
            [assistants.x]
            models = ["missing"]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown model 'missing'"));

        assert!(Config::from_toml(r#"assistant = "nope""#).is_err());
        assert!(Config::from_toml("unknown_key = 1").is_err());
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let err = Config::load(Some(Path::new("/nonexistent/precis.toml"))).unwrap_err();
        assert!(matches!(err, PrecisError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_build_default_assistant() {
        let assistant = Config::default().build_assistant(DEFAULT_ASSISTANT, &secrets()).await.unwrap();
        let names: Vec<_> = assistant.models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["gpt4o_mini_rainboweye", "gpt4o_mini_openrouter", "gpt4o_mini_excellence2"]);

        assert_eq!(
            assistant.models[0].provider,
            LlmProvider::OpenAiCompatible {
                url: "https://gitaigc.com/v1/chat/completions".to_string(),
                api_keys: vec!["re-key".to_string()],
            }
        );
        assert!(matches!(&assistant.models[2].provider, LlmProvider::Azure { api_key, .. } if api_key == "az-key"));
        assert!(assistant.tools.is_none());
    }

    #[tokio::test]
    async fn test_missing_secret_is_fatal() {
        let err = Config::default().build_assistant(DEFAULT_ASSISTANT, &StaticSecrets::default()).await.unwrap_err();
        assert!(matches!(err, PrecisError::Secret { .. }));
    }

    #[tokio::test]
    async fn test_scrapers() {
        let scrapers = Config::default().scrapers(&secrets()).await.unwrap();
        assert_eq!(scrapers, vec![Scraper::reader(), Scraper::crawler("sp-key")]);

        let mut config = Config::default();
        config.fetch.use_crawler = false;
        assert_eq!(config.scrapers(&StaticSecrets::default()).await.unwrap(), vec![Scraper::reader()]);
    }

    #[rstest::rstest]
    #[case("")]
    #[case("   ")]
    #[case(" alice")]
    #[case("team/alice")]
    #[case("team\\alice")]
    #[case("..")]
    #[case("../x")]
    #[case("a\nb")]
    fn test_rejects_unsafe_user_names(#[case] user: &str) {
        assert!(matches!(validate_user(user), Err(PrecisError::ConfigError(_))));

        let mut config = Config::default();
        config.user = user.to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_accepts_plain_user_names() {
        for user in ["default", "yijie", "alice.smith", "user-42", "张伟"] {
            validate_user(user).unwrap();
        }
        assert!(Config::from_toml("user = \"team/alice\"").is_err());
    }

    #[test]
    fn test_key_vault_source_needs_credentials() {
        let mut config = Config::default();
        assert!(config.secret_source(None).is_ok());

        config.secrets.source = SecretSourceKind::KeyVault;
        config.secrets.tenant_id = Some("tenant".to_string());
        config.secrets.client_id = Some("client".to_string());
        assert!(matches!(config.secret_source(Some("s".to_string())), Err(PrecisError::ConfigError(_))));

        config.secrets.vault_url = Some("https://vault.example.net".to_string());
        assert!(matches!(config.secret_source(None), Err(PrecisError::ConfigError(_))));
        assert!(config.secret_source(Some("s".to_string())).is_ok());
    }

    #[tokio::test]
    async fn test_local_profile_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::from_toml(&format!(
            "user = \"reader\"\n[storage]\nkind = \"local\"\ndir = {:?}\n",
            dir.path().display().to_string()
        ))
        .unwrap();
        config.user = "someone".to_string();

        let store = config.profile_store(http_client().unwrap(), &StaticSecrets::default()).await.unwrap();
        assert_eq!(store.blob_name(), "someone.json");
        assert!(store.load().await.is_err());
    }
}
