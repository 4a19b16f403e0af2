pub mod config;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod llm;
pub mod profile;
pub mod purify;
pub mod retry;
pub mod secrets;
pub mod session;
pub mod storage;
pub mod tools;

pub use config::{Config, DEFAULT_ASSISTANT, SecretSourceKind, StorageKind};
pub use error::{PrecisError, Result};
pub use fetch::{Acquirer, FetchConfig, MIN_ARTICLE_CHARS, Scraper, http_client};
pub use filter::filter_words;
pub use llm::{Assistant, InvokeConfig, Invoker, LlmProvider, Message, ModelSpec, Role};
pub use profile::{Profile, Prompt, PromptUpdate};
pub use purify::{MAX_CHARS, purify};
pub use retry::RetryPolicy;
pub use secrets::{EnvSecrets, KeyVaultCredentials, KeyVaultSecrets, SecretSource, StaticSecrets};
pub use session::{GREETING, Outcome, Services, Session, is_valid_url};
pub use storage::{AzureBlobStore, BlobStore, LocalBlobStore, MemoryBlobStore, ProfileStore};
pub use tools::{Tool, ToolCall};
