//! One user's interactive session.
//!
//! A [`Session`] owns everything that lives for the length of a conversation:
//! the loaded [`Profile`], the selected prompt and the chat transcript. It is
//! created by [`Session::start`] and handed back by [`Session::end`]; nothing
//! is kept globally.
//!
//! Profiles are saved wholesale after every mutation with no version check.
//! Two sessions for the same user will silently overwrite each other's
//! changes; the last save wins.

use tracing::{info, warn};
use url::Url;

use crate::config::Config;
use crate::fetch::{Acquirer, http_client};
use crate::filter::filter_words;
use crate::llm::{Assistant, Invoker, Message};
use crate::profile::{Profile, PromptUpdate};
use crate::secrets::SecretSource;
use crate::storage::ProfileStore;
use crate::{PrecisError, Result};

/// First transcript entry of every session.
pub const GREETING: &str = "Choose, edit or add processing prompts and filter words with the commands below, \
                            then paste an article URL.";

/// Whether `input` is an absolute http(s) URL with a host.
///
/// Reachability is not checked.
pub fn is_valid_url(input: &str) -> bool {
    match Url::parse(input.trim()) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

/// Wrap scraped text the way the model expects it.
pub fn article_message(text: &str) -> String {
    format!("<article>{text}</article>")
}

/// The external collaborators a session needs.
#[derive(Clone)]
pub struct Services {
    pub acquirer: Acquirer,
    pub invoker: Invoker,
    pub assistant: Assistant,
    pub profiles: ProfileStore,
}

impl Services {
    /// Build everything from configuration, resolving secrets on the way.
    ///
    /// Any secret that cannot be read fails the whole startup.
    pub async fn from_config(config: &Config, secrets: &dyn SecretSource) -> Result<Self> {
        let client = http_client()?;

        let acquirer = Acquirer::new(client.clone(), config.scrapers(secrets).await?, config.fetch_config());
        let invoker = Invoker::new(client.clone(), config.invoke_config());
        let assistant = config.build_assistant(&config.assistant, secrets).await?;
        let profiles = config.profile_store(client, secrets).await?;

        Ok(Self { acquirer, invoker, assistant, profiles })
    }
}

/// Result of [`Session::process_article`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The filtered model answer, also appended to the transcript.
    Answered(String),
    /// Input was not a URL; nothing was recorded.
    InvalidUrl,
    /// No prompt is selected.
    NoPrompt,
    /// Every scraper failed.
    NoText,
    /// Every model failed.
    NoAnswer,
}

pub struct Session {
    services: Services,
    profile: Profile,
    selected: Option<String>,
    transcript: Vec<Message>,
    warnings: Vec<String>,
}

impl Session {
    /// Load the user's profile and open a fresh transcript.
    ///
    /// If the profile cannot be loaded the session starts with an empty one
    /// and a warning, so the user can still work.
    pub async fn start(services: Services) -> Self {
        let mut warnings = Vec::new();
        let profile = match services.profiles.load().await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, "could not load profile, starting empty");
                warnings.push(format!("Could not load your settings ({e}). Starting with an empty profile."));
                Profile::default()
            }
        };

        Self::with_profile(services, profile, warnings)
    }

    /// Open a session over an already loaded profile.
    pub fn with_profile(services: Services, profile: Profile, warnings: Vec<String>) -> Self {
        let selected = profile.prompt_names().next().map(str::to_string);
        Self { services, profile, selected, transcript: vec![Message::assistant(GREETING)], warnings }
    }

    /// Close the session and hand back the final profile.
    pub fn end(self) -> Profile {
        info!(messages = self.transcript.len(), "session ended");
        self.profile
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn selected_prompt(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Warnings raised since the last call, oldest first.
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    pub fn select_prompt(&mut self, name: &str) -> Result<()> {
        if self.profile.prompt(name).is_none() {
            return Err(PrecisError::Validation(format!("no prompt named '{name}'")));
        }
        self.selected = Some(name.to_string());
        Ok(())
    }

    /// Scrape `url`, run it through the assistant with the selected prompt,
    /// filter the answer and record the exchange.
    pub async fn process_article(&mut self, url: &str) -> Outcome {
        let url = url.trim();
        if !is_valid_url(url) {
            return Outcome::InvalidUrl;
        }
        self.transcript.push(Message::user(url));

        let Some(instruction) = self.selected.as_deref().and_then(|name| self.profile.instruction(name)) else {
            return Outcome::NoPrompt;
        };
        let instruction = instruction.to_string();

        let Some(text) = self.services.acquirer.acquire(url).await else {
            return Outcome::NoText;
        };

        let Some(answer) = self.services.invoker.ask(&self.services.assistant, &instruction, &article_message(&text)).await
        else {
            return Outcome::NoAnswer;
        };

        let answer = filter_words(&answer, &self.profile.filter_words);
        self.transcript.push(Message::assistant(answer.clone()));
        Outcome::Answered(answer)
    }

    pub async fn add_prompt(&mut self, name: &str, instruction: &str) -> Result<()> {
        self.profile.add_prompt(name, instruction)?;
        if self.selected.is_none() {
            self.selected = self.profile.prompt_names().next().map(str::to_string);
        }
        self.persist().await;
        Ok(())
    }

    /// Replace a prompt's text; blank text deletes the prompt.
    pub async fn update_prompt(&mut self, name: &str, instruction: &str) -> Result<PromptUpdate> {
        let update = self.profile.update_prompt(name, instruction)?;
        if update == PromptUpdate::Deleted && self.selected.as_deref() == Some(name) {
            self.selected = self.profile.prompt_names().next().map(str::to_string);
        }
        self.persist().await;
        Ok(update)
    }

    pub async fn remove_prompt(&mut self, name: &str) -> Result<()> {
        self.update_prompt(name, "").await.map(|_| ())
    }

    pub async fn add_filter_word(&mut self, word: &str) -> Result<()> {
        self.profile.add_filter_word(word)?;
        self.persist().await;
        Ok(())
    }

    /// Replace the word list from a JSON array; blank input clears it.
    pub async fn replace_filter_words(&mut self, text: &str) -> Result<()> {
        self.profile.replace_filter_words(text)?;
        self.persist().await;
        Ok(())
    }

    /// Save the profile; a failed save becomes a warning and the in-memory
    /// change stands.
    async fn persist(&mut self) {
        match self.services.profiles.save(&self.profile).await {
            Ok(url) => info!(url = %url, "profile saved"),
            Err(e) => {
                warn!(error = %e, "could not save profile");
                self.warnings.push(format!("Could not save your settings ({e})."));
            }
        }
    }
}
