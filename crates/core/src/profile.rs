//! User configuration: named processing prompts and filter words.
//!
//! A [`Profile`] is loaded once per session, mutated in memory, and written
//! back wholesale after each mutation. There is no versioning: whoever saves
//! last wins.

use serde::{Deserialize, Serialize};

use crate::{PrecisError, Result};

/// A named processing instruction, used as the system message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    #[serde(rename = "prompt")]
    pub name: String,
    #[serde(rename = "prompt_value")]
    pub instruction: String,
}

/// Everything persisted for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "prompts_for_processing", default)]
    pub prompts: Vec<Prompt>,
    #[serde(rename = "words_for_filtering", default)]
    pub filter_words: Vec<String>,
}

/// What [`Profile::update_prompt`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptUpdate {
    Updated,
    Deleted,
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        Err(PrecisError::Validation(format!("{field} is required")))
    } else {
        Ok(value.to_string())
    }
}

impl Profile {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn prompt(&self, name: &str) -> Option<&Prompt> {
        self.prompts.iter().find(|p| p.name == name)
    }

    /// Instruction text for the prompt called `name`.
    pub fn instruction(&self, name: &str) -> Option<&str> {
        self.prompt(name).map(|p| p.instruction.as_str())
    }

    pub fn prompt_names(&self) -> impl Iterator<Item = &str> {
        self.prompts.iter().map(|p| p.name.as_str())
    }

    /// Append a new prompt. Name and instruction are trimmed and required.
    pub fn add_prompt(&mut self, name: &str, instruction: &str) -> Result<()> {
        let name = required("prompt name", name)?;
        let instruction = required("prompt", instruction)?;

        if self.prompt(&name).is_some() {
            return Err(PrecisError::Validation(format!("a prompt named '{name}' already exists")));
        }

        self.prompts.push(Prompt { name, instruction });
        Ok(())
    }

    /// Replace a prompt's instruction, or delete the prompt when the new
    /// instruction is blank.
    pub fn update_prompt(&mut self, name: &str, instruction: &str) -> Result<PromptUpdate> {
        let index = self
            .prompts
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| PrecisError::Validation(format!("no prompt named '{name}'")))?;

        if instruction.trim().is_empty() {
            self.prompts.remove(index);
            Ok(PromptUpdate::Deleted)
        } else {
            self.prompts[index].instruction = instruction.to_string();
            Ok(PromptUpdate::Updated)
        }
    }

    pub fn remove_prompt(&mut self, name: &str) -> Result<()> {
        self.update_prompt(name, "").map(|_| ())
    }

    /// Append a filter word. The word is trimmed and required.
    pub fn add_filter_word(&mut self, word: &str) -> Result<()> {
        let word = required("word", word)?;
        self.filter_words.push(word);
        Ok(())
    }

    /// Replace the whole word list from a JSON array of strings.
    ///
    /// Blank input clears the list; anything other than an array of strings
    /// is rejected and leaves the list untouched.
    pub fn replace_filter_words(&mut self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            self.filter_words.clear();
            return Ok(());
        }

        let words: Vec<String> = serde_json::from_str(text)
            .map_err(|e| PrecisError::Validation(format!("expected a JSON list of strings: {e}")))?;
        self.filter_words = words;
        Ok(())
    }

    /// The word list rendered the way [`Profile::replace_filter_words`] reads it.
    pub fn filter_words_json(&self) -> String {
        serde_json::to_string(&self.filter_words).unwrap_or_else(|_| "[]".to_string())
    }
}
