//! Local functions a model may call through tool calls.
//!
//! The registry is fixed: [`Tool`] has one variant per function, and each
//! variant's arguments are decoded from the call's JSON `arguments` string
//! with unknown fields rejected.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::filter::filter_words;
use crate::purify::purify;
use crate::{PrecisError, Result};

/// Prefix of the report returned in place of a text answer.
pub const REPORT_HEADER: &str = "The following dictionary contains the results:\n";

/// A tool call as it appears in `choices[0].message.tool_calls`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionCall>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterWordsArgs {
    pub text: String,
    pub words: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurifyArgs {
    pub text: String,
}

/// A decoded, ready-to-run tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Tool {
    FilterWords(FilterWordsArgs),
    Purify(PurifyArgs),
}

impl Tool {
    pub const NAMES: [&'static str; 2] = ["filter_words", "purify"];

    /// Decode a call by function name and JSON argument string.
    pub fn decode(name: &str, arguments: &str) -> Result<Self> {
        match name {
            "filter_words" => Ok(Tool::FilterWords(serde_json::from_str(arguments)?)),
            "purify" => Ok(Tool::Purify(serde_json::from_str(arguments)?)),
            other => Err(PrecisError::Validation(format!("unknown tool: {other}"))),
        }
    }

    pub fn run(&self) -> String {
        match self {
            Tool::FilterWords(args) => filter_words(&args.text, &args.words),
            Tool::Purify(args) => purify(&args.text),
        }
    }
}

/// JSON schema for a registered tool, in chat-completions `tools` format.
pub fn definition(name: &str) -> Option<Value> {
    let (description, properties, required) = match name {
        "filter_words" => (
            "Remove every occurrence of each word from the text, in order.",
            json!({
                "text": { "type": "string" },
                "words": { "type": "array", "items": { "type": "string" } }
            }),
            json!(["text", "words"]),
        ),
        "purify" => (
            "Strip markdown links, HTML tags and noise lines from scraped text.",
            json!({ "text": { "type": "string" } }),
            json!(["text"]),
        ),
        _ => return None,
    };

    Some(json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
                "additionalProperties": false
            }
        }
    }))
}

/// Build the `tools` request array for the named tools.
pub fn definitions<S: AsRef<str>>(names: &[S]) -> Result<Value> {
    names
        .iter()
        .map(|name| {
            definition(name.as_ref())
                .ok_or_else(|| PrecisError::ConfigError(format!("unknown tool: {}", name.as_ref())))
        })
        .collect::<Result<Vec<_>>>()
        .map(Value::Array)
}

/// Run every decodable call and render the results as a report.
///
/// Calls that are unknown or carry bad arguments are logged and skipped.
/// Returns `None` if no call succeeded.
pub fn execute(calls: &[ToolCall]) -> Option<String> {
    let mut results = Map::new();

    for function in calls.iter().filter_map(|call| call.function.as_ref()) {
        match Tool::decode(&function.name, &function.arguments) {
            Ok(tool) => {
                debug!(tool = %function.name, "executing tool call");
                let key = format!("{}({})", function.name, function.arguments);
                results.insert(key, Value::String(tool.run()));
            }
            Err(e) => warn!(tool = %function.name, error = %e, "skipping tool call"),
        }
    }

    if results.is_empty() {
        return None;
    }

    Some(format!("{REPORT_HEADER}{}", Value::Object(results)))
}
