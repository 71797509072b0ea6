//! Semantic grouping via an external LLM (the Advisor)
//!
//! The Surgeon asks the Advisor to organize a batch of magic numbers into a
//! category → subcategory → name tree. The Advisor is unreliable by nature:
//! it may be down, slow, or answer with prose instead of JSON. Every failure
//! surfaces as an [`AdvisorError`] and the caller falls back to deterministic
//! grouping.
//!
//! # Backends
//!
//! - `ollama` (default): native `/api/generate` endpoint, no key needed
//! - `openai`: any OpenAI-compatible chat completions endpoint (`OPENAI_API_KEY`)
//! - `anthropic`: messages API (`ANTHROPIC_API_KEY`)

mod client;
mod prompts;

pub use client::{AiClient, ClientConfig, LlmBackend};
pub use prompts::{GroupingPromptBuilder, SampleEntry};

use crate::config::AdvisorSettings;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors that can occur while talking to the Advisor
#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("Missing API key: {env_var} not set. Get your key at {signup_url}")]
    MissingApiKey { env_var: String, signup_url: String },

    #[error("Advisor did not answer within {secs}s")]
    Timeout { secs: u64 },

    #[error("Advisor unreachable: {0}")]
    Unreachable(String),

    #[error("Advisor API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Malformed Advisor response: {0}")]
    MalformedResponse(String),

    #[error("Invalid Advisor configuration: {0}")]
    ConfigError(String),
}

pub type AdvisorResult<T> = Result<T, AdvisorError>;

/// A semantic grouping oracle
pub trait Advisor {
    /// Backend and model, for logs and reports
    fn name(&self) -> String;

    /// Send a prompt and return the JSON object found in the answer
    fn submit(&self, prompt: &str) -> AdvisorResult<serde_json::Value>;
}

/// Build the configured Advisor client
pub fn from_settings(settings: &AdvisorSettings) -> AdvisorResult<AiClient> {
    let backend: LlmBackend = settings.backend.parse()?;
    AiClient::from_env_with_config(ClientConfig::from_settings(backend, settings))
}

static JSON_FENCE: OnceLock<Regex> = OnceLock::new();

/// Pull a JSON object out of free-form model output.
///
/// Tries a ```json fenced block first, then the outermost pair of braces.
pub fn extract_json(text: &str) -> AdvisorResult<serde_json::Value> {
    let fence = JSON_FENCE.get_or_init(|| Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").unwrap());

    let candidate = match fence.captures(text).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => {
            let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
                return Err(AdvisorError::MalformedResponse(
                    "no JSON object in response".to_string(),
                ));
            };
            if end < start {
                return Err(AdvisorError::MalformedResponse(
                    "no JSON object in response".to_string(),
                ));
            }
            &text[start..=end]
        }
    };

    let value: serde_json::Value = serde_json::from_str(candidate)
        .map_err(|e| AdvisorError::MalformedResponse(e.to_string()))?;
    if !value.is_object() {
        return Err(AdvisorError::MalformedResponse(
            "top-level JSON value is not an object".to_string(),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_fenced_json() {
        let text = "Sure! Here it is:\n```json\n{\"combat\": {\"melee\": {}}}\n```\nHope it helps {}";
        let value = extract_json(text).unwrap();
        assert!(value["combat"]["melee"].is_object());
    }

    #[test]
    fn test_extract_outermost_braces() {
        let text = "grouping: {\"items\": {\"potions\": {\"heal\": {\"value\": 25}}}} done";
        let value = extract_json(text).unwrap();
        assert_eq!(value["items"]["potions"]["heal"]["value"], 25);
    }

    #[test]
    fn test_extract_rejects_prose() {
        assert!(matches!(
            extract_json("I cannot help with that."),
            Err(AdvisorError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_json("} backwards {"),
            Err(AdvisorError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_json("{not json}"),
            Err(AdvisorError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_from_settings_rejects_unknown_backend() {
        let settings = AdvisorSettings {
            backend: "carrier-pigeon".into(),
            ..Default::default()
        };
        assert!(matches!(from_settings(&settings), Err(AdvisorError::ConfigError(_))));
    }

    #[test]
    fn test_from_settings_ollama_needs_no_key() {
        let client = from_settings(&AdvisorSettings::default()).unwrap();
        assert_eq!(client.backend(), LlmBackend::Ollama);
    }
}
