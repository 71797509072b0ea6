//! LLM API client supporting Ollama, OpenAI-compatible and Anthropic backends
//!
//! Uses ureq (sync HTTP) with a global timeout; no async runtime needed.

use super::{extract_json, Advisor, AdvisorError, AdvisorResult};
use crate::config::AdvisorSettings;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::debug;

/// Supported LLM backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmBackend {
    #[default]
    Ollama,
    OpenAi,
    Anthropic,
}

impl std::str::FromStr for LlmBackend {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(LlmBackend::Ollama),
            "openai" | "openai-compatible" => Ok(LlmBackend::OpenAi),
            "anthropic" | "claude" => Ok(LlmBackend::Anthropic),
            other => Err(AdvisorError::ConfigError(format!(
                "unknown backend '{}' (expected ollama, openai or anthropic)",
                other
            ))),
        }
    }
}

impl LlmBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmBackend::Ollama => "ollama",
            LlmBackend::OpenAi => "openai",
            LlmBackend::Anthropic => "anthropic",
        }
    }

    pub fn env_key(&self) -> &'static str {
        match self {
            LlmBackend::Ollama => "OLLAMA_MODEL",
            LlmBackend::OpenAi => "OPENAI_API_KEY",
            LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    pub fn signup_url(&self) -> &'static str {
        match self {
            LlmBackend::Ollama => "https://ollama.ai (no key needed, just run locally)",
            LlmBackend::OpenAi => "https://platform.openai.com/api-keys",
            LlmBackend::Anthropic => "https://console.anthropic.com/settings/keys",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmBackend::Ollama => "deepseek-coder-v2:16b-lite-instruct-q4_K_M",
            LlmBackend::OpenAi => "gpt-4o",
            LlmBackend::Anthropic => "claude-sonnet-4-20250514",
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LlmBackend::Ollama => "http://localhost:11434",
            LlmBackend::OpenAi => "https://api.openai.com",
            LlmBackend::Anthropic => "https://api.anthropic.com",
        }
    }

    fn api_path(&self) -> &'static str {
        match self {
            LlmBackend::Ollama => "/api/generate",
            LlmBackend::OpenAi => "/v1/chat/completions",
            LlmBackend::Anthropic => "/v1/messages",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, LlmBackend::Ollama)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub backend: LlmBackend,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::default(),
            endpoint: None,
            model: None,
            max_tokens: 4096,
            temperature: 0.3,
            timeout: Duration::from_secs(120),
        }
    }
}

impl ClientConfig {
    pub fn from_settings(backend: LlmBackend, settings: &AdvisorSettings) -> Self {
        let non_empty = |s: &str| (!s.trim().is_empty()).then(|| s.trim().to_string());
        Self {
            backend,
            endpoint: non_empty(&settings.endpoint),
            model: non_empty(&settings.model),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.backend.default_model())
    }

    pub fn url(&self) -> String {
        let base = self
            .endpoint
            .as_deref()
            .unwrap_or_else(|| self.backend.default_endpoint())
            .trim_end_matches('/');
        format!("{}{}", base, self.backend.api_path())
    }
}

/// Unified LLM client
pub struct AiClient {
    config: ClientConfig,
    api_key: String,
    agent: ureq::Agent,
}

fn make_agent(timeout: Duration) -> ureq::Agent {
    ureq::config::Config::builder()
        .http_status_as_error(false)
        .timeout_global(Some(timeout))
        .build()
        .new_agent()
}

impl AiClient {
    pub fn new(config: ClientConfig, api_key: impl Into<String>) -> Self {
        let agent = make_agent(config.timeout);
        Self {
            config,
            api_key: api_key.into(),
            agent,
        }
    }

    pub fn from_env_with_config(mut config: ClientConfig) -> AdvisorResult<Self> {
        if !config.backend.requires_api_key() {
            if config.model.is_none() {
                config.model = env::var("OLLAMA_MODEL").ok().filter(|m| !m.is_empty());
            }
            return Ok(Self::new(config, "ollama"));
        }

        let env_key = config.backend.env_key();
        let api_key = env::var(env_key).map_err(|_| AdvisorError::MissingApiKey {
            env_var: env_key.to_string(),
            signup_url: config.backend.signup_url().to_string(),
        })?;

        Ok(Self::new(config, api_key))
    }

    pub fn backend(&self) -> LlmBackend {
        self.config.backend
    }

    pub fn model(&self) -> &str {
        self.config.model()
    }

    pub fn url(&self) -> String {
        self.config.url()
    }

    /// Map transport failures onto Advisor errors
    fn transport_error(&self, e: ureq::Error) -> AdvisorError {
        match e {
            ureq::Error::Timeout(_) => AdvisorError::Timeout {
                secs: self.config.timeout.as_secs(),
            },
            ureq::Error::Io(ref io) if io.kind() == std::io::ErrorKind::TimedOut => {
                AdvisorError::Timeout {
                    secs: self.config.timeout.as_secs(),
                }
            }
            other => AdvisorError::Unreachable(other.to_string()),
        }
    }

    /// POST a JSON body and decode the JSON answer
    fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        body: &B,
        headers: &[(&str, &str)],
    ) -> AdvisorResult<R> {
        let url = self.config.url();
        debug!("POST {} ({})", url, self.config.model());

        let mut req = self.agent.post(&url).header("Content-Type", "application/json");
        for (name, value) in headers {
            req = req.header(*name, *value);
        }

        let response = req.send_json(body).map_err(|e| self.transport_error(e))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let error_text = response.into_body().read_to_string().unwrap_or_default();
            return Err(AdvisorError::ApiError {
                status,
                message: error_text,
            });
        }

        response.into_body().read_json().map_err(|e| match e {
            ureq::Error::Json(json) => AdvisorError::MalformedResponse(json.to_string()),
            other => self.transport_error(other),
        })
    }

    /// Generate a completion for a single user prompt
    pub fn generate(&self, prompt: &str) -> AdvisorResult<String> {
        match self.config.backend {
            LlmBackend::Ollama => self.generate_ollama(prompt),
            LlmBackend::OpenAi => self.generate_openai(prompt),
            LlmBackend::Anthropic => self.generate_anthropic(prompt),
        }
    }

    fn generate_ollama(&self, prompt: &str) -> AdvisorResult<String> {
        let body = OllamaRequest {
            model: self.config.model().to_string(),
            prompt: prompt.to_string(),
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        };
        let resp: OllamaResponse = self.post(&body, &[])?;
        Ok(resp.response)
    }

    fn generate_openai(&self, prompt: &str) -> AdvisorResult<String> {
        let body = OpenAiRequest {
            model: self.config.model().to_string(),
            messages: vec![Message::user(prompt)],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };
        let auth = format!("Bearer {}", self.api_key);
        let resp: OpenAiResponse = self.post(&body, &[("Authorization", auth.as_str())])?;

        resp.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AdvisorError::MalformedResponse("No response choices".to_string()))
    }

    fn generate_anthropic(&self, prompt: &str) -> AdvisorResult<String> {
        let body = AnthropicRequest {
            model: self.config.model().to_string(),
            max_tokens: self.config.max_tokens,
            messages: vec![Message::user(prompt)],
            temperature: Some(self.config.temperature),
        };
        let resp: AnthropicResponse = self.post(
            &body,
            &[
                ("x-api-key", self.api_key.as_str()),
                ("anthropic-version", "2023-06-01"),
            ],
        )?;

        resp.content
            .into_iter()
            .find(|c| c.content_type == "text")
            .map(|c| c.text)
            .ok_or_else(|| AdvisorError::MalformedResponse("No text content in response".to_string()))
    }

    /// Cheap connectivity check used by `doctor`
    pub fn probe(&self) -> AdvisorResult<String> {
        match self.config.backend {
            LlmBackend::Ollama => {
                let base = self
                    .config
                    .endpoint
                    .as_deref()
                    .unwrap_or_else(|| self.config.backend.default_endpoint())
                    .trim_end_matches('/');
                let response = self
                    .agent
                    .get(&format!("{}/api/tags", base))
                    .call()
                    .map_err(|e| self.transport_error(e))?;
                let status = response.status().as_u16();
                if status >= 400 {
                    return Err(AdvisorError::ApiError {
                        status,
                        message: "model list unavailable".to_string(),
                    });
                }
                let tags: OllamaTags = response
                    .into_body()
                    .read_json()
                    .map_err(|e| AdvisorError::MalformedResponse(e.to_string()))?;
                let wanted = self.config.model();
                let installed = tags.models.iter().any(|m| m.name == wanted);
                Ok(format!(
                    "{} models installed, {} {}",
                    tags.models.len(),
                    wanted,
                    if installed { "present" } else { "not pulled" }
                ))
            }
            _ => Ok(format!("{} set", self.config.backend.env_key())),
        }
    }
}

impl Advisor for AiClient {
    fn name(&self) -> String {
        format!("{}/{}", self.config.backend.as_str(), self.config.model())
    }

    fn submit(&self, prompt: &str) -> AdvisorResult<serde_json::Value> {
        let text = self.generate(prompt)?;
        extract_json(&text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

impl Message {
    fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

// Ollama API types
#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

// OpenAI API types
#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: String,
}

// Anthropic API types
#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_defaults() {
        assert_eq!(
            LlmBackend::Ollama.default_model(),
            "deepseek-coder-v2:16b-lite-instruct-q4_K_M"
        );
        assert!(!LlmBackend::Ollama.requires_api_key());
        assert!(LlmBackend::Anthropic.requires_api_key());
        assert_eq!("OpenAI".parse::<LlmBackend>().unwrap(), LlmBackend::OpenAi);
    }

    #[test]
    fn test_config_url_and_model() {
        let config = ClientConfig::default();
        assert_eq!(config.url(), "http://localhost:11434/api/generate");

        let config = ClientConfig {
            backend: LlmBackend::OpenAi,
            endpoint: Some("http://gpu-box:8000/".to_string()),
            model: Some("qwen2.5-coder".to_string()),
            ..Default::default()
        };
        assert_eq!(config.url(), "http://gpu-box:8000/v1/chat/completions");
        assert_eq!(config.model(), "qwen2.5-coder");
    }

    #[test]
    fn test_from_settings_blank_fields_use_defaults() {
        let settings = AdvisorSettings {
            endpoint: "  ".into(),
            ..Default::default()
        };
        let config = ClientConfig::from_settings(LlmBackend::Anthropic, &settings);
        assert!(config.endpoint.is_none());
        assert!(config.model.is_none());
        assert_eq!(config.url(), "https://api.anthropic.com/v1/messages");
        assert_eq!(config.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_ollama_request_shape() {
        let body = OllamaRequest {
            model: "m".into(),
            prompt: "p".into(),
            stream: false,
            options: OllamaOptions { temperature: 0.5 },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["temperature"], 0.5);
    }

    #[test]
    fn test_unreachable_endpoint_is_an_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let config = ClientConfig {
            endpoint: Some("http://127.0.0.1:9".to_string()),
            timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let client = AiClient::new(config, "ollama");
        let err = client.submit("group these").unwrap_err();
        assert!(matches!(
            err,
            AdvisorError::Unreachable(_) | AdvisorError::Timeout { .. }
        ));
    }
}
