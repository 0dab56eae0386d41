//! LLM client: three provider wire shapes behind one `complete` call.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Result, WikiSurgeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl LlmConfig {
    /// Whether analysis should attempt the LLM path at all. OpenAI and
    /// Anthropic require credentials; a local Ollama endpoint does not.
    pub fn enabled(&self) -> bool {
        match self.provider {
            LlmProvider::OpenAi | LlmProvider::Anthropic => {
                self.api_key.as_ref().is_some_and(|k| !k.is_empty())
            }
            LlmProvider::Ollama => !self.base_url.is_empty(),
        }
    }
}

pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("provider", &self.config.provider)
            .finish()
    }
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        url::Url::parse(&config.base_url).map_err(|e| {
            WikiSurgeError::Config(format!("invalid llm base_url {}: {e}", config.base_url))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("WikiSurge/0.1 (anomaly-detection; conflict-analysis-bot)")
            .build()
            .map_err(WikiSurgeError::from)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Send the system/user prompt pair to the configured provider and
    /// return the raw text response. Cooperative with `cancel`: if the
    /// token fires before the response arrives, the in-flight request is
    /// abandoned and an error is returned instead of waiting it out.
    pub async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let request = self.dispatch(system_prompt, user_prompt);
        tokio::select! {
            result = request => result,
            _ = cancel.cancelled() => Err(WikiSurgeError::Cancelled("llm request cancelled".into())),
        }
    }

    async fn dispatch(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        match self.config.provider {
            LlmProvider::OpenAi => self.complete_openai(system_prompt, user_prompt).await,
            LlmProvider::Anthropic => self.complete_anthropic(system_prompt, user_prompt).await,
            LlmProvider::Ollama => self.complete_ollama(system_prompt, user_prompt).await,
        }
    }

    async fn complete_openai(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            messages: [Message<'a>; 2],
            max_tokens: u32,
            temperature: f64,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }
        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: String,
        }
        #[derive(Deserialize)]
        struct Response {
            choices: Vec<Choice>,
        }

        let body = Request {
            model: &self.config.model,
            messages: [
                Message { role: "system", content: system_prompt },
                Message { role: "user", content: user_prompt },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let url = format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(self.config.api_key.as_deref().unwrap_or_default())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<Response>()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| WikiSurgeError::Downstream("openai response had no choices".into()))
    }

    async fn complete_anthropic(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            max_tokens: u32,
            system: &'a str,
            messages: [Message<'a>; 1],
        }
        #[derive(Deserialize)]
        struct Block {
            text: Option<String>,
        }
        #[derive(Deserialize)]
        struct Response {
            content: Vec<Block>,
        }

        let body = Request {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            system: system_prompt,
            messages: [Message { role: "user", content: user_prompt }],
        };

        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .header("x-api-key", self.config.api_key.as_deref().unwrap_or_default())
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<Response>()
            .await?;

        response
            .content
            .into_iter()
            .find_map(|b| b.text)
            .ok_or_else(|| WikiSurgeError::Downstream("anthropic response had no text blocks".into()))
    }

    async fn complete_ollama(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct ResponseMessage {
            content: String,
        }
        #[derive(Deserialize)]
        struct Response {
            message: ResponseMessage,
        }

        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "stream": false,
            "options": {
                "temperature": self.config.temperature,
                "num_predict": self.config.max_tokens,
            },
        });

        let url = format!("{}/api/chat", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<Response>()
            .await?;

        Ok(response.message.content)
    }
}

/// Locate the outermost `{...}` substring in a possibly markdown-fenced
/// response and parse it. On failure, the caller should fall back to
/// treating the whole response as prose.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

pub fn warn_llm_failure(err: &WikiSurgeError) {
    warn!(error = %err, "llm call failed, falling back to heuristic analysis");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_from_markdown_fence() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json_object(raw), Some("{\"a\": 1}"));
    }

    #[test]
    fn extracts_json_with_surrounding_prose() {
        let raw = "Sure, here you go: {\"a\": 1} hope that helps";
        assert_eq!(extract_json_object(raw), Some("{\"a\": 1}"));
    }

    #[test]
    fn none_when_no_braces() {
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn enabled_requires_api_key_for_hosted_providers() {
        let cfg = LlmConfig {
            provider: LlmProvider::OpenAi,
            base_url: "https://api.openai.com".into(),
            api_key: None,
            model: "gpt-4o-mini".into(),
            max_tokens: 512,
            temperature: 0.2,
        };
        assert!(!cfg.enabled());
    }

    #[test]
    fn new_rejects_a_malformed_base_url() {
        let cfg = LlmConfig {
            provider: LlmProvider::Ollama,
            base_url: "not a url".into(),
            api_key: None,
            model: "llama3".into(),
            max_tokens: 512,
            temperature: 0.2,
        };
        assert!(matches!(LlmClient::new(cfg), Err(WikiSurgeError::Config(_))));
    }

    #[test]
    fn ollama_enabled_without_api_key() {
        let cfg = LlmConfig {
            provider: LlmProvider::Ollama,
            base_url: "http://localhost:11434".into(),
            api_key: None,
            model: "llama3".into(),
            max_tokens: 512,
            temperature: 0.2,
        };
        assert!(cfg.enabled());
    }
}
