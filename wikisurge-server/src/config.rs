//! Layered configuration: defaults, then an optional TOML file, then
//! environment variables (prefixed `WIKISURGE_`), each layer overriding the
//! last. Mirrors the three-source composition the core library's host
//! configuration loaders use elsewhere in this stack.

use serde::Deserialize;
use wikisurge_core::analysis::LlmProvider;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    pub redis_url: String,
    pub wikipedia_server_url: String,

    pub llm_provider: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: String,

    pub scheduler_daily_hour: u32,
    pub scheduler_weekly_hour: u32,
    pub scheduler_max_concurrent_sends: usize,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 8080,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            wikipedia_server_url: "https://en.wikipedia.org".to_string(),

            llm_provider: None,
            llm_api_key: None,
            llm_base_url: None,
            llm_model: "gpt-4o-mini".to_string(),

            scheduler_daily_hour: 6,
            scheduler_weekly_hour: 6,
            scheduler_max_concurrent_sends: 10,

            cors_allowed_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

impl AppConfig {
    /// Load order: typed defaults, then `wikisurge.toml` if present in the
    /// working directory, then `WIKISURGE_*` environment variables.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = AppConfig::default();
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&defaults)?)
            .add_source(config::File::with_name("wikisurge").required(false))
            .add_source(
                config::Environment::with_prefix("WIKISURGE")
                    .separator("_")
                    .list_separator(","),
            );

        let settings = builder.build()?;
        let app_config: AppConfig = settings.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.server_port == 0 {
            anyhow::bail!("server_port must be nonzero");
        }
        if self.scheduler_max_concurrent_sends == 0 {
            anyhow::bail!("scheduler_max_concurrent_sends must be at least 1");
        }
        if let Some(provider) = &self.llm_provider {
            parse_provider(provider)?;
        }
        url::Url::parse(&self.redis_url)
            .map_err(|e| anyhow::anyhow!("invalid redis_url {}: {e}", self.redis_url))?;
        url::Url::parse(&self.wikipedia_server_url)
            .map_err(|e| anyhow::anyhow!("invalid wikipedia_server_url {}: {e}", self.wikipedia_server_url))?;
        if let Some(base_url) = &self.llm_base_url {
            url::Url::parse(base_url)
                .map_err(|e| anyhow::anyhow!("invalid llm_base_url {base_url}: {e}"))?;
        }
        Ok(())
    }

    /// Resolved provider, or `None` if no provider was configured. A
    /// configured-but-unreachable provider is still `Some`: whether it's
    /// actually usable is `LlmConfig::enabled`'s call, not this one's.
    pub fn llm_provider(&self) -> anyhow::Result<Option<LlmProvider>> {
        self.llm_provider.as_deref().map(parse_provider).transpose()
    }
}

fn parse_provider(raw: &str) -> anyhow::Result<LlmProvider> {
    match raw {
        "openai" => Ok(LlmProvider::OpenAi),
        "anthropic" => Ok(LlmProvider::Anthropic),
        "ollama" => Ok(LlmProvider::Ollama),
        other => anyhow::bail!("unsupported llm_provider: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_cleanly() {
        AppConfig::default().validate().expect("defaults must be valid");
    }

    #[test]
    fn rejects_an_unsupported_llm_provider() {
        let config = AppConfig { llm_provider: Some("cohere".to_string()), ..AppConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_a_malformed_redis_url() {
        let config = AppConfig { redis_url: "not a url".to_string(), ..AppConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_a_malformed_llm_base_url() {
        let config =
            AppConfig { llm_base_url: Some("not a url".to_string()), ..AppConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_a_zero_port() {
        let config = AppConfig { server_port: 0, ..AppConfig::default() };
        assert!(config.validate().is_err());
    }
}
