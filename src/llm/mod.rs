pub mod catalog;
pub mod orchestrator;
pub mod providers;
pub mod response_parser;

use crate::error::{LlmError, PipelineError};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

pub use catalog::{all_models, default_model, models_for, ModelInfo};
pub use orchestrator::{
    backoff_delay, classify_failure, CallOrchestrator, ContextSource, FailureClass, LlmContext,
    SettingsFileSource, StaticContext,
};
pub use response_parser::extract_structured;

/// LLM provider types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    DashScope,
    OpenAI,
    Gemini,
    SiliconFlow,
    Groq,
    Together,
    OpenRouter,
    Cerebras,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 8] = [
        ProviderKind::DashScope,
        ProviderKind::OpenAI,
        ProviderKind::Gemini,
        ProviderKind::SiliconFlow,
        ProviderKind::Groq,
        ProviderKind::Together,
        ProviderKind::OpenRouter,
        ProviderKind::Cerebras,
    ];

    /// Identifier used in settings files
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::DashScope => "dashscope",
            ProviderKind::OpenAI => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::SiliconFlow => "siliconflow",
            ProviderKind::Groq => "groq",
            ProviderKind::Together => "together",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Cerebras => "cerebras",
        }
    }

    /// Documented API root of the hosted service
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::DashScope => "https://dashscope.aliyuncs.com/compatible-mode/v1",
            ProviderKind::OpenAI => "https://api.openai.com/v1",
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            ProviderKind::SiliconFlow => "https://api.siliconflow.cn/v1",
            ProviderKind::Groq => "https://api.groq.com/openai/v1",
            ProviderKind::Together => "https://api.together.xyz/v1",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
            ProviderKind::Cerebras => "https://api.cerebras.ai/v1",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| PipelineError::UnsupportedProvider(s.to_string()))
    }
}

/// Resolved configuration for a single provider instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: String,
    pub model_name: String,
    /// Overrides the provider's default API root
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind, api_key: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            kind,
            api_key: api_key.into(),
            model_name: model_name.into(),
            base_url: None,
            max_tokens: 4096,
            temperature: 0.1,
            timeout_seconds: 120,
        }
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| self.kind.default_base_url())
            .trim_end_matches('/')
    }
}

/// Per-call overrides
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CallOptions {
    /// Smallest useful request, for connectivity checks
    pub fn probe() -> Self {
        Self {
            max_tokens: Some(5),
            temperature: None,
        }
    }
}

/// Token accounting reported by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Normalized LLM response
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: String,
    pub usage: Option<TokenUsage>,
    pub model: Option<String>,
    pub finish_reason: Option<String>,
}

impl LlmResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send `prompt`, with `input` merged in as a labeled block
    async fn call(
        &self,
        prompt: &str,
        input: Option<&Value>,
        options: &CallOptions,
    ) -> Result<LlmResponse>;

    fn kind(&self) -> ProviderKind;

    /// Issue a minimal request; any failure is reported as `false`
    async fn test_connection(&self) -> bool {
        match self.call("Hi", None, &CallOptions::probe()).await {
            Ok(_) => true,
            Err(e) => {
                warn!("{} connection test failed: {}", self.kind(), e);
                false
            }
        }
    }

    fn list_models(&self) -> Vec<ModelInfo> {
        catalog::models_for(self.kind())
    }
}

/// Create LLM instance based on configuration
pub fn create_provider(config: &ProviderConfig) -> Result<Box<dyn LlmProvider>> {
    if config.api_key.trim().is_empty() {
        return Err(LlmError::MissingApiKey {
            provider: config.kind.to_string(),
        }
        .into());
    }

    match config.kind {
        ProviderKind::Gemini => Ok(Box::new(providers::GeminiProvider::new(config.clone())?)),
        ProviderKind::DashScope
        | ProviderKind::OpenAI
        | ProviderKind::SiliconFlow
        | ProviderKind::Groq
        | ProviderKind::Together
        | ProviderKind::OpenRouter
        | ProviderKind::Cerebras => Ok(Box::new(providers::OpenAiCompatibleProvider::new(
            config.clone(),
        )?)),
    }
}

/// Merge the structured input into the prompt as a labeled, human-readable block
pub fn build_full_input(prompt: &str, input: Option<&Value>) -> String {
    let block = match input {
        None | Some(Value::Null) => return prompt.to_string(),
        Some(Value::Object(map)) if map.is_empty() => return prompt.to_string(),
        Some(Value::String(s)) if s.is_empty() => return prompt.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(value @ Value::Object(_)) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        Some(other) => other.to_string(),
    };

    format!("{}\n\nInput:\n{}", prompt, block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("openrouter".parse::<ProviderKind>().unwrap(), ProviderKind::OpenRouter);
        assert_eq!(" Groq ".parse::<ProviderKind>().unwrap(), ProviderKind::Groq);

        let err = "g4f".parse::<ProviderKind>().unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedProvider(ref name) if name == "g4f"));
    }

    #[test]
    fn test_provider_kind_serde_matches_as_str() {
        for kind in ProviderKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_base_url_override() {
        let mut config = ProviderConfig::new(ProviderKind::OpenAI, "key", "gpt-4");
        assert_eq!(config.base_url(), "https://api.openai.com/v1");

        config.base_url = Some("http://localhost:8080/v1/".to_string());
        assert_eq!(config.base_url(), "http://localhost:8080/v1");
    }

    #[test]
    fn test_build_full_input_object_is_pretty_json() {
        let full = build_full_input("Summarize.", Some(&json!({"text": "hello"})));
        assert!(full.starts_with("Summarize.\n\nInput:\n{"));
        assert!(full.contains("\"text\": \"hello\""));
    }

    #[test]
    fn test_build_full_input_plain_values() {
        assert_eq!(build_full_input("P", None), "P");
        assert_eq!(build_full_input("P", Some(&json!({}))), "P");
        assert_eq!(build_full_input("P", Some(&json!("raw words"))), "P\n\nInput:\nraw words");
        assert_eq!(build_full_input("P", Some(&json!([1, 2]))), "P\n\nInput:\n[1,2]");
    }

    #[test]
    fn test_create_provider_requires_key() {
        let config = ProviderConfig::new(ProviderKind::Groq, "", "llama-3.1-8b-instant");
        let err = create_provider(&config).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<LlmError>(),
            Some(LlmError::MissingApiKey { .. })
        ));

        let config = ProviderConfig::new(ProviderKind::Gemini, "key", "gemini-2.5-flash");
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.kind(), ProviderKind::Gemini);
        assert!(!provider.list_models().is_empty());
    }

    struct FixedProvider {
        answer: Option<&'static str>,
    }

    #[async_trait]
    impl LlmProvider for FixedProvider {
        async fn call(&self, _prompt: &str, _input: Option<&Value>, _options: &CallOptions) -> Result<LlmResponse> {
            match self.answer {
                Some(text) => Ok(LlmResponse::text(text)),
                None => Err(LlmError::Api {
                    provider: "openai".to_string(),
                    status: 500,
                    body: "internal error".to_string(),
                }
                .into()),
            }
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAI
        }
    }

    #[tokio::test]
    async fn test_connection_reports_provider_errors_as_false() {
        assert!(FixedProvider { answer: Some("Hello!") }.test_connection().await);
        assert!(!FixedProvider { answer: None }.test_connection().await);
    }

    #[tokio::test]
    async fn test_connection_to_unreachable_host_is_false() {
        let mut config = ProviderConfig::new(ProviderKind::OpenAI, "key", "gpt-4o-mini");
        config.base_url = Some("http://127.0.0.1:9/v1".to_string());
        config.timeout_seconds = 2;

        let provider = create_provider(&config).unwrap();
        assert!(!provider.test_connection().await);
    }
}
