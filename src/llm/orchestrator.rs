use super::{create_provider, CallOptions, LlmProvider};
use crate::config::Config;
use crate::error::{LlmError, PipelineError};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Attempt budget used until a context has been acquired successfully
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Provider instance plus the settings snapshot it was built from
#[derive(Clone)]
pub struct LlmContext {
    pub provider: Arc<dyn LlmProvider>,
    /// Total attempts per orchestrated call
    pub max_retries: u32,
    /// Language for user-facing text in model output
    pub output_language: Option<String>,
}

impl LlmContext {
    pub fn new(provider: Arc<dyn LlmProvider>, max_retries: u32) -> Self {
        Self {
            provider,
            max_retries,
            output_language: None,
        }
    }
}

/// Supplies a fresh context before every attempt, so settings changes apply
/// without restarting
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn acquire(&self) -> Result<LlmContext>;
}

/// Always hands out the same provider
pub struct StaticContext {
    context: LlmContext,
}

impl StaticContext {
    pub fn new(context: LlmContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl ContextSource for StaticContext {
    async fn acquire(&self) -> Result<LlmContext> {
        Ok(self.context.clone())
    }
}

/// Re-reads the configuration file on every acquire
pub struct SettingsFileSource {
    config_path: Option<PathBuf>,
}

impl SettingsFileSource {
    /// `None` searches the default config locations and the environment
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self { config_path }
    }
}

#[async_trait]
impl ContextSource for SettingsFileSource {
    async fn acquire(&self) -> Result<LlmContext> {
        let config = match &self.config_path {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };

        let provider_config = config.llm.provider_config()?;
        let provider = create_provider(&provider_config)?;

        Ok(LlmContext {
            provider: Arc::from(provider),
            max_retries: config.llm.max_retries,
            output_language: config.llm.output_language.clone(),
        })
    }
}

/// How a failed attempt should be paced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    RateLimited,
    Transient,
}

/// Rate limits are recognized by HTTP 429 or the phrase "rate limit"
pub fn classify_failure(err: &anyhow::Error) -> FailureClass {
    if let Some(llm_error) = err.downcast_ref::<LlmError>() {
        if llm_error.status() == Some(429) {
            return FailureClass::RateLimited;
        }
    }

    let message = format!("{:#}", err).to_lowercase();
    if message.contains("429") || message.contains("rate limit") {
        FailureClass::RateLimited
    } else {
        FailureClass::Transient
    }
}

/// Wait before the attempt following `attempt` (0-based):
/// rate limits 20s, 40s, 60s, ...; everything else 2s, 4s, 8s, ...
pub fn backoff_delay(attempt: u32, class: FailureClass) -> Duration {
    match class {
        FailureClass::RateLimited => Duration::from_secs((attempt as u64 + 1) * 20),
        FailureClass::Transient => Duration::from_secs(2u64.saturating_pow(attempt + 1)),
    }
}

fn is_fatal(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::UnsupportedProvider(_))
    )
}

/// Wraps provider calls with bounded retries and differentiated backoff
#[derive(Clone)]
pub struct CallOrchestrator {
    source: Arc<dyn ContextSource>,
}

impl CallOrchestrator {
    pub fn new(source: Arc<dyn ContextSource>) -> Self {
        Self { source }
    }

    /// Shorthand for a fixed provider
    pub fn with_provider(provider: Arc<dyn LlmProvider>, max_retries: u32) -> Self {
        Self::new(Arc::new(StaticContext::new(LlmContext::new(provider, max_retries))))
    }

    /// Call the current provider, retrying until the attempt budget is spent.
    ///
    /// The error of the last attempt is returned unchanged. An unsupported
    /// provider kind is returned immediately.
    pub async fn call(&self, prompt: &str, input: Option<&Value>) -> Result<String> {
        let mut max_attempts = DEFAULT_MAX_RETRIES;
        let mut attempt: u32 = 0;

        loop {
            let result = match self.source.acquire().await {
                Ok(context) => {
                    max_attempts = context.max_retries.max(1);
                    Self::invoke(&context, prompt, input).await
                }
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => Err(e),
            };

            let err = match result {
                Ok(content) => return Ok(content),
                Err(e) => e,
            };

            if attempt + 1 >= max_attempts {
                error!("LLM call failed after {} attempts: {:#}", max_attempts, err);
                return Err(err);
            }

            let class = classify_failure(&err);
            let wait = backoff_delay(attempt, class);
            match class {
                FailureClass::RateLimited => warn!(
                    "Rate limit hit ({:#}), pausing {}s",
                    err,
                    wait.as_secs()
                ),
                FailureClass::Transient => warn!(
                    "LLM call failed ({:#}), retrying in {}s",
                    err,
                    wait.as_secs()
                ),
            }

            tokio::time::sleep(wait).await;
            attempt += 1;
            info!("LLM attempt {} of {}", attempt + 1, max_attempts);
        }
    }

    async fn invoke(context: &LlmContext, prompt: &str, input: Option<&Value>) -> Result<String> {
        let prompt = match &context.output_language {
            Some(language) if !language.trim().is_empty() => inject_language(prompt, language),
            _ => prompt.to_string(),
        };

        let response = context
            .provider
            .call(&prompt, input, &CallOptions::default())
            .await?;

        debug!(
            "{} responded ({} chars, usage: {:?}, finish: {:?})",
            context.provider.kind(),
            response.content.len(),
            response.usage,
            response.finish_reason
        );
        Ok(response.content)
    }
}

fn inject_language(prompt: &str, language: &str) -> String {
    format!(
        "{}\n\nIMPORTANT: You MUST output all textual content (titles, descriptions, reasons, etc.) in {}. Keep JSON keys and structural identifiers in English.",
        prompt, language
    )
}
