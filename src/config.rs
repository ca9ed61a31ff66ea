use crate::llm::{default_model, ProviderConfig, ProviderKind};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Configuration for the subtitle outline/timeline pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider selection and call settings
    pub llm: LlmSettings,

    /// Chunk boundaries
    pub chunking: ChunkingConfig,

    /// Timeline stage settings
    pub timeline: TimelineConfig,

    /// Prompt template locations
    pub prompts: PromptConfig,

    /// Artifact storage and logging
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Provider kind, e.g. "dashscope" or "openrouter"
    pub provider: String,

    pub api_key: String,

    /// Empty selects the provider's default model
    pub model: String,

    /// Override for OpenAI-compatible services hosted elsewhere
    pub base_url: Option<String>,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature for generation (0.0 = deterministic)
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Total attempts per call, including the first
    pub max_retries: u32,

    /// Language for titles and other user-facing output
    pub output_language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Longest time span a chunk may cover
    pub interval_minutes: u64,

    /// Character budget per chunk
    pub max_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Re-parses allowed per chunk after the first attempt
    pub max_parse_retries: u32,

    /// Appended to the input when a response could not be parsed
    pub retry_instruction: String,
}

/// Configuration for the stage prompts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Base directory for prompt files
    pub prompt_dir: PathBuf,

    /// Outline prompt file
    pub outline_file: String,

    /// Timeline prompt file
    pub timeline_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root of the per-run artifact directories
    pub metadata_dir: PathBuf,

    /// Log filter used when RUST_LOG is unset
    pub log_level: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::DashScope.to_string(),
            api_key: String::new(),
            model: String::new(),
            base_url: None,
            max_tokens: 4096,
            temperature: 0.1,
            timeout_seconds: 120,
            max_retries: 3,
            output_language: None,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 30,
            max_chars: 1500,
        }
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            max_parse_retries: 2,
            retry_instruction: "Your previous output could not be parsed. Respond with a valid JSON array only, \
                with no commentary. Every item needs \"outline\", \"start_time\" and \"end_time\", \
                and times must use the HH:MM:SS,mmm format."
                .to_string(),
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            prompt_dir: PathBuf::from("config/prompts"),
            outline_file: "outline.txt".to_string(),
            timeline_file: "timeline.txt".to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            metadata_dir: PathBuf::from("./metadata"),
            log_level: "autoclip_pipeline=info,warn".to_string(),
        }
    }
}

impl LlmSettings {
    pub fn provider_kind(&self) -> Result<ProviderKind> {
        Ok(self.provider.parse::<ProviderKind>()?)
    }

    /// Resolve these settings into a provider configuration
    pub fn provider_config(&self) -> Result<ProviderConfig> {
        let kind = self.provider_kind()?;
        let model = if self.model.trim().is_empty() {
            default_model(kind).to_string()
        } else {
            self.model.trim().to_string()
        };

        let mut config = ProviderConfig::new(kind, self.api_key.trim(), model);
        config.base_url = self.base_url.clone();
        config.max_tokens = self.max_tokens;
        config.temperature = self.temperature;
        config.timeout_seconds = self.timeout_seconds;
        Ok(config)
    }
}

/// Prompt used when the outline template file is absent
pub const DEFAULT_OUTLINE_PROMPT: &str = "You are analysing one segment of a video transcript. \
Identify the distinct topics discussed in the order they appear.

Format every topic exactly like this:
1. **Topic title**
- Key point about the topic
- Another key point

Use a numbered line with the title in double asterisks, followed by dash-prefixed key points. \
Do not add any other text.";

/// Prompt used when the timeline template file is absent
pub const DEFAULT_TIMELINE_PROMPT: &str = "You are given an outline of topics and the subtitles \
of the transcript segment they came from. For every outline topic, find where the discussion of \
that topic starts and ends in the subtitles.

Respond with a JSON array only. Each item must have:
- \"outline\": the topic title, copied exactly
- \"start_time\": when the topic starts, formatted HH:MM:SS,mmm
- \"end_time\": when the topic ends, formatted HH:MM:SS,mmm

Only use times that appear in the subtitles.";

impl PromptConfig {
    /// Load prompt content from a specific file
    pub async fn load_prompt(&self, filename: &str) -> Result<String> {
        let path = self.prompt_dir.join(filename);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) => Err(anyhow!("Failed to load prompt from {}: {}", path.display(), e)),
        }
    }

    /// Load outline prompt, falling back to the built-in one
    pub async fn load_outline_prompt(&self) -> String {
        self.load_or_default(&self.outline_file, DEFAULT_OUTLINE_PROMPT).await
    }

    /// Load timeline prompt, falling back to the built-in one
    pub async fn load_timeline_prompt(&self) -> String {
        self.load_or_default(&self.timeline_file, DEFAULT_TIMELINE_PROMPT).await
    }

    async fn load_or_default(&self, filename: &str, default: &str) -> String {
        match self.load_prompt(filename).await {
            Ok(prompt) if !prompt.trim().is_empty() => prompt,
            Ok(_) => {
                warn!("Prompt file {} is empty, using built-in prompt", filename);
                default.to_string()
            }
            Err(e) => {
                warn!("{}, using built-in prompt", e);
                default.to_string()
            }
        }
    }
}

impl Config {
    /// Load configuration from the default locations, then the environment
    pub fn load() -> Result<Self> {
        let config_paths = ["autoclip.toml", "config/autoclip.toml"];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(config) => {
                        tracing::debug!("Loaded configuration from: {}", path);
                        return Ok(config.with_env_overrides());
                    }
                    Err(e) => {
                        warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        Ok(Self::from_env())
    }

    /// Load configuration from a specific file, with environment overrides applied
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config.with_env_overrides())
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(provider) = std::env::var("AUTOCLIP_PROVIDER") {
            self.llm.provider = provider;
        }

        if let Ok(api_key) = std::env::var("AUTOCLIP_API_KEY") {
            self.llm.api_key = api_key;
        }

        if let Ok(model) = std::env::var("AUTOCLIP_MODEL") {
            self.llm.model = model;
        }

        if let Ok(base_url) = std::env::var("AUTOCLIP_BASE_URL") {
            self.llm.base_url = Some(base_url);
        }

        if let Ok(retries) = std::env::var("AUTOCLIP_MAX_RETRIES") {
            match retries.parse() {
                Ok(retries) => self.llm.max_retries = retries,
                Err(_) => warn!("Ignoring invalid AUTOCLIP_MAX_RETRIES: {}", retries),
            }
        }

        if let Ok(dir) = std::env::var("AUTOCLIP_METADATA_DIR") {
            self.output.metadata_dir = PathBuf::from(dir);
        }

        if let Ok(log_level) = std::env::var("AUTOCLIP_LOG_LEVEL") {
            self.output.log_level = log_level;
        }

        self
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), config_str)?;
        tracing::info!("Configuration saved to: {}", path.as_ref().display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunking.interval_minutes == 0 {
            return Err(anyhow!("chunking.interval_minutes must be greater than 0"));
        }

        if self.chunking.max_chars == 0 {
            return Err(anyhow!("chunking.max_chars must be greater than 0"));
        }

        if self.llm.max_retries == 0 {
            return Err(anyhow!("llm.max_retries must be greater than 0"));
        }

        self.llm.provider_kind()?;

        if let Some(base_url) = self.llm.base_url.as_deref().filter(|u| !u.trim().is_empty()) {
            url::Url::parse(base_url)
                .with_context(|| format!("llm.base_url is not a valid URL: {}", base_url))?;
        }

        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Pipeline Configuration:\n\
            - Provider: {}\n\
            - Model: {}\n\
            - Max Retries: {}\n\
            - Chunking: {} min / {} chars\n\
            - Metadata Directory: {}",
            self.llm.provider,
            if self.llm.model.is_empty() { "(default)" } else { self.llm.model.as_str() },
            self.llm.max_retries,
            self.chunking.interval_minutes,
            self.chunking.max_chars,
            self.output.metadata_dir.display()
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_provider(mut self, kind: ProviderKind) -> Self {
        self.config.llm.provider = kind.to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.llm.api_key = api_key.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.config.llm.model = model.into();
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.config.llm.max_retries = retries;
        self
    }

    pub fn with_chunking(mut self, interval_minutes: u64, max_chars: usize) -> Self {
        self.config.chunking.interval_minutes = interval_minutes;
        self.config.chunking.max_chars = max_chars;
        self
    }

    pub fn with_metadata_dir(mut self, dir: PathBuf) -> Self {
        self.config.output.metadata_dir = dir;
        self
    }

    pub fn with_prompt_dir(mut self, dir: PathBuf) -> Self {
        self.config.prompts.prompt_dir = dir;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
