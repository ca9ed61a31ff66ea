/// AutoClip Pipeline
///
/// Turns a long subtitle track into a topic outline and a time-anchored
/// timeline by delegating each chunk to a pluggable LLM backend.

pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod subtitle;

// Re-export main types for easy access
pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{LlmError, PipelineError};
pub use crate::llm::{
    create_provider, CallOrchestrator, ContextSource, LlmProvider, LlmResponse, ProviderConfig,
    ProviderKind, SettingsFileSource, StaticContext,
};
pub use crate::pipeline::{
    ArtifactStore, OutlineEntry, OutlineExtractor, Pipeline, RunSummary, TimelineEntry,
    TimelineExtractor,
};
pub use crate::subtitle::{chunk_by_time_and_size, parse_srt_file, Chunk, SubtitleEntry, Timestamp};
