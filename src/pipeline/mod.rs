//! Two-stage extraction: outline topics per chunk, then time ranges per topic

pub mod artifacts;
pub mod cache;
pub mod outline;
pub mod timeline;

pub use artifacts::{ArtifactStore, DebugTag};
pub use cache::{FileResponseCache, MemoryResponseCache, ResponseCache};
pub use outline::{lines_to_entries, merge_outlines, OutlineEntry, OutlineExtractor, OutlineResult};
pub use timeline::{
    clamp_to_chunk, finalize_timeline, validate_items, TimelineEntry, TimelineExtractor,
    TimelineResult,
};

use crate::config::Config;
use crate::llm::CallOrchestrator;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// What a run produced, written to `run_summary.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub source: Option<PathBuf>,
    pub chunk_count: usize,
    pub outline_count: usize,
    pub timeline_count: usize,
    pub outline_failed_chunks: Vec<usize>,
    pub timeline_failed_chunks: Vec<usize>,
}

/// Both extractors wired to one configuration and artifact directory
pub struct Pipeline {
    config: Config,
    orchestrator: CallOrchestrator,
    store: ArtifactStore,
    response_cache: Option<Arc<dyn ResponseCache>>,
}

impl Pipeline {
    pub fn new(config: Config, orchestrator: CallOrchestrator) -> Self {
        let store = ArtifactStore::new(config.output.metadata_dir.clone());
        Self {
            config,
            orchestrator,
            store,
            response_cache: None,
        }
    }

    /// Replace the on-disk timeline response cache
    pub fn with_response_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.response_cache = Some(cache);
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    async fn outline_extractor(&self) -> OutlineExtractor {
        let prompt = self.config.prompts.load_outline_prompt().await;
        OutlineExtractor::new(self.orchestrator.clone(), self.store.clone(), prompt).with_chunking(
            self.config.chunking.interval_minutes,
            self.config.chunking.max_chars,
        )
    }

    async fn timeline_extractor(&self) -> TimelineExtractor {
        let prompt = self.config.prompts.load_timeline_prompt().await;
        let extractor = TimelineExtractor::new(self.orchestrator.clone(), self.store.clone(), prompt)
            .with_parse_retries(
                self.config.timeline.max_parse_retries,
                self.config.timeline.retry_instruction.clone(),
            );

        match &self.response_cache {
            Some(cache) => extractor.with_cache(cache.clone()),
            None => extractor,
        }
    }

    /// Outline stage only; writes `outline.json`.
    ///
    /// The fresh chunk set makes any cached timeline response stale.
    pub async fn run_outline(&self, srt_path: &Path) -> Result<OutlineResult> {
        let result = self.outline_extractor().await.extract(srt_path).await?;
        if let Some(cache) = &self.response_cache {
            cache.clear().await?;
        }
        self.store.save_outline(&result.outlines).await?;
        Ok(result)
    }

    /// Timeline stage only, from a previous run's `outline.json` and chunk files
    pub async fn run_timeline(&self) -> Result<TimelineResult> {
        let outlines = self.store.load_outline().await?;
        let chunks = self.store.load_chunks().await?;
        info!("Resuming with {} topics over {} chunks", outlines.len(), chunks.len());

        let result = self.timeline_extractor().await.extract(&outlines, &chunks).await?;
        self.store.save_timeline(&result.timeline).await?;
        Ok(result)
    }

    /// Both stages, passing the chunk set straight from one to the other
    pub async fn run(&self, srt_path: &Path) -> Result<RunSummary> {
        let started_at = Utc::now();

        let outline = self.run_outline(srt_path).await?;
        let timeline = self
            .timeline_extractor()
            .await
            .extract(&outline.outlines, &outline.chunks)
            .await?;
        self.store.save_timeline(&timeline.timeline).await?;

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            source: Some(srt_path.to_path_buf()),
            chunk_count: outline.chunks.len(),
            outline_count: outline.outlines.len(),
            timeline_count: timeline.timeline.len(),
            outline_failed_chunks: outline.failed_chunks,
            timeline_failed_chunks: timeline.failed_chunks,
        };
        self.store.save_summary(&summary).await?;

        info!(
            "🎉 Run finished: {} chunks, {} topics, {} timeline entries",
            summary.chunk_count, summary.outline_count, summary.timeline_count
        );
        Ok(summary)
    }
}
