use super::artifacts::{ArtifactStore, DebugTag, TIMELINE_RAW_DIR};
use super::cache::{FileResponseCache, ResponseCache};
use super::outline::OutlineEntry;
use crate::error::{preview, PipelineError};
use crate::llm::{extract_structured, CallOrchestrator};
use crate::subtitle::{Chunk, Timestamp};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A topic anchored to a time range inside its chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Title of the outline entry this range belongs to
    pub outline: String,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub chunk_index: usize,
    /// Assigned after the global sort; empty in per-chunk files
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
}

impl TimelineEntry {
    pub fn new(outline: impl Into<String>, start_time: Timestamp, end_time: Timestamp, chunk_index: usize) -> Self {
        Self {
            outline: outline.into(),
            start_time,
            end_time,
            chunk_index,
            id: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimelineResult {
    pub timeline: Vec<TimelineEntry>,
    /// Chunk groups that produced no usable items
    pub failed_chunks: Vec<usize>,
}

/// Bring `start..end` inside the chunk's span, keeping `start <= end`
pub fn clamp_to_chunk(start: Timestamp, end: Timestamp, chunk: &Chunk) -> (Timestamp, Timestamp) {
    let lower = chunk.start_time.min(chunk.end_time);
    let upper = chunk.start_time.max(chunk.end_time);

    let start = start.max(lower).min(upper);
    let end = end.max(lower).min(upper).max(start);
    (start, end)
}

/// Keep items that carry `outline`, `start_time` and `end_time` with valid
/// timestamps, clamped to the chunk. Invalid items are dropped individually.
pub fn validate_items(items: &[Value], chunk: &Chunk) -> Vec<TimelineEntry> {
    let mut validated = Vec::new();

    for item in items {
        let fields = (
            item.get("outline").and_then(Value::as_str),
            item.get("start_time").and_then(Value::as_str),
            item.get("end_time").and_then(Value::as_str),
        );
        let (Some(outline), Some(raw_start), Some(raw_end)) = fields else {
            warn!("Chunk {}: item missing required fields: {}", chunk.chunk_index, item);
            continue;
        };

        let (start, end) = match (Timestamp::parse_strict(raw_start), Timestamp::parse_strict(raw_end)) {
            (Ok(start), Ok(end)) => (start, end),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Chunk {}: dropping '{}': {}", chunk.chunk_index, outline, e);
                continue;
            }
        };

        let (clamped_start, clamped_end) = clamp_to_chunk(start, end, chunk);
        if (clamped_start, clamped_end) != (start, end) {
            warn!(
                "Chunk {}: adjusted '{}' from {} -> {} to {} -> {}",
                chunk.chunk_index, outline, start, end, clamped_start, clamped_end
            );
        }

        validated.push(TimelineEntry::new(outline, clamped_start, clamped_end, chunk.chunk_index));
    }

    validated
}

/// Sort by start time and number entries "1".."n"
pub fn finalize_timeline(mut timeline: Vec<TimelineEntry>) -> Vec<TimelineEntry> {
    timeline.sort_by_key(|entry| entry.start_time);
    for (position, entry) in timeline.iter_mut().enumerate() {
        entry.id = (position + 1).to_string();
    }
    timeline
}

/// Anchors outline topics to time ranges, one call per chunk group
pub struct TimelineExtractor {
    orchestrator: CallOrchestrator,
    store: ArtifactStore,
    cache: Arc<dyn ResponseCache>,
    prompt: String,
    max_parse_retries: u32,
    retry_instruction: String,
}

impl TimelineExtractor {
    pub fn new(orchestrator: CallOrchestrator, store: ArtifactStore, prompt: impl Into<String>) -> Self {
        let cache = Arc::new(FileResponseCache::new(store.dir(TIMELINE_RAW_DIR)));
        let defaults = crate::config::TimelineConfig::default();
        Self {
            orchestrator,
            store,
            cache,
            prompt: prompt.into(),
            max_parse_retries: defaults.max_parse_retries,
            retry_instruction: defaults.retry_instruction,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_parse_retries(mut self, max_parse_retries: u32, retry_instruction: impl Into<String>) -> Self {
        self.max_parse_retries = max_parse_retries;
        self.retry_instruction = retry_instruction.into();
        self
    }

    /// Anchor every outline entry within the chunk it came from, then
    /// reassemble the per-chunk results into one globally sorted timeline.
    pub async fn extract(&self, outlines: &[OutlineEntry], chunks: &[Chunk]) -> Result<TimelineResult> {
        info!("🕒 Starting timeline extraction for {} topics", outlines.len());

        if outlines.is_empty() {
            warn!("Outline is empty, nothing to anchor");
            return Ok(TimelineResult::default());
        }

        let chunks_by_index: BTreeMap<usize, &Chunk> =
            chunks.iter().map(|chunk| (chunk.chunk_index, chunk)).collect();

        let mut groups: BTreeMap<usize, Vec<&OutlineEntry>> = BTreeMap::new();
        for outline in outlines {
            groups.entry(outline.chunk_index).or_default().push(outline);
        }

        let mut failed_chunks = Vec::new();
        let mut processed = Vec::new();

        for (&chunk_index, group) in &groups {
            let Some(chunk) = chunks_by_index.get(&chunk_index) else {
                error!("{}, skipping {} topics", PipelineError::MissingChunk(chunk_index), group.len());
                failed_chunks.push(chunk_index);
                continue;
            };

            info!("Processing chunk {} with {} topics", chunk_index, group.len());
            self.store.remove_timeline_chunk(chunk_index).await?;
            processed.push(chunk_index);

            match self.process_chunk(chunk, group).await {
                Ok(items) => {
                    info!("Chunk {} anchored {} time ranges", chunk_index, items.len());
                    self.store.save_timeline_chunk(chunk_index, &items).await?;
                }
                Err(e) => {
                    error!("Chunk {} timeline failed: {:#}", chunk_index, e);
                    failed_chunks.push(chunk_index);
                }
            }
        }

        let mut timeline = Vec::new();
        for chunk_index in processed {
            if let Some(items) = self.store.load_timeline_chunk(chunk_index).await? {
                timeline.extend(items);
            }
        }

        let timeline = finalize_timeline(timeline);
        info!("✅ Timeline assembled with {} entries", timeline.len());

        Ok(TimelineResult {
            timeline,
            failed_chunks,
        })
    }

    async fn process_chunk(&self, chunk: &Chunk, group: &[&OutlineEntry]) -> Result<Vec<TimelineEntry>> {
        if let Some(cached) = self.cache.get(chunk.chunk_index).await? {
            info!("Found cached response for chunk {}", chunk.chunk_index);
            match self.parse_response(&cached, chunk).await {
                Ok(items) => return Ok(items),
                Err(e) => warn!("Cached response for chunk {} is unusable ({}), calling the model", chunk.chunk_index, e),
            }
        }

        let outline: Vec<Value> = group
            .iter()
            .map(|o| json!({ "title": o.title, "subtopics": o.subtopics }))
            .collect();
        let mut input = json!({
            "outline": outline,
            "srt_text": chunk.srt_text(),
        });

        let attempts = self.max_parse_retries + 1;
        let mut last_error = anyhow!("chunk {} was never attempted", chunk.chunk_index);

        for attempt in 0..attempts {
            let raw = self.orchestrator.call(&self.prompt, Some(&input)).await?;
            self.cache.put(chunk.chunk_index, &raw).await?;

            match self.parse_response(&raw, chunk).await {
                Ok(items) => return Ok(items),
                Err(e) => last_error = e,
            }

            if attempt + 1 < attempts {
                warn!(
                    "Chunk {} parse failed ({}), retrying ({}/{})",
                    chunk.chunk_index,
                    last_error,
                    attempt + 2,
                    attempts
                );
                input["additional_instruction"] = Value::String(self.retry_instruction.clone());
            } else {
                self.store
                    .save_debug(chunk.chunk_index, DebugTag::FinalParseFailure, &raw)
                    .await;
            }
        }

        Err(last_error)
    }

    /// Parse one raw response into validated items; an empty result is an error
    async fn parse_response(&self, raw: &str, chunk: &Chunk) -> Result<Vec<TimelineEntry>> {
        let index = chunk.chunk_index;
        self.store.save_debug(index, DebugTag::OriginalResponse, raw).await;

        let parsed = match extract_structured(raw) {
            Ok(value) => value,
            Err(e) => {
                let info = json!({
                    "error": e.to_string(),
                    "response_length": raw.len(),
                    "response_preview": preview(raw, 200),
                    "chunk_index": index,
                    "chunk_start": chunk.start_time,
                    "chunk_end": chunk.end_time,
                });
                let report = serde_json::to_string_pretty(&info).unwrap_or_else(|_| info.to_string());
                self.store.save_debug(index, DebugTag::ParseError, &report).await;
                return Err(e.into());
            }
        };

        let items = match parsed {
            Value::Array(items) => items,
            other => {
                self.store.save_debug(index, DebugTag::NotList, &other.to_string()).await;
                return Err(anyhow!("chunk {} response is not a list", index));
            }
        };

        if !items.is_empty() && !items.iter().any(Value::is_object) {
            self.store
                .save_debug(index, DebugTag::InvalidStructure, &Value::Array(items.clone()).to_string())
                .await;
            return Err(anyhow!("chunk {} list holds no objects", index));
        }

        let validated = validate_items(&items, chunk);
        if validated.is_empty() {
            return Err(anyhow!("chunk {} produced no valid timeline items", index));
        }
        Ok(validated)
    }
}
