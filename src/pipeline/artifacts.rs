//! On-disk layout of a pipeline run.
//!
//! Everything lives under one metadata directory, one file per chunk index,
//! so either stage can be resumed without re-deriving chunks:
//!
//! ```text
//! metadata/
//!   step1_chunks/chunk_<n>.txt          chunk text sent to the outline prompt
//!   step1_srt_chunks/chunk_<n>.json     subtitle entries of the chunk
//!   step1_llm_raw_output/chunk_<n>.txt  raw outline responses
//!   step2_llm_raw_output/chunk_<n>.txt  raw timeline responses (response cache)
//!   step2_timeline_chunks/chunk_<n>.json validated timeline items
//!   debug_responses/chunk_<n>_<tag>.txt
//!   outline.json, timeline.json, run_summary.json
//! ```

use super::{OutlineEntry, RunSummary, TimelineEntry};
use crate::error::PipelineError;
use crate::subtitle::{Chunk, SubtitleEntry};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const CHUNKS_DIR: &str = "step1_chunks";
pub const SRT_CHUNKS_DIR: &str = "step1_srt_chunks";
pub const OUTLINE_RAW_DIR: &str = "step1_llm_raw_output";
pub const TIMELINE_RAW_DIR: &str = "step2_llm_raw_output";
pub const TIMELINE_CHUNKS_DIR: &str = "step2_timeline_chunks";
pub const DEBUG_DIR: &str = "debug_responses";

pub const OUTLINE_FILE: &str = "outline.json";
pub const TIMELINE_FILE: &str = "timeline.json";
pub const SUMMARY_FILE: &str = "run_summary.json";

/// Tags for responses kept for post-mortem inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugTag {
    OriginalResponse,
    InvalidStructure,
    NotList,
    ParseError,
    FinalParseFailure,
}

impl DebugTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebugTag::OriginalResponse => "original_response",
            DebugTag::InvalidStructure => "invalid_structure",
            DebugTag::NotList => "not_list",
            DebugTag::ParseError => "parse_error",
            DebugTag::FinalParseFailure => "final_parse_failure",
        }
    }
}

/// Intermediate and final artifacts of a run, keyed by chunk index
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create every artifact directory
    pub async fn initialize(&self) -> Result<()> {
        for dir in [
            CHUNKS_DIR,
            SRT_CHUNKS_DIR,
            OUTLINE_RAW_DIR,
            TIMELINE_RAW_DIR,
            TIMELINE_CHUNKS_DIR,
            DEBUG_DIR,
        ] {
            tokio::fs::create_dir_all(self.root.join(dir)).await?;
        }
        debug!("Artifact directories ready under {}", self.root.display());
        Ok(())
    }

    pub fn dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn chunk_file(&self, dir: &str, chunk_index: usize, extension: &str) -> PathBuf {
        self.root
            .join(dir)
            .join(format!("chunk_{}.{}", chunk_index, extension))
    }

    /// Persist chunk text and subtitle entries for every chunk.
    ///
    /// A new chunk set invalidates everything derived from the previous one,
    /// so old chunk files and timeline responses are removed first.
    pub async fn save_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        for dir in [CHUNKS_DIR, SRT_CHUNKS_DIR, OUTLINE_RAW_DIR] {
            remove_dir_if_present(&self.dir(dir)).await?;
        }
        self.reset_timeline_cache().await?;
        self.initialize().await?;

        for chunk in chunks {
            let text_path = self.chunk_file(CHUNKS_DIR, chunk.chunk_index, "txt");
            tokio::fs::write(&text_path, &chunk.text).await?;

            let srt_path = self.chunk_file(SRT_CHUNKS_DIR, chunk.chunk_index, "json");
            write_json(&srt_path, &chunk.entries).await?;
        }

        info!("💾 Saved {} chunks to {}", chunks.len(), self.root.display());
        Ok(())
    }

    /// Rebuild one chunk from its persisted subtitle entries
    pub async fn load_chunk(&self, chunk_index: usize) -> Result<Chunk> {
        let path = self.chunk_file(SRT_CHUNKS_DIR, chunk_index, "json");
        if !path.exists() {
            return Err(PipelineError::MissingChunk(chunk_index).into());
        }

        let entries: Vec<SubtitleEntry> = read_json(&path).await?;
        Chunk::from_entries(chunk_index, entries)
            .ok_or_else(|| PipelineError::MissingChunk(chunk_index).into())
    }

    /// Rebuild the whole chunk set written by the outline stage, ordered by index
    pub async fn load_chunks(&self) -> Result<Vec<Chunk>> {
        let dir = self.dir(SRT_CHUNKS_DIR);
        let mut indices = Vec::new();

        let mut read_dir = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("No chunk directory at {}, run the outline stage first", dir.display()))?;

        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name();
            match parse_chunk_file_name(&name.to_string_lossy(), "json") {
                Some(index) => indices.push(index),
                None => debug!("Ignoring {}", entry.path().display()),
            }
        }

        indices.sort_unstable();

        let mut chunks = Vec::with_capacity(indices.len());
        for index in indices {
            match self.load_chunk(index).await {
                Ok(chunk) => chunks.push(chunk),
                Err(e) => warn!("Skipping chunk {}: {}", index, e),
            }
        }
        Ok(chunks)
    }

    pub async fn save_outline_response(&self, chunk_index: usize, response: &str) -> Result<()> {
        tokio::fs::create_dir_all(self.dir(OUTLINE_RAW_DIR)).await?;
        tokio::fs::write(self.chunk_file(OUTLINE_RAW_DIR, chunk_index, "txt"), response).await?;
        Ok(())
    }

    /// Write a response under `debug_responses`; failures are only logged
    pub async fn save_debug(&self, chunk_index: usize, tag: DebugTag, content: &str) {
        let dir = self.dir(DEBUG_DIR);
        let path = dir.join(format!("chunk_{}_{}.txt", chunk_index, tag.as_str()));

        let result = async {
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(&path, content).await
        }
        .await;

        match result {
            Ok(()) => debug!("Debug response saved to: {}", path.display()),
            Err(e) => warn!("Failed to save debug response {}: {}", path.display(), e),
        }
    }

    pub async fn save_timeline_chunk(&self, chunk_index: usize, items: &[TimelineEntry]) -> Result<()> {
        tokio::fs::create_dir_all(self.dir(TIMELINE_CHUNKS_DIR)).await?;
        write_json(&self.chunk_file(TIMELINE_CHUNKS_DIR, chunk_index, "json"), &items).await
    }

    /// Validated items for a chunk, `None` if the chunk has no result file
    pub async fn load_timeline_chunk(&self, chunk_index: usize) -> Result<Option<Vec<TimelineEntry>>> {
        let path = self.chunk_file(TIMELINE_CHUNKS_DIR, chunk_index, "json");
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(read_json(&path).await?))
    }

    /// Remove cached timeline responses and per-chunk timeline results
    pub async fn reset_timeline_cache(&self) -> Result<()> {
        for dir in [TIMELINE_RAW_DIR, TIMELINE_CHUNKS_DIR] {
            remove_dir_if_present(&self.dir(dir)).await?;
        }
        debug!("Cleared timeline responses under {}", self.root.display());
        Ok(())
    }

    /// Drop a result file left over from an earlier run
    pub async fn remove_timeline_chunk(&self, chunk_index: usize) -> Result<()> {
        let path = self.chunk_file(TIMELINE_CHUNKS_DIR, chunk_index, "json");
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save_outline(&self, outlines: &[OutlineEntry]) -> Result<PathBuf> {
        let path = self.root.join(OUTLINE_FILE);
        write_json(&path, &outlines).await?;
        info!("📝 Outline saved to: {}", path.display());
        Ok(path)
    }

    pub async fn load_outline(&self) -> Result<Vec<OutlineEntry>> {
        read_json(&self.root.join(OUTLINE_FILE)).await
    }

    pub async fn save_timeline(&self, timeline: &[TimelineEntry]) -> Result<PathBuf> {
        let path = self.root.join(TIMELINE_FILE);
        write_json(&path, &timeline).await?;
        info!("🕒 Timeline saved to: {}", path.display());
        Ok(path)
    }

    pub async fn load_timeline(&self) -> Result<Vec<TimelineEntry>> {
        read_json(&self.root.join(TIMELINE_FILE)).await
    }

    pub async fn save_summary(&self, summary: &RunSummary) -> Result<PathBuf> {
        let path = self.root.join(SUMMARY_FILE);
        write_json(&path, summary).await?;
        Ok(path)
    }
}

/// `chunk_12.json` -> 12
fn parse_chunk_file_name(name: &str, extension: &str) -> Option<usize> {
    name.strip_prefix("chunk_")?
        .strip_suffix(extension)?
        .strip_suffix('.')?
        .parse()
        .ok()
}

async fn remove_dir_if_present(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to clear {}", dir.display())),
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtitle::Timestamp;
    use tempfile::TempDir;

    fn chunk(index: usize, start_secs: u64) -> Chunk {
        let entries = vec![
            SubtitleEntry::new(1, Timestamp::from_secs(start_secs), Timestamp::from_secs(start_secs + 2), "first line"),
            SubtitleEntry::new(2, Timestamp::from_secs(start_secs + 3), Timestamp::from_secs(start_secs + 5), "second line"),
        ];
        Chunk::from_entries(index, entries).unwrap()
    }

    #[test]
    fn test_chunk_file_names() {
        assert_eq!(parse_chunk_file_name("chunk_0.json", "json"), Some(0));
        assert_eq!(parse_chunk_file_name("chunk_12.json", "json"), Some(12));
        assert_eq!(parse_chunk_file_name("chunk_3.txt", "json"), None);
        assert_eq!(parse_chunk_file_name("chunk_x.json", "json"), None);
        assert_eq!(parse_chunk_file_name("notes.json", "json"), None);
    }

    #[tokio::test]
    async fn test_chunks_reload_in_index_order() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let chunks: Vec<Chunk> = (0..12).map(|i| chunk(i, i as u64 * 60)).collect();

        store.save_chunks(&chunks).await.unwrap();
        let reloaded = store.load_chunks().await.unwrap();

        assert_eq!(reloaded, chunks);
        let text = tokio::fs::read_to_string(dir.path().join(CHUNKS_DIR).join("chunk_11.txt"))
            .await
            .unwrap();
        assert_eq!(text, "first line second line");
    }

    #[tokio::test]
    async fn test_new_chunk_set_drops_previous_run_files() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let old: Vec<Chunk> = (0..3).map(|i| chunk(i, i as u64 * 60)).collect();

        store.save_chunks(&old).await.unwrap();
        tokio::fs::write(store.dir(TIMELINE_RAW_DIR).join("chunk_0.txt"), "old response")
            .await
            .unwrap();
        let item = TimelineEntry::new("Old topic", Timestamp::from_secs(1), Timestamp::from_secs(2), 0);
        store.save_timeline_chunk(0, &[item]).await.unwrap();

        let fresh = vec![chunk(0, 500)];
        store.save_chunks(&fresh).await.unwrap();

        assert_eq!(store.load_chunks().await.unwrap(), fresh);
        assert!(!store.dir(TIMELINE_RAW_DIR).join("chunk_0.txt").exists());
        assert!(store.load_timeline_chunk(0).await.unwrap().is_none());
        assert!(store.dir(TIMELINE_RAW_DIR).exists());
    }

    #[tokio::test]
    async fn test_missing_chunk_is_typed() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.initialize().await.unwrap();

        let err = store.load_chunk(4).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingChunk(4))
        ));
    }

    #[tokio::test]
    async fn test_debug_files_are_tagged() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());

        store.save_debug(2, DebugTag::NotList, "{\"a\": 1}").await;

        let path = dir.path().join(DEBUG_DIR).join("chunk_2_not_list.txt");
        assert_eq!(tokio::fs::read_to_string(path).await.unwrap(), "{\"a\": 1}");
    }

    #[tokio::test]
    async fn test_timeline_chunk_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let item = TimelineEntry::new("Intro", Timestamp::from_secs(1), Timestamp::from_secs(4), 0);

        assert!(store.load_timeline_chunk(0).await.unwrap().is_none());
        store.save_timeline_chunk(0, &[item.clone()]).await.unwrap();
        assert_eq!(store.load_timeline_chunk(0).await.unwrap(), Some(vec![item]));

        store.remove_timeline_chunk(0).await.unwrap();
        store.remove_timeline_chunk(0).await.unwrap();
        assert!(store.load_timeline_chunk(0).await.unwrap().is_none());
    }
}
