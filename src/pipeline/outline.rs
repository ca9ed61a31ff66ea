use super::artifacts::ArtifactStore;
use crate::llm::CallOrchestrator;
use crate::subtitle::{chunk_by_time_and_size, parse_srt_file, Chunk};
use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Longest subtopic kept; longer lines are dropped
pub const MAX_SUBTOPIC_CHARS: usize = 200;

/// A topic found in one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub title: String,
    #[serde(default)]
    pub subtopics: Vec<String>,
    pub chunk_index: usize,
}

impl OutlineEntry {
    pub fn new(title: impl Into<String>, chunk_index: usize) -> Self {
        Self {
            title: title.into(),
            subtopics: Vec::new(),
            chunk_index,
        }
    }
}

/// Merged outline plus the chunk set it was derived from
#[derive(Debug, Clone, Default)]
pub struct OutlineResult {
    pub outlines: Vec<OutlineEntry>,
    pub chunks: Vec<Chunk>,
    /// Chunks whose call failed or came back empty
    pub failed_chunks: Vec<usize>,
}

fn title_line_pattern() -> &'static Regex {
    static TITLE: OnceLock<Regex> = OnceLock::new();
    TITLE.get_or_init(|| Regex::new(r"^\d+\.\s*\*\*").expect("static title pattern"))
}

enum ParseState {
    Outside,
    Inside(OutlineEntry),
}

/// Recognize `N. **Title**` lines and the `- subtopic` lines under them.
///
/// Dash lines seen before any title are ignored.
pub fn lines_to_entries<'a, I>(lines: I, chunk_index: usize) -> Vec<OutlineEntry>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut entries = Vec::new();
    let mut state = ParseState::Outside;

    for line in lines {
        let line = line.trim();

        if title_line_pattern().is_match(line) {
            if let ParseState::Inside(done) = std::mem::replace(&mut state, ParseState::Outside) {
                entries.push(done);
            }

            let title = line.split("**").nth(1).unwrap_or_default().trim();
            if !title.is_empty() {
                state = ParseState::Inside(OutlineEntry::new(title, chunk_index));
            }
            continue;
        }

        if let (Some(rest), ParseState::Inside(entry)) = (line.strip_prefix('-'), &mut state) {
            let subtopic = rest.trim();
            if !subtopic.is_empty() && subtopic.chars().count() <= MAX_SUBTOPIC_CHARS {
                entry.subtopics.push(subtopic.to_string());
            }
        }
    }

    if let ParseState::Inside(done) = state {
        entries.push(done);
    }

    entries
}

/// Deduplicate by title, keeping the first occurrence and encounter order
pub fn merge_outlines(outlines: Vec<OutlineEntry>) -> Vec<OutlineEntry> {
    let mut seen = HashSet::new();
    outlines
        .into_iter()
        .filter(|outline| seen.insert(outline.title.clone()))
        .collect()
}

/// Drives one outline call per chunk
pub struct OutlineExtractor {
    orchestrator: CallOrchestrator,
    store: ArtifactStore,
    prompt: String,
    interval_minutes: u64,
    max_chars: usize,
}

impl OutlineExtractor {
    pub fn new(orchestrator: CallOrchestrator, store: ArtifactStore, prompt: impl Into<String>) -> Self {
        Self {
            orchestrator,
            store,
            prompt: prompt.into(),
            interval_minutes: 30,
            max_chars: 1500,
        }
    }

    pub fn with_chunking(mut self, interval_minutes: u64, max_chars: usize) -> Self {
        self.interval_minutes = interval_minutes;
        self.max_chars = max_chars;
        self
    }

    /// Parse and chunk the subtitle file, persist the chunks, then outline each one.
    ///
    /// A missing or empty subtitle file fails the whole run; per-chunk failures
    /// are recorded and skipped.
    pub async fn extract(&self, srt_path: &Path) -> Result<OutlineResult> {
        info!("🎬 Starting outline extraction for {}", srt_path.display());

        let entries = parse_srt_file(srt_path).await?;
        let chunks = chunk_by_time_and_size(&entries, self.interval_minutes, self.max_chars);
        info!(
            "Split {} subtitle entries into {} chunks (≤{} min, <{} chars)",
            entries.len(),
            chunks.len(),
            self.interval_minutes,
            self.max_chars
        );

        self.store.save_chunks(&chunks).await?;

        let (outlines, failed_chunks) = self.extract_from_chunks(&chunks).await;
        Ok(OutlineResult {
            outlines,
            chunks,
            failed_chunks,
        })
    }

    /// Outline already-derived chunks in order; returns merged entries and failed chunk indices
    pub async fn extract_from_chunks(&self, chunks: &[Chunk]) -> (Vec<OutlineEntry>, Vec<usize>) {
        let mut all_outlines = Vec::new();
        let mut failed = Vec::new();

        for (position, chunk) in chunks.iter().enumerate() {
            info!(
                "Processing chunk {}/{} ({} -> {})",
                position + 1,
                chunks.len(),
                chunk.start_time,
                chunk.end_time
            );

            let input = json!({ "text": chunk.text });
            let response = match self.orchestrator.call(&self.prompt, Some(&input)).await {
                Ok(response) => response,
                Err(e) => {
                    error!("Chunk {} outline failed: {:#}", chunk.chunk_index, e);
                    failed.push(chunk.chunk_index);
                    continue;
                }
            };

            if response.trim().is_empty() {
                warn!("Chunk {} returned an empty response", chunk.chunk_index);
                failed.push(chunk.chunk_index);
                continue;
            }

            if let Err(e) = self.store.save_outline_response(chunk.chunk_index, &response).await {
                warn!("Could not keep raw outline for chunk {}: {}", chunk.chunk_index, e);
            }

            let parsed = lines_to_entries(response.lines(), chunk.chunk_index);
            if parsed.is_empty() {
                warn!("No topics recognized in chunk {}", chunk.chunk_index);
            }
            all_outlines.extend(parsed);
        }

        let merged = merge_outlines(all_outlines);
        info!("✅ Outline extraction completed with {} topics", merged.len());
        (merged, failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_to_entries() {
        let response = "Here are the topics:\n\
            1. **Opening remarks**\n\
            - Welcome\n\
            -   Agenda for today  \n\
            \n\
            2.**Guard passing**\n\
            - Pressure first\n\
            Some stray prose\n\
            - Stack pass";

        let entries = lines_to_entries(response.lines(), 4);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "Opening remarks");
        assert_eq!(entries[0].subtopics, vec!["Welcome", "Agenda for today"]);
        assert_eq!(entries[1].title, "Guard passing");
        assert_eq!(entries[1].subtopics, vec!["Pressure first", "Stack pass"]);
        assert!(entries.iter().all(|e| e.chunk_index == 4));
    }

    #[test]
    fn test_dash_lines_outside_entry_are_ignored() {
        let entries = lines_to_entries(["- orphan", "1. **Only topic**", "- kept"], 0);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].subtopics, vec!["kept"]);
    }

    #[test]
    fn test_overlong_and_empty_subtopics_are_dropped() {
        let long = format!("- {}", "x".repeat(MAX_SUBTOPIC_CHARS + 1));
        let exact = format!("- {}", "y".repeat(MAX_SUBTOPIC_CHARS));
        let entries = lines_to_entries(["1. **Topic**", "-", long.as_str(), exact.as_str()], 0);

        assert_eq!(entries[0].subtopics.len(), 1);
        assert_eq!(entries[0].subtopics[0].len(), MAX_SUBTOPIC_CHARS);
    }

    #[test]
    fn test_plain_numbered_lines_do_not_start_entries() {
        let entries = lines_to_entries(["1. Not bold", "- detail"], 0);
        assert!(entries.is_empty());
    }

    #[test]
    fn test_merge_keeps_first_occurrence() {
        let mut first_a = OutlineEntry::new("A", 0);
        first_a.subtopics.push("from chunk 0".to_string());
        let mut second_a = OutlineEntry::new("A", 2);
        second_a.subtopics.push("from chunk 2".to_string());

        let merged = merge_outlines(vec![first_a.clone(), OutlineEntry::new("B", 1), second_a]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], first_a);
        assert_eq!(merged[1].title, "B");
    }
}
