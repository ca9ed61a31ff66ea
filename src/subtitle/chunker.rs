use super::{format_srt, SubtitleEntry, Timestamp};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// A contiguous run of subtitle entries handed to the model in one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 0-based, contiguous across a run
    pub chunk_index: usize,
    /// Entry texts joined with single spaces
    pub text: String,
    /// Start of the first entry
    pub start_time: Timestamp,
    /// End of the last entry
    pub end_time: Timestamp,
    pub entries: Vec<SubtitleEntry>,
}

impl Chunk {
    /// Build a chunk from a non-empty run of entries
    pub fn from_entries(chunk_index: usize, entries: Vec<SubtitleEntry>) -> Option<Self> {
        let start_time = entries.first()?.start_time;
        let end_time = entries.last()?.end_time;
        let text = entries
            .iter()
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        Some(Self {
            chunk_index,
            text,
            start_time,
            end_time,
            entries,
        })
    }

    /// Entries rendered back as SRT blocks
    pub fn srt_text(&self) -> String {
        format_srt(&self.entries)
    }

    pub fn duration(&self) -> Duration {
        self.end_time.since(self.start_time)
    }
}

/// Split entries into chunks bounded by elapsed time AND accumulated characters.
///
/// A cut happens before an entry when the time since the last cut reaches
/// `interval_minutes`, or when adding the entry would bring the character count
/// to `max_chars` or beyond. A single entry longer than `max_chars` still forms
/// its own chunk.
pub fn chunk_by_time_and_size(
    entries: &[SubtitleEntry],
    interval_minutes: u64,
    max_chars: usize,
) -> Vec<Chunk> {
    let Some(first) = entries.first() else {
        return Vec::new();
    };

    let interval = Duration::from_secs(interval_minutes * 60);
    let mut chunks = Vec::new();
    let mut current: Vec<SubtitleEntry> = Vec::new();
    let mut current_chars = 0usize;
    let mut last_cut = first.start_time;

    for entry in entries {
        let elapsed = entry.start_time.since(last_cut);
        let entry_chars = entry.char_len();

        let time_limit_reached = elapsed >= interval;
        let char_limit_reached = current_chars + entry_chars >= max_chars;

        if (time_limit_reached || char_limit_reached) && !current.is_empty() {
            let run = std::mem::take(&mut current);
            chunks.extend(Chunk::from_entries(chunks.len(), run));
            current_chars = 0;
            last_cut = entry.start_time;
        }

        current.push(entry.clone());
        current_chars += entry_chars;
    }

    if !current.is_empty() {
        chunks.extend(Chunk::from_entries(chunks.len(), current));
    }

    debug!(
        "Split {} entries into {} chunks (interval {}m, budget {} chars)",
        entries.len(),
        chunks.len(),
        interval_minutes,
        max_chars
    );
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: u32, start_secs: u64, text: &str) -> SubtitleEntry {
        SubtitleEntry::new(
            index,
            Timestamp::from_secs(start_secs),
            Timestamp::from_secs(start_secs + 4),
            text,
        )
    }

    fn track(count: u32, spacing_secs: u64, text: &str) -> Vec<SubtitleEntry> {
        (0..count)
            .map(|i| entry(i + 1, i as u64 * spacing_secs, text))
            .collect()
    }

    #[test]
    fn test_empty_input_gives_no_chunks() {
        assert!(chunk_by_time_and_size(&[], 10, 1000).is_empty());
    }

    #[test]
    fn test_chunks_partition_entries() {
        let entries = track(200, 7, "some dialogue here");
        let chunks = chunk_by_time_and_size(&entries, 5, 500);

        let rejoined: Vec<SubtitleEntry> =
            chunks.iter().flat_map(|c| c.entries.clone()).collect();
        assert_eq!(rejoined, entries);

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert!(!chunk.entries.is_empty());
        }
    }

    #[test]
    fn test_char_budget_is_respected() {
        let entries = track(100, 1, "0123456789");
        let chunks = chunk_by_time_and_size(&entries, 60, 45);

        for chunk in &chunks {
            let chars: usize = chunk.entries.iter().map(|e| e.char_len()).sum();
            assert!(chars < 45, "chunk {} has {} chars", chunk.chunk_index, chars);
        }
        // 4 entries of 10 chars fit under 45, the fifth would reach 50
        assert_eq!(chunks[0].entries.len(), 4);
    }

    #[test]
    fn test_time_interval_is_respected() {
        let entries = track(120, 30, "x");
        let chunks = chunk_by_time_and_size(&entries, 10, 1_000_000);

        assert_eq!(chunks.len(), 6);
        for chunk in &chunks {
            let first = chunk.entries.first().unwrap().start_time;
            let last = chunk.entries.last().unwrap().start_time;
            assert!(last.since(first) < Duration::from_secs(600));
        }
        assert_eq!(chunks[1].start_time.to_string(), "00:10:00,000");
    }

    #[test]
    fn test_oversized_single_entry_stands_alone() {
        let long = "y".repeat(80);
        let entries = vec![entry(1, 0, "short"), entry(2, 5, &long), entry(3, 10, "tail")];
        let chunks = chunk_by_time_and_size(&entries, 30, 50);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].entries.len(), 1);
        assert_eq!(chunks[1].text, long);
    }

    #[test]
    fn test_chunk_bounds_and_text() {
        let entries = vec![entry(1, 3, "hello"), entry(2, 9, "world")];
        let chunks = chunk_by_time_and_size(&entries, 30, 1000);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello world");
        assert_eq!(chunks[0].start_time, Timestamp::from_secs(3));
        assert_eq!(chunks[0].end_time, Timestamp::from_secs(13));
        assert_eq!(chunks[0].duration(), Duration::from_secs(10));
    }
}
