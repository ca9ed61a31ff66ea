use super::Timestamp;
use crate::error::PipelineError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// SRT (SubRip Subtitle) entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleEntry {
    /// Sequential number as written in the source file
    pub index: u32,
    /// Start timestamp
    pub start_time: Timestamp,
    /// End timestamp
    pub end_time: Timestamp,
    /// Subtitle text (multi-line cues keep their line breaks)
    pub text: String,
}

impl SubtitleEntry {
    /// Create a new subtitle entry
    pub fn new(index: u32, start_time: Timestamp, end_time: Timestamp, text: impl Into<String>) -> Self {
        Self {
            index,
            start_time,
            end_time,
            text: text.into().trim().to_string(),
        }
    }

    /// Length of the cue text in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

impl fmt::Display for SubtitleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{} --> {}\n{}\n",
            self.index, self.start_time, self.end_time, self.text
        )
    }
}

/// Read and parse an SRT file.
///
/// Fails with [`PipelineError::EmptySource`] when the file is missing, has zero
/// size, or holds no readable cue.
pub async fn parse_srt_file<P: AsRef<Path>>(path: P) -> Result<Vec<SubtitleEntry>> {
    let path = path.as_ref();

    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(_) => {
            return Err(PipelineError::EmptySource {
                path: path.to_path_buf(),
            }
            .into())
        }
    };
    if metadata.len() == 0 {
        return Err(PipelineError::EmptySource {
            path: path.to_path_buf(),
        }
        .into());
    }

    let bytes = tokio::fs::read(path).await?;
    let content = String::from_utf8_lossy(&bytes);
    let entries = parse_srt(&content)?;
    if entries.is_empty() {
        warn!("No subtitle cues could be read from {}", path.display());
        return Err(PipelineError::EmptySource {
            path: path.to_path_buf(),
        }
        .into());
    }

    debug!("Parsed {} subtitle entries from {}", entries.len(), path.display());
    Ok(entries)
}

/// Parse SRT text into entries, preserving file order.
///
/// Blocks that are not a valid cue are logged and skipped; the rest of the
/// file is still parsed.
pub fn parse_srt(content: &str) -> Result<Vec<SubtitleEntry>, PipelineError> {
    let content = content.trim_start_matches('\u{feff}');
    let mut entries = Vec::new();
    let mut skipped = 0usize;
    let mut lines = content.lines().enumerate().peekable();

    loop {
        // Skip blank separators
        while matches!(lines.peek(), Some(&(_, l)) if l.trim().is_empty()) {
            lines.next();
        }

        let Some(&(line_no, _)) = lines.peek() else {
            break;
        };

        let mut block = Vec::new();
        while let Some(&(_, line)) = lines.peek() {
            if line.trim().is_empty() {
                break;
            }
            block.push(line);
            lines.next();
        }

        match parse_block(&block, entries.len()) {
            Ok(entry) => entries.push(entry),
            Err(reason) => {
                skipped += 1;
                let err = PipelineError::MalformedSubtitle {
                    line: line_no + 1,
                    reason,
                };
                warn!("{}, skipping block", err);
            }
        }
    }

    if skipped > 0 {
        warn!("Skipped {} malformed subtitle blocks", skipped);
    }
    Ok(entries)
}

/// One blank-line separated block: cue number, timing line, text lines
fn parse_block(block: &[&str], parsed_so_far: usize) -> std::result::Result<SubtitleEntry, String> {
    let first = block.first().ok_or_else(|| "empty block".to_string())?;

    let (index, time_line, text_lines) = match first.trim().parse::<u32>() {
        Ok(index) => {
            let time_line = block.get(1).ok_or_else(|| "missing timing line".to_string())?;
            (index, *time_line, &block[2..])
        }
        // Some exporters omit the counter; synthesize one
        Err(_) if first.contains("-->") => (parsed_so_far as u32 + 1, *first, &block[1..]),
        Err(_) => return Err(format!("expected cue number, found {:?}", first.trim())),
    };

    let (start_time, end_time) = parse_time_range(time_line)?;

    if text_lines.is_empty() {
        warn!("Subtitle {} has no text, keeping it as empty cue", index);
    }

    let text: Vec<&str> = text_lines.iter().map(|line| line.trim_end()).collect();
    Ok(SubtitleEntry::new(index, start_time, end_time, text.join("\n")))
}

/// Parse a time range like `00:00:01,000 --> 00:00:02,000`.
/// Position hints after the end time (`X1:... Y1:...`) are ignored.
fn parse_time_range(line: &str) -> std::result::Result<(Timestamp, Timestamp), String> {
    let (start, rest) = line
        .split_once("-->")
        .ok_or_else(|| format!("expected timing line, found {:?}", line.trim()))?;
    let end = rest.split_whitespace().next().unwrap_or_default();

    let start: Timestamp = start.trim().parse().map_err(|e: PipelineError| e.to_string())?;
    let end: Timestamp = end.parse().map_err(|e: PipelineError| e.to_string())?;
    Ok((start, end))
}

/// Render entries back into SRT blocks
pub fn format_srt(entries: &[SubtitleEntry]) -> String {
    let mut srt_content = String::new();

    for entry in entries {
        srt_content.push_str(&entry.to_string());
        srt_content.push('\n');
    }

    srt_content
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "1\n00:00:01,000 --> 00:00:04,000\nHello there\n\n2\n00:00:05,000 --> 00:00:08,500\nTwo lines\nof text\n\n";

    #[test]
    fn test_parse_basic_srt() {
        let entries = parse_srt(SAMPLE).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].index, 1);
        assert_eq!(entries[0].start_time.to_string(), "00:00:01,000");
        assert_eq!(entries[1].end_time.to_string(), "00:00:08,500");
        assert_eq!(entries[1].text, "Two lines\nof text");
    }

    #[test]
    fn test_parse_tolerates_bom_crlf_and_extra_blank_lines() {
        let content = "\u{feff}\r\n\r\n1\r\n00:00:01,000 --> 00:00:02,000\r\nHi\r\n\r\n\r\n\r\n2\r\n00:00:03,000 --> 00:00:04,000 X1:10 X2:20\r\nBye\r\n";
        let entries = parse_srt(content).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "Hi");
        assert_eq!(entries[1].end_time.as_millis(), 4_000);
    }

    #[test]
    fn test_parse_skips_garbage() {
        assert!(parse_srt("hello\nworld\n").unwrap().is_empty());
    }

    #[test]
    fn test_blank_line_inside_cue_text_skips_only_the_stray_block() {
        let content = "1\n00:00:01,000 --> 00:00:02,000\nHello\n\nworld\n\n2\n00:00:03,000 --> 00:00:04,000\nStill here\n";
        let entries = parse_srt(content).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "Hello");
        assert_eq!(entries[1].index, 2);
        assert_eq!(entries[1].text, "Still here");
    }

    #[test]
    fn test_bad_timing_line_skips_one_cue() {
        let content = "1\n00:00:01,000 -> 00:00:02,000\nBroken arrow\n\n2\n00:00:03,000 --> 00:00:04,000\nFine\n\n3\n9999999999999999:00:00,000 --> 00:00:06,000\nHuge\n";
        let entries = parse_srt(content).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "Fine");
    }

    #[test]
    fn test_format_roundtrip_keeps_order() {
        let entries = parse_srt(SAMPLE).unwrap();
        let rendered = format_srt(&entries);
        assert!(rendered.contains("00:00:05,000 --> 00:00:08,500"));
        assert_eq!(parse_srt(&rendered).unwrap(), entries);
    }

    #[tokio::test]
    async fn test_missing_or_empty_file_is_empty_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("missing.srt");
        let err = parse_srt_file(&missing).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::EmptySource { .. })
        ));

        let empty = dir.path().join("empty.srt");
        tokio::fs::write(&empty, b"").await.unwrap();
        let err = parse_srt_file(&empty).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::EmptySource { .. })
        ));

        let unreadable = dir.path().join("notes.srt");
        tokio::fs::write(&unreadable, b"just some notes\n").await.unwrap();
        let err = parse_srt_file(&unreadable).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::EmptySource { .. })
        ));
    }
}
