use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the extraction pipeline itself
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Subtitle source is missing or empty: {}", path.display())]
    EmptySource { path: PathBuf },

    #[error("Unsupported LLM provider: {0}")]
    UnsupportedProvider(String),

    #[error("Model response contains no structured data (preview: {preview:?})")]
    NoStructuredData { preview: String },

    #[error("Invalid timestamp (expected HH:MM:SS,mmm): {0}")]
    InvalidTimestamp(String),

    #[error("Malformed subtitle block near line {line}: {reason}")]
    MalformedSubtitle { line: usize, reason: String },

    #[error("Chunk {0} is not part of the current chunk set")]
    MissingChunk(usize),
}

/// Errors raised by an LLM backend
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("{provider} API error {status}: {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider} returned no choices")]
    EmptyResponse { provider: String },

    #[error("{provider} API key required")]
    MissingApiKey { provider: String },
}

impl LlmError {
    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Cut a string down to at most `max_chars` characters for log and error previews
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("héllo world", 5), "héllo...");
        assert_eq!(preview("short", 200), "short");
    }

    #[test]
    fn test_api_error_exposes_status() {
        let err = LlmError::Api {
            provider: "groq".to_string(),
            status: 429,
            body: "slow down".to_string(),
        };
        assert_eq!(err.status(), Some(429));
        assert!(err.to_string().contains("429"));
    }
}
