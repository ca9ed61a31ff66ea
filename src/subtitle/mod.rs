//! Subtitle ingestion: SRT parsing, timestamps and time/size bounded chunking

pub mod chunker;
pub mod srt;
pub mod timestamp;

pub use chunker::{chunk_by_time_and_size, Chunk};
pub use srt::{format_srt, parse_srt, parse_srt_file, SubtitleEntry};
pub use timestamp::Timestamp;
