use crate::error::PipelineError;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

/// SRT timestamp (`HH:MM:SS,mmm`) with millisecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(Duration);

impl Timestamp {
    pub fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }

    pub fn as_millis(&self) -> u64 {
        self.0.as_millis() as u64
    }

    /// Saturating difference `self - earlier`
    pub fn since(&self, earlier: Timestamp) -> Duration {
        self.0.saturating_sub(earlier.0)
    }

    /// Parse the exact canonical form `HH:MM:SS,mmm`.
    ///
    /// Model output goes through this path; [`FromStr`] is more lenient and
    /// is meant for subtitle files.
    pub fn parse_strict(text: &str) -> Result<Self, PipelineError> {
        static STRICT: OnceLock<Regex> = OnceLock::new();
        let re = STRICT.get_or_init(|| {
            Regex::new(r"^\d{2}:\d{2}:\d{2},\d{3}$").expect("static timestamp pattern")
        });

        if !re.is_match(text) {
            return Err(PipelineError::InvalidTimestamp(text.to_string()));
        }
        text.parse()
    }
}

impl From<Duration> for Timestamp {
    fn from(duration: Duration) -> Self {
        Self::from_millis(duration.as_millis() as u64)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_seconds = self.0.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;
        let milliseconds = self.0.subsec_millis();

        write!(f, "{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, milliseconds)
    }
}

impl FromStr for Timestamp {
    type Err = PipelineError;

    /// Accepts `H:MM:SS,mmm` and `H:MM:SS.mmm`; the millisecond part may be omitted
    fn from_str(timestamp: &str) -> Result<Self, Self::Err> {
        let invalid = || PipelineError::InvalidTimestamp(timestamp.to_string());
        let timestamp_trimmed = timestamp.trim();

        let (hms, millis) = match timestamp_trimmed.split_once([',', '.']) {
            Some((hms, millis)) => (hms, millis),
            None => (timestamp_trimmed, "0"),
        };

        let hms_parts: Vec<&str> = hms.split(':').collect();
        if hms_parts.len() != 3 {
            return Err(invalid());
        }

        let hours: u64 = hms_parts[0].parse().map_err(|_| invalid())?;
        let minutes: u64 = hms_parts[1].parse().map_err(|_| invalid())?;
        let seconds: u64 = hms_parts[2].parse().map_err(|_| invalid())?;
        if minutes >= 60 || seconds >= 60 || millis.is_empty() || millis.len() > 3 {
            return Err(invalid());
        }
        // "5" after the separator means 500ms, not 5ms
        let milliseconds: u64 = format!("{:0<3}", millis).parse().map_err(|_| invalid())?;

        let total_millis = hours
            .checked_mul(3600)
            .and_then(|secs| secs.checked_add(minutes * 60 + seconds))
            .and_then(|secs| secs.checked_mul(1000))
            .and_then(|millis| millis.checked_add(milliseconds))
            .ok_or_else(invalid)?;
        Ok(Self::from_millis(total_millis))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_formatting() {
        assert_eq!(Timestamp::from_secs(3661).to_string(), "01:01:01,000");
        assert_eq!(Timestamp::from_millis(1500).to_string(), "00:00:01,500");
        assert_eq!(Timestamp::default().to_string(), "00:00:00,000");
    }

    #[test]
    fn test_lenient_parsing() {
        let ts: Timestamp = "00:05:00.250".parse().unwrap();
        assert_eq!(ts.as_millis(), 300_250);

        let ts: Timestamp = "1:02:03,4".parse().unwrap();
        assert_eq!(ts.as_millis(), 3_723_400);

        assert!("00:61:00,000".parse::<Timestamp>().is_err());
        assert!("12:00".parse::<Timestamp>().is_err());
    }

    #[test]
    fn test_huge_hour_field_is_rejected() {
        let err = "9999999999999999:00:00,000".parse::<Timestamp>().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTimestamp(_)));

        let max_hours = format!("{}:00:00,000", u64::MAX);
        assert!(max_hours.parse::<Timestamp>().is_err());

        let json = serde_json::json!("9999999999999999:00:00,000");
        assert!(serde_json::from_value::<Timestamp>(json).is_err());
    }

    #[test]
    fn test_strict_parsing_rejects_loose_forms() {
        assert!(Timestamp::parse_strict("00:01:00,000").is_ok());
        assert!(Timestamp::parse_strict("00:01:00.000").is_err());
        assert!(Timestamp::parse_strict("1:01:00,000").is_err());
        assert!(Timestamp::parse_strict("end").is_err());
    }

    #[test]
    fn test_serde_uses_srt_string() {
        let ts = Timestamp::from_millis(5_025);
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"00:00:05,025\"");

        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }
}
