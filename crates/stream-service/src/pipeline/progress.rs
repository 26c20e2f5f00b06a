//! Parsing of tool output: transcoder progress lines and duration text.

use crate::pipeline::stage::StageEvent;
use thiserror::Error;

/// Parses one `key=value` progress line from the transcoder.
///
/// Only `total_size=<bytes>` and `progress=end` carry meaning; every other
/// line (and a `total_size` of `N/A`) is ignored.
pub fn parse_progress_line(line: &str) -> Option<StageEvent> {
    let (key, value) = line.trim().split_once('=')?;
    match (key.trim(), value.trim()) {
        ("total_size", bytes) => bytes
            .parse::<u64>()
            .ok()
            .map(|total_bytes| StageEvent::Progress { total_bytes }),
        ("progress", "end") => Some(StageEvent::End),
        _ => None,
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("empty duration")]
    Empty,

    #[error("malformed duration '{0}'")]
    Malformed(String),
}

/// Parses `HH:MM:SS`, `MM:SS` or `SS` into milliseconds.
///
/// Seconds may carry a fractional part.
pub fn parse_duration_ms(text: &str) -> Result<u64, DurationParseError> {
    // The tool prints one line per entry; only the first matters.
    let text = text.lines().next().map(str::trim).unwrap_or_default();
    if text.is_empty() {
        return Err(DurationParseError::Empty);
    }

    let malformed = || DurationParseError::Malformed(text.to_string());

    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() > 3 {
        return Err(malformed());
    }

    let mut total_seconds = 0.0_f64;
    let last = parts.len().saturating_sub(1);
    for (i, part) in parts.iter().enumerate() {
        let part = part.trim();
        if part.is_empty() || part.starts_with('-') || part.starts_with('+') {
            return Err(malformed());
        }
        let value = if i == last {
            part.parse::<f64>().map_err(|_| malformed())?
        } else {
            f64::from(part.parse::<u32>().map_err(|_| malformed())?)
        };
        if !value.is_finite() {
            return Err(malformed());
        }
        total_seconds = total_seconds * 60.0 + value;
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let ms = (total_seconds * 1000.0).round() as u64;
    Ok(ms)
}
