//! Argument vectors for the external tools.

use crate::quality::QualityProfile;

/// Format selector: prefer m4a audio, then any audio, then anything.
pub const RETRIEVAL_FORMAT: &str = "bestaudio[ext=m4a]/bestaudio/best";

/// Options that shape the retrieval command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalOptions {
    pub buffer_size: String,
    pub socket_timeout_seconds: u64,
}

/// Turns a client query into a retrieval reference.
///
/// `http://` and `https://` URLs pass through untouched; anything else is
/// prefixed so the tool resolves it as a search.
pub fn media_reference(query: &str, search_prefix: &str) -> String {
    let query = query.trim();
    let lower = query.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        query.to_string()
    } else {
        format!("{search_prefix}{query}")
    }
}

/// Arguments for streaming the best audio of `reference` to stdout.
pub fn retrieval_args(options: &RetrievalOptions, reference: &str) -> Vec<String> {
    vec![
        "-f".to_string(),
        RETRIEVAL_FORMAT.to_string(),
        "--no-playlist".to_string(),
        "--quiet".to_string(),
        "--no-warnings".to_string(),
        "--buffer-size".to_string(),
        options.buffer_size.clone(),
        "--no-part".to_string(),
        "--socket-timeout".to_string(),
        options.socket_timeout_seconds.to_string(),
        "--fragment-retries".to_string(),
        "3".to_string(),
        "--retries".to_string(),
        "2".to_string(),
        "-o".to_string(),
        "-".to_string(),
        reference.to_string(),
    ]
}

/// Arguments for printing the duration of `reference`.
pub fn duration_args(reference: &str) -> Vec<String> {
    vec![
        "--get-duration".to_string(),
        "--no-playlist".to_string(),
        "--quiet".to_string(),
        reference.to_string(),
    ]
}

/// Arguments for transcoding stdin to `profile` on stdout, reporting
/// progress on stderr.
pub fn transcode_args(seek_offset: f64, profile: &QualityProfile) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-nostats",
        "-progress",
        "pipe:2",
        "-ss",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.push(format_seek(seek_offset));
    args.extend(
        ["-i", "pipe:0", "-vn", "-acodec", profile.codec, "-b:a"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.push(profile.bitrate_arg());
    args.push("-ac".to_string());
    args.push(profile.channels.to_string());
    args.push("-ar".to_string());
    args.push(profile.sample_rate.to_string());
    args.extend(profile.encoder_params.split_whitespace().map(str::to_string));
    args.push("-f".to_string());
    args.push(profile.container.format_name().to_string());
    args.push("pipe:1".to_string());
    args
}

/// Seek offset in the transcoder's seconds notation (millisecond precision).
fn format_seek(seek_offset: f64) -> String {
    let seconds = if seek_offset.is_finite() && seek_offset > 0.0 {
        seek_offset
    } else {
        0.0
    };
    let formatted = format!("{seconds:.3}");
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::quality::{QualityProfileTable, Tier};

    #[test]
    fn test_media_reference_passes_urls_through() {
        assert_eq!(
            media_reference("https://example.com/watch?v=abc", "ytsearch1:"),
            "https://example.com/watch?v=abc"
        );
        assert_eq!(
            media_reference("  HTTP://example.com/a ", "ytsearch1:"),
            "HTTP://example.com/a"
        );
    }

    #[test]
    fn test_media_reference_prefixes_search_queries() {
        assert_eq!(
            media_reference("daft punk one more time", "ytsearch1:"),
            "ytsearch1:daft punk one more time"
        );
        assert_eq!(media_reference("abc", ""), "abc");
    }

    #[test]
    fn test_retrieval_args() {
        let options = RetrievalOptions {
            buffer_size: "16K".to_string(),
            socket_timeout_seconds: 10,
        };
        let args = retrieval_args(&options, "ytsearch1:song");
        assert_eq!(
            args,
            vec![
                "-f",
                "bestaudio[ext=m4a]/bestaudio/best",
                "--no-playlist",
                "--quiet",
                "--no-warnings",
                "--buffer-size",
                "16K",
                "--no-part",
                "--socket-timeout",
                "10",
                "--fragment-retries",
                "3",
                "--retries",
                "2",
                "-o",
                "-",
                "ytsearch1:song",
            ]
        );
    }

    #[test]
    fn test_transcode_args_for_medium() {
        let table = QualityProfileTable::standard();
        let args = transcode_args(12.5, table.profile_for(Tier::Medium));
        assert_eq!(
            args,
            vec![
                "-hide_banner",
                "-loglevel",
                "error",
                "-nostats",
                "-progress",
                "pipe:2",
                "-ss",
                "12.5",
                "-i",
                "pipe:0",
                "-vn",
                "-acodec",
                "libmp3lame",
                "-b:a",
                "128k",
                "-ac",
                "2",
                "-ar",
                "44100",
                "-compression_level",
                "5",
                "-f",
                "mp3",
                "pipe:1",
            ]
        );
    }

    #[test]
    fn test_format_seek() {
        assert_eq!(format_seek(0.0), "0");
        assert_eq!(format_seek(90.0), "90");
        assert_eq!(format_seek(1.25), "1.25");
        assert_eq!(format_seek(-3.0), "0");
        assert_eq!(format_seek(f64::NAN), "0");
    }

    #[test]
    fn test_duration_args() {
        assert_eq!(
            duration_args("ytsearch1:x"),
            vec!["--get-duration", "--no-playlist", "--quiet", "ytsearch1:x"]
        );
    }
}
