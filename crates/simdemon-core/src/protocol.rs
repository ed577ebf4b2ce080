//! Structured result marker protocol carried over log lines.
//!
//! An app prints a literal start marker, any number of payload lines (each
//! optionally prefixed with a `[level]` tag), then a literal stop marker.
//! The payload lines are joined with newlines, trimmed, and parsed as JSON.
//! An empty region parses to an empty object.
//!
//! ```text
//! [INFO] RESULT_START
//! [INFO] {"foo":"bar"}
//! [INFO] RESULT_STOP
//! ```

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Default literal line opening a capture region
pub const RESULT_START_MARKER: &str = "RESULT_START";

/// Default literal line closing a capture region
pub const RESULT_STOP_MARKER: &str = "RESULT_STOP";

/// Leading `[level]` tag, e.g. `[INFO] ` or `[DEBUG]`.
///
/// Any single bracketed word matches, so a payload line such as `[1]` is
/// read as a bare tag.
static LOG_LEVEL_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\w+\]\s*").expect("Invalid LOG_LEVEL_TAG regex"));

/// Upper bound on buffered payload lines before a region is abandoned
const MAX_CAPTURE_LINES: usize = 10_000;

/// Strip an optional leading `[level]` tag from a log line
pub fn strip_level_tag(line: &str) -> &str {
    match LOG_LEVEL_TAG.find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    }
}

/// A captured payload that is not valid JSON
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Results are not valid JSON")]
pub struct ParseFailure {
    /// The joined payload text that failed to parse
    pub payload: String,
    /// Parser error detail
    pub reason: String,
}

/// Outcome of one closed capture region
pub type StructuredResult = std::result::Result<Value, ParseFailure>;

/// Parser states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerState {
    /// Waiting for a start marker
    AwaitingStart,
    /// Between start and stop markers
    Capturing,
    /// At least one region has been closed; a new start marker re-arms
    Done,
}

/// Line-by-line state machine for the structured result marker protocol
#[derive(Debug)]
pub struct ResultMarkerParser {
    start_marker: String,
    stop_marker: String,
    state: MarkerState,
    lines: Vec<String>,
}

impl Default for ResultMarkerParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultMarkerParser {
    /// Create a parser using [`RESULT_START_MARKER`] / [`RESULT_STOP_MARKER`]
    pub fn new() -> Self {
        Self::with_markers(RESULT_START_MARKER, RESULT_STOP_MARKER)
    }

    pub fn with_markers(start: impl Into<String>, stop: impl Into<String>) -> Self {
        Self {
            start_marker: start.into(),
            stop_marker: stop.into(),
            state: MarkerState::AwaitingStart,
            lines: Vec::new(),
        }
    }

    pub fn state(&self) -> MarkerState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.state == MarkerState::Capturing
    }

    /// Feed one log line. Returns a result when the line closes a region.
    pub fn feed_line(&mut self, line: &str) -> Option<StructuredResult> {
        let line = strip_level_tag(line.trim_end_matches(['\r', '\n']));

        match self.state {
            MarkerState::AwaitingStart | MarkerState::Done => {
                if line == self.start_marker {
                    self.lines.clear();
                    self.state = MarkerState::Capturing;
                }
                None
            }
            MarkerState::Capturing => {
                if line == self.stop_marker {
                    self.state = MarkerState::Done;
                    let lines = std::mem::take(&mut self.lines);
                    return Some(parse_payload(&lines));
                }

                if !line.is_empty() {
                    if self.lines.len() >= MAX_CAPTURE_LINES {
                        tracing::warn!(
                            "Result region exceeded {} lines, discarding",
                            MAX_CAPTURE_LINES
                        );
                        self.reset();
                        return None;
                    }
                    self.lines.push(line.to_string());
                }
                None
            }
        }
    }

    /// Discard any open region. An unclosed region never yields a result.
    pub fn reset(&mut self) {
        self.state = MarkerState::AwaitingStart;
        self.lines.clear();
    }
}

/// Join captured lines and parse them as JSON
pub fn parse_payload(lines: &[String]) -> StructuredResult {
    if lines.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }

    let payload = lines.join("\n").trim().to_string();
    if payload.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }

    serde_json::from_str(&payload).map_err(|e| ParseFailure {
        payload,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut ResultMarkerParser, input: &str) -> Vec<StructuredResult> {
        input.lines().filter_map(|l| parser.feed_line(l)).collect()
    }

    #[test]
    fn test_single_line_payload() {
        let mut parser = ResultMarkerParser::new();
        let results = feed_all(&mut parser, "RESULT_START\n{\"foo\":\"bar\"}\nRESULT_STOP");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap()["foo"], "bar");
        assert_eq!(parser.state(), MarkerState::Done);
    }

    #[test]
    fn test_empty_region_is_empty_object() {
        let mut parser = ResultMarkerParser::new();
        let results = feed_all(&mut parser, "RESULT_START\nRESULT_STOP");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap(), &serde_json::json!({}));
    }

    #[test]
    fn test_unclosed_region_yields_nothing() {
        let mut parser = ResultMarkerParser::new();
        let results = feed_all(&mut parser, "RESULT_START\n{\"foo\":");

        assert!(results.is_empty());
        assert!(parser.is_capturing());
    }

    #[test]
    fn test_multi_line_payload_with_level_tags() {
        let input = "[INFO] booting\n\
                     [INFO] RESULT_START\n\
                     [INFO] {\n\
                     [INFO]   \"foo\": \"bar\",\n\
                     [DEBUG]\n\
                     [INFO]   \"n\": 2\n\
                     [INFO] }\n\
                     [INFO] RESULT_STOP\n\
                     [INFO] after";
        let mut parser = ResultMarkerParser::new();
        let results = feed_all(&mut parser, input);

        assert_eq!(results.len(), 1);
        let value = results[0].as_ref().unwrap();
        assert_eq!(value["foo"], "bar");
        assert_eq!(value["n"], 2);
    }

    #[test]
    fn test_malformed_payload_is_parse_failure() {
        let mut parser = ResultMarkerParser::new();
        let results = feed_all(&mut parser, "RESULT_START\nnot json\nRESULT_STOP");

        let err = results[0].as_ref().unwrap_err();
        assert_eq!(err.payload, "not json");
        assert_eq!(err.to_string(), "Results are not valid JSON");

        // Parser keeps working after a failure
        let more = feed_all(&mut parser, "RESULT_START\n[1, 2]\nRESULT_STOP");
        assert_eq!(more[0].as_ref().unwrap(), &serde_json::json!([1, 2]));
    }

    #[test]
    fn test_single_word_array_reads_as_level_tag() {
        // `[1]` and `[ok]` look exactly like `[INFO]` and are stripped
        let mut parser = ResultMarkerParser::new();
        let results = feed_all(&mut parser, "RESULT_START\n[1]\nRESULT_STOP");
        assert_eq!(results[0].as_ref().unwrap(), &serde_json::json!({}));

        let results = feed_all(&mut parser, "RESULT_START\n[ok] [\"ok\"]\nRESULT_STOP");
        assert_eq!(results[0].as_ref().unwrap(), &serde_json::json!(["ok"]));

        // Anything beyond one word inside the brackets is kept
        assert_eq!(strip_level_tag("[1, 2]"), "[1, 2]");
        assert_eq!(strip_level_tag("[\"a\"]"), "[\"a\"]");
    }

    #[test]
    fn test_stop_marker_ignored_outside_region() {
        let mut parser = ResultMarkerParser::new();
        assert!(parser.feed_line("RESULT_STOP").is_none());
        assert_eq!(parser.state(), MarkerState::AwaitingStart);
    }

    #[test]
    fn test_custom_markers() {
        let mut parser =
            ResultMarkerParser::with_markers("TI_MOCHA_RESULT_START", "TI_MOCHA_RESULT_STOP");
        let results = feed_all(
            &mut parser,
            "TI_MOCHA_RESULT_START\n{\"ok\":true}\nTI_MOCHA_RESULT_STOP",
        );
        assert_eq!(results[0].as_ref().unwrap()["ok"], true);
    }

    #[test]
    fn test_strip_level_tag() {
        assert_eq!(strip_level_tag("[INFO] hello"), "hello");
        assert_eq!(strip_level_tag("[ERROR]boom"), "boom");
        assert_eq!(strip_level_tag("no tag"), "no tag");
        assert_eq!(strip_level_tag(" [INFO] indented"), " [INFO] indented");
    }

    #[test]
    fn test_reset_discards_open_region() {
        let mut parser = ResultMarkerParser::new();
        parser.feed_line("RESULT_START");
        parser.feed_line("{}");
        parser.reset();
        assert!(parser.feed_line("RESULT_STOP").is_none());
    }
}
