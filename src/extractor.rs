//! Stream annotation extractor.
//!
//! The model is instructed to flag facts worth keeping by emitting a marker
//! line (`:::WORKSPACE_SAVE: <fact>`). Replies arrive as *cumulative* text, so
//! every increment is rescanned from the start: markers are stripped from the
//! visible text every time, while facts are reported only the first time
//! they are seen during the current model turn.

use std::collections::HashSet;

/// Marker sentinel. Everything after it up to the end of the line is the fact.
pub const SENTINEL: &str = ":::WORKSPACE_SAVE:";

/// Shortest trailing fragment treated as a sentinel still being typed.
const MIN_PARTIAL_SENTINEL: usize = 3;

/// What to do with a marker on the last line when that line has no newline yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrailingMarker {
    /// End of input terminates the marker; the fact is reported immediately.
    #[default]
    Capture,
    /// Hide the marker but hold the fact back until its newline arrives or
    /// [`AnnotationExtractor::finish`] is called.
    Defer,
}

/// Result of one pass over the cumulative text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// The cumulative text with every marker removed.
    pub cleaned: String,
    /// Facts not reported before during this turn, in order of appearance.
    pub new_facts: Vec<String>,
}

/// Per-turn marker extractor. Call [`reset`](Self::reset) when a new model
/// turn begins.
#[derive(Debug, Default)]
pub struct AnnotationExtractor {
    seen: HashSet<String>,
    trailing: TrailingMarker,
}

impl AnnotationExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trailing(trailing: TrailingMarker) -> Self {
        AnnotationExtractor {
            seen: HashSet::new(),
            trailing,
        }
    }

    pub fn trailing(&self) -> TrailingMarker {
        self.trailing
    }

    /// Forget the facts captured for the previous turn.
    pub fn reset(&mut self) {
        self.seen.clear();
    }

    /// Number of distinct facts captured during the current turn.
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Process an in-flight increment.
    pub fn extract(&mut self, cumulative: &str) -> Extraction {
        self.scan(cumulative, false)
    }

    /// Process the final text of the stream. A trailing unterminated marker
    /// is always captured here, whatever the [`TrailingMarker`] policy.
    pub fn finish(&mut self, cumulative: &str) -> Extraction {
        self.scan(cumulative, true)
    }

    fn scan(&mut self, text: &str, final_pass: bool) -> Extraction {
        let deferring = !final_pass && self.trailing == TrailingMarker::Defer;
        let mut cleaned = String::with_capacity(text.len());
        let mut new_facts = Vec::new();

        for segment in text.split_inclusive('\n') {
            let terminated = segment.ends_with('\n');
            let Some(pos) = segment.find(SENTINEL) else {
                if deferring && !terminated {
                    cleaned.push_str(strip_partial_sentinel(segment));
                } else {
                    cleaned.push_str(segment);
                }
                continue;
            };

            // The marker runs to the end of the line, newline included.
            cleaned.push_str(&segment[..pos]);
            if deferring && !terminated {
                continue;
            }
            let fact = segment[pos + SENTINEL.len()..].trim();
            if fact.is_empty() {
                continue;
            }
            if self.seen.insert(fact.to_string()) {
                new_facts.push(fact.to_string());
            }
        }

        // Removing a marker can butt two fragments together into a fresh
        // sentinel; the visible text must never show one.
        while cleaned.contains(SENTINEL) {
            cleaned = cleaned.replace(SENTINEL, "");
        }

        Extraction { cleaned, new_facts }
    }
}

/// Drop a trailing fragment that could be the start of a sentinel.
fn strip_partial_sentinel(segment: &str) -> &str {
    for len in (MIN_PARTIAL_SENTINEL..SENTINEL.len()).rev() {
        if segment.ends_with(&SENTINEL[..len]) {
            return &segment[..segment.len() - len];
        }
    }
    segment
}
