//! Incremental token stream parsing
//!
//! Splits a generation stream into user-visible text and the reasoning
//! span emitted between an opening and closing marker pair. Fragments
//! arrive with no alignment to semantic boundaries, so a marker may be
//! split across any number of fragments; a carry buffer holds back a
//! suffix that might still complete into a marker.

use once_cell::sync::Lazy;
use regex::Regex;

/// Default opening marker for reasoning spans
pub const DEFAULT_OPEN_MARKER: &str = "<think>";
/// Default closing marker for reasoning spans
pub const DEFAULT_CLOSE_MARKER: &str = "</think>";

static DEFAULT_STRIP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&pair_pattern(DEFAULT_OPEN_MARKER, DEFAULT_CLOSE_MARKER))
        .expect("default marker pattern")
});

fn pair_pattern(open: &str, close: &str) -> String {
    format!("(?s){}.*?{}", regex::escape(open), regex::escape(close))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseMode {
    Normal,
    InsideReasoning,
}

/// Stateful parser for one generation stream. Scoped to a single
/// completion; discard it when the turn ends.
pub struct TokenStreamParser {
    open_marker: String,
    close_marker: String,
    strip_re: Regex,
    mode: ParseMode,
    /// Suspected partial marker held back until the next fragment
    carry: String,
    visible: String,
    reasoning_buf: String,
    reasoning: Option<String>,
}

impl TokenStreamParser {
    pub fn new() -> Self {
        Self::with_markers(DEFAULT_OPEN_MARKER, DEFAULT_CLOSE_MARKER)
    }

    pub fn with_markers(open: &str, close: &str) -> Self {
        let strip_re = if open == DEFAULT_OPEN_MARKER && close == DEFAULT_CLOSE_MARKER {
            DEFAULT_STRIP_RE.clone()
        } else {
            // Escaped literals always compile
            Regex::new(&pair_pattern(open, close)).expect("marker pattern")
        };

        Self {
            open_marker: open.to_string(),
            close_marker: close.to_string(),
            strip_re,
            mode: ParseMode::Normal,
            carry: String::new(),
            visible: String::new(),
            reasoning_buf: String::new(),
            reasoning: None,
        }
    }

    /// Consume one token fragment. Empty fragments are no-ops.
    pub fn feed(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }

        let mut combined = std::mem::take(&mut self.carry);
        combined.push_str(fragment);

        loop {
            match self.mode {
                ParseMode::Normal => match combined.find(&self.open_marker) {
                    Some(idx) => {
                        self.visible.push_str(&combined[..idx]);
                        combined = combined[idx + self.open_marker.len()..].to_string();
                        self.mode = ParseMode::InsideReasoning;
                    }
                    None => break,
                },
                ParseMode::InsideReasoning => match combined.find(&self.close_marker) {
                    Some(idx) => {
                        self.reasoning_buf.push_str(&combined[..idx]);
                        // Only one span is tracked; the last closed span wins.
                        self.reasoning = Some(self.reasoning_buf.trim().to_string());
                        self.reasoning_buf.clear();
                        combined = combined[idx + self.close_marker.len()..].to_string();
                        self.mode = ParseMode::Normal;
                    }
                    None => break,
                },
            }
        }

        // Hold back a suffix that might be the start of the marker this
        // mode is waiting for.
        let marker = match self.mode {
            ParseMode::Normal => &self.open_marker,
            ParseMode::InsideReasoning => &self.close_marker,
        };
        let keep = partial_marker_suffix(&combined, marker);
        let emit_to = combined.len() - keep;
        match self.mode {
            ParseMode::Normal => self.visible.push_str(&combined[..emit_to]),
            ParseMode::InsideReasoning => self.reasoning_buf.push_str(&combined[..emit_to]),
        }
        self.carry = combined.split_off(emit_to);
    }

    /// Accumulated user-visible text, with any fully formed marker pair
    /// (and the text it encloses) stripped out. The re-scan covers the
    /// whole accumulation, not just the latest delta: late marker
    /// resolution can leave a completed pair behind in the buffer.
    pub fn visible_text(&self) -> String {
        if self.visible.contains(&self.open_marker) {
            self.strip_re.replace_all(&self.visible, "").into_owned()
        } else {
            self.visible.clone()
        }
    }

    /// Trimmed text of the last fully closed reasoning span
    pub fn reasoning(&self) -> Option<&str> {
        self.reasoning.as_deref()
    }

    /// Flush any unterminated state at end of stream. An unclosed
    /// reasoning span is surfaced as visible text instead of being
    /// dropped silently.
    pub fn finish(&mut self) {
        match self.mode {
            ParseMode::Normal => {
                // The held-back suffix never completed into a marker.
                self.visible.push_str(&self.carry);
            }
            ParseMode::InsideReasoning => {
                self.visible.push_str(&self.reasoning_buf);
                self.visible.push_str(&self.carry);
                self.reasoning_buf.clear();
                self.mode = ParseMode::Normal;
            }
        }
        self.carry.clear();
    }
}

impl Default for TokenStreamParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Length in bytes of the longest suffix of `text` that is a proper
/// prefix of `marker`
fn partial_marker_suffix(text: &str, marker: &str) -> usize {
    let max = marker.len().saturating_sub(1).min(text.len());
    for len in (1..=max).rev() {
        if !text.is_char_boundary(text.len() - len) {
            continue;
        }
        if marker.starts_with(&text[text.len() - len..]) {
            return len;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut TokenStreamParser, fragments: &[&str]) {
        for f in fragments {
            parser.feed(f);
        }
    }

    #[test]
    fn marker_pair_split_across_fragments() {
        let mut parser = TokenStreamParser::new();
        feed_all(
            &mut parser,
            &["Hello ", "<thi", "nk>planning</thin", "k> world"],
        );
        parser.finish();

        assert_eq!(parser.visible_text(), "Hello  world");
        assert_eq!(parser.reasoning(), Some("planning"));
    }

    #[test]
    fn marker_pair_in_single_fragment() {
        let mut parser = TokenStreamParser::new();
        parser.feed("a<think> deliberate </think>b");
        parser.finish();

        assert_eq!(parser.visible_text(), "ab");
        assert_eq!(parser.reasoning(), Some("deliberate"));
    }

    #[test]
    fn one_character_fragments() {
        let mut parser = TokenStreamParser::new();
        let stream = "x<think>y</think>z";
        for ch in stream.chars() {
            parser.feed(&ch.to_string());
        }
        parser.finish();

        assert_eq!(parser.visible_text(), "xz");
        assert_eq!(parser.reasoning(), Some("y"));
    }

    #[test]
    fn empty_fragments_are_no_ops() {
        let mut parser = TokenStreamParser::new();
        feed_all(&mut parser, &["", "a", "", "<think>r</think>", "", "b"]);
        parser.finish();

        assert_eq!(parser.visible_text(), "ab");
        assert_eq!(parser.reasoning(), Some("r"));
    }

    #[test]
    fn reasoning_is_trimmed() {
        let mut parser = TokenStreamParser::new();
        parser.feed("<think>\n  inner thoughts \n</think>done");
        parser.finish();

        assert_eq!(parser.visible_text(), "done");
        assert_eq!(parser.reasoning(), Some("inner thoughts"));
    }

    #[test]
    fn last_closed_span_wins() {
        let mut parser = TokenStreamParser::new();
        feed_all(
            &mut parser,
            &["<think>first</think>a", "<think>second</think>b"],
        );
        parser.finish();

        assert_eq!(parser.visible_text(), "ab");
        assert_eq!(parser.reasoning(), Some("second"));
    }

    #[test]
    fn unclosed_span_flushes_to_visible_at_end_of_stream() {
        let mut parser = TokenStreamParser::new();
        feed_all(&mut parser, &["before ", "<think>never closed"]);
        assert_eq!(parser.visible_text(), "before ");

        parser.finish();
        assert_eq!(parser.visible_text(), "before never closed");
        assert_eq!(parser.reasoning(), None);
    }

    #[test]
    fn false_marker_prefix_is_released() {
        let mut parser = TokenStreamParser::new();
        feed_all(&mut parser, &["a <th", "ree-legged dog"]);
        parser.finish();

        assert_eq!(parser.visible_text(), "a <three-legged dog");
        assert_eq!(parser.reasoning(), None);
    }

    #[test]
    fn trailing_partial_marker_flushes_at_end_of_stream() {
        let mut parser = TokenStreamParser::new();
        parser.feed("half a marker <thin");
        // Held back while the stream is live...
        assert_eq!(parser.visible_text(), "half a marker ");

        // ...but released once the stream ends.
        parser.finish();
        assert_eq!(parser.visible_text(), "half a marker <thin");
    }

    #[test]
    fn custom_markers() {
        let mut parser = TokenStreamParser::with_markers("[[plan]]", "[[/plan]]");
        feed_all(&mut parser, &["go [[pl", "an]]route A[[/p", "lan]] now"]);
        parser.finish();

        assert_eq!(parser.visible_text(), "go  now");
        assert_eq!(parser.reasoning(), Some("route A"));
    }

    #[test]
    fn visible_text_strips_resolved_pairs_defensively() {
        let mut parser = TokenStreamParser::new();
        // Simulate a resolved pair landing in the visible accumulation.
        parser.visible = "keep <think>stray</think>this".to_string();
        assert_eq!(parser.visible_text(), "keep this");
    }
}
