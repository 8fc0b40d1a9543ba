//! Character windows over the source text.
//!
//! Every pipeline stage optionally restricts itself to a `[start, end)`
//! sub-range of the source text. Offsets are character offsets; out-of-range
//! values are silently clamped to the text length, never reported as errors.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A half-open `[start, end)` character window, as configured (pre-clamp).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextWindow {
    /// Inclusive start offset.
    pub start: usize,
    /// Exclusive end offset.
    pub end: usize,
}

impl TextWindow {
    /// Create a window. Values are clamped lazily, against the text they are
    /// applied to.
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Effective bounds against a text of `len` characters. Both bounds are
    /// clamped to `[0, len]`; a start past the end collapses to the empty
    /// window at the start.
    #[must_use]
    pub fn clamp(&self, len: usize) -> (usize, usize) {
        let start = self.start.min(len);
        let end = self.end.min(len).max(start);
        (start, end)
    }

    /// Extract the windowed text.
    #[must_use]
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        let len = text.chars().count();
        let (start, end) = self.clamp(len);
        let (byte_start, byte_end) = char_range_to_bytes(text, start, end);
        &text[byte_start..byte_end]
    }

    /// Head and tail snippets of the windowed text, `snippet` characters
    /// each, for operator inspection before a long run.
    #[must_use]
    pub fn preview(&self, text: &str, snippet: usize) -> (String, String) {
        let windowed = self.slice(text);
        let head: String = windowed.chars().take(snippet).collect();
        let tail_len = windowed.chars().count();
        let tail: String = windowed
            .chars()
            .skip(tail_len.saturating_sub(snippet))
            .collect();
        (head, tail)
    }

    /// Number of characters in the effective window.
    #[must_use]
    pub fn char_len(&self, text: &str) -> usize {
        let (start, end) = self.clamp(text.chars().count());
        end - start
    }
}

/// Find a window by searching `text` for `pattern`.
///
/// With `literal` the pattern is matched verbatim; otherwise it is a regular
/// expression. Returns the character bounds of the first match, or `None`
/// when nothing matches.
pub fn locate(text: &str, pattern: &str, literal: bool) -> Result<Option<TextWindow>> {
    let source = if literal {
        regex::escape(pattern)
    } else {
        pattern.to_string()
    };
    let re = regex::Regex::new(&source)
        .map_err(|e| Error::invalid_input(format!("window pattern: {e}")))?;
    Ok(re.find(text).map(|m| {
        let start = text[..m.start()].chars().count();
        let end = start + m.as_str().chars().count();
        TextWindow::new(start, end)
    }))
}

/// Byte bounds of the character range `[start, end)` in `text`. Both bounds
/// must already be clamped to the text's character length.
fn char_range_to_bytes(text: &str, start: usize, end: usize) -> (usize, usize) {
    let mut byte_start = text.len();
    let mut byte_end = text.len();
    for (chars_seen, (byte_idx, _)) in text.char_indices().enumerate() {
        if chars_seen == start {
            byte_start = byte_idx;
        }
        if chars_seen == end {
            byte_end = byte_idx;
            break;
        }
    }
    if start == end {
        byte_end = byte_start;
    }
    (byte_start, byte_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_beyond_length() {
        let w = TextWindow::new(5, 9999);
        assert_eq!(w.clamp(11), (5, 11));
    }

    #[test]
    fn test_clamp_inverted_collapses() {
        let w = TextWindow::new(50, 30);
        assert_eq!(w.clamp(100), (50, 50));
        assert_eq!(w.slice("x".repeat(100).as_str()), "");
    }

    #[test]
    fn test_slice_counts_chars_not_bytes() {
        let text = "äöü ßß";
        let w = TextWindow::new(4, 6);
        assert_eq!(w.slice(text), "ßß");
    }

    #[test]
    fn test_slice_full_range() {
        let w = TextWindow::new(0, usize::MAX);
        assert_eq!(w.slice("The red fox"), "The red fox");
    }

    #[test]
    fn test_preview_head_and_tail() {
        let w = TextWindow::new(0, 11);
        let (head, tail) = w.preview("The red fox", 3);
        assert_eq!(head, "The");
        assert_eq!(tail, "fox");
    }

    #[test]
    fn test_locate_literal_escapes_metacharacters() {
        let text = "price (net) is 4.50";
        let w = locate(text, "(net)", true).unwrap().unwrap();
        assert_eq!(w, TextWindow::new(6, 11));
    }

    #[test]
    fn test_locate_regex_and_char_offsets() {
        let text = "äää fox";
        let w = locate(text, "f.x", false).unwrap().unwrap();
        assert_eq!(w, TextWindow::new(4, 7));
    }

    #[test]
    fn test_locate_no_match() {
        assert_eq!(locate("abc", "zzz", true).unwrap(), None);
    }

    #[test]
    fn test_locate_bad_regex_is_invalid_input() {
        assert!(locate("abc", "(", false).is_err());
    }
}
