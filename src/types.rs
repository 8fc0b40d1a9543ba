//! Core data model: tokens, segments, annotations and tagged tokens.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Annotation id carried by tokens outside any annotation.
pub const NO_ANNOTATION: &str = "none";

/// A single token produced by the tokenizer adapter.
///
/// `offset` is the character offset of the token's first character in the
/// (windowed) source text. `id` is the token's ordinal position. Tokens are
/// created once per tokenization run and are read-only afterward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Ordinal position in the token sequence.
    pub id: usize,
    /// Character offset of the first character.
    pub offset: usize,
    /// Surface text, including any newline characters.
    pub text: String,
}

impl Token {
    /// Create a new token.
    #[must_use]
    pub fn new(id: usize, offset: usize, text: impl Into<String>) -> Self {
        Self {
            id,
            offset,
            text: text.into(),
        }
    }

    /// True when the token is a line-break marker (contains a newline).
    ///
    /// Line-break tokens are forced to `O` during alignment and are the only
    /// tokens a paragraph policy inspects.
    #[must_use]
    pub fn is_line_break(&self) -> bool {
        self.text.contains('\n')
    }

    /// Length of the token text in characters.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// One contiguous character range `[start, end)` of an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Segment {
    /// Inclusive start offset.
    pub start: usize,
    /// Exclusive end offset.
    pub end: usize,
}

impl Segment {
    /// Create a new segment.
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Length in characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// True for a zero-length segment. Such a segment matches no token.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// True when `offset` is strictly inside the segment (`start < offset <
    /// end`). An offset equal to `end` is outside: the range is half-open.
    #[must_use]
    pub fn contains_inside(&self, offset: usize) -> bool {
        self.start < offset && offset < self.end
    }

    /// True when the segment begins exactly at `offset`.
    #[must_use]
    pub fn starts_at(&self, offset: usize) -> bool {
        !self.is_empty() && self.start == offset
    }
}

/// A span annotation: a tag class over one or more segments of the text.
///
/// An annotation with more than one segment is discontinuous. Segments within
/// one annotation never overlap and need not be contiguous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Stable identifier, unique within one annotation set.
    pub id: String,
    /// Tag class name, e.g. `Color`.
    pub tag_class: String,
    /// Ordered segments covered by this annotation.
    pub segments: Vec<Segment>,
}

impl Annotation {
    /// Create a new annotation.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        tag_class: impl Into<String>,
        segments: Vec<Segment>,
    ) -> Self {
        Self {
            id: id.into(),
            tag_class: tag_class.into(),
            segments,
        }
    }

    /// True when the annotation consists of more than one segment.
    #[must_use]
    pub fn is_discontinuous(&self) -> bool {
        self.segments.len() > 1
    }

    /// Overall bound from the first segment's start to the last segment's
    /// end. `None` for an annotation without segments.
    #[must_use]
    pub fn bound(&self) -> Option<Segment> {
        let first = self.segments.first()?;
        let last = self.segments.last()?;
        Some(Segment::new(first.start, last.end))
    }
}

/// All annotations attached to one text, plus the text itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationSet {
    /// The annotated source text.
    pub text: String,
    /// Annotations in stable input order. Order matters: when several
    /// annotations could claim the same token, the first one wins.
    pub annotations: Vec<Annotation>,
}

impl AnnotationSet {
    /// Create an annotation set, checking that every segment lies within
    /// `[0, text length in chars]` and is well-formed (`start <= end`).
    pub fn new(text: impl Into<String>, annotations: Vec<Annotation>) -> Result<Self> {
        let text = text.into();
        let len = text.chars().count();
        for ann in &annotations {
            for seg in &ann.segments {
                if seg.start > seg.end {
                    return Err(Error::invalid_input(format!(
                        "annotation {}: segment ({}, {}) has start > end",
                        ann.id, seg.start, seg.end
                    )));
                }
                if seg.end > len {
                    return Err(Error::consistency(format!(
                        "annotation {}: segment ({}, {}) exceeds text length {}",
                        ann.id, seg.start, seg.end, len
                    )));
                }
            }
        }
        Ok(Self { text, annotations })
    }

    /// Parse annotations from their JSON interchange form and attach them to
    /// `text`. The JSON shape is `{"annotations": [{"id", "tag_class",
    /// "segments": [{"start", "end"}]}]}`.
    pub fn from_json(text: impl Into<String>, json: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct AnnotationFile {
            annotations: Vec<Annotation>,
        }
        let file: AnnotationFile =
            serde_json::from_str(json).map_err(|e| Error::parse(format!("annotation JSON: {e}")))?;
        Self::new(text, file.annotations)
    }

    /// Length of the text in characters.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// IOB2 tag carried by a token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Tag {
    /// Outside any annotation.
    O,
    /// First token of an annotated span, with the tag class.
    B(String),
    /// Continuation token of an annotated span, with the tag class.
    I(String),
}

impl Tag {
    /// Parse from a label string (`O`, `B-<class>`, `I-<class>`).
    ///
    /// Returns `None` for anything else, including bare `B-`/`I-` without a
    /// class.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        if label == "O" {
            return Some(Tag::O);
        }
        if let Some(class) = label.strip_prefix("B-") {
            if !class.is_empty() {
                return Some(Tag::B(class.to_string()));
            }
        }
        if let Some(class) = label.strip_prefix("I-") {
            if !class.is_empty() {
                return Some(Tag::I(class.to_string()));
            }
        }
        None
    }

    /// Render as a label string.
    #[must_use]
    pub fn as_label(&self) -> String {
        match self {
            Tag::O => "O".to_string(),
            Tag::B(class) => format!("B-{class}"),
            Tag::I(class) => format!("I-{class}"),
        }
    }

    /// The tag class, if any.
    #[must_use]
    pub fn class(&self) -> Option<&str> {
        match self {
            Tag::O => None,
            Tag::B(class) | Tag::I(class) => Some(class.as_str()),
        }
    }

    /// True for `O`.
    #[must_use]
    pub fn is_outside(&self) -> bool {
        matches!(self, Tag::O)
    }

    /// True for `B-`.
    #[must_use]
    pub fn is_begin(&self) -> bool {
        matches!(self, Tag::B(_))
    }

    /// True for `I-`.
    #[must_use]
    pub fn is_inside(&self) -> bool {
        matches!(self, Tag::I(_))
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_label())
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.as_label()
    }
}

impl TryFrom<String> for Tag {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Tag::parse(&value).ok_or_else(|| format!("not an IOB2 label: {value:?}"))
    }
}

/// A token with its alignment result.
///
/// Exactly one tag per token. A token never carries two tags; when several
/// segments could claim it, the alignment engine's tie-break has already
/// picked one before a `TaggedToken` exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedToken {
    /// The underlying token.
    pub token: Token,
    /// IOB2 tag.
    pub tag: Tag,
    /// Id of the matched annotation, or [`NO_ANNOTATION`].
    pub annotation_id: String,
    /// Dense per-annotation ordinal (1-based) of this token within its
    /// annotation; 0 for unmatched tokens.
    pub multi_token_index: usize,
}

impl TaggedToken {
    /// A token outside any annotation.
    #[must_use]
    pub fn untagged(token: Token) -> Self {
        Self {
            token,
            tag: Tag::O,
            annotation_id: NO_ANNOTATION.to_string(),
            multi_token_index: 0,
        }
    }

    /// A token matched to an annotation.
    #[must_use]
    pub fn tagged(token: Token, tag: Tag, annotation_id: impl Into<String>, index: usize) -> Self {
        Self {
            token,
            tag,
            annotation_id: annotation_id.into(),
            multi_token_index: index,
        }
    }

    /// True when the token carries a `B-` or `I-` tag.
    #[must_use]
    pub fn is_tagged(&self) -> bool {
        !self.tag.is_outside()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn tag_label_roundtrip(class in "[A-Za-z][A-Za-z-]{0,20}") {
            let b = Tag::B(class.clone());
            prop_assert_eq!(Tag::parse(&b.as_label()), Some(b));
            let i = Tag::I(class);
            prop_assert_eq!(Tag::parse(&i.as_label()), Some(i));
        }

        #[test]
        fn segment_inside_respects_bounds(start in 0usize..100, len in 0usize..50, off in 0usize..200) {
            let seg = Segment::new(start, start + len);
            if seg.contains_inside(off) {
                prop_assert!(off > seg.start);
                prop_assert!(off < seg.end);
            }
            // The end offset is never inside: half-open range.
            prop_assert!(!seg.contains_inside(seg.end));
        }

        #[test]
        fn bound_covers_every_segment(starts in proptest::collection::vec(0usize..100, 1..5)) {
            let mut sorted = starts;
            sorted.sort_unstable();
            let segments: Vec<Segment> =
                sorted.iter().map(|&s| Segment::new(s, s + 3)).collect();
            let ann = Annotation::new("a", "X", segments.clone());
            let bound = ann.bound().unwrap();
            for seg in segments {
                prop_assert!(bound.start <= seg.start);
                prop_assert!(bound.end >= seg.end);
            }
        }
    }
}
