//! Document reconstruction: from a tagged token sequence back to a
//! paragraph/span tree.
//!
//! The builder walks the tagged tokens once, keeping a single open span
//! accumulator. `B-` opens a span, following `I-` tokens of the same
//! annotation merge into it space-joined, `O` closes it and collects into a
//! plain run. Line-break tokens never become content: they either mark a
//! paragraph boundary (decided by the [`ParagraphPolicy`]) or vanish as
//! soft in-paragraph wraps.
//!
//! Spacing is materialized in the tree itself: every plain run carries its
//! separating spaces, and a closed span is followed by a run starting with
//! one space. The serializer only concatenates; the one correction pass it
//! applies afterwards is about punctuation, not about re-deriving spaces.

use serde::{Deserialize, Serialize};

use crate::types::{Tag, TaggedToken, Token};

/// Decides whether a line-break token starts a new paragraph.
///
/// Evaluated once per line-break token. The first token of the stream always
/// starts paragraph 1, policy regardless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParagraphPolicy {
    /// Never split: the whole document is one implicit paragraph.
    None,
    /// A line break is a paragraph boundary only when the raw token text is
    /// shorter than `threshold` characters. Short breaks are hard paragraph
    /// ends; long ones (a newline followed by padding spaces) are soft wraps
    /// within a paragraph.
    LineLengthHeuristic {
        /// Raw token length below which a line break splits.
        threshold: usize,
    },
}

/// Raw-length cutoff distinguishing hard breaks from padded soft wraps.
pub const DEFAULT_LINE_LENGTH_THRESHOLD: usize = 10;

impl Default for ParagraphPolicy {
    fn default() -> Self {
        ParagraphPolicy::LineLengthHeuristic {
            threshold: DEFAULT_LINE_LENGTH_THRESHOLD,
        }
    }
}

impl ParagraphPolicy {
    /// True when `token` ends the current paragraph.
    #[must_use]
    pub fn is_boundary(&self, token: &Token) -> bool {
        match self {
            ParagraphPolicy::None => false,
            ParagraphPolicy::LineLengthHeuristic { threshold } => {
                token.is_line_break() && token.char_len() < *threshold
            }
        }
    }
}

/// One node of a reconstructed paragraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    /// A tagged span: merged token texts of one annotation occurrence.
    Span {
        /// Tag class, which becomes the element name.
        tag_class: String,
        /// Originating annotation id, which becomes the `annotation`
        /// attribute.
        annotation_id: String,
        /// Space-joined token texts.
        text: String,
    },
    /// Plain run text between spans, separating spaces included.
    Run(String),
}

/// An ordered sequence of nodes between two paragraph boundaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    /// Nodes in original token order.
    pub nodes: Vec<Node>,
}

impl Paragraph {
    /// True when the paragraph holds no nodes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// The reconstructed document tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Paragraphs in order. Exactly one when splitting is disabled.
    pub paragraphs: Vec<Paragraph>,
    /// Whether paragraphs are rendered as their own elements or the content
    /// attaches directly to the body.
    pub split_paragraphs: bool,
}

impl Document {
    /// All span nodes across all paragraphs, in document order.
    pub fn spans(&self) -> impl Iterator<Item = &Node> {
        self.paragraphs
            .iter()
            .flat_map(|p| &p.nodes)
            .filter(|n| matches!(n, Node::Span { .. }))
    }

    /// Number of span nodes.
    #[must_use]
    pub fn span_count(&self) -> usize {
        self.spans().count()
    }
}

/// Build a document tree from a tagged token sequence.
///
/// Deterministic: the same sequence and policy always produce the same tree.
#[must_use]
pub fn build_document(tagged: &[TaggedToken], policy: &ParagraphPolicy) -> Document {
    let mut acc = Accumulator::new();

    for (idx, tt) in tagged.iter().enumerate() {
        if idx == 0 {
            acc.start_paragraph();
        }
        if tt.token.is_line_break() {
            if idx > 0 && policy.is_boundary(&tt.token) {
                acc.close_span();
                acc.start_paragraph();
            }
            // Soft wraps vanish; their spacing is already carried by the
            // neighboring runs.
            continue;
        }
        match &tt.tag {
            Tag::O => {
                acc.close_span();
                acc.append_plain(&tt.token.text);
            }
            Tag::B(class) => {
                acc.close_span();
                acc.open_span(class, &tt.annotation_id, &tt.token.text);
            }
            Tag::I(class) => {
                if acc.merges_with(&tt.annotation_id) {
                    acc.append_inside(&tt.token.text);
                } else {
                    // Continuation without a matching open span: treat it as
                    // the start of its own span rather than losing the token.
                    acc.close_span();
                    acc.open_span(class, &tt.annotation_id, &tt.token.text);
                }
            }
        }
    }
    acc.close_span();
    acc.finish(!matches!(policy, ParagraphPolicy::None))
}

/// Local builder state. Owned here, never global, discarded after the walk.
struct Accumulator {
    paragraphs: Vec<Paragraph>,
    nodes: Vec<Node>,
    /// Annotation id of the open span, while the last node is still
    /// accepting `I-` continuations.
    open_annotation: Option<String>,
    started: bool,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            paragraphs: Vec::new(),
            nodes: Vec::new(),
            open_annotation: None,
            started: false,
        }
    }

    fn start_paragraph(&mut self) {
        if self.started {
            self.paragraphs.push(Paragraph {
                nodes: std::mem::take(&mut self.nodes),
            });
        }
        self.started = true;
        self.open_annotation = None;
    }

    fn open_span(&mut self, tag_class: &str, annotation_id: &str, text: &str) {
        self.nodes.push(Node::Span {
            tag_class: tag_class.to_string(),
            annotation_id: annotation_id.to_string(),
            text: text.to_string(),
        });
        self.open_annotation = Some(annotation_id.to_string());
    }

    fn merges_with(&self, annotation_id: &str) -> bool {
        self.open_annotation.as_deref() == Some(annotation_id)
    }

    fn append_inside(&mut self, text: &str) {
        if let Some(Node::Span { text: span_text, .. }) = self.nodes.last_mut() {
            span_text.push(' ');
            span_text.push_str(text);
        }
    }

    /// Close the open span, leaving the single separating space that the
    /// token join owes to whatever follows the element.
    fn close_span(&mut self) {
        if self.open_annotation.take().is_some() {
            self.nodes.push(Node::Run(" ".to_string()));
        }
    }

    fn append_plain(&mut self, text: &str) {
        if let Some(Node::Run(run)) = self.nodes.last_mut() {
            run.push_str(text);
            run.push(' ');
        } else {
            self.nodes.push(Node::Run(format!("{text} ")));
        }
    }

    fn finish(mut self, split_paragraphs: bool) -> Document {
        if self.started {
            self.paragraphs.push(Paragraph { nodes: self.nodes });
        }
        Document {
            paragraphs: self.paragraphs,
            split_paragraphs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Tag, TaggedToken, Token};

    fn o(id: usize, offset: usize, text: &str) -> TaggedToken {
        TaggedToken::untagged(Token::new(id, offset, text))
    }

    fn b(id: usize, offset: usize, text: &str, class: &str, ann: &str, idx: usize) -> TaggedToken {
        TaggedToken::tagged(Token::new(id, offset, text), Tag::B(class.into()), ann, idx)
    }

    fn i(id: usize, offset: usize, text: &str, class: &str, ann: &str, idx: usize) -> TaggedToken {
        TaggedToken::tagged(Token::new(id, offset, text), Tag::I(class.into()), ann, idx)
    }

    #[test]
    fn test_single_span_between_runs() {
        let tagged = vec![
            o(0, 0, "The"),
            b(1, 4, "red", "Color", "a1", 1),
            o(2, 8, "fox"),
        ];
        let doc = build_document(&tagged, &ParagraphPolicy::None);

        assert_eq!(doc.paragraphs.len(), 1);
        assert!(!doc.split_paragraphs);
        assert_eq!(
            doc.paragraphs[0].nodes,
            vec![
                Node::Run("The ".to_string()),
                Node::Span {
                    tag_class: "Color".to_string(),
                    annotation_id: "a1".to_string(),
                    text: "red".to_string(),
                },
                Node::Run(" fox ".to_string()),
            ]
        );
    }

    #[test]
    fn test_continuations_merge_space_joined() {
        let tagged = vec![
            b(0, 0, "dark", "Color", "a1", 1),
            i(1, 5, "red", "Color", "a1", 2),
            i(2, 9, "brown", "Color", "a1", 3),
        ];
        let doc = build_document(&tagged, &ParagraphPolicy::None);
        assert_eq!(doc.span_count(), 1);
        assert_eq!(
            doc.paragraphs[0].nodes[0],
            Node::Span {
                tag_class: "Color".to_string(),
                annotation_id: "a1".to_string(),
                text: "dark red brown".to_string(),
            }
        );
        // Closing the span leaves its separating space behind.
        assert_eq!(doc.paragraphs[0].nodes[1], Node::Run(" ".to_string()));
    }

    #[test]
    fn test_outside_token_terminates_span() {
        let tagged = vec![
            b(0, 0, "red", "Color", "a1", 1),
            o(1, 4, "and"),
            b(2, 8, "blue", "Color", "a2", 1),
        ];
        let doc = build_document(&tagged, &ParagraphPolicy::None);
        assert_eq!(doc.span_count(), 2);
        assert_eq!(doc.paragraphs[0].nodes[1], Node::Run(" and ".to_string()));
    }

    #[test]
    fn test_adjacent_annotations_do_not_merge() {
        // An I- of a different annotation right after a B- must not be
        // folded into the open span.
        let tagged = vec![
            b(0, 0, "red", "Color", "a1", 1),
            i(1, 4, "house", "Place", "a2", 1),
        ];
        let doc = build_document(&tagged, &ParagraphPolicy::None);
        assert_eq!(doc.span_count(), 2);
        let texts: Vec<&str> = doc
            .spans()
            .map(|n| match n {
                Node::Span { text, .. } => text.as_str(),
                Node::Run(_) => unreachable!(),
            })
            .collect();
        assert_eq!(texts, vec!["red", "house"]);
    }

    #[test]
    fn test_orphan_continuation_starts_its_own_span() {
        let tagged = vec![o(0, 0, "The"), i(1, 4, "red", "Color", "a1", 1)];
        let doc = build_document(&tagged, &ParagraphPolicy::None);
        assert_eq!(doc.span_count(), 1);
    }

    #[test]
    fn test_short_line_break_splits_paragraph() {
        let tagged = vec![
            o(0, 0, "one"),
            o(1, 3, "\n"),
            o(2, 4, "two"),
        ];
        let doc = build_document(&tagged, &ParagraphPolicy::default());
        assert!(doc.split_paragraphs);
        assert_eq!(doc.paragraphs.len(), 2);
        assert_eq!(doc.paragraphs[0].nodes, vec![Node::Run("one ".to_string())]);
        assert_eq!(doc.paragraphs[1].nodes, vec![Node::Run("two ".to_string())]);
    }

    #[test]
    fn test_long_line_break_is_soft_wrap() {
        // A newline padded to the threshold stays inside the paragraph and
        // leaves no content behind.
        let padded = format!("\n{}", " ".repeat(15));
        let tagged = vec![
            o(0, 0, "one"),
            o(1, 3, &padded),
            o(2, 19, "two"),
        ];
        let doc = build_document(&tagged, &ParagraphPolicy::default());
        assert_eq!(doc.paragraphs.len(), 1);
        assert_eq!(
            doc.paragraphs[0].nodes,
            vec![Node::Run("one two ".to_string())]
        );
    }

    #[test]
    fn test_soft_wrap_does_not_break_span_merge() {
        let padded = format!("\n{}", " ".repeat(15));
        let tagged = vec![
            b(0, 0, "dark", "Color", "a1", 1),
            o(1, 4, &padded),
            i(2, 20, "red", "Color", "a1", 2),
        ];
        let doc = build_document(&tagged, &ParagraphPolicy::default());
        assert_eq!(doc.span_count(), 1);
        assert_eq!(
            doc.paragraphs[0].nodes[0],
            Node::Span {
                tag_class: "Color".to_string(),
                annotation_id: "a1".to_string(),
                text: "dark red".to_string(),
            }
        );
    }

    #[test]
    fn test_span_open_at_boundary_is_closed_into_old_paragraph() {
        let tagged = vec![
            b(0, 0, "red", "Color", "a1", 1),
            o(1, 3, "\n"),
            o(2, 4, "two"),
        ];
        let doc = build_document(&tagged, &ParagraphPolicy::default());
        assert_eq!(doc.paragraphs.len(), 2);
        assert_eq!(
            doc.paragraphs[0].nodes,
            vec![
                Node::Span {
                    tag_class: "Color".to_string(),
                    annotation_id: "a1".to_string(),
                    text: "red".to_string(),
                },
                Node::Run(" ".to_string()),
            ]
        );
    }

    #[test]
    fn test_leading_line_break_starts_single_paragraph() {
        let tagged = vec![o(0, 0, "\n"), o(1, 1, "one")];
        let doc = build_document(&tagged, &ParagraphPolicy::default());
        assert_eq!(doc.paragraphs.len(), 1);
        assert_eq!(doc.paragraphs[0].nodes, vec![Node::Run("one ".to_string())]);
    }

    #[test]
    fn test_consecutive_boundaries_make_empty_paragraph() {
        let tagged = vec![
            o(0, 0, "one"),
            o(1, 3, "\n"),
            o(2, 4, "\n"),
            o(3, 5, "two"),
        ];
        let doc = build_document(&tagged, &ParagraphPolicy::default());
        assert_eq!(doc.paragraphs.len(), 3);
        assert!(doc.paragraphs[1].is_empty());
    }

    #[test]
    fn test_empty_input() {
        let doc = build_document(&[], &ParagraphPolicy::default());
        assert!(doc.paragraphs.is_empty());
    }

    #[test]
    fn test_deterministic() {
        let tagged = vec![
            o(0, 0, "The"),
            b(1, 4, "red", "Color", "a1", 1),
            i(2, 8, "fox", "Color", "a1", 2),
            o(3, 12, "\n"),
            o(4, 13, "ran"),
        ];
        let policy = ParagraphPolicy::default();
        assert_eq!(
            build_document(&tagged, &policy),
            build_document(&tagged, &policy)
        );
    }

    #[test]
    fn test_policy_threshold_edge() {
        let policy = ParagraphPolicy::default();
        // 9 chars: boundary. 10 chars: soft wrap.
        assert!(policy.is_boundary(&Token::new(0, 0, format!("\n{}", " ".repeat(8)))));
        assert!(!policy.is_boundary(&Token::new(0, 0, format!("\n{}", " ".repeat(9)))));
        // Non-breaks never split, whatever their length.
        assert!(!policy.is_boundary(&Token::new(0, 0, "ab")));
    }
}
