//! # weft
//!
//! Span annotations to token tables to documents.
//!
//! - **Align**: project character-offset span annotations onto tokens as
//!   IOB2 tags, segment- or boundary-level, discontinuous spans included
//! - **Checkpoint**: persist tokens and tags as escaped TSV tables that
//!   reload bit-for-bit, months later, under a declared tag vocabulary
//! - **Reconstruct**: rebuild a paragraph-split document tree from the tags
//!   alone and serialize it as namespaced TEI-shaped XML
//!
//! ## Quick Start
//!
//! ```rust
//! use weft::prelude::*;
//!
//! let text = "The red fox";
//! let set = AnnotationSet::new(
//!     text,
//!     vec![Annotation::new("a1", "Color", vec![Segment::new(4, 7)])],
//! )?;
//!
//! let tokens = WhitespaceTokenizer::new(LanguageModel::English).tokenize(text)?;
//! let tagged = align(&tokens, &set, AlignMode::SegmentLevel);
//! assert_eq!(tagged[1].tag.as_label(), "B-Color");
//!
//! let doc = build_document(&tagged, &ParagraphPolicy::None);
//! let xml = render(&doc);
//! assert!(xml.contains("<wa:Color wa:annotation=\"a1\">red</wa:Color>"));
//! # Ok::<(), weft::Error>(())
//! ```
//!
//! ## Pipeline
//!
//! The same steps run as an explicit, resumable plan. Each [`pipeline::Stage`]
//! reads its input from the shared context or from the checkpoint a previous
//! run left behind, so tagging today and reconstructing next month is the
//! same plan minus the stages already done:
//!
//! ```rust,ignore
//! use weft::pipeline::{Checkpoint, Pipeline, PipelineContext};
//!
//! let plan = Pipeline::new(config.stages());
//! let mut ctx = PipelineContext::new(Checkpoint::new("out/novel"))
//!     .with_text(text)
//!     .with_annotations(set);
//! let report = plan.run("novel.txt", &mut ctx);
//! ```
//!
//! ## Design
//!
//! - **Character offsets everywhere**: token positions and annotation
//!   segments count `char`s, never bytes, so multibyte text round-trips
//! - **Typed stages**: the plan is an enum, not a string registry; a stage
//!   that is not in the plan does not exist for the run
//! - **Tokenizers are adapters**: anything satisfying the [`tokenize::Tokenizer`]
//!   contract plugs in; the built-in whitespace adapter is the reference
//! - **Reconstruction trusts only the table**: documents are rebuilt from
//!   tagged tokens alone, with no lookups back into the source annotations

#![warn(missing_docs)]

pub mod align;
pub mod config;
pub mod document;
mod error;
pub mod markup;
pub mod pipeline;
pub mod schema;
pub mod table;
pub mod tokenize;
pub mod types;
pub mod window;

pub mod prelude {
    //! Commonly used items, re-exported for convenience.
    //!
    //! ```rust
    //! use weft::prelude::*;
    //!
    //! let tokens = WhitespaceTokenizer::default().tokenize("Der rote Fuchs").unwrap();
    //! assert_eq!(tokens.len(), 3);
    //! ```
    pub use crate::align::{align, align_with_base, AlignMode, AlignmentStats};
    pub use crate::document::{build_document, Document, Node, Paragraph, ParagraphPolicy};
    pub use crate::error::{Error, Result};
    pub use crate::markup::{render, render_with, MarkupOptions};
    pub use crate::schema::TagSchema;
    pub use crate::tokenize::{LanguageModel, Tokenizer, WhitespaceTokenizer};
    pub use crate::types::{
        Annotation, AnnotationSet, Segment, Tag, TaggedToken, Token, NO_ANNOTATION,
    };
    pub use crate::window::TextWindow;
}

// Re-exports
pub use align::{align, align_with_base, AlignMode, AlignmentStats};
pub use config::RunConfig;
pub use document::{build_document, Document, Node, Paragraph, ParagraphPolicy};
pub use error::{Error, Result};
pub use markup::{render, render_with, write_markup, MarkupOptions};
pub use pipeline::{Checkpoint, Pipeline, PipelineContext, RunReport, Stage};
pub use schema::TagSchema;
pub use table::{
    read_tagged_table, read_token_table, write_tagged_table, write_token_table,
};
pub use tokenize::{unify_line_endings, LanguageModel, Tokenizer, WhitespaceTokenizer};
pub use types::{Annotation, AnnotationSet, Segment, Tag, TaggedToken, Token, NO_ANNOTATION};
pub use window::TextWindow;
