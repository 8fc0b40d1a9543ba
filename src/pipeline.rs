//! The pipeline: explicit, ordered, typed stages with optional checkpoints.
//!
//! A run is a plan of [`Stage`] values executed in order against one
//! [`PipelineContext`]. Each stage takes its input from the context when a
//! previous stage produced it there, or loads it from the corresponding
//! checkpoint file, which is what makes re-entry work: aligning today and
//! reconstructing next month are the same plan minus the stages already done.
//!
//! Stage dispatch is by variant, not by name: there is no string-keyed stage
//! registry to misconfigure, and a stage that is not in the plan simply does
//! not exist for the run.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::align::{align_with_base, AlignMode};
use crate::document::{build_document, Document, ParagraphPolicy};
use crate::error::{Error, Result};
use crate::markup::MarkupOptions;
use crate::schema::TagSchema;
use crate::table::{
    read_tagged_table, read_token_table, write_tagged_table, write_token_table,
};
use crate::tokenize::{LanguageModel, Tokenizer, WhitespaceTokenizer};
use crate::types::{AnnotationSet, TaggedToken, Token};
use crate::window::TextWindow;

/// Default file name of the basic token table checkpoint.
pub const TOKEN_TABLE_FILE: &str = "token_table.tsv";
/// Default file name of the tagged token table checkpoint.
pub const TAGGED_TABLE_FILE: &str = "tagged_table.tsv";
/// Default file name of the rendered markup.
pub const MARKUP_FILE: &str = "document.xml";

/// Where the persisted artifacts of one document live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    dir: PathBuf,
    token_table: String,
    tagged_table: String,
    markup: String,
}

impl Checkpoint {
    /// Checkpoint with default artifact names under `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            token_table: TOKEN_TABLE_FILE.to_string(),
            tagged_table: TAGGED_TABLE_FILE.to_string(),
            markup: MARKUP_FILE.to_string(),
        }
    }

    /// Override the artifact file names.
    #[must_use]
    pub fn with_names(
        mut self,
        token_table: impl Into<String>,
        tagged_table: impl Into<String>,
        markup: impl Into<String>,
    ) -> Self {
        self.token_table = token_table.into();
        self.tagged_table = tagged_table.into();
        self.markup = markup.into();
        self
    }

    /// Path of the basic token table.
    #[must_use]
    pub fn token_table_path(&self) -> PathBuf {
        self.dir.join(&self.token_table)
    }

    /// Path of the tagged token table.
    #[must_use]
    pub fn tagged_table_path(&self) -> PathBuf {
        self.dir.join(&self.tagged_table)
    }

    /// Path of the rendered markup file.
    #[must_use]
    pub fn markup_path(&self) -> PathBuf {
        self.dir.join(&self.markup)
    }
}

/// Mutable state handed from stage to stage within one run.
pub struct PipelineContext {
    /// Source text (line endings already unified), for tokenization.
    pub text: Option<String>,
    /// Annotations plus their text, for alignment.
    pub set: Option<AnnotationSet>,
    /// Optional character window restricting all stages.
    pub window: Option<TextWindow>,
    /// Vocabulary for validating reloaded tagged tables.
    pub schema: Option<TagSchema>,
    /// Tokenizer adapter. Defaults to the whitespace adapter configured by
    /// the tokenize stage.
    pub tokenizer: Option<Box<dyn Tokenizer>>,
    /// Tokens produced or reloaded in this run.
    pub tokens: Option<Vec<Token>>,
    /// Tagged tokens produced or reloaded in this run.
    pub tagged: Option<Vec<TaggedToken>>,
    /// Reconstructed document, once built.
    pub document: Option<Document>,
    checkpoint: Checkpoint,
    artifacts: Vec<PathBuf>,
    warnings: Vec<String>,
}

impl PipelineContext {
    /// Fresh context writing artifacts to `checkpoint`.
    #[must_use]
    pub fn new(checkpoint: Checkpoint) -> Self {
        Self {
            text: None,
            set: None,
            window: None,
            schema: None,
            tokenizer: None,
            tokens: None,
            tagged: None,
            document: None,
            checkpoint,
            artifacts: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Set the source text.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set the annotation set.
    #[must_use]
    pub fn with_annotations(mut self, set: AnnotationSet) -> Self {
        self.set = Some(set);
        self
    }

    /// Restrict the run to a text window.
    #[must_use]
    pub fn with_window(mut self, window: TextWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Validate reloaded tagged tables against `schema`.
    #[must_use]
    pub fn with_schema(mut self, schema: TagSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Swap in a tokenizer adapter.
    #[must_use]
    pub fn with_tokenizer(mut self, tokenizer: Box<dyn Tokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    /// Record a soft condition: logged, remembered, and the run's result is
    /// marked incomplete, but the pipeline continues.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{message}");
        self.warnings.push(message);
    }

    fn record_artifact(&mut self, path: PathBuf) {
        self.artifacts.push(path);
    }
}

/// One processing stage, with its own options.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Tokenize the (windowed) source text and write the basic token table.
    Tokenize {
        /// Language model for the tokenizer backend.
        language: LanguageModel,
        /// Maximum accepted text length, in characters.
        max_length: Option<usize>,
    },
    /// Align annotations onto the tokens and write the tagged table.
    Align {
        /// Matching granularity.
        mode: AlignMode,
    },
    /// Rebuild the document tree and write the rendered markup.
    Reconstruct {
        /// Paragraph boundary policy.
        policy: ParagraphPolicy,
        /// Serializer options.
        markup: MarkupOptions,
    },
}

impl Stage {
    /// Stage name, for reports.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Tokenize { .. } => "tokenize",
            Stage::Align { .. } => "align",
            Stage::Reconstruct { .. } => "reconstruct",
        }
    }

    /// Run the stage against `ctx`.
    pub fn run(&self, ctx: &mut PipelineContext) -> Result<()> {
        match self {
            Stage::Tokenize {
                language,
                max_length,
            } => run_tokenize(ctx, *language, *max_length),
            Stage::Align { mode } => run_align(ctx, *mode),
            Stage::Reconstruct { policy, markup } => run_reconstruct(ctx, policy, markup),
        }
    }
}

fn run_tokenize(
    ctx: &mut PipelineContext,
    language: LanguageModel,
    max_length: Option<usize>,
) -> Result<()> {
    let text = ctx
        .text
        .as_deref()
        .ok_or_else(|| Error::invalid_input("tokenize stage: no source text in context"))?;
    let windowed = match ctx.window {
        Some(window) => window.slice(text).to_string(),
        None => text.to_string(),
    };

    let tokens = match &ctx.tokenizer {
        Some(adapter) => adapter.tokenize(&windowed)?,
        None => {
            let mut adapter = WhitespaceTokenizer::new(language);
            if let Some(max) = max_length {
                adapter = adapter.with_max_length(max);
            }
            adapter.tokenize(&windowed)?
        }
    };

    let path = ctx.checkpoint.token_table_path();
    write_token_table(&path, &tokens)?;
    ctx.record_artifact(path);
    ctx.tokens = Some(tokens);
    Ok(())
}

fn run_align(ctx: &mut PipelineContext, mode: AlignMode) -> Result<()> {
    let set = ctx
        .set
        .as_ref()
        .ok_or_else(|| Error::invalid_input("align stage: no annotation set in context"))?;
    let tokens = match &ctx.tokens {
        Some(tokens) => tokens.clone(),
        None => read_token_table(ctx.checkpoint.token_table_path())?,
    };
    let base = match ctx.window {
        Some(window) => window.clamp(set.char_len()).0,
        None => 0,
    };

    let tagged = align_with_base(&tokens, set, mode, base);

    let path = ctx.checkpoint.tagged_table_path();
    write_tagged_table(&path, &tagged)?;
    ctx.record_artifact(path);
    ctx.tokens = Some(tokens);
    ctx.tagged = Some(tagged);
    Ok(())
}

fn run_reconstruct(
    ctx: &mut PipelineContext,
    policy: &ParagraphPolicy,
    markup: &MarkupOptions,
) -> Result<()> {
    let tagged = match &ctx.tagged {
        Some(tagged) => tagged.clone(),
        None => read_tagged_table(ctx.checkpoint.tagged_table_path(), ctx.schema.as_ref())?,
    };

    let document = build_document(&tagged, policy);
    let path = ctx.checkpoint.markup_path();
    crate::markup::write_markup(&path, &document, markup)?;
    ctx.record_artifact(path);
    ctx.tagged = Some(tagged);
    ctx.document = Some(document);
    Ok(())
}

/// An ordered plan of stages.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Build a plan from stages, executed in the given order.
    #[must_use]
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// The configured stages.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Run the plan against one document context.
    ///
    /// Never panics and never aborts a batch: a failing stage stops this
    /// run and is recorded in the report, leaving the caller free to carry
    /// on with other documents.
    #[must_use]
    pub fn run(&self, input: impl Into<String>, ctx: &mut PipelineContext) -> RunReport {
        let input = input.into();
        let started_at = chrono::Utc::now().to_rfc3339();
        let mut stages_run = Vec::new();
        let mut error = None;

        for stage in &self.stages {
            log::debug!("{input}: running stage {}", stage.name());
            match stage.run(ctx) {
                Ok(()) => stages_run.push(stage.name().to_string()),
                Err(e) => {
                    log::warn!("{input}: stage {} failed: {e}", stage.name());
                    error = Some(e.to_string());
                    break;
                }
            }
        }

        let warnings = std::mem::take(&mut ctx.warnings);
        let complete = error.is_none() && warnings.is_empty();
        RunReport {
            input,
            started_at,
            stages_run,
            artifacts: std::mem::take(&mut ctx.artifacts),
            warnings,
            error,
            complete,
        }
    }
}

/// Outcome of running one document through the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Name of the processed input.
    pub input: String,
    /// RFC 3339 timestamp taken when the run started.
    pub started_at: String,
    /// Names of the stages that ran to completion.
    pub stages_run: Vec<String>,
    /// Artifacts written, in write order.
    pub artifacts: Vec<PathBuf>,
    /// Soft conditions encountered; non-empty means the result is partial.
    pub warnings: Vec<String>,
    /// The error that stopped the run, if any.
    pub error: Option<String>,
    /// True when every stage ran and no soft condition was recorded.
    pub complete: bool,
}

impl RunReport {
    /// True when no stage failed (the result may still be partial).
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Input:      {}", self.input)?;
        writeln!(f, "Started:    {}", self.started_at)?;
        writeln!(f, "Stages:     {}", self.stages_run.join(", "))?;
        for artifact in &self.artifacts {
            writeln!(f, "Artifact:   {}", artifact.display())?;
        }
        for warning in &self.warnings {
            writeln!(f, "Warning:    {warning}")?;
        }
        if let Some(error) = &self.error {
            writeln!(f, "Error:      {error}")?;
        }
        write!(
            f,
            "Status:     {}",
            if self.error.is_some() {
                "failed"
            } else if self.complete {
                "complete"
            } else {
                "incomplete"
            }
        )
    }
}

/// Convenience path helper: artifacts for `input` go into a directory named
/// after its file stem, under `out_dir`.
#[must_use]
pub fn document_dir(out_dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    out_dir.join(stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Annotation, Segment};

    fn fox_set() -> AnnotationSet {
        AnnotationSet::new(
            "The red fox",
            vec![Annotation::new(
                "a1",
                "Color",
                vec![Segment::new(4, 7)],
            )],
        )
        .unwrap()
    }

    fn full_plan() -> Pipeline {
        Pipeline::new(vec![
            Stage::Tokenize {
                language: LanguageModel::English,
                max_length: None,
            },
            Stage::Align {
                mode: AlignMode::SegmentLevel,
            },
            Stage::Reconstruct {
                policy: ParagraphPolicy::None,
                markup: MarkupOptions::default(),
            },
        ])
    }

    #[test]
    fn test_full_run_writes_all_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = Checkpoint::new(dir.path());
        let mut ctx = PipelineContext::new(checkpoint.clone())
            .with_text("The red fox")
            .with_annotations(fox_set());

        let report = full_plan().run("fox", &mut ctx);

        assert!(report.succeeded(), "unexpected error: {:?}", report.error);
        assert!(report.complete);
        assert_eq!(report.stages_run, vec!["tokenize", "align", "reconstruct"]);
        assert!(checkpoint.token_table_path().exists());
        assert!(checkpoint.tagged_table_path().exists());
        assert!(checkpoint.markup_path().exists());
        assert_eq!(report.artifacts.len(), 3);

        let xml = std::fs::read_to_string(checkpoint.markup_path()).unwrap();
        assert!(xml.contains("<wa:Color wa:annotation=\"a1\">red</wa:Color>"));

        let doc = ctx.document.unwrap();
        assert_eq!(doc.span_count(), 1);
    }

    #[test]
    fn test_reentry_from_tagged_table() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = Checkpoint::new(dir.path());

        // First process writes the tables.
        let mut ctx = PipelineContext::new(checkpoint.clone())
            .with_text("The red fox")
            .with_annotations(fox_set());
        let plan = Pipeline::new(vec![
            Stage::Tokenize {
                language: LanguageModel::English,
                max_length: None,
            },
            Stage::Align {
                mode: AlignMode::SegmentLevel,
            },
        ]);
        assert!(plan.run("fox", &mut ctx).succeeded());

        // A separate process reconstructs from the checkpoint alone.
        let mut later = PipelineContext::new(checkpoint.clone());
        let plan = Pipeline::new(vec![Stage::Reconstruct {
            policy: ParagraphPolicy::None,
            markup: MarkupOptions::default(),
        }]);
        let report = plan.run("fox", &mut later);

        assert!(report.succeeded(), "unexpected error: {:?}", report.error);
        assert!(checkpoint.markup_path().exists());
        assert_eq!(later.document.unwrap().span_count(), 1);
    }

    #[test]
    fn test_reentry_align_from_token_table() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = Checkpoint::new(dir.path());

        let mut ctx = PipelineContext::new(checkpoint.clone()).with_text("The red fox");
        let plan = Pipeline::new(vec![Stage::Tokenize {
            language: LanguageModel::English,
            max_length: None,
        }]);
        assert!(plan.run("fox", &mut ctx).succeeded());

        let mut later = PipelineContext::new(checkpoint).with_annotations(fox_set());
        let plan = Pipeline::new(vec![Stage::Align {
            mode: AlignMode::SegmentLevel,
        }]);
        let report = plan.run("fox", &mut later);
        assert!(report.succeeded());
        let tagged = later.tagged.unwrap();
        assert_eq!(tagged[1].tag.as_label(), "B-Color");
    }

    #[test]
    fn test_missing_checkpoint_is_reported_not_panicked() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = PipelineContext::new(Checkpoint::new(dir.path()));
        let plan = Pipeline::new(vec![Stage::Reconstruct {
            policy: ParagraphPolicy::None,
            markup: MarkupOptions::default(),
        }]);
        let report = plan.run("missing", &mut ctx);
        assert!(!report.succeeded());
        assert!(report.error.as_deref().unwrap_or("").contains("Not found"));
        assert!(report.stages_run.is_empty());
    }

    #[test]
    fn test_warning_marks_run_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = PipelineContext::new(Checkpoint::new(dir.path()))
            .with_text("The red fox")
            .with_annotations(fox_set());
        ctx.warn("vocabulary file not found, skipping validation");

        let report = full_plan().run("fox", &mut ctx);
        assert!(report.succeeded());
        assert!(!report.complete);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_windowed_run() {
        let dir = tempfile::tempdir().unwrap();
        let text = "IGNORED -- The red fox";
        let set = AnnotationSet::new(
            text,
            vec![Annotation::new(
                "a1",
                "Color",
                vec![Segment::new(15, 18)],
            )],
        )
        .unwrap();
        let mut ctx = PipelineContext::new(Checkpoint::new(dir.path()))
            .with_text(text)
            .with_annotations(set)
            .with_window(TextWindow::new(11, 22));

        let report = full_plan().run("fox", &mut ctx);
        assert!(report.succeeded(), "unexpected error: {:?}", report.error);

        let tagged = ctx.tagged.unwrap();
        let labels: Vec<String> = tagged.iter().map(|t| t.tag.as_label()).collect();
        assert_eq!(labels, vec!["O", "B-Color", "O"]);
    }

    #[test]
    fn test_rendered_markup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = Checkpoint::new(dir.path());
        let mut ctx = PipelineContext::new(checkpoint.clone())
            .with_text("The red fox")
            .with_annotations(fox_set());
        assert!(full_plan().run("fox", &mut ctx).succeeded());
        let first = std::fs::read_to_string(checkpoint.markup_path()).unwrap();

        let mut again = PipelineContext::new(checkpoint.clone())
            .with_text("The red fox")
            .with_annotations(fox_set());
        assert!(full_plan().run("fox", &mut again).succeeded());
        let second = std::fs::read_to_string(checkpoint.markup_path()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_custom_artifact_names() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = Checkpoint::new(dir.path()).with_names(
            "basic.tsv",
            "annotated.tsv",
            "out.xml",
        );
        assert_eq!(checkpoint.token_table_path(), dir.path().join("basic.tsv"));
        assert_eq!(
            checkpoint.tagged_table_path(),
            dir.path().join("annotated.tsv")
        );
        assert_eq!(checkpoint.markup_path(), dir.path().join("out.xml"));
    }

    #[test]
    fn test_document_dir_uses_file_stem() {
        let out = Path::new("/tmp/out");
        assert_eq!(
            document_dir(out, Path::new("corpus/novel.txt")),
            PathBuf::from("/tmp/out/novel")
        );
    }
}
