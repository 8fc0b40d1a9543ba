//! TOML run configuration.
//!
//! A config file describes one pipeline plan: which stages run, with which
//! options, plus the optional tag vocabulary and text window. Every field has
//! a default, so an empty file is a valid full run and a file only has to
//! state what differs from the defaults.
//!
//! ```toml
//! [tokenize]
//! language = "german"
//! max-length = 2000000
//!
//! [align]
//! mode = "segment-level"
//!
//! [reconstruct]
//! paragraphs = true
//! line-length-threshold = 10
//!
//! [schema]
//! name = "space-analysis"
//! classes = ["Ort-Container", "Bewegung-Subjekt"]
//! ```
//!
//! Command-line flags override config values; the resolution lives in the
//! binary, this module only loads, validates, and translates to pipeline
//! types.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::align::AlignMode;
use crate::document::{ParagraphPolicy, DEFAULT_LINE_LENGTH_THRESHOLD};
use crate::error::{Error, Result};
use crate::markup::{MarkupOptions, DEFAULT_ANNOTATION_NS, DEFAULT_ANNOTATION_PREFIX};
use crate::pipeline::{Checkpoint, Stage, MARKUP_FILE, TAGGED_TABLE_FILE, TOKEN_TABLE_FILE};
use crate::schema::TagSchema;
use crate::tokenize::{LanguageModel, DEFAULT_MAX_TEXT_LENGTH};
use crate::window::TextWindow;

/// Top-level run configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunConfig {
    /// Tokenize stage.
    #[serde(default)]
    pub tokenize: TokenizeConfig,

    /// Align stage.
    #[serde(default)]
    pub align: AlignConfig,

    /// Reconstruct stage.
    #[serde(default)]
    pub reconstruct: ReconstructConfig,

    /// Optional tag vocabulary for validating reloaded tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaConfig>,

    /// Optional character window restricting the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<WindowConfig>,

    /// Artifact placement and names.
    #[serde(default)]
    pub output: OutputConfig,
}

impl RunConfig {
    /// Load and validate a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found(path.display().to_string())
            } else {
                Error::Io(e)
            }
        })?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: RunConfig = toml::from_str(contents)
            .map_err(|e| Error::parse(format!("config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize back to TOML, e.g. for `--print-config`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::parse(format!("config: {e}")))
    }

    fn validate(&self) -> Result<()> {
        if self.tokenize.max_length == 0 {
            return Err(Error::validation(
                "config",
                "tokenize.max-length must be at least 1",
            ));
        }
        if self.reconstruct.line_length_threshold == 0 {
            return Err(Error::validation(
                "config",
                "reconstruct.line-length-threshold must be at least 1",
            ));
        }
        if self.reconstruct.prefix.is_empty() {
            return Err(Error::validation("config", "reconstruct.prefix must not be empty"));
        }
        if self.reconstruct.namespace.is_empty() {
            return Err(Error::validation(
                "config",
                "reconstruct.namespace must not be empty",
            ));
        }
        if let Some(schema) = &self.schema {
            if schema.classes.is_empty() {
                return Err(Error::validation(
                    "config",
                    "schema.classes must declare at least one class",
                ));
            }
            if schema.classes.iter().any(String::is_empty) {
                return Err(Error::validation(
                    "config",
                    "schema.classes must not contain empty names",
                ));
            }
        }
        if let Some(window) = &self.window {
            if let Some(end) = window.end {
                if end < window.start {
                    return Err(Error::validation(
                        "config",
                        format!("window ends at {end} before it starts at {}", window.start),
                    ));
                }
            }
        }
        Ok(())
    }

    /// The stage plan this configuration describes, in pipeline order.
    /// A disabled stage is simply absent from the plan.
    #[must_use]
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages = Vec::new();
        if self.tokenize.enabled {
            stages.push(Stage::Tokenize {
                language: self.tokenize.language,
                max_length: Some(self.tokenize.max_length),
            });
        }
        if self.align.enabled {
            stages.push(Stage::Align {
                mode: self.align.mode,
            });
        }
        if self.reconstruct.enabled {
            stages.push(Stage::Reconstruct {
                policy: self.paragraph_policy(),
                markup: self.markup_options(),
            });
        }
        stages
    }

    /// Paragraph policy of the reconstruct stage.
    #[must_use]
    pub fn paragraph_policy(&self) -> ParagraphPolicy {
        if self.reconstruct.paragraphs {
            ParagraphPolicy::LineLengthHeuristic {
                threshold: self.reconstruct.line_length_threshold,
            }
        } else {
            ParagraphPolicy::None
        }
    }

    /// Serializer options of the reconstruct stage.
    #[must_use]
    pub fn markup_options(&self) -> MarkupOptions {
        MarkupOptions {
            annotation_ns: self.reconstruct.namespace.clone(),
            annotation_prefix: self.reconstruct.prefix.clone(),
        }
    }

    /// The declared tag vocabulary, if any.
    #[must_use]
    pub fn tag_schema(&self) -> Option<TagSchema> {
        self.schema
            .as_ref()
            .map(|s| TagSchema::new(&s.name, s.classes.iter().map(String::as_str)))
    }

    /// The declared text window, if any. An absent `end` means to the end of
    /// the text; the window is clamped against the actual text later.
    #[must_use]
    pub fn text_window(&self) -> Option<TextWindow> {
        self.window
            .as_ref()
            .map(|w| TextWindow::new(w.start, w.end.unwrap_or(usize::MAX)))
    }

    /// Checkpoint under `dir` using the configured artifact names.
    #[must_use]
    pub fn checkpoint(&self, dir: impl Into<PathBuf>) -> Checkpoint {
        Checkpoint::new(dir).with_names(
            &self.output.token_table,
            &self.output.tagged_table,
            &self.output.markup,
        )
    }
}

/// Tokenize stage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TokenizeConfig {
    /// Whether the stage is part of the plan.
    #[serde(default = "enabled_default")]
    pub enabled: bool,

    /// Language model for the tokenizer backend.
    #[serde(default)]
    pub language: LanguageModel,

    /// Maximum accepted text length, in characters.
    #[serde(default = "max_length_default")]
    pub max_length: usize,
}

impl Default for TokenizeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: LanguageModel::default(),
            max_length: DEFAULT_MAX_TEXT_LENGTH,
        }
    }
}

/// Align stage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AlignConfig {
    /// Whether the stage is part of the plan.
    #[serde(default = "enabled_default")]
    pub enabled: bool,

    /// Matching granularity.
    #[serde(default)]
    pub mode: AlignMode,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: AlignMode::default(),
        }
    }
}

/// Reconstruct stage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReconstructConfig {
    /// Whether the stage is part of the plan.
    #[serde(default = "enabled_default")]
    pub enabled: bool,

    /// Whether line-break tokens may open new paragraphs.
    #[serde(default = "enabled_default")]
    pub paragraphs: bool,

    /// Line-break tokens shorter than this many characters are paragraph
    /// boundaries; longer ones are soft wraps.
    #[serde(default = "threshold_default")]
    pub line_length_threshold: usize,

    /// Namespace URI for tagged span elements.
    #[serde(default = "namespace_default")]
    pub namespace: String,

    /// Prefix bound to the span namespace.
    #[serde(default = "prefix_default")]
    pub prefix: String,
}

impl Default for ReconstructConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            paragraphs: true,
            line_length_threshold: DEFAULT_LINE_LENGTH_THRESHOLD,
            namespace: DEFAULT_ANNOTATION_NS.to_string(),
            prefix: DEFAULT_ANNOTATION_PREFIX.to_string(),
        }
    }
}

/// Declared tag vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SchemaConfig {
    /// Vocabulary name.
    pub name: String,
    /// Permitted tag classes.
    pub classes: Vec<String>,
}

/// Character window restricting the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WindowConfig {
    /// First character of the window.
    #[serde(default)]
    pub start: usize,
    /// One past the last character; absent means to the end of the text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
}

/// Artifact placement and names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Output directory. When absent the binary decides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// File name of the basic token table.
    #[serde(default = "token_table_default")]
    pub token_table: String,

    /// File name of the tagged token table.
    #[serde(default = "tagged_table_default")]
    pub tagged_table: String,

    /// File name of the rendered markup.
    #[serde(default = "markup_default")]
    pub markup: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: None,
            token_table: TOKEN_TABLE_FILE.to_string(),
            tagged_table: TAGGED_TABLE_FILE.to_string(),
            markup: MARKUP_FILE.to_string(),
        }
    }
}

// ==== serde default helpers ====

fn enabled_default() -> bool {
    true
}
fn max_length_default() -> usize {
    DEFAULT_MAX_TEXT_LENGTH
}
fn threshold_default() -> usize {
    DEFAULT_LINE_LENGTH_THRESHOLD
}
fn namespace_default() -> String {
    DEFAULT_ANNOTATION_NS.to_string()
}
fn prefix_default() -> String {
    DEFAULT_ANNOTATION_PREFIX.to_string()
}
fn token_table_default() -> String {
    TOKEN_TABLE_FILE.to_string()
}
fn tagged_table_default() -> String {
    TAGGED_TABLE_FILE.to_string()
}
fn markup_default() -> String {
    MARKUP_FILE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_is_a_full_run_with_defaults() {
        let config = RunConfig::from_toml("").unwrap();
        assert_eq!(config.tokenize.language, LanguageModel::German);
        assert_eq!(config.tokenize.max_length, 2_000_000);
        assert_eq!(config.align.mode, AlignMode::SegmentLevel);
        assert!(config.reconstruct.paragraphs);
        assert_eq!(config.reconstruct.line_length_threshold, 10);
        assert!(config.schema.is_none());
        assert!(config.window.is_none());

        let stages = config.stages();
        let names: Vec<&str> = stages.iter().map(Stage::name).collect();
        assert_eq!(names, vec!["tokenize", "align", "reconstruct"]);
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let config = RunConfig::from_toml(
            r#"
[tokenize]
language = "english"

[reconstruct]
paragraphs = false
"#,
        )
        .unwrap();
        assert_eq!(config.tokenize.language, LanguageModel::English);
        assert_eq!(config.tokenize.max_length, 2_000_000);
        assert_eq!(config.paragraph_policy(), ParagraphPolicy::None);
    }

    #[test]
    fn test_disabled_stages_are_absent_from_the_plan() {
        let config = RunConfig::from_toml(
            r#"
[tokenize]
enabled = false

[align]
enabled = false
"#,
        )
        .unwrap();
        let names: Vec<&str> = config.stages().iter().map(Stage::name).collect();
        assert_eq!(names, vec!["reconstruct"]);
    }

    #[test]
    fn test_schema_section_becomes_vocabulary() {
        let config = RunConfig::from_toml(
            r#"
[schema]
name = "space-analysis"
classes = ["Ort-Container", "Bewegung-Subjekt"]
"#,
        )
        .unwrap();
        let schema = config.tag_schema().unwrap();
        assert_eq!(schema.name, "space-analysis");
        assert!(schema.contains("Ort-Container"));
        assert!(!schema.contains("Farbe"));
    }

    #[test]
    fn test_window_without_end_runs_to_text_end() {
        let config = RunConfig::from_toml(
            r#"
[window]
start = 100
"#,
        )
        .unwrap();
        let window = config.text_window().unwrap();
        assert_eq!(window.clamp(250), (100, 250));
    }

    #[test]
    fn test_inverted_window_is_rejected() {
        let err = RunConfig::from_toml(
            r#"
[window]
start = 50
end = 10
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_zero_threshold_is_rejected() {
        let err = RunConfig::from_toml(
            r#"
[reconstruct]
line-length-threshold = 0
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("line-length-threshold"));
    }

    #[test]
    fn test_empty_schema_classes_are_rejected() {
        let err = RunConfig::from_toml(
            r#"
[schema]
name = "empty"
classes = []
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let err = RunConfig::from_toml("[tokenize\nlanguage = ").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = RunConfig::from_file("/nonexistent/weft.toml").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_from_file_and_custom_artifacts() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[output]
token-table = "basic.tsv"
tagged-table = "annotated.tsv"
markup = "out.xml"
"#
        )
        .unwrap();

        let config = RunConfig::from_file(file.path()).unwrap();
        let checkpoint = config.checkpoint("/tmp/run");
        assert_eq!(
            checkpoint.token_table_path(),
            PathBuf::from("/tmp/run/basic.tsv")
        );
        assert_eq!(checkpoint.markup_path(), PathBuf::from("/tmp/run/out.xml"));
    }

    #[test]
    fn test_toml_round_trip_preserves_values() {
        let config = RunConfig::from_toml(
            r#"
[tokenize]
language = "french"
max-length = 5000

[align]
mode = "boundary-level"
"#,
        )
        .unwrap();
        let rendered = config.to_toml().unwrap();
        let reparsed = RunConfig::from_toml(&rendered).unwrap();
        assert_eq!(reparsed.tokenize.language, LanguageModel::French);
        assert_eq!(reparsed.tokenize.max_length, 5000);
        assert_eq!(reparsed.align.mode, AlignMode::BoundaryLevel);
    }
}
