//! weft - span annotation pipeline CLI
//!
//! Aligns character-offset span annotations onto tokens as IOB2 tags,
//! checkpoints the result as TSV tables, and reconstructs namespaced XML
//! documents from the tables alone.
//!
//! # Usage
//!
//! ```bash
//! # Tokenize a text and write the basic token table
//! weft tokenize -f novel.txt -o out/
//!
//! # Tokenize and align annotations in one go
//! weft align -f novel.txt -a novel.annotations.json -o out/
//!
//! # Rebuild the document from a checkpointed tagged table
//! weft build -o out/novel --format xml
//!
//! # Full pipeline over a corpus, two files per document
//! weft run 'corpus/*.txt' -c weft.toml -o out/
//!
//! # Inspect a window before committing to a long run
//! weft window -f novel.txt --locate 'Erstes Kapitel' --literal
//! ```

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use glob::glob;
use is_terminal::IsTerminal;

use weft::align::AlignmentStats;
use weft::pipeline::{document_dir, Checkpoint, Pipeline, PipelineContext, RunReport, Stage};
use weft::table::render_token_table;
use weft::tokenize::DEFAULT_MAX_TEXT_LENGTH;
use weft::window::locate;
use weft::{
    unify_line_endings, AlignMode, AnnotationSet, Error, LanguageModel, MarkupOptions,
    ParagraphPolicy, RunConfig, TagSchema, TextWindow, Tokenizer, WhitespaceTokenizer,
};

// ============================================================================
// CLI Structure
// ============================================================================

/// Span annotation pipeline - align, checkpoint, reconstruct
#[derive(Parser)]
#[command(name = "weft")]
#[command(
    author,
    version,
    about = "Span annotation pipeline - align, checkpoint, reconstruct",
    long_about = r#"
weft - span annotations to token tables to documents

STAGES:
  tokenize     - text to ordered tokens with character offsets
  align        - span annotations onto tokens as IOB2 tags
  reconstruct  - tagged tokens back into a namespaced XML document

Every stage writes its result as a checkpoint file, and every stage can
resume from the checkpoint a previous run left behind: tagging today and
reconstructing next month are the same plan minus the stages already done.

ANNOTATIONS:
  JSON, one object per annotation, character offsets, half-open ranges:
    {"annotations": [{"id": "a1", "tag_class": "Color",
                      "segments": [{"start": 4, "end": 7}]}]}

EXAMPLES:
  weft tokenize -f novel.txt -o out/
  weft align -f novel.txt -a novel.annotations.json --mode segment-level
  weft build -o out/novel --format xml
  weft run 'corpus/*.txt' -c weft.toml -o out/
  weft window -f novel.txt --start 1000 --end 2000
"#
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Text to tokenize to stdout (shorthand for `weft tokenize`)
    #[arg(trailing_var_arg = true)]
    text: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Tokenize text and write the basic token table
    #[command(visible_alias = "t")]
    Tokenize(TokenizeArgs),

    /// Align annotations onto tokens and write the tagged table
    #[command(visible_alias = "a")]
    Align(AlignArgs),

    /// Rebuild the document from a checkpointed tagged table
    #[command(visible_alias = "b")]
    Build(BuildArgs),

    /// Run the configured pipeline over one or many documents
    #[command(visible_alias = "r")]
    Run(RunArgs),

    /// Inspect or locate a character window in a text
    #[command(visible_alias = "w")]
    Window(WindowArgs),
}

#[derive(clap::Args)]
struct TokenizeArgs {
    /// Text to process
    #[arg(short = 't', long)]
    text: Option<String>,

    /// Read text from file
    #[arg(short = 'f', long)]
    file: Option<PathBuf>,

    /// Language model for the tokenizer backend
    #[arg(short = 'l', long, default_value = "german")]
    language: LanguageModel,

    /// Maximum accepted text length, in characters
    #[arg(long, default_value_t = DEFAULT_MAX_TEXT_LENGTH)]
    max_length: usize,

    /// Window start, character offset
    #[arg(long)]
    window_start: Option<usize>,

    /// Window end, exclusive character offset
    #[arg(long)]
    window_end: Option<usize>,

    /// Output directory; artifacts go into a per-document subdirectory
    #[arg(short = 'o', long, default_value = "weft-out")]
    out: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,

    /// Text as positional arguments (alternative to --text)
    #[arg(trailing_var_arg = true)]
    positional: Vec<String>,
}

#[derive(clap::Args)]
struct AlignArgs {
    /// Text to process
    #[arg(short = 't', long)]
    text: Option<String>,

    /// Read text from file
    #[arg(short = 'f', long)]
    file: Option<PathBuf>,

    /// Annotation JSON file
    #[arg(short = 'a', long)]
    annotations: PathBuf,

    /// Matching granularity
    #[arg(short = 'm', long, default_value = "segment-level")]
    mode: AlignMode,

    /// Language model for the tokenizer backend
    #[arg(short = 'l', long, default_value = "german")]
    language: LanguageModel,

    /// Maximum accepted text length, in characters
    #[arg(long, default_value_t = DEFAULT_MAX_TEXT_LENGTH)]
    max_length: usize,

    /// Window start, character offset
    #[arg(long)]
    window_start: Option<usize>,

    /// Window end, exclusive character offset
    #[arg(long)]
    window_end: Option<usize>,

    /// Reuse the token table already checkpointed in the output directory
    /// instead of tokenizing again
    #[arg(long)]
    from_table: bool,

    /// Output directory; artifacts go into a per-document subdirectory
    #[arg(short = 'o', long, default_value = "weft-out")]
    out: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,

    /// Text as positional arguments (alternative to --text)
    #[arg(trailing_var_arg = true)]
    positional: Vec<String>,
}

#[derive(clap::Args)]
struct BuildArgs {
    /// Checkpoint directory holding the tagged table; the document is
    /// written back into it
    #[arg(short = 'o', long)]
    out: PathBuf,

    /// Do not split paragraphs at line-break tokens
    #[arg(long)]
    no_paragraphs: bool,

    /// Line-break tokens shorter than this open a new paragraph
    #[arg(long, default_value_t = 10)]
    threshold: usize,

    /// Namespace URI for tagged span elements
    #[arg(long)]
    namespace: Option<String>,

    /// Prefix bound to the span namespace
    #[arg(long)]
    prefix: Option<String>,

    /// TOML file declaring the tag vocabulary (name, classes); a missing
    /// file is a warning, the table is then loaded unvalidated
    #[arg(long)]
    schema_file: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Input text files or glob patterns
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Annotation JSON file (single input only); defaults to
    /// `<input-stem>.annotations.json` next to each input
    #[arg(short = 'a', long)]
    annotations: Option<PathBuf>,

    /// TOML run configuration
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Output directory (overrides the configuration)
    #[arg(short = 'o', long)]
    out: Option<PathBuf>,

    /// Language model (overrides the configuration)
    #[arg(short = 'l', long)]
    language: Option<LanguageModel>,

    /// Matching granularity (overrides the configuration)
    #[arg(short = 'm', long)]
    mode: Option<AlignMode>,

    /// Do not split paragraphs at line-break tokens
    #[arg(long)]
    no_paragraphs: bool,

    /// TOML file declaring the tag vocabulary (name, classes); a missing
    /// file is a warning, tables are then loaded unvalidated
    #[arg(long)]
    schema_file: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,

    /// Only print the final summary
    #[arg(short = 'q', long)]
    quiet: bool,
}

#[derive(clap::Args)]
struct WindowArgs {
    /// Text to inspect
    #[arg(short = 't', long)]
    text: Option<String>,

    /// Read text from file
    #[arg(short = 'f', long)]
    file: Option<PathBuf>,

    /// Window start, character offset
    #[arg(long, default_value_t = 0)]
    start: usize,

    /// Window end, exclusive character offset; defaults to the text end
    #[arg(long)]
    end: Option<usize>,

    /// Find the window by pattern instead of offsets (regular expression)
    #[arg(long)]
    locate: Option<String>,

    /// Treat the locate pattern as literal text
    #[arg(long)]
    literal: bool,

    /// Preview snippet length, in characters
    #[arg(long, default_value_t = 40)]
    snippet: usize,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,

    /// Text as positional arguments (alternative to --text)
    #[arg(trailing_var_arg = true)]
    positional: Vec<String>,
}

/// Output format selection shared by all commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    /// Human-readable summary (default)
    #[default]
    Human,
    /// Run report(s) as JSON
    Json,
    /// The produced table as TSV on stdout (tokenize/align)
    Tsv,
    /// The rendered document as XML on stdout (build)
    Xml,
}

// ============================================================================
// Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result: Result<(), String> = match cli.command {
        Some(Commands::Tokenize(args)) => cmd_tokenize(args),
        Some(Commands::Align(args)) => cmd_align(args),
        Some(Commands::Build(args)) => cmd_build(args),
        Some(Commands::Run(args)) => cmd_run(args),
        Some(Commands::Window(args)) => cmd_window(args),
        None => {
            // No subcommand: tokenize the positional text to stdout.
            if cli.text.is_empty() {
                eprintln!("No input provided. Run `weft --help` for usage.");
                return ExitCode::FAILURE;
            }
            let text = unify_line_endings(&cli.text.join(" "));
            WhitespaceTokenizer::default()
                .tokenize(&text)
                .map(|tokens| print!("{}", render_token_table(&tokens)))
                .map_err(|e| e.to_string())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", color("31", "error:"), e);
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_tokenize(args: TokenizeArgs) -> Result<(), String> {
    let text = read_text_input(args.text.as_deref(), args.file.as_deref(), &args.positional)?;
    let text = unify_line_endings(&text);
    let name = input_name(args.file.as_deref());

    let dir = document_dir(&args.out, Path::new(&name));
    ensure_dir(&dir)?;
    let checkpoint = Checkpoint::new(&dir);

    let mut ctx = PipelineContext::new(checkpoint.clone()).with_text(text);
    if let Some(window) = window_of(args.window_start, args.window_end) {
        ctx = ctx.with_window(window);
    }

    let plan = Pipeline::new(vec![Stage::Tokenize {
        language: args.language,
        max_length: Some(args.max_length),
    }]);
    let report = plan.run(&name, &mut ctx);
    fail_on_error(&report)?;

    match args.format {
        OutputFormat::Human => {
            let tokens = ctx.tokens.as_deref().unwrap_or(&[]);
            let line_breaks = tokens.iter().filter(|t| t.is_line_break()).count();
            println!("{report}");
            println!("Tokens:     {} ({} line breaks)", tokens.len(), line_breaks);
        }
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Tsv => print_file(&checkpoint.token_table_path())?,
        OutputFormat::Xml => return Err("xml output applies to build and run".to_string()),
    }
    Ok(())
}

fn cmd_align(args: AlignArgs) -> Result<(), String> {
    let text = read_text_input(args.text.as_deref(), args.file.as_deref(), &args.positional)?;
    let text = unify_line_endings(&text);
    let set = read_annotation_set(&text, &args.annotations)?;
    let name = input_name(args.file.as_deref());

    let dir = document_dir(&args.out, Path::new(&name));
    ensure_dir(&dir)?;
    let checkpoint = Checkpoint::new(&dir);

    let mut ctx = PipelineContext::new(checkpoint.clone())
        .with_text(text)
        .with_annotations(set);
    if let Some(window) = window_of(args.window_start, args.window_end) {
        ctx = ctx.with_window(window);
    }

    let mut stages = Vec::new();
    if !args.from_table {
        stages.push(Stage::Tokenize {
            language: args.language,
            max_length: Some(args.max_length),
        });
    }
    stages.push(Stage::Align { mode: args.mode });

    let report = Pipeline::new(stages).run(&name, &mut ctx);
    fail_on_error(&report)?;

    match args.format {
        OutputFormat::Human => {
            println!("{report}");
            if let Some(tagged) = &ctx.tagged {
                print!("{}", AlignmentStats::from_tagged(tagged));
            }
        }
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Tsv => print_file(&checkpoint.tagged_table_path())?,
        OutputFormat::Xml => return Err("xml output applies to build and run".to_string()),
    }
    Ok(())
}

fn cmd_build(args: BuildArgs) -> Result<(), String> {
    let checkpoint = Checkpoint::new(&args.out);
    let name = args
        .out
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    let mut ctx = PipelineContext::new(checkpoint.clone());
    apply_schema_file(&mut ctx, args.schema_file.as_deref())?;

    let policy = if args.no_paragraphs {
        ParagraphPolicy::None
    } else {
        ParagraphPolicy::LineLengthHeuristic {
            threshold: args.threshold,
        }
    };
    let mut markup = MarkupOptions::default();
    if let Some(ns) = args.namespace {
        markup.annotation_ns = ns;
    }
    if let Some(prefix) = args.prefix {
        markup.annotation_prefix = prefix;
    }

    let plan = Pipeline::new(vec![Stage::Reconstruct { policy, markup }]);
    let report = plan.run(&name, &mut ctx);
    fail_on_error(&report)?;

    match args.format {
        OutputFormat::Human => {
            println!("{report}");
            if let Some(doc) = &ctx.document {
                println!("Paragraphs: {}", doc.paragraphs.len());
                println!("Spans:      {}", doc.span_count());
            }
        }
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Tsv => return Err("tsv output applies to tokenize and align".to_string()),
        OutputFormat::Xml => print_file(&checkpoint.markup_path())?,
    }
    Ok(())
}

fn cmd_run(args: RunArgs) -> Result<(), String> {
    if matches!(args.format, OutputFormat::Tsv | OutputFormat::Xml) {
        return Err("run prints human or json output".to_string());
    }
    let mut config = match &args.config {
        Some(path) => RunConfig::from_file(path).map_err(|e| e.to_string())?,
        None => RunConfig::default(),
    };
    if let Some(language) = args.language {
        config.tokenize.language = language;
    }
    if let Some(mode) = args.mode {
        config.align.mode = mode;
    }
    if args.no_paragraphs {
        config.reconstruct.paragraphs = false;
    }

    let inputs = expand_inputs(&args.inputs)?;
    if inputs.is_empty() {
        return Err("no inputs matched".to_string());
    }
    if args.annotations.is_some() && inputs.len() > 1 {
        return Err(format!(
            "--annotations applies to a single input, got {}",
            inputs.len()
        ));
    }

    let out_dir = args
        .out
        .clone()
        .or_else(|| config.output.dir.clone())
        .unwrap_or_else(|| PathBuf::from("weft-out"));
    let plan = Pipeline::new(config.stages());
    let needs_annotations = plan.stages().iter().any(|s| s.name() == "align");
    let schema = config.tag_schema();

    let mut reports = Vec::new();
    for input in &inputs {
        let name = input.display().to_string();
        let dir = document_dir(&out_dir, input);
        if let Err(e) = ensure_dir(&dir) {
            reports.push(failed_report(&name, &e));
            continue;
        }

        let mut ctx = PipelineContext::new(config.checkpoint(&dir));
        if let Some(schema) = schema.clone() {
            ctx = ctx.with_schema(schema);
        }
        if let Some(window) = config.text_window() {
            ctx = ctx.with_window(window);
        }

        match fs::read_to_string(input) {
            Ok(text) => ctx.text = Some(unify_line_endings(&text)),
            Err(e) => {
                reports.push(failed_report(&name, &format!("{}: {e}", input.display())));
                continue;
            }
        }

        if needs_annotations {
            let path = args
                .annotations
                .clone()
                .unwrap_or_else(|| annotations_path(input));
            let text = ctx.text.as_deref().unwrap_or_default();
            match read_annotation_set(text, &path) {
                Ok(set) => ctx.set = Some(set),
                Err(e) => {
                    reports.push(failed_report(&name, &e));
                    continue;
                }
            }
        }

        if let Err(e) = apply_schema_file(&mut ctx, args.schema_file.as_deref()) {
            reports.push(failed_report(&name, &e));
            continue;
        }

        reports.push(plan.run(&name, &mut ctx));
    }

    let failed = reports.iter().filter(|r| !r.succeeded()).count();
    let incomplete = reports
        .iter()
        .filter(|r| r.succeeded() && !r.complete)
        .count();

    match args.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&reports).map_err(|e| e.to_string())?
            );
        }
        _ => {
            if !args.quiet {
                for report in &reports {
                    println!("{report}");
                    println!();
                }
            }
            println!(
                "Processed {} document(s): {} complete, {} incomplete, {} failed",
                reports.len(),
                reports.len() - failed - incomplete,
                incomplete,
                failed
            );
        }
    }

    if failed > 0 {
        return Err(format!("{failed} of {} document(s) failed", reports.len()));
    }
    Ok(())
}

fn cmd_window(args: WindowArgs) -> Result<(), String> {
    if matches!(args.format, OutputFormat::Tsv | OutputFormat::Xml) {
        return Err("window prints human or json output".to_string());
    }
    let text = read_text_input(args.text.as_deref(), args.file.as_deref(), &args.positional)?;
    let text = unify_line_endings(&text);
    let len = text.chars().count();

    let window = match &args.locate {
        Some(pattern) => match locate(&text, pattern, args.literal).map_err(|e| e.to_string())? {
            Some(window) => window,
            None => {
                println!("No match.");
                return Ok(());
            }
        },
        None => TextWindow::new(args.start, args.end.unwrap_or(usize::MAX)),
    };

    let (start, end) = window.clamp(len);
    let (head, tail) = window.preview(&text, args.snippet);

    match args.format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "start": start,
                "end": end,
                "length": end - start,
                "text-length": len,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&value).map_err(|e| e.to_string())?
            );
        }
        _ => {
            println!("Window:     [{start}, {end}) of {len} chars");
            println!("Head:       {head:?}");
            println!("Tail:       {tail:?}");
        }
    }
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolve input text from --text, --file, positional args, or stdin.
fn read_text_input(
    text: Option<&str>,
    file: Option<&Path>,
    positional: &[String],
) -> Result<String, String> {
    if let Some(text) = text {
        return Ok(text.to_string());
    }
    if let Some(path) = file {
        return fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()));
    }
    if !positional.is_empty() {
        return Ok(positional.join(" "));
    }
    if !io::stdin().is_terminal() {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("read stdin: {e}"))?;
        if !buf.is_empty() {
            return Ok(buf);
        }
    }
    Err("No input text provided. Use -t 'text' or -f file or pipe via stdin".to_string())
}

/// Read and bind an annotation JSON file to its text.
fn read_annotation_set(text: &str, path: &Path) -> Result<AnnotationSet, String> {
    let json = fs::read_to_string(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            Error::not_found(path.display().to_string()).to_string()
        } else {
            format!("{}: {e}", path.display())
        }
    })?;
    AnnotationSet::from_json(text, &json).map_err(|e| e.to_string())
}

/// Load a tag vocabulary from a TOML file into the context. A missing file
/// is a soft condition: warn and continue without validation.
fn apply_schema_file(ctx: &mut PipelineContext, path: Option<&Path>) -> Result<(), String> {
    let Some(path) = path else {
        return Ok(());
    };
    match fs::read_to_string(path) {
        Ok(contents) => {
            #[derive(serde::Deserialize)]
            struct SchemaFile {
                name: String,
                classes: Vec<String>,
            }
            let file: SchemaFile = toml::from_str(&contents)
                .map_err(|e| format!("{}: {e}", path.display()))?;
            ctx.schema = Some(TagSchema::new(file.name, file.classes));
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            ctx.warn(format!(
                "vocabulary file {} not found, loading tables unvalidated",
                path.display()
            ));
            Ok(())
        }
        Err(e) => Err(format!("{}: {e}", path.display())),
    }
}

/// Expand literal paths and glob patterns, in stable order.
fn expand_inputs(inputs: &[String]) -> Result<Vec<PathBuf>, String> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.contains(['*', '?', '[']) {
            let matches = glob(input).map_err(|e| format!("{input}: {e}"))?;
            let mut matched = Vec::new();
            for entry in matches {
                matched.push(entry.map_err(|e| format!("{input}: {e}"))?);
            }
            matched.sort();
            paths.extend(matched);
        } else {
            paths.push(PathBuf::from(input));
        }
    }
    Ok(paths)
}

/// Sibling annotation file: `novel.txt` -> `novel.annotations.json`.
fn annotations_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    input.with_file_name(format!("{stem}.annotations.json"))
}

/// Name of the processed input, for reports and the per-document directory.
fn input_name(file: Option<&Path>) -> String {
    file.map(|p| p.display().to_string())
        .unwrap_or_else(|| "stdin".to_string())
}

fn window_of(start: Option<usize>, end: Option<usize>) -> Option<TextWindow> {
    if start.is_none() && end.is_none() {
        return None;
    }
    Some(TextWindow::new(
        start.unwrap_or(0),
        end.unwrap_or(usize::MAX),
    ))
}

fn ensure_dir(dir: &Path) -> Result<(), String> {
    fs::create_dir_all(dir).map_err(|e| format!("{}: {e}", dir.display()))
}

fn fail_on_error(report: &RunReport) -> Result<(), String> {
    match &report.error {
        Some(error) => Err(error.clone()),
        None => Ok(()),
    }
}

fn failed_report(input: &str, error: &str) -> RunReport {
    RunReport {
        input: input.to_string(),
        started_at: chrono::Utc::now().to_rfc3339(),
        stages_run: Vec::new(),
        artifacts: Vec::new(),
        warnings: Vec::new(),
        error: Some(error.to_string()),
        complete: false,
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).map_err(|e| e.to_string())?
    );
    Ok(())
}

fn print_file(path: &Path) -> Result<(), String> {
    let contents = fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    print!("{contents}");
    Ok(())
}

fn color(code: &str, text: &str) -> String {
    if io::stderr().is_terminal() {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    } else {
        text.to_string()
    }
}
