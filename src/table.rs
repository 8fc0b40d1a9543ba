//! Token tables: the persisted intermediate form of the pipeline.
//!
//! Two tab-separated artifacts connect the stages across process boundaries:
//! the basic table (`Token_ID`, `Text_Pointer`, `Token`) written after
//! tokenization, and the tagged table (the same plus `Tag`, `Annotation_ID`,
//! `Multi_Token_Annotation`) written after alignment. Reading a table back
//! reconstructs the in-memory sequence exactly; `read(write(x)) == x` is a
//! law, which is why the escaping below is bijective.
//!
//! The reload step knows nothing about the alignment engine. Document
//! reconstruction can therefore run much later, from the tagged table alone.

use std::path::Path;

use crate::error::{Error, Result};
use crate::schema::TagSchema;
use crate::types::{Tag, TaggedToken, Token};

/// Header of the basic token table.
pub const BASIC_COLUMNS: [&str; 3] = ["Token_ID", "Text_Pointer", "Token"];

/// Header of the tagged token table.
pub const TAGGED_COLUMNS: [&str; 6] = [
    "Token_ID",
    "Text_Pointer",
    "Token",
    "Tag",
    "Annotation_ID",
    "Multi_Token_Annotation",
];

// =============================================================================
// Escaping
// =============================================================================

/// Escape one TSV field. Newlines, tabs, carriage returns and the backslash
/// itself become two-character sequences, so neither row nor column
/// boundaries can be forged by field content.
#[must_use]
pub fn escape_field(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Invert [`escape_field`]. Rejects stray escapes so that damaged artifacts
/// fail loudly instead of round-tripping wrong.
pub fn unescape_field(field: &str) -> Result<String> {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => {
                return Err(Error::parse(format!("bad escape sequence \\{other}")));
            }
            None => return Err(Error::parse("dangling backslash at end of field")),
        }
    }
    Ok(out)
}

// =============================================================================
// Writing
// =============================================================================

/// Render the basic token table.
#[must_use]
pub fn render_token_table(tokens: &[Token]) -> String {
    let mut out = String::new();
    out.push_str(&BASIC_COLUMNS.join("\t"));
    out.push('\n');
    for token in tokens {
        out.push_str(&format!(
            "{}\t{}\t{}\n",
            token.id,
            token.offset,
            escape_field(&token.text)
        ));
    }
    out
}

/// Render the tagged token table.
#[must_use]
pub fn render_tagged_table(tagged: &[TaggedToken]) -> String {
    let mut out = String::new();
    out.push_str(&TAGGED_COLUMNS.join("\t"));
    out.push('\n');
    for tt in tagged {
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{}\n",
            tt.token.id,
            tt.token.offset,
            escape_field(&tt.token.text),
            escape_field(&tt.tag.as_label()),
            escape_field(&tt.annotation_id),
            tt.multi_token_index
        ));
    }
    out
}

/// Write the basic token table to `path`.
pub fn write_token_table(path: impl AsRef<Path>, tokens: &[Token]) -> Result<()> {
    std::fs::write(path.as_ref(), render_token_table(tokens))?;
    Ok(())
}

/// Write the tagged token table to `path`.
pub fn write_tagged_table(path: impl AsRef<Path>, tagged: &[TaggedToken]) -> Result<()> {
    std::fs::write(path.as_ref(), render_tagged_table(tagged))?;
    Ok(())
}

// =============================================================================
// Reading
// =============================================================================

/// Parse the basic token table from its textual form.
///
/// `artifact` names the table in error messages (typically the file name).
pub fn parse_token_table(content: &str, artifact: &str) -> Result<Vec<Token>> {
    let rows = table_rows(content, &BASIC_COLUMNS, artifact)?;
    let mut tokens = Vec::with_capacity(rows.len());
    for (line_no, fields) in rows {
        let id = parse_number(fields[0], "Token_ID", line_no, artifact)?;
        let offset = parse_number(fields[1], "Text_Pointer", line_no, artifact)?;
        let text = unescape_field(fields[2])
            .map_err(|e| Error::validation(artifact, format!("line {line_no}: {e}")))?;
        tokens.push(Token::new(id, offset, text));
    }
    check_monotonic(tokens.iter().map(|t| t.offset), artifact)?;
    Ok(tokens)
}

/// Parse the tagged token table from its textual form.
///
/// When a `schema` is given, every tag class must belong to it; undeclared
/// classes are a validation failure naming the vocabulary.
pub fn parse_tagged_table(
    content: &str,
    artifact: &str,
    schema: Option<&TagSchema>,
) -> Result<Vec<TaggedToken>> {
    let rows = table_rows(content, &TAGGED_COLUMNS, artifact)?;
    let mut tagged = Vec::with_capacity(rows.len());
    for (line_no, fields) in rows {
        let id = parse_number(fields[0], "Token_ID", line_no, artifact)?;
        let offset = parse_number(fields[1], "Text_Pointer", line_no, artifact)?;
        let text = unescape_field(fields[2])
            .map_err(|e| Error::validation(artifact, format!("line {line_no}: {e}")))?;
        let label = unescape_field(fields[3])
            .map_err(|e| Error::validation(artifact, format!("line {line_no}: {e}")))?;
        let tag = Tag::parse(&label).ok_or_else(|| {
            Error::validation(
                artifact,
                format!("line {line_no}: {label:?} is not an IOB2 label"),
            )
        })?;
        let annotation_id = unescape_field(fields[4])
            .map_err(|e| Error::validation(artifact, format!("line {line_no}: {e}")))?;
        let index = parse_number(fields[5], "Multi_Token_Annotation", line_no, artifact)?;
        tagged.push(TaggedToken {
            token: Token::new(id, offset, text),
            tag,
            annotation_id,
            multi_token_index: index,
        });
    }
    check_monotonic(tagged.iter().map(|t| t.token.offset), artifact)?;

    if let Some(schema) = schema {
        let undeclared = schema.undeclared(tagged.iter().map(|t| &t.tag));
        if !undeclared.is_empty() {
            return Err(Error::validation(
                artifact,
                format!(
                    "tag classes not in vocabulary {:?}: {}",
                    schema.name,
                    undeclared.join(", ")
                ),
            ));
        }
    }
    Ok(tagged)
}

/// Read the basic token table from `path`.
pub fn read_token_table(path: impl AsRef<Path>) -> Result<Vec<Token>> {
    let path = path.as_ref();
    let content = read_artifact(path)?;
    parse_token_table(&content, &path.display().to_string())
}

/// Read the tagged token table from `path`.
pub fn read_tagged_table(
    path: impl AsRef<Path>,
    schema: Option<&TagSchema>,
) -> Result<Vec<TaggedToken>> {
    let path = path.as_ref();
    let content = read_artifact(path)?;
    parse_tagged_table(&content, &path.display().to_string(), schema)
}

fn read_artifact(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::not_found(path.display().to_string())
        } else {
            Error::Io(e)
        }
    })
}

// =============================================================================
// Shared row handling
// =============================================================================

/// Split a table into validated rows of exactly `columns.len()` fields,
/// keeping 1-based line numbers for error messages.
fn table_rows<'a>(
    content: &'a str,
    columns: &[&str],
    artifact: &str,
) -> Result<Vec<(usize, Vec<&'a str>)>> {
    let mut lines = content.lines();
    let header = lines
        .next()
        .ok_or_else(|| Error::validation(artifact, "table is empty, header missing"))?;
    let expected = columns.join("\t");
    if header != expected {
        return Err(Error::validation(
            artifact,
            format!("header {header:?} does not match required columns {expected:?}"),
        ));
    }

    let mut rows = Vec::new();
    for (idx, line) in lines.enumerate() {
        if line.is_empty() {
            continue; // trailing newline
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != columns.len() {
            return Err(Error::validation(
                artifact,
                format!(
                    "line {}: expected {} fields, found {}",
                    idx + 2,
                    columns.len(),
                    fields.len()
                ),
            ));
        }
        rows.push((idx + 2, fields));
    }
    if rows.is_empty() {
        return Err(Error::validation(artifact, "table contains no rows"));
    }
    Ok(rows)
}

fn parse_number(field: &str, column: &str, line_no: usize, artifact: &str) -> Result<usize> {
    field.parse().map_err(|_| {
        Error::validation(
            artifact,
            format!("line {line_no}: {column} {field:?} is not a number"),
        )
    })
}

/// Token offsets must strictly increase; a table violating that cannot have
/// come from one tokenization run.
fn check_monotonic(offsets: impl Iterator<Item = usize>, artifact: &str) -> Result<()> {
    let mut prev: Option<usize> = None;
    for offset in offsets {
        if let Some(p) = prev {
            if offset <= p {
                return Err(Error::consistency(format!(
                    "{artifact}: token offsets not strictly increasing ({p} then {offset})"
                )));
            }
        }
        prev = Some(offset);
    }
    Ok(())
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::types::Tag;
    use proptest::prelude::*;

    fn arb_text() -> impl Strategy<Value = String> {
        // Token-ish strings including everything the escaper must handle.
        proptest::string::string_regex("[a-zäö\\\\\n\t\r .«»]{0,12}").unwrap()
    }

    proptest! {
        #[test]
        fn escape_roundtrip(text in arb_text()) {
            let escaped = escape_field(&text);
            prop_assert!(!escaped.contains('\n'));
            prop_assert!(!escaped.contains('\t'));
            prop_assert_eq!(unescape_field(&escaped).unwrap(), text);
        }

        #[test]
        fn tagged_table_roundtrip(
            texts in proptest::collection::vec(arb_text(), 1..8),
            class in "[A-Z][a-z]{1,8}",
        ) {
            let tagged: Vec<TaggedToken> = texts
                .iter()
                .enumerate()
                .map(|(i, text)| {
                    let token = Token::new(i, i * 20, text.clone());
                    if i % 2 == 0 {
                        TaggedToken::untagged(token)
                    } else {
                        TaggedToken::tagged(token, Tag::B(class.clone()), format!("id{i}"), 1)
                    }
                })
                .collect();
            let rendered = render_tagged_table(&tagged);
            let parsed = parse_tagged_table(&rendered, "prop", None).unwrap();
            prop_assert_eq!(parsed, tagged);
        }
    }
}
