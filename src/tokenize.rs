//! Tokenizer adapter boundary.
//!
//! Tokenization itself is external to this crate: any component that can turn
//! text into ordered `(id, offset, text)` tokens may sit behind the
//! [`Tokenizer`] trait. What this module owns is the *contract* at that
//! boundary: character offsets, strictly increasing positions, and the full
//! re-concatenation check that makes a bad tokenization fail fast instead of
//! corrupting every later stage.
//!
//! The built-in [`WhitespaceTokenizer`] satisfies the contract without any
//! linguistic model: words split on whitespace, edge punctuation peeled into
//! its own tokens, newline runs kept as line-break tokens so paragraph
//! policies have something to inspect.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Token;

/// Language model requested from the tokenizer backend.
///
/// The built-in whitespace adapter tokenizes identically for all of them; a
/// linguistic backend uses this to select its model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LanguageModel {
    /// German model.
    #[default]
    German,
    /// English model.
    English,
    /// French model.
    French,
    /// Spanish model.
    Spanish,
    /// Language-agnostic multilingual model.
    Multilingual,
}

impl LanguageModel {
    /// Canonical name.
    #[must_use]
    pub fn as_label(&self) -> &'static str {
        match self {
            LanguageModel::German => "German",
            LanguageModel::English => "English",
            LanguageModel::French => "French",
            LanguageModel::Spanish => "Spanish",
            LanguageModel::Multilingual => "Multilingual",
        }
    }

    /// All supported models.
    #[must_use]
    pub fn all() -> &'static [LanguageModel] {
        &[
            LanguageModel::German,
            LanguageModel::English,
            LanguageModel::French,
            LanguageModel::Spanish,
            LanguageModel::Multilingual,
        ]
    }
}

impl std::fmt::Display for LanguageModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_label())
    }
}

impl std::str::FromStr for LanguageModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "german" | "de" | "deu" => Ok(LanguageModel::German),
            "english" | "en" | "eng" => Ok(LanguageModel::English),
            "french" | "fr" | "fra" => Ok(LanguageModel::French),
            "spanish" | "es" | "spa" => Ok(LanguageModel::Spanish),
            "multilingual" | "xx" => Ok(LanguageModel::Multilingual),
            other => Err(Error::invalid_input(format!(
                "unknown language model: {other}"
            ))),
        }
    }
}

/// The tokenizer adapter boundary.
///
/// Implementations must produce tokens with strictly increasing character
/// offsets whose texts, placed back at those offsets, reproduce the source
/// text with nothing but whitespace in the gaps. [`verify_tokenization`]
/// checks exactly that and implementations are expected to pass it.
pub trait Tokenizer: Send + Sync {
    /// Tokenize `text` into ordered tokens with character offsets.
    fn tokenize(&self, text: &str) -> Result<Vec<Token>>;

    /// Adapter name, for reports and logs.
    fn name(&self) -> &'static str {
        "unknown"
    }
}

/// Built-in whitespace/punctuation tokenizer.
///
/// Not a linguistic tokenizer. It exists so the pipeline runs end to end
/// without an external model, and as the reference for the boundary contract.
#[derive(Debug, Clone)]
pub struct WhitespaceTokenizer {
    language: LanguageModel,
    max_length: Option<usize>,
}

/// Punctuation peeled off word edges into tokens of their own.
const EDGE_PUNCTUATION: &[char] = &[
    '.', ',', ':', ';', '!', '?', '«', '»', '(', ')', '"',
];

/// Default text length ceiling, in characters. Linguistic backends tend to
/// fall over far beyond this, so the limit is enforced before they run.
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 2_000_000;

impl WhitespaceTokenizer {
    /// Create an adapter for the given language model.
    #[must_use]
    pub fn new(language: LanguageModel) -> Self {
        Self {
            language,
            max_length: None,
        }
    }

    /// Limit the text length (in characters) the adapter accepts.
    #[must_use]
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// The configured language model.
    #[must_use]
    pub fn language(&self) -> LanguageModel {
        self.language
    }
}

impl Default for WhitespaceTokenizer {
    fn default() -> Self {
        Self::new(LanguageModel::default())
    }
}

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<Token>> {
        if let Some(max) = self.max_length {
            let len = text.chars().count();
            if len > max {
                return Err(Error::invalid_input(format!(
                    "text has {len} characters, adapter limit is {max}"
                )));
            }
        }
        log::debug!(
            "tokenizing {} bytes with whitespace adapter ({})",
            text.len(),
            self.language
        );

        let mut tokens = Vec::new();
        let mut chunk = String::new();
        let mut chunk_offset = 0;
        let mut offset = 0; // running char offset
        let mut in_break = false;

        for c in text.chars() {
            let is_ws = c.is_whitespace();
            if is_ws {
                if !in_break {
                    flush_word(&mut tokens, &mut chunk, chunk_offset);
                }
                if c == '\n' || in_break {
                    // A whitespace run containing a newline becomes one
                    // line-break token, trailing spaces included.
                    if !in_break {
                        // Run starts at the newline, not at leading spaces.
                        chunk_offset = offset;
                        in_break = true;
                    }
                    chunk.push(c);
                }
                if !in_break {
                    chunk_offset = offset + 1;
                }
            } else {
                if in_break {
                    flush_break(&mut tokens, &mut chunk, chunk_offset);
                    in_break = false;
                }
                if chunk.is_empty() {
                    chunk_offset = offset;
                }
                chunk.push(c);
            }
            offset += 1;
        }
        if in_break {
            flush_break(&mut tokens, &mut chunk, chunk_offset);
        } else {
            flush_word(&mut tokens, &mut chunk, chunk_offset);
        }

        // ids are ordinal positions, assigned after punctuation peeling
        for (id, token) in tokens.iter_mut().enumerate() {
            token.id = id;
        }

        verify_tokenization(text, &tokens)?;
        Ok(tokens)
    }

    fn name(&self) -> &'static str {
        "whitespace"
    }
}

/// Emit a completed word chunk, peeling edge punctuation into separate
/// tokens. Ids are fixed up by the caller afterwards.
fn flush_word(tokens: &mut Vec<Token>, chunk: &mut String, chunk_offset: usize) {
    if chunk.is_empty() {
        return;
    }
    let chars: Vec<char> = chunk.chars().collect();
    let mut lead = 0;
    while lead < chars.len() && EDGE_PUNCTUATION.contains(&chars[lead]) {
        lead += 1;
    }
    let mut trail = chars.len();
    while trail > lead && EDGE_PUNCTUATION.contains(&chars[trail - 1]) {
        trail -= 1;
    }

    for (i, c) in chars[..lead].iter().enumerate() {
        tokens.push(Token::new(0, chunk_offset + i, c.to_string()));
    }
    if lead < trail {
        let core: String = chars[lead..trail].iter().collect();
        tokens.push(Token::new(0, chunk_offset + lead, core));
    }
    for (i, c) in chars[trail..].iter().enumerate() {
        tokens.push(Token::new(0, chunk_offset + trail + i, c.to_string()));
    }
    chunk.clear();
}

fn flush_break(tokens: &mut Vec<Token>, chunk: &mut String, chunk_offset: usize) {
    if chunk.is_empty() {
        return;
    }
    tokens.push(Token::new(0, chunk_offset, chunk.clone()));
    chunk.clear();
}

/// Unify line endings to `\n` so character offsets are stable across
/// platforms. Applied to the source text before tokenization.
#[must_use]
pub fn unify_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// The full re-concatenation check.
///
/// Verifies that ids are ordinal, offsets strictly increase, each token's
/// text matches the source text at its offset, and inter-token gaps contain
/// nothing but whitespace. A violation means every downstream offset
/// comparison would be meaningless, so this is a fatal consistency error.
pub fn verify_tokenization(text: &str, tokens: &[Token]) -> Result<()> {
    let chars: Vec<char> = text.chars().collect();
    let mut cursor = 0; // next unexplained char offset

    for (idx, token) in tokens.iter().enumerate() {
        if token.id != idx {
            return Err(Error::consistency(format!(
                "token {} carries id {}, expected ordinal {}",
                idx, token.id, idx
            )));
        }
        if token.offset < cursor {
            return Err(Error::consistency(format!(
                "token {} at offset {} overlaps the previous token",
                idx, token.offset
            )));
        }
        if !chars[cursor..token.offset.min(chars.len())]
            .iter()
            .all(|c| c.is_whitespace())
        {
            return Err(Error::consistency(format!(
                "non-whitespace source text between offsets {} and {} is not covered by any token",
                cursor, token.offset
            )));
        }
        let token_chars: Vec<char> = token.text.chars().collect();
        let end = token.offset + token_chars.len();
        if end > chars.len() || chars[token.offset..end] != token_chars[..] {
            return Err(Error::consistency(format!(
                "token {} ({:?}) does not match the source text at offset {}",
                idx, token.text, token.offset
            )));
        }
        cursor = end;
    }

    if !chars[cursor.min(chars.len())..]
        .iter()
        .all(|c| c.is_whitespace())
    {
        return Err(Error::consistency(format!(
            "source text after offset {cursor} is not covered by any token"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(text: &str) -> Vec<Token> {
        WhitespaceTokenizer::default().tokenize(text).unwrap()
    }

    #[test]
    fn test_basic_offsets() {
        let tokens = tokenize("The red fox");
        let got: Vec<(usize, usize, &str)> = tokens
            .iter()
            .map(|t| (t.id, t.offset, t.text.as_str()))
            .collect();
        assert_eq!(got, vec![(0, 0, "The"), (1, 4, "red"), (2, 8, "fox")]);
    }

    #[test]
    fn test_offsets_are_chars_not_bytes() {
        let tokens = tokenize("ää öö");
        assert_eq!(tokens[0].offset, 0);
        assert_eq!(tokens[1].offset, 3);
    }

    #[test]
    fn test_newline_run_is_one_line_break_token() {
        let tokens = tokenize("one\n\ntwo");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "\n\n", "two"]);
        assert!(tokens[1].is_line_break());
        assert_eq!(tokens[2].offset, 5);
    }

    #[test]
    fn test_trailing_spaces_join_line_break_token() {
        let tokens = tokenize("one\n   two");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "\n   ", "two"]);
    }

    #[test]
    fn test_edge_punctuation_is_peeled() {
        let tokens = tokenize("«Ja», sagte er.");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["«", "Ja", "»", ",", "sagte", "er", "."]);
        // offsets still point into the source
        assert_eq!(tokens[1].offset, 1);
        assert_eq!(tokens[6].offset, 14);
    }

    #[test]
    fn test_inner_apostrophe_stays() {
        let tokens = tokenize("don't stop");
        assert_eq!(tokens[0].text, "don't");
    }

    #[test]
    fn test_max_length_guard() {
        let tk = WhitespaceTokenizer::default().with_max_length(5);
        assert!(tk.tokenize("too long for that").is_err());
        assert!(tk.tokenize("ok").is_ok());
    }

    #[test]
    fn test_verify_catches_corrupted_token() {
        let mut tokens = tokenize("The red fox");
        tokens[1].text = "blue".to_string();
        let err = verify_tokenization("The red fox", &tokens).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_verify_catches_uncovered_text() {
        let mut tokens = tokenize("The red fox");
        tokens.remove(1);
        for (id, t) in tokens.iter_mut().enumerate() {
            t.id = id;
        }
        assert!(verify_tokenization("The red fox", &tokens).is_err());
    }

    #[test]
    fn test_verify_accepts_gap_whitespace() {
        let tokens = tokenize("  spaced   out  ");
        assert_eq!(tokens.len(), 2);
        // verify_tokenization already ran inside tokenize()
        assert_eq!(tokens[0].offset, 2);
        assert_eq!(tokens[1].offset, 11);
    }

    #[test]
    fn test_unify_line_endings() {
        assert_eq!(unify_line_endings("a\r\nb\rc\nd"), "a\nb\nc\nd");
    }

    #[test]
    fn test_language_model_parse() {
        assert_eq!("de".parse::<LanguageModel>().unwrap(), LanguageModel::German);
        assert_eq!(
            "Multilingual".parse::<LanguageModel>().unwrap(),
            LanguageModel::Multilingual
        );
        assert!("klingon".parse::<LanguageModel>().is_err());
    }

    #[test]
    fn test_empty_text() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   ").is_empty());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn tokenization_always_verifies(text in "[a-zA-Zäöü .,«»!?\n]{0,80}") {
            // tokenize() runs the re-concatenation check internally; the
            // property is that it never trips on its own output.
            let tokens = WhitespaceTokenizer::default().tokenize(&text).unwrap();
            prop_assert!(verify_tokenization(&text, &tokens).is_ok());
        }

        #[test]
        fn offsets_strictly_increase(text in "[a-z \n]{0,60}") {
            let tokens = WhitespaceTokenizer::default().tokenize(&text).unwrap();
            for pair in tokens.windows(2) {
                prop_assert!(pair[0].offset < pair[1].offset);
            }
        }
    }
}
