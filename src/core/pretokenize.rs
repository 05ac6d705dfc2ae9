//! Regex pre-tokenization.
//!
//! Text is cut into fragments before BPE runs, so merges never cross a word,
//! number or punctuation boundary. A leading space stays attached to the
//! fragment that follows it (`" world"`), matching how GPT-2 vocabularies
//! were trained.

use regexr::{Regex, RegexBuilder};

use super::tokenizer::TokenizerError;

/// GPT-2 pre-tokenization pattern.
///
/// In priority order: English contraction suffixes, an optional space then a
/// letter run, an optional space then a digit run, an optional space then a
/// run of punctuation, whitespace not followed by non-whitespace, and any
/// remaining whitespace. The final `\s+` guarantees every character lands in
/// some fragment.
pub const GPT2_PATTERN: &str =
    r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";

/// Splits text into BPE fragments.
pub struct Splitter {
    regex: Regex,
    pattern: String,
    use_jit: bool,
}

impl Splitter {
    /// Compile `pattern` with JIT enabled.
    pub fn new(pattern: &str) -> Result<Self, TokenizerError> {
        Self::build(pattern, true)
    }

    /// Splitter for [`GPT2_PATTERN`].
    pub fn gpt2() -> Result<Self, TokenizerError> {
        Self::new(GPT2_PATTERN)
    }

    fn build(pattern: &str, use_jit: bool) -> Result<Self, TokenizerError> {
        let regex = RegexBuilder::new(pattern).jit(use_jit).build()?;
        Ok(Self {
            regex,
            pattern: pattern.to_string(),
            use_jit,
        })
    }

    /// Recompile with JIT enabled or disabled.
    pub fn jit(self, use_jit: bool) -> Result<Self, TokenizerError> {
        Self::build(&self.pattern, use_jit)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn uses_jit(&self) -> bool {
        self.use_jit
    }

    /// Fragments of `text` in input order.
    ///
    /// Empty matches are skipped; with [`GPT2_PATTERN`] the fragments are
    /// non-overlapping and concatenate back to `text`.
    pub fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.regex
            .find_iter(text)
            .filter(|m| m.end() > m.start())
            .map(|m| &text[m.start()..m.end()])
            .collect()
    }
}
