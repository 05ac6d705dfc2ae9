use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use aho_corasick::AhoCorasick;
use log::trace;
use rustc_hash::FxHashMap;
use thiserror::Error;

use super::bpe::byte_pair_merge;
use super::byte_level::{byte_level_byte, byte_level_encode};
use super::cache::{MergeCache, UnboundedCache};
use super::pretokenize::{Splitter, GPT2_PATTERN};
use super::vocab::{
    load_encoder_json, load_encoder_json_file, load_merges, load_merges_file, MergeRanks,
    TokenId, Vocabulary, VocabError,
};

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("Regex compilation error: {0}")]
    RegexError(#[from] regexr::Error),
    #[error("Vocabulary error: {0}")]
    VocabError(#[from] VocabError),
    #[error("Decoding error: invalid UTF-8")]
    Utf8Error,
    #[error("Aho-Corasick build error: {0}")]
    AhoCorasickError(#[from] aho_corasick::BuildError),
    #[error("Unknown token: symbol {0:?} is not in the vocabulary")]
    UnknownSymbol(String),
    #[error("Unknown token: id {0} is not in the vocabulary")]
    UnknownId(TokenId),
    #[error("Special token {0:?} is not in the vocabulary")]
    UnknownSpecialToken(String),
}

/// File name of the token table inside a model directory.
pub const ENCODER_FILE: &str = "encoder.json";

/// File name of the merge list inside a model directory.
pub const MERGES_FILE: &str = "vocab.bpe";

/// Special tokens registered automatically when the vocabulary contains them.
pub const DEFAULT_SPECIAL_TOKENS: &[&str] = &["<|endoftext|>"];

/// What to do with symbols or ids the vocabulary does not know.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownPolicy {
    /// Leave them out of the output.
    #[default]
    Drop,
    /// Fail with [`TokenizerError::UnknownSymbol`] / [`TokenizerError::UnknownId`].
    Fail,
}

impl FromStr for UnknownPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop" => Ok(Self::Drop),
            "fail" | "strict" => Ok(Self::Fail),
            _ => Err(format!(
                "invalid unknown-token policy: {s:?} (expected \"drop\" or \"fail\")"
            )),
        }
    }
}

/// Cache counters, useful to confirm that repeated fragments skip BPE.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Fragments answered from the cache.
    pub hits: usize,
    /// Fragments that ran the merge engine.
    pub misses: usize,
}

/// GPT-2 style byte-level BPE tokenizer.
///
/// Built once from a vocabulary and a merge table, then used read-only; the
/// only mutable state is the fragment cache, which is internally
/// synchronized, so a `Tokenizer` can be shared across threads.
///
/// # Pipeline
///
/// `encode`: split text into fragments, transcode each fragment's UTF-8 bytes
/// into byte-level characters, merge them with BPE (memoized per fragment),
/// then look every final symbol up in the vocabulary.
///
/// `decode`: look ids up, concatenate their token strings and map each
/// character back to its byte.
///
/// ```ignore
/// let tokenizer = Tokenizer::from_dir("models/gpt2")?;
/// let ids = tokenizer.encode("Hello world")?;
/// assert_eq!(tokenizer.decode(&ids)?, "Hello world");
/// ```
pub struct Tokenizer {
    vocab: Vocabulary,
    ranks: MergeRanks,
    splitter: Splitter,
    special_tokens: FxHashMap<String, TokenId>,
    special_token_strings: Vec<String>,
    special_matcher: Option<AhoCorasick>,
    cache: Box<dyn MergeCache>,
    policy: UnknownPolicy,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl Tokenizer {
    /// Create a tokenizer with the GPT-2 pattern and an unbounded cache.
    ///
    /// Tokens from [`DEFAULT_SPECIAL_TOKENS`] present in `vocab` are
    /// registered as special tokens.
    pub fn new(vocab: Vocabulary, ranks: MergeRanks) -> Result<Self, TokenizerError> {
        Self::with_options(vocab, ranks, GPT2_PATTERN, Box::new(UnboundedCache::new()))
    }

    /// Create a tokenizer with a custom pre-tokenization pattern and cache.
    ///
    /// # Arguments
    /// * `vocab` - Token table
    /// * `ranks` - Merge table
    /// * `pattern` - Regex used to split text into fragments
    /// * `cache` - Fragment memo; pass a fresh instance per tokenizer
    pub fn with_options(
        vocab: Vocabulary,
        ranks: MergeRanks,
        pattern: &str,
        cache: Box<dyn MergeCache>,
    ) -> Result<Self, TokenizerError> {
        let splitter = Splitter::new(pattern)?;

        let special_tokens: FxHashMap<String, TokenId> = DEFAULT_SPECIAL_TOKENS
            .iter()
            .filter_map(|&token| vocab.token_to_id(token).map(|id| (token.to_string(), id)))
            .collect();

        let mut tokenizer = Self {
            vocab,
            ranks,
            splitter,
            special_tokens: FxHashMap::default(),
            special_token_strings: Vec::new(),
            special_matcher: None,
            cache,
            policy: UnknownPolicy::default(),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        };
        tokenizer.set_special_tokens(special_tokens)?;
        Ok(tokenizer)
    }

    /// Create a tokenizer from the contents of `encoder.json` and `vocab.bpe`.
    pub fn from_bytes(encoder_json: &[u8], merges: &[u8]) -> Result<Self, TokenizerError> {
        let vocab = load_encoder_json(encoder_json)?;
        let ranks = load_merges(merges)?;
        Self::new(vocab, ranks)
    }

    /// Create a tokenizer from an `encoder.json` path and a `vocab.bpe` path.
    pub fn from_files(
        encoder_path: impl AsRef<Path>,
        merges_path: impl AsRef<Path>,
    ) -> Result<Self, TokenizerError> {
        let vocab = load_encoder_json_file(encoder_path)?;
        let ranks = load_merges_file(merges_path)?;
        Self::new(vocab, ranks)
    }

    /// Create a tokenizer from a directory holding [`ENCODER_FILE`] and
    /// [`MERGES_FILE`].
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, TokenizerError> {
        let dir = dir.as_ref();
        Self::from_files(dir.join(ENCODER_FILE), dir.join(MERGES_FILE))
    }

    /// Choose how unknown symbols and ids are handled.
    pub fn unknown_policy(mut self, policy: UnknownPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enable or disable JIT compilation of the pre-tokenization regex.
    pub fn jit(mut self, use_jit: bool) -> Result<Self, TokenizerError> {
        self.splitter = self.splitter.jit(use_jit)?;
        Ok(self)
    }

    /// Replace the registered special tokens.
    ///
    /// Every token must already be a vocabulary entry; its id is taken from
    /// the vocabulary.
    pub fn special_tokens<S: AsRef<str>>(mut self, tokens: &[S]) -> Result<Self, TokenizerError> {
        let mut special = FxHashMap::default();
        for token in tokens {
            let token = token.as_ref();
            let id = self
                .vocab
                .token_to_id(token)
                .ok_or_else(|| TokenizerError::UnknownSpecialToken(token.to_string()))?;
            special.insert(token.to_string(), id);
        }
        self.set_special_tokens(special)?;
        Ok(self)
    }

    fn set_special_tokens(
        &mut self,
        special_tokens: FxHashMap<String, TokenId>,
    ) -> Result<(), TokenizerError> {
        let special_token_strings: Vec<String> = special_tokens.keys().cloned().collect();
        self.special_matcher = if special_token_strings.is_empty() {
            None
        } else {
            Some(AhoCorasick::new(&special_token_strings)?)
        };
        self.special_tokens = special_tokens;
        self.special_token_strings = special_token_strings;
        Ok(())
    }

    /// Run BPE on a single fragment, consulting the cache first.
    ///
    /// The cache key is the fragment text before transcoding.
    pub fn bpe(&self, fragment: &str) -> Vec<String> {
        if let Some(cached) = self.cache.get(fragment) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return cached;
        }

        let symbols: Vec<String> = byte_level_encode(fragment.as_bytes())
            .chars()
            .map(String::from)
            .collect();
        let merged = byte_pair_merge(symbols, &self.ranks);

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.cache.insert(fragment.to_string(), merged.clone());
        merged
    }

    fn push_ids(&self, symbols: &[String], ids: &mut Vec<TokenId>) -> Result<(), TokenizerError> {
        for symbol in symbols {
            match self.vocab.token_to_id(symbol) {
                Some(id) => ids.push(id),
                None => match self.policy {
                    UnknownPolicy::Drop => trace!("dropping unknown symbol {:?}", symbol),
                    UnknownPolicy::Fail => {
                        return Err(TokenizerError::UnknownSymbol(symbol.clone()))
                    }
                },
            }
        }
        Ok(())
    }

    /// Encode text to token ids.
    ///
    /// Special tokens in the input are treated as ordinary text. Symbols
    /// missing from the vocabulary are dropped unless the tokenizer was built
    /// with [`UnknownPolicy::Fail`].
    pub fn encode(&self, text: &str) -> Result<Vec<TokenId>, TokenizerError> {
        let mut ids = Vec::with_capacity(text.len() / 3 + 1);
        for fragment in self.splitter.split(text) {
            let symbols = self.bpe(fragment);
            self.push_ids(&symbols, &mut ids)?;
        }
        Ok(ids)
    }

    /// Encode text, emitting registered special tokens directly.
    ///
    /// Text between special tokens is encoded with [`encode`](Self::encode).
    pub fn encode_with_special(&self, text: &str) -> Result<Vec<TokenId>, TokenizerError> {
        let Some(ref special_matcher) = self.special_matcher else {
            return self.encode(text);
        };

        let mut result = Vec::new();
        let mut last_end = 0;

        for m in special_matcher.find_iter(text.as_bytes()) {
            let start = m.start();
            let end = m.end();

            if start > last_end {
                result.extend(self.encode(&text[last_end..start])?);
            }

            let token_str = &self.special_token_strings[m.pattern().as_usize()];
            if let Some(&id) = self.special_tokens.get(token_str) {
                result.push(id);
            }

            last_end = end;
        }

        if last_end < text.len() {
            result.extend(self.encode(&text[last_end..])?);
        }

        Ok(result)
    }

    /// Decode token ids back to raw bytes.
    pub fn decode_bytes(&self, ids: &[TokenId]) -> Result<Vec<u8>, TokenizerError> {
        let mut symbols = String::with_capacity(ids.len() * 4);
        for &id in ids {
            match self.vocab.id_to_token(id) {
                Some(token) => symbols.push_str(token),
                None => match self.policy {
                    UnknownPolicy::Drop => trace!("skipping unknown id {}", id),
                    UnknownPolicy::Fail => return Err(TokenizerError::UnknownId(id)),
                },
            }
        }

        // Vocabulary construction rejects tokens outside the alphabet
        Ok(symbols.chars().filter_map(byte_level_byte).collect())
    }

    /// Decode token ids to a string.
    pub fn decode(&self, ids: &[TokenId]) -> Result<String, TokenizerError> {
        let bytes = self.decode_bytes(ids)?;
        String::from_utf8(bytes).map_err(|_| TokenizerError::Utf8Error)
    }

    /// Decode token ids to a string, skipping unknown ids and replacing
    /// invalid UTF-8 with the replacement character.
    pub fn decode_lossy(&self, ids: &[TokenId]) -> String {
        let bytes: Vec<u8> = ids
            .iter()
            .filter_map(|&id| self.vocab.id_to_token(id))
            .flat_map(str::chars)
            .filter_map(byte_level_byte)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Vocabulary size as the number of id slots (`max_id + 1`).
    pub fn vocab_size(&self) -> usize {
        self.vocab.max_id().map_or(0, |id| id as usize + 1)
    }

    pub fn token_to_id(&self, token: &str) -> Option<TokenId> {
        self.vocab.token_to_id(token)
    }

    pub fn id_to_token(&self, id: TokenId) -> Option<&str> {
        self.vocab.id_to_token(id)
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn merge_ranks(&self) -> &MergeRanks {
        &self.ranks
    }

    /// Get the registered special tokens.
    pub fn special_tokens_map(&self) -> &FxHashMap<String, TokenId> {
        &self.special_tokens
    }

    pub fn policy(&self) -> UnknownPolicy {
        self.policy
    }

    /// Clear the fragment cache and reset its counters.
    pub fn clear_cache(&self) {
        self.cache.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Number of cached fragments.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::byte_level::byte_level_char;
    use crate::core::cache::LruMergeCache;
    use std::sync::Arc;
    use std::thread;

    /// Byte tokens 0-255, a few merged words and `<|endoftext|>`.
    fn make_vocab() -> Vocabulary {
        let mut encoder = FxHashMap::default();
        for b in 0u8..=255 {
            encoder.insert(byte_level_char(b).to_string(), b as TokenId);
        }
        for (i, token) in ["Ġt", "he", "Ġthe", "ll", "llo", "Hello", "<|endoftext|>"]
            .iter()
            .enumerate()
        {
            encoder.insert(token.to_string(), 256 + i as TokenId);
        }
        Vocabulary::new(encoder).unwrap()
    }

    fn make_ranks() -> MergeRanks {
        MergeRanks::from_pairs([
            ("Ġ", "t"),
            ("h", "e"),
            ("Ġt", "he"),
            ("l", "l"),
            ("ll", "o"),
            ("H", "e"),
            ("He", "llo"),
        ]).unwrap()
    }

    fn make_test_tokenizer() -> Tokenizer {
        Tokenizer::new(make_vocab(), make_ranks()).unwrap()
    }

    /// Only the merged words; no byte fallback.
    fn make_sparse_tokenizer() -> Tokenizer {
        let mut encoder = FxHashMap::default();
        encoder.insert("Ġthe".to_string(), 0);
        encoder.insert("Ġt".to_string(), 1);
        Tokenizer::new(Vocabulary::new(encoder).unwrap(), make_ranks()).unwrap()
    }

    #[test]
    fn test_single_word_is_one_token() {
        let tokenizer = make_test_tokenizer();
        let the = tokenizer.token_to_id("Ġthe").unwrap();

        let ids = tokenizer.encode(" the").unwrap();
        assert_eq!(ids, vec![the]);
        assert_eq!(tokenizer.decode(&ids).unwrap(), " the");
    }

    #[test]
    fn test_encode_decode() {
        let tokenizer = make_test_tokenizer();
        let text = "Hello the world, it's 2024!\n\tcafé 🦀";
        let ids = tokenizer.encode(text).unwrap();
        assert_eq!(tokenizer.decode(&ids).unwrap(), text);
    }

    #[test]
    fn test_hello_merges() {
        let tokenizer = make_test_tokenizer();
        let hello = tokenizer.token_to_id("Hello").unwrap();
        assert_eq!(tokenizer.encode("Hello").unwrap(), vec![hello]);
        assert_eq!(tokenizer.bpe("Hello"), vec!["Hello"]);
    }

    #[test]
    fn test_control_bytes_without_entries_encode_to_nothing() {
        let tokenizer = make_sparse_tokenizer();
        assert!(tokenizer.encode("\u{1}\u{2}\u{3}").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_symbol_fails_in_strict_mode() {
        let tokenizer = make_sparse_tokenizer().unknown_policy(UnknownPolicy::Fail);
        assert_eq!(tokenizer.policy(), UnknownPolicy::Fail);
        let err = tokenizer.encode("\u{1}").unwrap_err();
        assert!(matches!(err, TokenizerError::UnknownSymbol(ref s) if s == "\u{101}"));

        // Known words still encode
        assert_eq!(tokenizer.encode(" the").unwrap(), vec![0]);
    }

    #[test]
    fn test_partial_drop_keeps_known_symbols() {
        let tokenizer = make_sparse_tokenizer();
        // " the" -> Ġthe, " tx" -> [Ġt, x] with x unknown
        assert_eq!(tokenizer.encode(" the tx").unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_repeated_fragment_hits_cache() {
        let tokenizer = make_test_tokenizer();
        let ids = tokenizer.encode(" the the").unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], ids[1]);
        assert_eq!(tokenizer.cache_stats(), CacheStats { hits: 1, misses: 1 });
        assert_eq!(tokenizer.cache_len(), 1);
    }

    #[test]
    fn test_cached_and_cold_results_agree() {
        let tokenizer = make_test_tokenizer();
        let cold = tokenizer.bpe(" Hello");
        let warm = tokenizer.bpe(" Hello");
        assert_eq!(cold, warm);
        assert_eq!(tokenizer.cache_stats().hits, 1);

        let fresh = make_test_tokenizer();
        assert_eq!(fresh.bpe(" Hello"), cold);
    }

    #[test]
    fn test_clear_cache() {
        let tokenizer = make_test_tokenizer();
        tokenizer.encode("Hello the").unwrap();
        assert!(tokenizer.cache_len() > 0);
        tokenizer.clear_cache();
        assert_eq!(tokenizer.cache_len(), 0);
        assert_eq!(tokenizer.cache_stats(), CacheStats::default());
    }

    #[test]
    fn test_bounded_cache_still_encodes() {
        let tokenizer = Tokenizer::with_options(
            make_vocab(),
            make_ranks(),
            GPT2_PATTERN,
            Box::new(LruMergeCache::new(1)),
        )
        .unwrap();
        let text = "Hello the Hello the";
        let ids = tokenizer.encode(text).unwrap();
        assert_eq!(tokenizer.decode(&ids).unwrap(), text);
        assert_eq!(tokenizer.cache_len(), 1);
    }

    #[test]
    fn test_decode_skips_unknown_ids() {
        let tokenizer = make_test_tokenizer();
        let the = tokenizer.token_to_id("Ġthe").unwrap();
        assert_eq!(tokenizer.decode(&[the, 9999, the]).unwrap(), " the the");
        assert_eq!(tokenizer.decode_lossy(&[9999]), "");
    }

    #[test]
    fn test_decode_unknown_id_fails_in_strict_mode() {
        let tokenizer = make_test_tokenizer().unknown_policy(UnknownPolicy::Fail);
        assert!(matches!(
            tokenizer.decode(&[9999]).unwrap_err(),
            TokenizerError::UnknownId(9999)
        ));
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let tokenizer = make_test_tokenizer();
        // A lone continuation byte
        let ids = [0x80 as TokenId];
        assert!(matches!(
            tokenizer.decode(&ids).unwrap_err(),
            TokenizerError::Utf8Error
        ));
        assert_eq!(tokenizer.decode_bytes(&ids).unwrap(), vec![0x80]);
        assert_eq!(tokenizer.decode_lossy(&ids), "\u{FFFD}");
    }

    #[test]
    fn test_encode_with_special() {
        let tokenizer = make_test_tokenizer();
        let eot = tokenizer.token_to_id("<|endoftext|>").unwrap();

        let ids = tokenizer.encode_with_special("Hello<|endoftext|> the").unwrap();
        assert!(ids.contains(&eot));
        assert_eq!(tokenizer.decode(&ids).unwrap(), "Hello<|endoftext|> the");

        // Plain encode splits the marker into ordinary fragments
        assert!(!tokenizer.encode("<|endoftext|>").unwrap().contains(&eot));
    }

    #[test]
    fn test_special_tokens_must_exist() {
        let err = make_test_tokenizer()
            .special_tokens(&["<|pad|>"])
            .err()
            .unwrap();
        assert!(matches!(err, TokenizerError::UnknownSpecialToken(_)));

        let tokenizer = make_test_tokenizer().special_tokens::<&str>(&[]).unwrap();
        assert!(tokenizer.special_tokens_map().is_empty());
        let hello = tokenizer.token_to_id("Hello").unwrap();
        let tokenizer = tokenizer.special_tokens(&["Hello"]).unwrap();
        assert_eq!(tokenizer.encode_with_special("xHello").unwrap()[1], hello);
    }

    #[test]
    fn test_vocab_size() {
        let tokenizer = make_test_tokenizer();
        assert_eq!(tokenizer.vocab_size(), 263);
        assert_eq!(tokenizer.vocabulary().len(), 263);
        assert_eq!(tokenizer.merge_ranks().len(), 7);
    }

    #[test]
    fn test_jit_toggle() {
        let tokenizer = make_test_tokenizer().jit(false).unwrap();
        let text = "Hello World";
        let ids = tokenizer.encode(text).unwrap();
        assert_eq!(tokenizer.decode(&ids).unwrap(), text);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("drop".parse::<UnknownPolicy>(), Ok(UnknownPolicy::Drop));
        assert_eq!("fail".parse::<UnknownPolicy>(), Ok(UnknownPolicy::Fail));
        assert!("ignore".parse::<UnknownPolicy>().is_err());
    }

    #[test]
    fn test_tokenizer_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Tokenizer>();
    }

    #[test]
    fn test_concurrent_encode_agrees() {
        let tokenizer = Arc::new(make_test_tokenizer());
        let text = "Hello the Hello world, the hello";
        let expected = make_test_tokenizer().encode(text).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tokenizer = Arc::clone(&tokenizer);
                thread::spawn(move || {
                    (0..50)
                        .map(|_| tokenizer.encode(text).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for handle in handles {
            for ids in handle.join().unwrap() {
                assert_eq!(ids, expected);
            }
        }

        let cached = tokenizer.cache_len();
        assert!(cached > 0);
        assert_eq!(tokenizer.encode(text).unwrap(), expected);
        assert_eq!(tokenizer.cache_len(), cached);
    }
}
