//! GPT-2 style byte-level BPE tokenizer.
//!
//! Converts text to 16-bit token ids and back using a fixed vocabulary
//! (`encoder.json`) and an ordered merge table (`vocab.bpe`).
//!
//! ```ignore
//! use gpt_bpe::Tokenizer;
//!
//! let tokenizer = Tokenizer::from_dir("models/gpt2")?;
//! let ids = tokenizer.encode("Hello world")?;
//! let text = tokenizer.decode(&ids)?;
//! ```

pub mod core;
#[cfg(feature = "python")]
mod python;

pub use core::{
    byte_level_decode, byte_level_encode, byte_pair_merge, load_encoder_json, load_merges,
    CacheStats, LruMergeCache, MergeCache, MergeRanks, Splitter, TokenId, Tokenizer,
    TokenizerError, UnboundedCache, UnknownPolicy, VocabError, Vocabulary, GPT2_PATTERN,
};
