//! Core tokenization engine for gpt-bpe.
//!
//! # Architecture
//!
//! - [`vocab`]: `encoder.json` / `vocab.bpe` loading into [`Vocabulary`] and
//!   [`MergeRanks`]
//! - [`byte_level`]: the byte <-> printable-character bijection
//! - [`pretokenize`]: regex splitting of text into fragments
//! - [`bpe`]: the rank-driven merge loop
//! - [`cache`]: injectable per-fragment memo ([`MergeCache`])
//! - [`Tokenizer`]: ties the pieces together behind `encode` / `decode`

pub mod bpe;
pub mod byte_level;
pub mod cache;
pub mod pretokenize;
mod tokenizer;
pub mod vocab;

pub use bpe::byte_pair_merge;
pub use byte_level::{byte_level_decode, byte_level_encode};
pub use cache::{LruMergeCache, MergeCache, UnboundedCache, DEFAULT_LRU_CAPACITY};
pub use pretokenize::{Splitter, GPT2_PATTERN};
pub use tokenizer::{
    CacheStats, Tokenizer, TokenizerError, UnknownPolicy, DEFAULT_SPECIAL_TOKENS, ENCODER_FILE,
    MERGES_FILE,
};
pub use vocab::{
    load_encoder_json, load_encoder_json_file, load_merges, load_merges_file, MergeRanks, Rank,
    TokenId, VocabError, Vocabulary,
};
