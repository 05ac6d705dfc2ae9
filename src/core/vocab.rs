//! Vocabulary and merge-table loading for GPT-2 style BPE.
//!
//! A GPT-2 tokenizer ships as two files:
//!
//! - `encoder.json`: a JSON object mapping every token (written in the
//!   transcoded alphabet of [`byte_level`](super::byte_level)) to its id
//! - `vocab.bpe`: the ordered merge list, one `left right` pair per line,
//!   preceded by a version header
//!
//! # Example Format
//!
//! ```text
//! #version: 0.2
//! Ġ t
//! Ġ a
//! h e
//! ```
//!
//! The position of a pair in the list (header excluded) is its rank: `Ġ t`
//! has rank 0 and is merged before anything else.

use std::path::Path;

use log::{debug, warn};
use rustc_hash::FxHashMap;
use thiserror::Error;

use super::byte_level::is_byte_level_char;

/// Token id. GPT-2 vocabularies have 50,257 entries, which fits in 16 bits.
pub type TokenId = u16;

/// Merge rank. Lower ranks merge first.
pub type Rank = u32;

/// Errors that can occur when loading vocabulary or merge files.
#[derive(Error, Debug)]
pub enum VocabError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid encoder JSON: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Invalid line format: {0}")]
    ParseError(String),
    #[error("Token id {id} for {token:?} does not fit in 16 bits")]
    IdOutOfRange { token: String, id: u64 },
    #[error("Token id {id} is assigned to both {first:?} and {second:?}")]
    DuplicateId {
        id: TokenId,
        first: String,
        second: String,
    },
    #[error("Token {0:?} contains characters outside the byte-level alphabet")]
    InvalidToken(String),
}

/// Bijective `token <-> id` table.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    encoder: FxHashMap<String, TokenId>,
    decoder: FxHashMap<TokenId, String>,
}

impl Vocabulary {
    /// Build a vocabulary from a `token -> id` map.
    ///
    /// Fails if two tokens share an id or if a token cannot be mapped back
    /// to bytes.
    pub fn new(encoder: FxHashMap<String, TokenId>) -> Result<Self, VocabError> {
        let mut decoder: FxHashMap<TokenId, String> =
            FxHashMap::with_capacity_and_hasher(encoder.len(), Default::default());

        for (token, &id) in &encoder {
            if token.is_empty() || !token.chars().all(is_byte_level_char) {
                return Err(VocabError::InvalidToken(token.clone()));
            }
            if let Some(existing) = decoder.insert(id, token.clone()) {
                // Order the pair so the message does not depend on hash order
                let (first, second) = if existing < *token {
                    (existing, token.clone())
                } else {
                    (token.clone(), existing)
                };
                return Err(VocabError::DuplicateId { id, first, second });
            }
        }

        Ok(Self { encoder, decoder })
    }

    #[inline]
    pub fn token_to_id(&self, token: &str) -> Option<TokenId> {
        self.encoder.get(token).copied()
    }

    #[inline]
    pub fn id_to_token(&self, id: TokenId) -> Option<&str> {
        self.decoder.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.encoder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoder.is_empty()
    }

    /// Largest id in the table, if any.
    pub fn max_id(&self) -> Option<TokenId> {
        self.decoder.keys().max().copied()
    }

    pub fn encoder(&self) -> &FxHashMap<String, TokenId> {
        &self.encoder
    }

    pub fn decoder(&self) -> &FxHashMap<TokenId, String> {
        &self.decoder
    }
}

/// Ordered `(left, right) -> rank` merge table.
///
/// Pairs are stored as a nested map so lookups borrow both symbols instead of
/// building an owned key per probe.
#[derive(Debug, Clone, Default)]
pub struct MergeRanks {
    ranks: FxHashMap<String, FxHashMap<String, Rank>>,
    len: usize,
}

impl MergeRanks {
    /// Build a table from pairs in priority order; the position of each pair
    /// is its rank. A repeated pair keeps the rank of its last occurrence.
    pub fn from_pairs<I, L, R>(pairs: I) -> Result<Self, VocabError>
    where
        I: IntoIterator<Item = (L, R)>,
        L: Into<String>,
        R: Into<String>,
    {
        let mut table = Self::default();
        for (position, (left, right)) in pairs.into_iter().enumerate() {
            table.insert(left.into(), right.into(), rank_at(position)?);
        }
        Ok(table)
    }

    fn insert(&mut self, left: String, right: String, rank: Rank) {
        let previous = self.ranks.entry(left).or_default().insert(right, rank);
        if previous.is_none() {
            self.len += 1;
        }
    }

    /// Rank of the pair, or `None` if the pair is never merged.
    #[inline]
    pub fn rank(&self, left: &str, right: &str) -> Option<Rank> {
        self.ranks.get(left)?.get(right).copied()
    }

    #[inline]
    pub fn contains(&self, left: &str, right: &str) -> bool {
        self.rank(left, right).is_some()
    }

    /// Number of distinct pairs.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Load a vocabulary from the contents of an `encoder.json` file.
pub fn load_encoder_json(data: &[u8]) -> Result<Vocabulary, VocabError> {
    let raw: FxHashMap<String, u64> = serde_json::from_slice(data)?;

    let mut encoder = FxHashMap::with_capacity_and_hasher(raw.len(), Default::default());
    for (token, id) in raw {
        let id = TokenId::try_from(id).map_err(|_| VocabError::IdOutOfRange {
            token: token.clone(),
            id,
        })?;
        encoder.insert(token, id);
    }

    let vocab = Vocabulary::new(encoder)?;
    debug!("loaded vocabulary with {} tokens", vocab.len());
    Ok(vocab)
}

/// Load a vocabulary from an `encoder.json` path.
pub fn load_encoder_json_file(path: impl AsRef<Path>) -> Result<Vocabulary, VocabError> {
    let data = std::fs::read(path)?;
    load_encoder_json(&data)
}

/// Rank for the pair at `position` in the merge list.
fn rank_at(position: usize) -> Result<Rank, VocabError> {
    Rank::try_from(position).map_err(|_| {
        VocabError::ParseError(format!(
            "merge list exceeds {} entries",
            u64::from(Rank::MAX) + 1
        ))
    })
}

/// Load a merge table from the contents of a `vocab.bpe` file.
///
/// Format: a header line (skipped unconditionally), then one pair per line,
/// split on whitespace. Blank lines are ignored and do not consume a rank.
pub fn load_merges(data: &[u8]) -> Result<MergeRanks, VocabError> {
    let text = std::str::from_utf8(data)
        .map_err(|_| VocabError::ParseError("Invalid UTF-8 in merges".to_string()))?;

    let mut lines = text.lines();
    if lines.next().is_none() {
        return Err(VocabError::ParseError(
            "Missing header line in merges".to_string(),
        ));
    }

    let mut table = MergeRanks::default();
    let mut position = 0usize;
    // Header is line 1
    for (line_no, line) in lines.enumerate().map(|(i, l)| (i + 2, l)) {
        // Transcoded symbols never contain whitespace
        let mut parts = line.split_whitespace();
        let left = match parts.next() {
            Some(left) => left,
            None => continue,
        };
        let (Some(right), None) = (parts.next(), parts.next()) else {
            return Err(VocabError::ParseError(format!(
                "line {}: expected `left right`, got {:?}",
                line_no, line
            )));
        };
        let rank = rank_at(position)?;

        if table.contains(left, right) {
            warn!(
                "merge pair {:?} repeated on line {}; keeping the later rank",
                line, line_no
            );
        }
        table.insert(left.to_string(), right.to_string(), rank);
        position += 1;
    }

    debug!("loaded {} merge rules", table.len());
    Ok(table)
}

/// Load a merge table from a `vocab.bpe` path.
pub fn load_merges_file(path: impl AsRef<Path>) -> Result<MergeRanks, VocabError> {
    let data = std::fs::read(path)?;
    load_merges(&data)
}
