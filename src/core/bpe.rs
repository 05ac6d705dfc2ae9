//! Rank-driven byte-pair merging.
//!
//! Given the symbols of one transcoded fragment, repeatedly merge the adjacent
//! pair with the lowest rank until no ranked pair remains:
//!
//! 1. Collect the distinct adjacent pairs in first-seen order.
//! 2. Pick the pair with the lowest rank. Equal ranks resolve to the pair seen
//!    first; pairs missing from the table never merge.
//! 3. Replace every non-overlapping occurrence of that pair, scanning left to
//!    right, with the concatenated symbol.
//! 4. Repeat until the fragment is a single symbol or nothing is mergeable.
//!
//! Each step removes at least one symbol, so a fragment of `n` symbols is
//! final after at most `n - 1` steps.

use rustc_hash::FxHashSet;

use super::vocab::{MergeRanks, Rank};

type Pair<'a> = (&'a str, &'a str);

/// Distinct adjacent pairs of `word`, in the order they first occur.
pub(crate) fn get_pairs(word: &[String]) -> Vec<Pair<'_>> {
    let mut seen = FxHashSet::default();
    let mut pairs = Vec::with_capacity(word.len().saturating_sub(1));
    for window in word.windows(2) {
        let pair = (window[0].as_str(), window[1].as_str());
        if seen.insert(pair) {
            pairs.push(pair);
        }
    }
    pairs
}

/// Lowest-ranked pair, or `None` when no pair is in the table.
fn lowest_ranked<'a>(pairs: &[Pair<'a>], ranks: &MergeRanks) -> Option<(Pair<'a>, Rank)> {
    let mut best: Option<(Pair<'a>, Rank)> = None;
    for &pair in pairs {
        let Some(rank) = ranks.rank(pair.0, pair.1) else {
            continue;
        };
        // Strict comparison keeps the earliest pair on ties
        if best.map_or(true, |(_, best_rank)| rank < best_rank) {
            best = Some((pair, rank));
        }
    }
    best
}

/// Replace every non-overlapping `first second` occurrence with `first + second`.
pub(crate) fn merge_pair(word: &[String], first: &str, second: &str) -> Vec<String> {
    let mut merged = Vec::with_capacity(word.len());
    let mut i = 0;
    while i < word.len() {
        if i + 1 < word.len() && word[i] == first && word[i + 1] == second {
            let mut symbol = String::with_capacity(first.len() + second.len());
            symbol.push_str(first);
            symbol.push_str(second);
            merged.push(symbol);
            i += 2;
        } else {
            merged.push(word[i].clone());
            i += 1;
        }
    }
    merged
}

/// Run the merge loop, returning the final symbols and the number of merge
/// steps taken.
pub(crate) fn byte_pair_merge_counted(
    mut word: Vec<String>,
    ranks: &MergeRanks,
) -> (Vec<String>, usize) {
    let mut steps = 0;
    while word.len() > 1 {
        let pairs = get_pairs(&word);
        let Some(((first, second), _)) = lowest_ranked(&pairs, ranks) else {
            break;
        };
        let merged = merge_pair(&word, first, second);
        word = merged;
        steps += 1;
    }
    (word, steps)
}

/// Merge `symbols` (single transcoded characters) into final BPE symbols.
///
/// # Example
/// ```
/// use gpt_bpe::{byte_pair_merge, MergeRanks};
///
/// let ranks = MergeRanks::from_pairs([("Ġ", "t"), ("h", "e"), ("Ġt", "he")]).unwrap();
/// let symbols = "Ġthe".chars().map(String::from).collect();
/// assert_eq!(byte_pair_merge(symbols, &ranks), vec!["Ġthe"]);
/// ```
pub fn byte_pair_merge(symbols: Vec<String>, ranks: &MergeRanks) -> Vec<String> {
    byte_pair_merge_counted(symbols, ranks).0
}
