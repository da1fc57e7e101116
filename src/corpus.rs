//! The in-memory word index: length buckets, per-position character index,
//! and the case-folded shadow corpus used to accelerate exact and partial
//! wildcard lookups.

use std::collections::HashMap;

use crate::bloom::CorpusBlooms;
use crate::pattern::{PatternCache, PatternMode};

/// Per-length mapping from index to position-keyed character buckets.
///
/// `PositionIndex[length][position][char]` holds the set of corpus indices
/// whose folded word has length `length` and character `char` at
/// `position`. Represented here as one `Vec<HashMap<char, Vec<u32>>>` per
/// length, built once and never mutated afterwards.
type PositionTable = Vec<HashMap<char, Vec<u32>>>;

/// The fixed, immutable corpus and the indexes built over it.
///
/// Construction is `O(sum of word lengths)`. Every query method is a pure,
/// read-only function of `&self`, so a single `WordIndex` can be shared
/// across threads behind an `Arc` without locking.
pub struct WordIndex {
    /// Case-preserved words, in insertion (corpus) order. Used for output.
    original: Vec<String>,
    /// Lowercase shadow of `original`, same length and order. Used for
    /// matching so comparisons are case-insensitive by construction.
    folded: Vec<String>,
    /// length -> ordered (ascending corpus index) list of indices with that length.
    length_buckets: HashMap<usize, Vec<u32>>,
    /// length -> per-position char -> indices.
    position_index: HashMap<usize, PositionTable>,
    blooms: CorpusBlooms,
}

impl WordIndex {
    /// Builds every index structure from a corpus of non-empty UTF-8 words.
    /// Preserves `original[i]` verbatim and stores `folded[i] =
    /// lowercase(original[i])`.
    pub fn build(words: Vec<String>) -> Self {
        let folded: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();

        let mut length_buckets: HashMap<usize, Vec<u32>> = HashMap::new();
        for (i, w) in folded.iter().enumerate() {
            length_buckets
                .entry(w.chars().count())
                .or_default()
                .push(i as u32);
        }

        let mut position_index: HashMap<usize, PositionTable> = HashMap::new();
        for (&length, idxs) in &length_buckets {
            let mut by_pos: PositionTable = vec![HashMap::new(); length];
            for &i in idxs {
                for (p, ch) in folded[i as usize].chars().enumerate() {
                    by_pos[p].entry(ch).or_default().push(i);
                }
            }
            position_index.insert(length, by_pos);
        }

        let blooms = CorpusBlooms::build(&folded);

        WordIndex {
            original: words,
            folded,
            length_buckets,
            position_index,
            blooms,
        }
    }

    pub fn len(&self) -> usize {
        self.original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }

    fn word_at(&self, idx: u32) -> &str {
        &self.original[idx as usize]
    }

    /// Fixed-length (no `*`) exact candidates via the position index:
    /// intersects `PositionIndex[L][p][c]` across every non-`?` position,
    /// then filters the length bucket in corpus order.
    fn exact_fixed_length_indices(&self, pattern: &str) -> Vec<u32> {
        let length = pattern.chars().count();
        let Some(bucket) = self.length_buckets.get(&length) else {
            return Vec::new();
        };
        let pat_lower = pattern.to_lowercase();
        let fixed: Vec<(usize, char)> = pat_lower
            .chars()
            .enumerate()
            .filter(|&(_, c)| c != '?')
            .collect();

        if fixed.is_empty() {
            return bucket.clone();
        }

        let by_pos = &self.position_index[&length];
        let mut candidate: Option<std::collections::HashSet<u32>> = None;
        for &(pos, ch) in &fixed {
            let set: std::collections::HashSet<u32> = by_pos
                .get(pos)
                .and_then(|m| m.get(&ch))
                .map(|v| v.iter().copied().collect())
                .unwrap_or_default();
            candidate = Some(match candidate {
                None => set,
                Some(prev) => prev.intersection(&set).copied().collect(),
            });
            if candidate.as_ref().is_some_and(|s| s.is_empty()) {
                return Vec::new();
            }
        }
        let candidate = candidate.unwrap_or_default();
        bucket
            .iter()
            .copied()
            .filter(|i| candidate.contains(i))
            .collect()
    }

    /// Scans every corpus index in ascending order, keeping `i` when
    /// `length_ok(len)` holds and `test(original_word)` matches. This is
    /// the shared engine for every regex-backed scan (exact-with-`*`, and
    /// both partial variants) and is what guarantees the corpus-index
    /// ordering invariant regardless of
    /// how many distinct lengths are eligible.
    fn scan_in_corpus_order(
        &self,
        length_ok: impl Fn(usize) -> bool,
        test: impl Fn(&str) -> bool,
    ) -> Vec<u32> {
        let mut out = Vec::new();
        for (i, word) in self.original.iter().enumerate() {
            let len = self.folded[i].chars().count();
            if !length_ok(len) {
                continue;
            }
            if test(word) {
                out.push(i as u32);
            }
        }
        out
    }

    fn count_in_corpus_order(
        &self,
        length_ok: impl Fn(usize) -> bool,
        test: impl Fn(&str) -> bool,
    ) -> usize {
        let mut n = 0;
        for (i, word) in self.original.iter().enumerate() {
            let len = self.folded[i].chars().count();
            if !length_ok(len) {
                continue;
            }
            if test(word) {
                n += 1;
            }
        }
        n
    }

    fn min_len_excluding_stars(pattern: &str) -> usize {
        pattern.chars().filter(|&c| c != '*').count()
    }

    /// Anchored, case-insensitive wildcard match over the whole corpus.
    pub fn find_exact(&self, pattern: &str, cache: &PatternCache) -> Vec<String> {
        if self.blooms.should_skip(pattern) {
            return Vec::new();
        }
        if !pattern.contains('*') {
            return self
                .exact_fixed_length_indices(pattern)
                .into_iter()
                .map(|i| self.word_at(i).to_string())
                .collect();
        }
        let min_len = Self::min_len_excluding_stars(pattern);
        let regex = cache.compile(pattern, PatternMode::ExactWithStar);
        let idxs =
            self.scan_in_corpus_order(|l| l >= min_len, |w| regex.is_match(w));
        idxs.into_iter()
            .map(|i| self.word_at(i).to_string())
            .collect()
    }

    /// Cardinality-only counterpart of [`WordIndex::find_exact`] that never
    /// materializes the match list.
    pub fn count_exact(&self, pattern: &str, cache: &PatternCache) -> usize {
        if self.blooms.should_skip(pattern) {
            return 0;
        }
        if !pattern.contains('*') {
            return self.exact_fixed_length_indices(pattern).len();
        }
        let min_len = Self::min_len_excluding_stars(pattern);
        let regex = cache.compile(pattern, PatternMode::ExactWithStar);
        self.count_in_corpus_order(|l| l >= min_len, |w| regex.is_match(w))
    }

    /// Unanchored substring wildcard match over the whole corpus.
    pub fn find_partial(&self, pattern: &str, cache: &PatternCache) -> Vec<String> {
        if self.blooms.should_skip(pattern) {
            return Vec::new();
        }
        if !pattern.contains('*') {
            if pattern.chars().all(|c| c == '?') {
                let min_len = pattern.chars().count();
                let idxs = self.scan_in_corpus_order(|l| l >= min_len, |_| true);
                return idxs.into_iter().map(|i| self.word_at(i).to_string()).collect();
            }
            let min_len = pattern.chars().count();
            let regex = cache.compile(pattern, PatternMode::PartialNoStar);
            let idxs =
                self.scan_in_corpus_order(|l| l >= min_len, |w| regex.is_match(w));
            return idxs.into_iter().map(|i| self.word_at(i).to_string()).collect();
        }
        let min_len = Self::min_len_excluding_stars(pattern);
        let regex = cache.compile(pattern, PatternMode::PartialWithStar);
        let idxs =
            self.scan_in_corpus_order(|l| l >= min_len, |w| regex.is_match(w));
        idxs.into_iter().map(|i| self.word_at(i).to_string()).collect()
    }

    /// Cardinality-only counterpart of [`WordIndex::find_partial`].
    pub fn count_partial(&self, pattern: &str, cache: &PatternCache) -> usize {
        if self.blooms.should_skip(pattern) {
            return 0;
        }
        if !pattern.contains('*') {
            if pattern.chars().all(|c| c == '?') {
                let min_len = pattern.chars().count();
                return self.count_in_corpus_order(|l| l >= min_len, |_| true);
            }
            let min_len = pattern.chars().count();
            let regex = cache.compile(pattern, PatternMode::PartialNoStar);
            return self.count_in_corpus_order(|l| l >= min_len, |w| regex.is_match(w));
        }
        let min_len = Self::min_len_excluding_stars(pattern);
        let regex = cache.compile(pattern, PatternMode::PartialWithStar);
        self.count_in_corpus_order(|l| l >= min_len, |w| regex.is_match(w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> WordIndex {
        WordIndex::build(
            ["hello", "hallo", "hxllo", "heLLo", "world", "hell", "shell"]
                .into_iter()
                .map(String::from)
                .collect(),
        )
    }

    #[test]
    fn exact_question_marks_preserve_corpus_order() {
        let idx = fixture();
        let cache = PatternCache::new(100);
        assert_eq!(
            idx.find_exact("h?llo", &cache),
            vec!["hello", "hallo", "hxllo", "heLLo"]
        );
        assert_eq!(idx.count_exact("h?llo", &cache), 4);
    }

    #[test]
    fn partial_substring_preserves_corpus_order() {
        let idx = fixture();
        let cache = PatternCache::new(100);
        assert_eq!(
            idx.find_partial("ell", &cache),
            vec!["hello", "heLLo", "hell", "shell"]
        );
        assert_eq!(idx.count_partial("ell", &cache), 4);
    }

    #[test]
    fn exact_no_match() {
        let idx = fixture();
        let cache = PatternCache::new(100);
        assert!(idx.find_exact("abc", &cache).is_empty());
        assert_eq!(idx.count_exact("abc", &cache), 0);
    }

    #[test]
    fn exact_with_star() {
        let idx = fixture();
        let cache = PatternCache::new(100);
        assert_eq!(
            idx.find_exact("h*o", &cache),
            vec!["hello", "hallo", "hxllo", "heLLo"]
        );
    }

    #[test]
    fn partial_all_question_marks() {
        let idx = fixture();
        let cache = PatternCache::new(100);
        let all: Vec<String> = idx.find_partial("??", &cache);
        assert_eq!(
            all,
            vec!["hello", "hallo", "hxllo", "heLLo", "world", "hell", "shell"]
        );
    }

    #[test]
    fn case_insensitivity_does_not_change_match_set() {
        let idx = fixture();
        let cache = PatternCache::new(100);
        assert_eq!(idx.find_exact("H?LLO", &cache), idx.find_exact("h?llo", &cache));
        assert_eq!(
            idx.find_partial("ELL", &cache),
            idx.find_partial("ell", &cache)
        );
    }

    #[test]
    fn count_agrees_with_find_len_for_many_patterns() {
        let idx = fixture();
        let cache = PatternCache::new(100);
        for pattern in ["h?llo", "h*o", "*ll*", "??", "ell", "s*ll", "abc", "w?rld"] {
            assert_eq!(
                idx.count_exact(pattern, &cache),
                idx.find_exact(pattern, &cache).len(),
                "exact mismatch for {pattern}"
            );
            assert_eq!(
                idx.count_partial(pattern, &cache),
                idx.find_partial(pattern, &cache).len(),
                "partial mismatch for {pattern}"
            );
        }
    }
}
