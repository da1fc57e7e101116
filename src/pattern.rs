//! Wildcard-to-regex compilation and a bounded, thread-safe cache of
//! compiled patterns.
//!
//! `?` becomes `.`, `*` becomes `.*` (only where the call site allows
//! stars), every other regex metacharacter is escaped, and the whole body
//! is compiled case-insensitively. Exact mode anchors with `^...$`;
//! partial mode wraps the body with `.*` on both sides.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use regex::Regex;

/// Which of the three regex shapes a cached pattern was compiled as. Each
/// call site in [`crate::corpus::WordIndex`] uses exactly one, so the mode
/// is part of the cache key alongside the raw pattern text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternMode {
    /// Exact mode pattern containing `*`: anchored, `?` and `*` both live.
    ExactWithStar,
    /// Partial mode pattern with no `*` (but not all `?`): unanchored, only `?` lives.
    PartialNoStar,
    /// Partial mode pattern containing `*`: unanchored, `?` and `*` both live.
    PartialWithStar,
}

impl PatternMode {
    fn anchored(self) -> bool {
        matches!(self, PatternMode::ExactWithStar)
    }

    fn allow_star(self) -> bool {
        !matches!(self, PatternMode::PartialNoStar)
    }

    fn wrap_substring(self) -> bool {
        matches!(self, PatternMode::PartialNoStar | PatternMode::PartialWithStar)
    }
}

/// Escapes regex metacharacters, maps `?` to `.`, and maps `*` to `.*`
/// when `mode` allows stars. The result is a safe regex *body*, not yet
/// anchored or wrapped.
fn wildcard_to_regex_body(pattern: &str, mode: PatternMode) -> String {
    let mut body = String::with_capacity(pattern.len() * 2);
    for ch in pattern.chars() {
        match ch {
            '.' | '^' | '$' | '+' | '{' | '}' | '[' | ']' | '|' | '(' | ')' | '\\' => {
                body.push('\\');
                body.push(ch);
            }
            '?' => body.push('.'),
            '*' if mode.allow_star() => body.push_str(".*"),
            other => body.push(other),
        }
    }
    body
}

fn compile_regex(pattern: &str, mode: PatternMode) -> Regex {
    let body = wildcard_to_regex_body(pattern, mode);
    let full = if mode.anchored() {
        format!("^{body}$")
    } else if mode.wrap_substring() {
        format!(".*{body}.*")
    } else {
        body
    };
    regex::RegexBuilder::new(&full)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|_| {
            // A pathological pattern that somehow still fails to compile
            // (e.g. the repeated `.*.*` blowing the engine's size limits)
            // degrades to a regex that never matches, so callers see an
            // empty result instead of a panic. The session layer never
            // lets this kind of failure surface as anything but 400.
            Regex::new("$ ^").expect("never-matching fallback regex")
        })
}

/// A bounded, LRU-evicted, thread-safe cache of compiled regexes, keyed by
/// `(pattern text, mode)`. Default capacity is 100 entries.
pub struct PatternCache {
    inner: Mutex<LruCache<(String, PatternMode), Arc<Regex>>>,
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
}

impl PatternCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1");
        PatternCache {
            inner: Mutex::new(LruCache::new(cap)),
            hits: std::sync::atomic::AtomicU64::new(0),
            misses: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Returns the compiled regex for `(pattern, mode)`, compiling and
    /// inserting it on a cache miss.
    pub fn compile(&self, pattern: &str, mode: PatternMode) -> Arc<Regex> {
        let key = (pattern.to_string(), mode);
        let mut guard = self.inner.lock().expect("pattern cache mutex poisoned");
        if let Some(regex) = guard.get(&key) {
            self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return Arc::clone(regex);
        }
        drop(guard);
        self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let regex = Arc::new(compile_regex(pattern, mode));
        let mut guard = self.inner.lock().expect("pattern cache mutex poisoned");
        guard.put(key, Arc::clone(&regex));
        regex
    }

    /// Evicts every cached entry. Called by the memory-pressure governor.
    pub fn clear(&self) {
        self.inner.lock().expect("pattern cache mutex poisoned").clear();
    }

    /// Replaces the cache capacity, as happens on configuration reload.
    /// Existing entries are dropped; the new capacity is honored from then
    /// on.
    pub fn resize(&self, capacity: usize) {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1");
        let mut guard = self.inner.lock().expect("pattern cache mutex poisoned");
        guard.resize(cap);
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        let guard = self.inner.lock().expect("pattern cache mutex poisoned");
        let hits = self.hits.load(std::sync::atomic::Ordering::Relaxed);
        let misses = self.misses.load(std::sync::atomic::Ordering::Relaxed);
        CacheSnapshot {
            hits,
            misses,
            size: guard.len(),
            capacity: guard.cap().get(),
        }
    }
}

/// Point-in-time view of a [`PatternCache`]'s hit/miss/size counters,
/// reported by `STATS`.
#[derive(Debug, Clone, Copy)]
pub struct CacheSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_regex_metacharacters() {
        let body = wildcard_to_regex_body("a.b+c", PatternMode::ExactWithStar);
        assert_eq!(body, r"a\.b\+c");
    }

    #[test]
    fn question_mark_becomes_dot() {
        let body = wildcard_to_regex_body("h?llo", PatternMode::ExactWithStar);
        assert_eq!(body, "h.llo");
    }

    #[test]
    fn star_ignored_outside_allowed_modes() {
        let body = wildcard_to_regex_body("h*llo", PatternMode::PartialNoStar);
        assert_eq!(body, "h*llo");
    }

    #[test]
    fn cache_hits_after_first_compile() {
        let cache = PatternCache::new(10);
        let _ = cache.compile("h?llo", PatternMode::ExactWithStar);
        let snap_after_first = cache.snapshot();
        assert_eq!(snap_after_first.misses, 1);
        let _ = cache.compile("h?llo", PatternMode::ExactWithStar);
        let snap_after_second = cache.snapshot();
        assert_eq!(snap_after_second.hits, 1);
        assert_eq!(snap_after_second.misses, 1);
    }

    #[test]
    fn eviction_respects_capacity() {
        let cache = PatternCache::new(1);
        let _ = cache.compile("a", PatternMode::ExactWithStar);
        let _ = cache.compile("b", PatternMode::ExactWithStar);
        assert_eq!(cache.snapshot().size, 1);
    }

    #[test]
    fn case_insensitive_matching() {
        let regex = compile_regex("h?llo", PatternMode::ExactWithStar);
        assert!(regex.is_match("HELLO"));
        assert!(regex.is_match("hello"));
    }
}
