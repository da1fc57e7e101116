//! TCP wildcard word-search service: a bloom-filtered position index over a
//! fixed word corpus, a regex-backed `?`/`*` matcher with an LRU pattern
//! cache, and two server deployments (single-connection-at-a-time and a
//! bounded thread pool) speaking the same line-oriented wire protocol.

pub mod bloom;
pub mod config;
pub mod corpus;
pub mod error;
pub mod pattern;
pub mod pressure;
pub mod protocol;
pub mod server;
pub mod session;
pub mod stats;

pub use config::Config;
pub use corpus::WordIndex;
pub use error::{Result, WordSearchError};

/// Reads a word list from `path`, one word per line, blank lines ignored.
pub fn load_corpus(path: &std::path::Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path).map_err(|source| WordSearchError::CorpusLoad {
        path: path.display().to_string(),
        source,
    })?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}
