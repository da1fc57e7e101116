//! Crate-wide error type for the failures that abort the process before it
//! ever starts serving.
//!
//! Everything that happens once a connection is open is represented
//! instead as a typed outcome the session state machine always turns into
//! a framed response (see [`crate::protocol::ParseError`] and
//! [`crate::session::DispatchError`]) -- no internal failure is ever
//! surfaced to a client as anything but `400 BAD-REQUEST`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WordSearchError {
    #[error("failed to read word list from {path}: {source}")]
    CorpusLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load config from {path}: {source}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, WordSearchError>;
