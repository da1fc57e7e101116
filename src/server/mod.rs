//! Server contexts and accept loops: `basic` (one request-handling thread
//! per connection, exact mode only) and `threaded` (bounded worker pool,
//! both modes, `BATCH`, backpressure) share the [`Session`] pipeline and
//! differ only in concurrency shape.

pub mod basic;
pub mod health;
pub mod threaded;

use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::corpus::WordIndex;
use crate::pattern::PatternCache;
use crate::pressure::PressureGovernor;
use crate::session::Session;
use crate::stats::Stats;

/// Everything a server variant needs to answer connections, built once at
/// startup and shared behind `Arc` across threads. `config` is the only
/// mutable piece: a config-file reload replaces it wholesale, which is why
/// it lives behind a `Mutex` while everything else (`session`, `start_time`)
/// is set once and never changes. The listener and worker-pool size are
/// fixed at startup, matching the original's reload (it re-clamps and
/// resizes the pattern cache but never rebinds the socket or resizes the
/// thread pool).
pub struct Shared {
    pub session: Session,
    config: Mutex<Config>,
    pub start_time: Instant,
}

impl Shared {
    pub fn new(index: WordIndex, config: Config, allow_mode_override: bool, allow_batch: bool) -> Arc<Shared> {
        let session = Session {
            index: Arc::new(index),
            exact_cache: Arc::new(PatternCache::new(config.cache_size)),
            partial_cache: Arc::new(PatternCache::new(config.cache_size)),
            stats: Arc::new(Stats::new()),
            pressure: Arc::new(PressureGovernor::new(
                config.memory_soft_limit_bytes,
                config.max_questions,
                config.max_stars,
            )),
            max_pattern_length: config.max_pattern_length,
            allow_mode_override,
            allow_batch,
        };
        Arc::new(Shared {
            session,
            config: Mutex::new(config),
            start_time: Instant::now(),
        })
    }

    pub fn config(&self) -> Config {
        self.config.lock().expect("config mutex poisoned").clone()
    }

    /// Applies a freshly reloaded config's tunables to the live session:
    /// resizes both pattern caches and replaces the stored config. The
    /// worker-pool size is fixed at process startup and is not affected.
    pub fn apply_reload(&self, new_config: Config) {
        self.session.exact_cache.resize(new_config.cache_size);
        self.session.partial_cache.resize(new_config.cache_size);
        *self.config.lock().expect("config mutex poisoned") = new_config;
    }
}

/// Result of one [`read_line`] call.
pub(crate) enum ReadOutcome {
    /// A complete, decoded line with the trailing `\r`/`\n` stripped.
    Line(String),
    /// Clean EOF with no bytes read.
    Eof,
    /// The read deadline elapsed before a full line arrived.
    Timeout,
    /// The bytes collected before the line terminator aren't valid UTF-8.
    InvalidUtf8,
}

/// Reads one line (up to and including `\n`) from `stream` with a deadline.
/// Used by both server variants so the read-with-timeout, size-guard, and
/// UTF-8 validation behavior stays in one place.
pub(crate) fn read_line(
    reader: &mut impl std::io::BufRead,
    stream: &TcpStream,
    timeout: Duration,
    max_len: usize,
) -> std::io::Result<ReadOutcome> {
    stream.set_read_timeout(Some(timeout))?;
    let mut buf = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        match reader.read(&mut byte) {
            Ok(0) => return Ok(if buf.is_empty() { ReadOutcome::Eof } else { finish(buf) }),
            Ok(_) => {
                if byte[0] == b'\n' {
                    return Ok(finish(buf));
                }
                buf.push(byte[0]);
                if buf.len() > max_len + 64 {
                    return Ok(finish(buf));
                }
            }
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
                return Ok(ReadOutcome::Timeout);
            }
            Err(e) => return Err(e),
        }
    }
}

fn finish(buf: Vec<u8>) -> ReadOutcome {
    match String::from_utf8(buf) {
        Ok(s) => ReadOutcome::Line(s.trim_end_matches('\r').to_string()),
        Err(_) => ReadOutcome::InvalidUtf8,
    }
}
