//! Runtime configuration: built-in defaults, optional TOML file, environment
//! overrides, and the clamping rules applied after every merge.
//!
//! Precedence, highest wins: CLI flags (applied by the `bin/` front-ends
//! directly onto a loaded `Config`) > `WORDSEARCH_<FIELD>` environment
//! variables > TOML config file > built-in default.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Deserialize;

use crate::error::{Result, WordSearchError};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_workers: usize,
    pub request_timeout_secs: u64,
    pub max_pattern_length: usize,
    pub cache_size: usize,
    pub max_concurrent_connections: usize,
    pub max_questions: u64,
    pub max_stars: u64,
    pub memory_soft_limit_bytes: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "127.0.0.1".to_string(),
            port: 9999,
            max_workers: 50,
            request_timeout_secs: 30,
            max_pattern_length: 1000,
            cache_size: 100,
            max_concurrent_connections: 1000,
            max_questions: 5000,
            max_stars: 50,
            memory_soft_limit_bytes: None,
        }
    }
}

fn clampi(value: usize, min: usize, max: usize) -> usize {
    value.clamp(min, max)
}

fn clampu64(value: u64, min: u64, max: u64) -> u64 {
    value.clamp(min, max)
}

impl Config {
    /// Clamps every field to the bounds the original `_clampi`/`_clampf`
    /// helpers enforce, applied after every source merges in.
    pub fn validate(&mut self) {
        self.max_workers = clampi(self.max_workers, 1, 10_000);
        self.request_timeout_secs = clampu64(self.request_timeout_secs, 1, 3600);
        self.max_pattern_length = clampi(self.max_pattern_length, 1, 100_000);
        self.cache_size = clampi(self.cache_size, 1, 1_000_000);
        self.max_concurrent_connections = clampi(self.max_concurrent_connections, 1, 1_000_000);
        self.max_questions = clampu64(self.max_questions, 1, 1_000_000);
        self.max_stars = clampu64(self.max_stars, 1, 1_000_000);
    }

    /// Loads defaults, merges a TOML file if `path` is `Some`, then applies
    /// `WORDSEARCH_<FIELD>` environment overrides, then validates.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => Config::default(),
        };
        cfg.apply_env_overrides();
        cfg.validate();
        Ok(cfg)
    }

    fn from_file(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path).map_err(|source| WordSearchError::ConfigLoad {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| WordSearchError::ConfigParse {
            path: path.display().to_string(),
            source,
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("WORDSEARCH_HOST") {
            self.host = v;
        }
        if let Ok(v) = std::env::var("WORDSEARCH_PORT") {
            if let Ok(n) = v.parse() {
                self.port = n;
            }
        }
        if let Ok(v) = std::env::var("WORDSEARCH_MAX_WORKERS") {
            if let Ok(n) = v.parse() {
                self.max_workers = n;
            }
        }
        if let Ok(v) = std::env::var("WORDSEARCH_REQUEST_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.request_timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("WORDSEARCH_MAX_PATTERN_LENGTH") {
            if let Ok(n) = v.parse() {
                self.max_pattern_length = n;
            }
        }
        if let Ok(v) = std::env::var("WORDSEARCH_CACHE_SIZE") {
            if let Ok(n) = v.parse() {
                self.cache_size = n;
            }
        }
        if let Ok(v) = std::env::var("WORDSEARCH_MAX_CONCURRENT_CONNECTIONS") {
            if let Ok(n) = v.parse() {
                self.max_concurrent_connections = n;
            }
        }
        if let Ok(v) = std::env::var("WORDSEARCH_MAX_QUESTIONS") {
            if let Ok(n) = v.parse() {
                self.max_questions = n;
            }
        }
        if let Ok(v) = std::env::var("WORDSEARCH_MAX_STARS") {
            if let Ok(n) = v.parse() {
                self.max_stars = n;
            }
        }
        if let Ok(v) = std::env::var("WORDSEARCH_MEMORY_SOFT_LIMIT_BYTES") {
            self.memory_soft_limit_bytes = v.parse().ok();
        }
    }
}

/// Watches a config file's mtime across accept-loop ticks so both server
/// variants can reload without polling on every request.
pub struct ConfigWatcher {
    path: Option<PathBuf>,
    last_mtime: Option<SystemTime>,
}

impl ConfigWatcher {
    pub fn new(path: Option<PathBuf>) -> Self {
        ConfigWatcher {
            path,
            last_mtime: None,
        }
    }

    /// Called once per accept-loop tick. Returns `Some(new_config)` the
    /// first time the watched file's mtime advances past what was last
    /// observed (or is seen for the first time); `None` otherwise,
    /// including when no path is being watched or the file can't be
    /// stat'd (transient I/O errors are treated as "nothing to do").
    pub fn poll(&mut self) -> Option<Config> {
        let path = self.path.as_ref()?;
        let mtime = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
        let changed = match self.last_mtime {
            None => true,
            Some(prev) => mtime > prev,
        };
        if !changed {
            return None;
        }
        self.last_mtime = Some(mtime);
        match Config::from_file(path) {
            Ok(mut cfg) => {
                cfg.apply_env_overrides();
                cfg.validate();
                Some(cfg)
            }
            Err(_) => None,
        }
    }
}
