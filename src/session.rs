//! The per-request pipeline shared by both server variants: parse, validate,
//! dispatch to the word index, frame a response.
//!
//! A `Session` owns no per-connection mutable state beyond what's passed in;
//! it is built once per `Server` and shared (behind `Arc`) across every
//! connection and worker thread.

use std::io::Write as _;
use std::sync::Arc;
use std::time::Instant;

use base64::Engine as _;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::corpus::WordIndex;
use crate::pattern::PatternCache;
use crate::pressure::PressureGovernor;
use crate::protocol::{self, Command, Mode, Request};
use crate::stats::{CommandKind, Stats, StatusClass};

/// Shared, read-mostly state one `Session` dispatches requests against.
pub struct Session {
    pub index: Arc<WordIndex>,
    pub exact_cache: Arc<PatternCache>,
    pub partial_cache: Arc<PatternCache>,
    pub stats: Arc<Stats>,
    pub pressure: Arc<PressureGovernor>,
    pub max_pattern_length: usize,
    /// `false` for the basic server, which only ever serves exact mode and
    /// rejects `BATCH`.
    pub allow_mode_override: bool,
    pub allow_batch: bool,
}

/// Outcome of handling one line: the bytes to write back (already ending in
/// `END\n`) plus the bookkeeping the caller's accept loop needs.
pub struct Outcome {
    pub response: String,
    pub should_close: bool,
}

impl Session {
    /// Handles one decoded, newline-stripped request line end to end,
    /// including `Stats` bookkeeping. Never panics: every failure mode is a
    /// framed `400`/`404` response.
    pub fn handle_line(&self, line: &str) -> Outcome {
        let started = Instant::now();

        if line.chars().count() > self.max_pattern_length + 64 {
            let resp = self.frame_bad_request("pattern too long");
            self.stats
                .record_rejected(StatusClass::BadRequest, elapsed_ms(started));
            return Outcome {
                response: resp,
                should_close: false,
            };
        }

        let request = match protocol::parse(line) {
            Ok(r) => r,
            Err(e) => {
                let resp = self.frame_bad_request(&e.to_string());
                self.stats
                    .record_rejected(StatusClass::BadRequest, elapsed_ms(started));
                return Outcome {
                    response: resp,
                    should_close: false,
                };
            }
        };

        if matches!(request.command, Command::Quit) {
            return Outcome {
                response: "200 OK 0\nEND\n".to_string(),
                should_close: true,
            };
        }

        if matches!(request.command, Command::Stats) {
            let resp = self.frame_stats();
            self.stats
                .record_request(CommandKind::Stats, StatusClass::Ok, elapsed_ms(started));
            return Outcome {
                response: resp,
                should_close: false,
            };
        }

        if let Some(requested) = request.mode_override {
            if !self.allow_mode_override && requested != Mode::Exact {
                let resp = self.frame_bad_request("mode not supported");
                self.stats
                    .record_rejected(StatusClass::BadRequest, elapsed_ms(started));
                return Outcome {
                    response: resp,
                    should_close: false,
                };
            }
        }

        if matches!(request.command, Command::Batch) && !self.allow_batch {
            let resp = self.frame_bad_request("BATCH not supported");
            self.stats
                .record_rejected(StatusClass::BadRequest, elapsed_ms(started));
            return Outcome {
                response: resp,
                should_close: false,
            };
        }

        let (kind, response) = match request.command {
            Command::Find => (CommandKind::Find, self.dispatch_find(&request)),
            Command::Count => (CommandKind::Count, self.dispatch_count(&request)),
            Command::FindMulti => (CommandKind::Find, self.dispatch_find_multi(&request)),
            Command::Batch => (CommandKind::Batch, self.dispatch_batch(&request)),
            Command::Stats | Command::Quit => unreachable!("handled above"),
        };

        let status = response.status;
        let text = response.render();
        self.stats
            .record_request(kind, status, elapsed_ms(started));
        Outcome {
            response: text,
            should_close: false,
        }
    }

    fn frame_bad_request(&self, reason: &str) -> String {
        format!("400 BAD-REQUEST {reason}\nEND\n")
    }

    fn frame_stats(&self) -> String {
        let rss = self.pressure.observe();
        let snap = self.stats.snapshot();
        let caches = [
            ("exact", self.exact_cache.snapshot()),
            ("partial", self.partial_cache.snapshot()),
        ];
        let lines = snap.render_lines(
            self.index.len(),
            self.pressure.is_under_pressure(),
            rss,
            &caches,
        );
        let mut out = format!("200 OK {}\n", lines.len());
        for line in &lines {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("END\n");
        out
    }

    fn check_complexity(&self, pattern: &str) -> Result<(), Response> {
        let limits = self.pressure.effective_limits();
        let questions = pattern.chars().filter(|&c| c == '?').count();
        let stars = pattern.chars().filter(|&c| c == '*').count();
        self.stats.record_complexity(questions, stars);
        if questions as u64 > limits.max_questions {
            return Err(Response::bad_request(&format!(
                "pattern too complex: too many '?' wildcards (> {})",
                limits.max_questions
            )));
        }
        if stars as u64 > limits.max_stars {
            return Err(Response::bad_request(&format!(
                "pattern too complex: too many '*' wildcards (> {})",
                limits.max_stars
            )));
        }
        Ok(())
    }

    fn resolve_mode(&self, request: &Request, default: Mode) -> Mode {
        request.mode_override.unwrap_or(default)
    }

    fn dispatch_find(&self, request: &Request) -> Response {
        if let Err(resp) = self.check_complexity(&request.pattern) {
            return resp;
        }
        let mode = self.resolve_mode(request, Mode::Exact);
        let words = match mode {
            Mode::Exact => self.index.find_exact(&request.pattern, &self.exact_cache),
            Mode::Partial => self
                .index
                .find_partial(&request.pattern, &self.partial_cache),
        };
        Response::from_words(words, request.range, request.gzip)
    }

    fn dispatch_count(&self, request: &Request) -> Response {
        // COUNT ignores RANGE: the count is over the full
        // match set regardless of any pagination window requested.
        if let Err(resp) = self.check_complexity(&request.pattern) {
            return resp;
        }
        let mode = self.resolve_mode(request, Mode::Exact);
        let n = match mode {
            Mode::Exact => self.index.count_exact(&request.pattern, &self.exact_cache),
            Mode::Partial => self
                .index
                .count_partial(&request.pattern, &self.partial_cache),
        };
        Response::count(n)
    }

    /// Whitespace-tokenizes the pattern text into sub-patterns, matches each
    /// independently, and returns the deduplicated union in first-seen
    /// order.
    fn dispatch_find_multi(&self, request: &Request) -> Response {
        let mode = self.resolve_mode(request, Mode::Exact);
        let mut seen = std::collections::HashSet::new();
        let mut combined = Vec::new();
        for sub in request.pattern.split_whitespace() {
            if let Err(resp) = self.check_complexity(sub) {
                return resp;
            }
            let words = match mode {
                Mode::Exact => self.index.find_exact(sub, &self.exact_cache),
                Mode::Partial => self.index.find_partial(sub, &self.partial_cache),
            };
            for w in words {
                if seen.insert(w.clone()) {
                    combined.push(w);
                }
            }
        }
        Response::from_words(combined, request.range, request.gzip)
    }

    /// Parses the pattern text as a JSON array of strings and counts each
    /// entry independently, emitting `COUNT <i> <c>` body lines. A
    /// sub-pattern that fails the complexity guard contributes `0` to its
    /// own slot rather than failing the whole batch; a payload that isn't a
    /// JSON array of strings fails the whole request.
    fn dispatch_batch(&self, request: &Request) -> Response {
        let mode = self.resolve_mode(request, Mode::Exact);
        let patterns: Vec<String> = match serde_json::from_str(&request.pattern) {
            Ok(v) => v,
            Err(_) => return Response::bad_request("invalid batch payload"),
        };
        let mut lines = Vec::with_capacity(patterns.len());
        for (i, sub) in patterns.iter().enumerate() {
            let questions = sub.chars().filter(|&c| c == '?').count();
            let stars = sub.chars().filter(|&c| c == '*').count();
            let limits = self.pressure.effective_limits();
            self.stats.record_complexity(questions, stars);
            let n = if questions as u64 > limits.max_questions || stars as u64 > limits.max_stars {
                0
            } else {
                match mode {
                    Mode::Exact => self.index.count_exact(sub, &self.exact_cache),
                    Mode::Partial => self.index.count_partial(sub, &self.partial_cache),
                }
            };
            lines.push(format!("COUNT {i} {n}"));
        }
        Response::lines(lines, request.gzip)
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// A response body before framing: either a list of word matches (subject
/// to `RANGE` pagination and optional gzip), a bare count, or pre-rendered
/// lines (`BATCH`).
struct Response {
    status: StatusClass,
    code_text: &'static str,
    reason: Option<String>,
    body_lines: Vec<String>,
    total: usize,
    gzip: bool,
}

impl Response {
    fn bad_request(reason: &str) -> Response {
        Response {
            status: StatusClass::BadRequest,
            code_text: "BAD-REQUEST",
            reason: Some(reason.to_string()),
            body_lines: Vec::new(),
            total: 0,
            gzip: false,
        }
    }

    fn count(n: usize) -> Response {
        Response {
            status: StatusClass::Ok,
            code_text: "OK",
            reason: None,
            body_lines: Vec::new(),
            total: n,
            gzip: false,
        }
    }

    fn lines(lines: Vec<String>, gzip: bool) -> Response {
        let total = lines.len();
        Response {
            status: StatusClass::Ok,
            code_text: "OK",
            reason: None,
            body_lines: lines,
            total,
            gzip,
        }
    }

    /// `range`, when present, slices the match set before the count is
    /// taken: the status-line count and body always describe the windowed
    /// result, never the full match set behind it.
    fn from_words(words: Vec<String>, range: Option<(usize, usize)>, gzip: bool) -> Response {
        let windowed = match range {
            Some((offset, limit)) => words
                .into_iter()
                .skip(offset)
                .take(limit)
                .collect::<Vec<_>>(),
            None => words,
        };
        let total = windowed.len();
        if total == 0 {
            return Response {
                status: StatusClass::NotFound,
                code_text: "NOT-FOUND",
                reason: None,
                body_lines: Vec::new(),
                total: 0,
                gzip: false,
            };
        }
        Response {
            status: StatusClass::Ok,
            code_text: "OK",
            reason: None,
            body_lines: windowed,
            total,
            gzip,
        }
    }

    /// Renders the full wire response: `<code> <text>[ <reason>] <count>\n`,
    /// body lines (gzip-framed into one `GZIP <base64>` line when
    /// requested), then a literal `END\n`.
    fn render(self) -> String {
        let status_code = match self.status {
            StatusClass::Ok => 200,
            StatusClass::NotFound => 404,
            StatusClass::BadRequest => 400,
            StatusClass::Busy => 503,
        };
        let mut header = format!("{status_code} {}", self.code_text);
        if let Some(reason) = &self.reason {
            header.push(' ');
            header.push_str(reason);
        }

        if matches!(self.status, StatusClass::BadRequest) {
            return format!("{header}\nEND\n");
        }

        if self.gzip && !self.body_lines.is_empty() {
            let joined = self.body_lines.join("\n");
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            let _ = encoder.write_all(joined.as_bytes());
            let compressed = encoder.finish().unwrap_or_default();
            let encoded = base64::engine::general_purpose::STANDARD.encode(compressed);
            return format!("{header} 1\nGZIP {encoded}\nEND\n");
        }

        let mut out = format!("{header} {}\n", self.total);
        for line in &self.body_lines {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("END\n");
        out
    }
}
