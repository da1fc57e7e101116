//! End-to-end behavior of the request pipeline via the public `Session`
//! API: gzip framing, `RANGE` pagination, `FIND_MULTI` dedup order, and the
//! basic-server restrictions (no mode override, no `BATCH`).

use std::io::Read;
use std::sync::Arc;

use base64::Engine as _;
use wordsearch::corpus::WordIndex;
use wordsearch::pattern::PatternCache;
use wordsearch::pressure::PressureGovernor;
use wordsearch::session::Session;
use wordsearch::stats::Stats;

fn build_session(allow_mode_override: bool, allow_batch: bool) -> Session {
    let index = WordIndex::build(
        ["hello", "hallo", "hxllo", "world", "hell", "shell", "yellow"]
            .into_iter()
            .map(String::from)
            .collect(),
    );
    Session {
        index: Arc::new(index),
        exact_cache: Arc::new(PatternCache::new(50)),
        partial_cache: Arc::new(PatternCache::new(50)),
        stats: Arc::new(Stats::new()),
        pressure: Arc::new(PressureGovernor::new(None, 5000, 50)),
        max_pattern_length: 1000,
        allow_mode_override,
        allow_batch,
    }
}

#[test]
fn range_slices_before_the_count_is_taken() {
    let session = build_session(true, true);
    let out = session.handle_line("FIND h?llo RANGE 1 1");
    // h?llo matches hello, hallo, hxllo (3 total); RANGE 1 1 windows that
    // down to just "hallo", and the status-line count must reflect the
    // windowed body, not the full match set behind it.
    assert!(out.response.starts_with("200 OK 1\n"));
    let lines: Vec<&str> = out.response.lines().collect();
    assert_eq!(lines.len(), 3); // header, one match, END
    assert_eq!(lines[1], "hallo");
}

#[test]
fn range_past_the_end_is_not_found() {
    let session = build_session(true, true);
    let out = session.handle_line("FIND h?llo RANGE 10 5");
    assert_eq!(out.response, "404 NOT-FOUND 0\nEND\n");
}

#[test]
fn gzip_negotiation_collapses_body_to_one_line() {
    let session = build_session(true, true);
    let out = session.handle_line("FIND h?llo --accept-encoding gzip");
    let lines: Vec<&str> = out.response.lines().collect();
    assert_eq!(lines[0], "200 OK 3");
    assert!(lines[1].starts_with("GZIP "));
    assert_eq!(lines[2], "END");

    let encoded = &lines[1]["GZIP ".len()..];
    let compressed = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .unwrap();
    let mut decoder = flate2::read::GzDecoder::new(&compressed[..]);
    let mut decompressed = String::new();
    decoder.read_to_string(&mut decompressed).unwrap();
    assert_eq!(decompressed, "hello\nhallo\nhxllo");
}

#[test]
fn find_multi_dedups_preserving_first_seen_order() {
    let session = build_session(true, true);
    let out = session.handle_line("FIND_MULTI h?llo ell --mode partial");
    let lines: Vec<&str> = out.response.lines().collect();
    // h?llo matches hello, hallo, hxllo; ell then adds hell, shell, yellow
    // (hello is already seen and must not repeat).
    assert_eq!(
        &lines[1..lines.len() - 1],
        ["hello", "hallo", "hxllo", "hell", "shell", "yellow"]
    );
}

#[test]
fn basic_server_session_rejects_mode_override_and_batch() {
    let session = build_session(false, false);
    let mode_resp = session.handle_line("FIND hello --mode partial");
    assert_eq!(mode_resp.response, "400 BAD-REQUEST mode not supported\nEND\n");
    let batch_resp = session.handle_line("BATCH hello world");
    assert!(batch_resp.response.starts_with("400 BAD-REQUEST"));
}

#[test]
fn basic_server_session_accepts_explicit_exact_mode() {
    let session = build_session(false, false);
    let out = session.handle_line("FIND hello --mode exact");
    assert!(out.response.starts_with("200 OK"));
}

#[test]
fn stats_command_reports_words_total() {
    let session = build_session(true, true);
    let out = session.handle_line("STATS");
    assert!(out.response.contains("words_total 7"));
}

#[test]
fn pattern_exceeding_max_length_is_rejected_before_parsing() {
    let mut session = build_session(true, true);
    session.max_pattern_length = 4;
    let long_pattern = "a".repeat(200);
    let out = session.handle_line(&format!("FIND {long_pattern}"));
    assert!(out.response.starts_with("400 BAD-REQUEST"));
}
