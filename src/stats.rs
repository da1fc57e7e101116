//! Thread-safe observability counters, latency histogram, and
//! pattern-complexity histogram.
//!
//! Every mutation goes through the single mutex guarding [`Inner`]: all
//! bookkeeping for one connection or request is one lock acquisition, never
//! scattered across several fine-grained locks.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::pattern::CacheSnapshot;

/// Latency bucket thresholds in milliseconds, compared in order; the first
/// bucket whose threshold the latency is strictly less than wins, else the
/// sample falls into the open-ended `ge1000` bucket.
const LATENCY_BUCKETS_MS: [u64; 7] = [1, 5, 10, 50, 100, 500, 1000];

#[derive(Default)]
struct Inner {
    connections: u64,
    active_connections: u64,
    requests: u64,
    find_requests: u64,
    count_requests: u64,
    stats_requests: u64,
    batch_requests: u64,
    ok_responses: u64,
    not_found_responses: u64,
    bad_request_responses: u64,
    busy_responses: u64,
    total_request_time_ms: f64,
    last_request_time_ms: f64,
    latency_hist: HashMap<&'static str, u64>,
    complexity_hist: HashMap<String, u64>,
}

impl Inner {
    fn new() -> Self {
        let mut latency_hist = HashMap::new();
        for b in LATENCY_BUCKETS_MS {
            latency_hist.insert(bucket_label(b), 0);
        }
        latency_hist.insert("ge1000", 0);
        Inner {
            latency_hist,
            ..Default::default()
        }
    }
}

fn bucket_label(b: u64) -> &'static str {
    match b {
        1 => "lt1",
        5 => "lt5",
        10 => "lt10",
        50 => "lt50",
        100 => "lt100",
        500 => "lt500",
        1000 => "lt1000",
        _ => unreachable!("unexpected latency bucket threshold"),
    }
}

/// The request command kinds tracked by the per-command counters.
#[derive(Debug, Clone, Copy)]
pub enum CommandKind {
    Find,
    Count,
    Stats,
    Batch,
}

/// Which status class a completed request landed in.
#[derive(Debug, Clone, Copy)]
pub enum StatusClass {
    Ok,
    NotFound,
    BadRequest,
    Busy,
}

/// Process-wide (or per-`Server` in tests) observability record.
pub struct Stats {
    inner: Mutex<Inner>,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Stats {
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn connection_opened(&self) {
        let mut g = self.inner.lock().expect("stats mutex poisoned");
        g.connections += 1;
        g.active_connections += 1;
    }

    /// Idempotent: calling this more than once for the same connection
    /// never drives the counter below zero").
    pub fn connection_closed(&self) {
        let mut g = self.inner.lock().expect("stats mutex poisoned");
        if g.active_connections > 0 {
            g.active_connections -= 1;
        }
    }

    pub fn record_request(&self, kind: CommandKind, status: StatusClass, latency_ms: f64) {
        let mut g = self.inner.lock().expect("stats mutex poisoned");
        g.requests += 1;
        match kind {
            CommandKind::Find => g.find_requests += 1,
            CommandKind::Count => g.count_requests += 1,
            CommandKind::Stats => g.stats_requests += 1,
            CommandKind::Batch => g.batch_requests += 1,
        }
        match status {
            StatusClass::Ok => g.ok_responses += 1,
            StatusClass::NotFound => g.not_found_responses += 1,
            StatusClass::BadRequest => g.bad_request_responses += 1,
            StatusClass::Busy => g.busy_responses += 1,
        }
        g.total_request_time_ms += latency_ms;
        g.last_request_time_ms = latency_ms;
        let rounded = latency_ms.floor() as u64;
        let mut placed = false;
        for &b in &LATENCY_BUCKETS_MS {
            if rounded < b || latency_ms < b as f64 {
                *g.latency_hist.get_mut(bucket_label(b)).expect("bucket exists") += 1;
                placed = true;
                break;
            }
        }
        if !placed {
            *g.latency_hist.get_mut("ge1000").expect("ge1000 bucket exists") += 1;
        }
    }

    /// A bad-request/busy short-circuit before a command kind is known
    /// still needs to be counted for the response-status histogram and
    /// latency, but must not increment a per-command counter.
    pub fn record_rejected(&self, status: StatusClass, latency_ms: f64) {
        let mut g = self.inner.lock().expect("stats mutex poisoned");
        g.requests += 1;
        match status {
            StatusClass::Ok => g.ok_responses += 1,
            StatusClass::NotFound => g.not_found_responses += 1,
            StatusClass::BadRequest => g.bad_request_responses += 1,
            StatusClass::Busy => g.busy_responses += 1,
        }
        g.total_request_time_ms += latency_ms;
        g.last_request_time_ms = latency_ms;
        let rounded = latency_ms.floor() as u64;
        let mut placed = false;
        for &b in &LATENCY_BUCKETS_MS {
            if rounded < b || latency_ms < b as f64 {
                *g.latency_hist.get_mut(bucket_label(b)).expect("bucket exists") += 1;
                placed = true;
                break;
            }
        }
        if !placed {
            *g.latency_hist.get_mut("ge1000").expect("ge1000 bucket exists") += 1;
        }
    }

    pub fn record_complexity(&self, questions: usize, stars: usize) {
        let mut g = self.inner.lock().expect("stats mutex poisoned");
        *g.complexity_hist.entry(format!("q_{questions}")).or_insert(0) += 1;
        *g.complexity_hist.entry(format!("s_{stars}")).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let g = self.inner.lock().expect("stats mutex poisoned");
        let avg = if g.requests > 0 {
            g.total_request_time_ms / g.requests as f64
        } else {
            0.0
        };
        let error_rate = if g.requests > 0 {
            (g.bad_request_responses + g.not_found_responses) as f64 / g.requests as f64
        } else {
            0.0
        };
        StatsSnapshot {
            connections: g.connections,
            active_connections: g.active_connections,
            requests: g.requests,
            find_requests: g.find_requests,
            count_requests: g.count_requests,
            stats_requests: g.stats_requests,
            batch_requests: g.batch_requests,
            ok_responses: g.ok_responses,
            not_found_responses: g.not_found_responses,
            bad_request_responses: g.bad_request_responses,
            busy_responses: g.busy_responses,
            avg_request_time_ms: avg,
            last_request_time_ms: g.last_request_time_ms,
            error_rate,
            latency_hist: g.latency_hist.clone(),
            complexity_hist: g.complexity_hist.clone(),
        }
    }
}

/// Immutable point-in-time copy of [`Stats`], safe to read without holding
/// the lock.
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub connections: u64,
    pub active_connections: u64,
    pub requests: u64,
    pub find_requests: u64,
    pub count_requests: u64,
    pub stats_requests: u64,
    pub batch_requests: u64,
    pub ok_responses: u64,
    pub not_found_responses: u64,
    pub bad_request_responses: u64,
    pub busy_responses: u64,
    pub avg_request_time_ms: f64,
    pub last_request_time_ms: f64,
    pub error_rate: f64,
    pub latency_hist: HashMap<&'static str, u64>,
    pub complexity_hist: HashMap<String, u64>,
}

impl StatsSnapshot {
    /// Renders the `key value` lines that make up a `STATS` response body
    ///, given the extra facts only the server context
    /// knows: word count, pressure flag, observed memory, and each named
    /// compiled-pattern cache's hit/miss/size/rate.
    pub fn render_lines(
        &self,
        words_total: usize,
        under_memory_pressure: bool,
        memory_rss_bytes: Option<u64>,
        caches: &[(&str, CacheSnapshot)],
    ) -> Vec<String> {
        let mut lines = vec![
            format!("connections {}", self.connections),
            format!("active_connections {}", self.active_connections),
            format!("requests {}", self.requests),
            format!("find_requests {}", self.find_requests),
            format!("count_requests {}", self.count_requests),
            format!("stats_requests {}", self.stats_requests),
            format!("batch_requests {}", self.batch_requests),
            format!("ok_responses {}", self.ok_responses),
            format!("not_found_responses {}", self.not_found_responses),
            format!("bad_request_responses {}", self.bad_request_responses),
            format!("busy_responses {}", self.busy_responses),
            format!("avg_request_time_ms {:.3}", self.avg_request_time_ms),
            format!("last_request_time_ms {:.3}", self.last_request_time_ms),
            format!("error_rate {:.6}", self.error_rate),
            format!("words_total {words_total}"),
            format!("under_memory_pressure {}", under_memory_pressure as u8),
        ];
        if let Some(mem) = memory_rss_bytes {
            lines.push(format!("memory_rss_bytes {mem}"));
        }
        let mut latency_keys: Vec<&&str> = self.latency_hist.keys().collect();
        latency_keys.sort();
        for key in latency_keys {
            lines.push(format!("latency_ms_{key} {}", self.latency_hist[key]));
        }
        let mut complexity_keys: Vec<&String> = self.complexity_hist.keys().collect();
        complexity_keys.sort();
        for key in complexity_keys {
            lines.push(format!("complexity_{key} {}", self.complexity_hist[key]));
        }
        for (name, snap) in caches {
            lines.push(format!("cache_{name}_hits {}", snap.hits));
            lines.push(format!("cache_{name}_misses {}", snap.misses));
            lines.push(format!("cache_{name}_size {}", snap.size));
            lines.push(format!("cache_{name}_hit_rate {:.4}", snap.hit_rate()));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_counters_track_open_and_close() {
        let stats = Stats::new();
        stats.connection_opened();
        stats.connection_opened();
        assert_eq!(stats.snapshot().active_connections, 2);
        stats.connection_closed();
        assert_eq!(stats.snapshot().active_connections, 1);
    }

    #[test]
    fn double_close_does_not_go_negative() {
        let stats = Stats::new();
        stats.connection_opened();
        stats.connection_closed();
        stats.connection_closed();
        assert_eq!(stats.snapshot().active_connections, 0);
    }

    #[test]
    fn latency_buckets_are_exclusive_and_ordered() {
        let stats = Stats::new();
        stats.record_request(CommandKind::Find, StatusClass::Ok, 0.5);
        stats.record_request(CommandKind::Find, StatusClass::Ok, 750.0);
        let snap = stats.snapshot();
        assert_eq!(snap.latency_hist["lt1"], 1);
        assert_eq!(snap.latency_hist["lt1000"], 1);
    }

    #[test]
    fn latency_at_or_above_1000_falls_into_ge1000() {
        let stats = Stats::new();
        stats.record_request(CommandKind::Count, StatusClass::Ok, 1500.0);
        assert_eq!(stats.snapshot().latency_hist["ge1000"], 1);
    }

    #[test]
    fn render_lines_includes_word_count_and_pressure_flag() {
        let stats = Stats::new();
        let snap = stats.snapshot();
        let lines = snap.render_lines(7, true, Some(1024), &[]);
        assert!(lines.contains(&"words_total 7".to_string()));
        assert!(lines.contains(&"under_memory_pressure 1".to_string()));
        assert!(lines.contains(&"memory_rss_bytes 1024".to_string()));
    }
}
