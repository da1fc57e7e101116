//! Memory-pressure governor.
//!
//! Before matching a request, the session layer asks the governor to
//! observe resident memory. If it is over the configured soft limit, the
//! flag flips true, both pattern caches are cleared, and the effective
//! wildcard-complexity limits are halved for the rest of the process's
//! life under pressure. As soon as memory drops back at or below the
//! limit, the flag resets.

use std::sync::atomic::{AtomicBool, Ordering};

/// Reads resident set size in bytes for the current process, or `None` if
/// the platform doesn't expose it. Only Linux's `/proc/self/status` is
/// read; other platforms always report `None` rather than take on a
/// process-inspection dependency for it.
#[cfg(target_os = "linux")]
pub fn resident_memory_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: u64 = rest.trim().trim_end_matches(" kB").trim().parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
pub fn resident_memory_bytes() -> Option<u64> {
    None
}

/// Process-wide (or per-`Server` in tests) pressure state plus the
/// wildcard-complexity limits it halves under pressure.
pub struct PressureGovernor {
    under_pressure: AtomicBool,
    soft_limit_bytes: Option<u64>,
    max_questions: u64,
    max_stars: u64,
}

/// The effective `(max_questions, max_stars)` limits for one request,
/// already halved (floor 1) if the governor currently reports pressure.
#[derive(Debug, Clone, Copy)]
pub struct ComplexityLimits {
    pub max_questions: u64,
    pub max_stars: u64,
}

impl PressureGovernor {
    pub fn new(soft_limit_bytes: Option<u64>, max_questions: u64, max_stars: u64) -> Self {
        PressureGovernor {
            under_pressure: AtomicBool::new(false),
            soft_limit_bytes,
            max_questions,
            max_stars,
        }
    }

    pub fn is_under_pressure(&self) -> bool {
        self.under_pressure.load(Ordering::Relaxed)
    }

    /// Observes current memory and updates the flag. Returns whatever
    /// `resident_memory_bytes()` returned, so callers (e.g. `STATS`) can
    /// report it without a second read.
    pub fn observe(&self) -> Option<u64> {
        let rss = resident_memory_bytes();
        let Some(limit) = self.soft_limit_bytes else {
            self.under_pressure.store(false, Ordering::Relaxed);
            return rss;
        };
        match rss {
            Some(bytes) if bytes > limit => self.under_pressure.store(true, Ordering::Relaxed),
            Some(_) => self.under_pressure.store(false, Ordering::Relaxed),
            None => {}
        }
        rss
    }

    pub fn effective_limits(&self) -> ComplexityLimits {
        if self.is_under_pressure() {
            ComplexityLimits {
                max_questions: (self.max_questions / 2).max(1),
                max_stars: (self.max_stars / 2).max(1),
            }
        } else {
            ComplexityLimits {
                max_questions: self.max_questions,
                max_stars: self.max_stars,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_soft_limit_never_triggers_pressure() {
        let gov = PressureGovernor::new(None, 5000, 50);
        gov.observe();
        assert!(!gov.is_under_pressure());
        assert_eq!(gov.effective_limits().max_questions, 5000);
    }

    #[test]
    fn halved_limits_have_a_floor_of_one() {
        let gov = PressureGovernor::new(Some(0), 1, 1);
        gov.under_pressure.store(true, Ordering::Relaxed);
        let limits = gov.effective_limits();
        assert_eq!(limits.max_questions, 1);
        assert_eq!(limits.max_stars, 1);
    }

    #[test]
    fn pressure_flag_resets_below_limit() {
        let gov = PressureGovernor::new(Some(u64::MAX), 5000, 50);
        gov.under_pressure.store(true, Ordering::Relaxed);
        gov.observe();
        // With a soft limit effectively unreachable, observe() must clear
        // the flag the next time it runs (assuming resident memory is
        // observable and below u64::MAX, which it always is).
        if resident_memory_bytes().is_some() {
            assert!(!gov.is_under_pressure());
        }
    }
}
