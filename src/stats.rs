//! Run-wide statistics, derived purely from host state — no duplicated
//! counters to keep in sync.

use crate::cache::TimingCache;
use crate::host::{Host, HostStatus};
use crate::phase::BuildPhase;
use std::time::Instant;

/// Aggregate counts and wall-clock for the whole run, recomputed each
/// tick from the live host list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunStatistics {
    pub succeeded: usize,
    pub failed: usize,
    pub in_flight: usize,
    pub total: usize,
    pub elapsed_secs: f64,
}

impl RunStatistics {
    pub fn derive(hosts: &[Host], run_start: Instant, now: Instant) -> Self {
        let mut succeeded = 0;
        let mut failed = 0;
        let mut in_flight = 0;
        for host in hosts {
            match host.status() {
                HostStatus::Completed => succeeded += 1,
                HostStatus::Failed => failed += 1,
                HostStatus::Active => in_flight += 1,
            }
        }
        Self {
            succeeded,
            failed,
            in_flight,
            total: hosts.len(),
            elapsed_secs: now.saturating_duration_since(run_start).as_secs_f64(),
        }
    }

    /// Fraction of hosts that have reached a terminal state, `0.0..=1.0`.
    pub fn completion_fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.succeeded + self.failed) as f64 / self.total as f64
    }

    /// Overall success percentage among terminal hosts, for the final
    /// summary line (`k/N builds successful (p%)`).
    pub fn success_percentage(&self) -> f64 {
        let terminal = self.succeeded + self.failed;
        if terminal == 0 {
            return 0.0;
        }
        self.succeeded as f64 / terminal as f64 * 100.0
    }
}

/// Per-host ETA, suppressed entirely (both ETA and percentage) when
/// caching is disabled for the run, per the stricter interpretation of
/// the `--no-cache` interaction.
pub fn host_eta(host: &Host, cache: Option<&TimingCache>, now: Instant) -> Option<f64> {
    let cache = cache?;
    if host.is_terminal() {
        return None;
    }
    let phase_start = host.phase_start()?;
    let elapsed_in_phase = now.saturating_duration_since(phase_start).as_secs_f64();
    cache.estimate(host.id().as_str(), host.phase(), elapsed_in_phase)
}

/// Progress fraction derived from `host_eta`'s total estimate versus
/// elapsed-so-far; `None` when ETA is unavailable (no cache entry, or
/// caching disabled), matching the rule that a percentage is only shown
/// alongside a real ETA.
pub fn host_progress_fraction(host: &Host, cache: Option<&TimingCache>, now: Instant) -> Option<f64> {
    let cache = cache?;
    let entry = cache.entry(host.id().as_str())?;
    if entry.total_builds == 0 || entry.average_times.total <= 0.0 {
        return None;
    }
    let build_start = host.build_start()?;
    let elapsed = now.saturating_duration_since(build_start).as_secs_f64();
    let remaining = host_eta(host, Some(cache), now)?;
    let estimated_total = elapsed + remaining;
    if estimated_total <= 0.0 {
        return Some(1.0);
    }
    Some((elapsed / estimated_total).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostId;

    fn host(status_setup: impl FnOnce(&mut Host)) -> Host {
        let mut h = Host::new(HostId::parse("u@a").unwrap());
        status_setup(&mut h);
        h
    }

    #[test]
    fn derive_counts_match_host_statuses() {
        let now = Instant::now();
        let hosts = vec![
            host(|h| h.finish_success(now)),
            host(|h| h.finish_failure(Some(1), None, now)),
            host(|_| {}),
        ];
        let stats = RunStatistics::derive(&hosts, now, now);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.in_flight, 1);
        assert_eq!(stats.total, 3);
    }

    #[test]
    fn success_percentage_ignores_in_flight_hosts() {
        let now = Instant::now();
        let hosts = vec![
            host(|h| h.finish_success(now)),
            host(|h| h.finish_success(now)),
            host(|h| h.finish_failure(Some(1), None, now)),
            host(|_| {}),
        ];
        let stats = RunStatistics::derive(&hosts, now, now);
        assert!((stats.success_percentage() - 66.66666666).abs() < 1e-6);
    }

    #[test]
    fn zero_hosts_reports_full_completion() {
        let now = Instant::now();
        let stats = RunStatistics::derive(&[], now, now);
        assert_eq!(stats.completion_fraction(), 1.0);
        assert_eq!(stats.success_percentage(), 0.0);
    }

    #[test]
    fn eta_is_none_without_cache() {
        let now = Instant::now();
        let mut h = Host::new(HostId::parse("u@a").unwrap());
        h.advance_phase(BuildPhase::Make, now);
        assert!(host_eta(&h, None, now).is_none());
    }
}
