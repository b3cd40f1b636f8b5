//! Per-host state tracked by the controller across a run.

use std::time::Instant;
#[cfg(test)]
use std::time::Duration;

use crate::output_buffer::OutputBuffer;
use crate::phase::BuildPhase;

/// Canonical `user@hostname` cache and identity key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(String);

impl HostId {
    /// Parses a `user@hostname` entry. Bare hostnames are rejected: the
    /// remote user is required so the cache key and the SSH connection
    /// always agree on identity.
    pub fn parse(entry: &str) -> Result<Self, crate::error::ForgeError> {
        let trimmed = entry.trim();
        match trimmed.split_once('@') {
            Some((user, host)) if !user.is_empty() && !host.is_empty() => {
                Ok(HostId(format!("{user}@{host}")))
            }
            _ => Err(crate::error::ForgeError::Resolve(format!(
                "expected 'user@hostname', got '{entry}'"
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn user(&self) -> &str {
        self.0.split_once('@').map(|(u, _)| u).unwrap_or(&self.0)
    }

    pub fn hostname(&self) -> &str {
        self.0.split_once('@').map(|(_, h)| h).unwrap_or(&self.0)
    }

    /// Whether this host matches one of the configured demo/test prefixes.
    pub fn is_demo_host(&self, prefixes: &[String]) -> bool {
        let hostname = self.hostname();
        prefixes.iter().any(|prefix| hostname.starts_with(prefix.as_str()))
    }
}

impl std::fmt::Display for HostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coarse-grained host status, independent of `BuildPhase` (a host can be
/// `Failed` while its last observed phase was `Make`, for example).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    Active,
    Completed,
    Failed,
}

/// Accumulated wall-clock time spent in each timed build phase, used to
/// populate a `TimingRecord` for the cache. Only the phases the cache
/// tracks individually (configure/make/check/install) are counted here;
/// `Queued`/`Connecting`/`Preparing` have no corresponding cache field.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseDurations {
    pub configure_secs: f64,
    pub make_secs: f64,
    pub check_secs: f64,
    pub install_secs: f64,
}

/// All state the controller and renderer need for a single host.
#[derive(Debug, Clone)]
pub struct Host {
    id: HostId,
    status: HostStatus,
    phase: BuildPhase,
    output: OutputBuffer,
    build_start: Option<Instant>,
    phase_start: Option<Instant>,
    last_activity: Option<Instant>,
    exit_code: Option<i32>,
    error: Option<String>,
    scroll_offset: usize,
    phase_durations: PhaseDurations,
}

impl Host {
    pub fn new(id: HostId) -> Self {
        Self {
            id,
            status: HostStatus::Active,
            phase: BuildPhase::Queued,
            output: OutputBuffer::new(),
            build_start: None,
            phase_start: None,
            last_activity: None,
            exit_code: None,
            error: None,
            scroll_offset: 0,
            phase_durations: PhaseDurations::default(),
        }
    }

    pub fn id(&self) -> &HostId {
        &self.id
    }

    pub fn status(&self) -> HostStatus {
        self.status
    }

    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn set_scroll_offset(&mut self, offset: usize) {
        self.scroll_offset = offset;
    }

    pub fn build_start(&self) -> Option<Instant> {
        self.build_start
    }

    pub fn phase_start(&self) -> Option<Instant> {
        self.phase_start
    }

    pub fn last_activity(&self) -> Option<Instant> {
        self.last_activity
    }

    pub fn phase_durations(&self) -> PhaseDurations {
        self.phase_durations
    }

    /// Adds `elapsed` spent in `phase` to the running per-phase totals.
    /// A no-op for phases the cache doesn't track individually.
    fn accrue_phase_time(&mut self, phase: BuildPhase, elapsed: f64) {
        match phase {
            BuildPhase::Configure => self.phase_durations.configure_secs += elapsed,
            BuildPhase::Make => self.phase_durations.make_secs += elapsed,
            BuildPhase::Check => self.phase_durations.check_secs += elapsed,
            BuildPhase::Install => self.phase_durations.install_secs += elapsed,
            _ => {}
        }
    }

    /// Accrues the time spent in the phase being left, at the moment a
    /// transition (or termination) happens: "the elapsed time since the
    /// previous transition is attributed to the previous phase."
    fn close_out_current_phase(&mut self, now: Instant) {
        let Some(start) = self.phase_start else { return };
        let elapsed = now.saturating_duration_since(start).as_secs_f64();
        self.accrue_phase_time(self.phase, elapsed);
    }

    /// Appends a sanitized output line and bumps the activity clock.
    pub fn push_output(&mut self, line: String, now: Instant) {
        self.output.append(line);
        self.last_activity = Some(now);
        if self.build_start.is_none() {
            self.build_start = Some(now);
        }
    }

    /// Advances to `phase` if it is strictly greater than the current
    /// phase. Returns `false` (and does nothing) on an attempted
    /// regression, preserving the monotonicity invariant.
    pub fn advance_phase(&mut self, phase: BuildPhase, now: Instant) -> bool {
        if self.status != HostStatus::Active || phase <= self.phase {
            return false;
        }
        self.close_out_current_phase(now);
        self.phase = phase;
        self.phase_start = Some(now);
        self.last_activity = Some(now);
        true
    }

    /// Marks the host completed. No-op if already terminal.
    pub fn finish_success(&mut self, now: Instant) {
        if self.status != HostStatus::Active {
            return;
        }
        self.close_out_current_phase(now);
        self.status = HostStatus::Completed;
        self.phase = BuildPhase::Completed;
        self.exit_code = Some(0);
        self.last_activity = Some(now);
    }

    /// Marks the host failed with the given exit code and/or error
    /// message. No-op if already terminal.
    pub fn finish_failure(&mut self, exit_code: Option<i32>, error: Option<String>, now: Instant) {
        if self.status != HostStatus::Active {
            return;
        }
        self.close_out_current_phase(now);
        self.status = HostStatus::Failed;
        self.phase = BuildPhase::Failed;
        self.exit_code = exit_code;
        self.error = error;
        self.last_activity = Some(now);
    }

    pub fn is_terminal(&self) -> bool {
        self.status != HostStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_id_requires_user_and_host() {
        assert!(HostId::parse("alice@build01").is_ok());
        assert!(HostId::parse("build01").is_err());
        assert!(HostId::parse("alice@").is_err());
        assert!(HostId::parse("@build01").is_err());
    }

    #[test]
    fn host_id_splits_user_and_hostname() {
        let id = HostId::parse("alice@build01.example.com").unwrap();
        assert_eq!(id.user(), "alice");
        assert_eq!(id.hostname(), "build01.example.com");
    }

    #[test]
    fn demo_host_prefix_matches_hostname_only() {
        let id = HostId::parse("ci@test-build01").unwrap();
        let prefixes = vec!["test-".to_string(), "demo-".to_string()];
        assert!(id.is_demo_host(&prefixes));
        let id = HostId::parse("test-user@build01").unwrap();
        assert!(!id.is_demo_host(&prefixes));
    }

    #[test]
    fn phase_advance_is_monotonic() {
        let mut host = Host::new(HostId::parse("a@b").unwrap());
        let t0 = Instant::now();
        assert!(host.advance_phase(BuildPhase::Configure, t0));
        assert!(!host.advance_phase(BuildPhase::Connecting, t0));
        assert_eq!(host.phase(), BuildPhase::Configure);
    }

    #[test]
    fn finish_is_idempotent_and_terminal() {
        let mut host = Host::new(HostId::parse("a@b").unwrap());
        let t0 = Instant::now();
        host.finish_success(t0);
        assert!(host.is_terminal());
        host.finish_failure(Some(1), Some("late error".to_string()), t0);
        // Already terminal: failure attempt after success must not overwrite.
        assert_eq!(host.status(), HostStatus::Completed);
        assert_eq!(host.exit_code(), Some(0));
    }

    #[test]
    fn advance_phase_rejected_once_terminal() {
        let mut host = Host::new(HostId::parse("a@b").unwrap());
        let t0 = Instant::now();
        host.finish_failure(Some(1), None, t0);
        assert!(!host.advance_phase(BuildPhase::Install, t0));
    }

    #[test]
    fn phase_durations_accrue_per_transition_and_on_termination() {
        let mut host = Host::new(HostId::parse("a@b").unwrap());
        let t0 = Instant::now();
        host.advance_phase(BuildPhase::Connecting, t0);
        host.advance_phase(BuildPhase::Configure, t0 + Duration::from_secs(1));
        host.advance_phase(BuildPhase::Make, t0 + Duration::from_secs(3));
        host.advance_phase(BuildPhase::Check, t0 + Duration::from_secs(8));
        host.advance_phase(BuildPhase::Install, t0 + Duration::from_secs(9));
        host.finish_success(t0 + Duration::from_secs(11));

        let durations = host.phase_durations();
        assert_eq!(durations.configure_secs, 2.0);
        assert_eq!(durations.make_secs, 5.0);
        assert_eq!(durations.check_secs, 1.0);
        assert_eq!(durations.install_secs, 2.0);
    }
}
