//! Build-phase classification.
//!
//! Translates an unstructured line stream from a remote build agent into
//! ordered [`BuildPhase`] transitions. Mirrors the teacher's
//! `DeviceHandler` line-to-state matching: a `RegexSet` compiled once,
//! plus a table mapping each pattern index back to its logical outcome.

use once_cell::sync::Lazy;
use regex::RegexSet;

/// Ordered build phases. Ordering is load-bearing: the detector only
/// fires a transition when the candidate phase is strictly greater than
/// the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BuildPhase {
    Queued,
    Connecting,
    Preparing,
    Configure,
    Make,
    Check,
    Install,
    Completed,
    Failed,
}

impl BuildPhase {
    /// `Completed` and `Failed` are terminal: no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, BuildPhase::Completed | BuildPhase::Failed)
    }
}

impl std::fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            BuildPhase::Queued => "queued",
            BuildPhase::Connecting => "connecting",
            BuildPhase::Preparing => "preparing",
            BuildPhase::Configure => "configure",
            BuildPhase::Make => "make",
            BuildPhase::Check => "check",
            BuildPhase::Install => "install",
            BuildPhase::Completed => "completed",
            BuildPhase::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// One row of the phase-pattern table: the phase a match advances to,
/// the regex it's matched against, and a priority used to break ties
/// when several patterns match the same line.
#[derive(Debug, Clone, Copy)]
struct PhaseRule {
    phase: BuildPhase,
    priority: u8,
}

/// Fallback install prefix when the run's `AppConfig` doesn't carry one.
/// Matches the agent script's own assumption (`agent.sh` never passes
/// `--prefix` to `./configure`, so `make install` lands here).
pub const DEFAULT_INSTALL_PREFIX: &str = "/usr/local";

/// Patterns reproduced exactly from the phase detector's contract.
/// Order here determines `RegexSet` match indices, which `RULES` maps
/// back to a `(phase, priority)` pair.
static PATTERNS: &[&str] = &[
    r"(?i)^Uploading",
    r"(?i)^Extracting",
    r"(?i)^tar: ",
    r"configure:",
    r"\./configure",
    r"(?i)checking for",
    r"^make\[",
    r"make: Entering directory",
    r"make check",
    r"Testsuite summary",
    r"^PASS:",
    r"^FAIL:",
    r"make install",
    r"(?i)installing ",
    r"BUILD OK",
    r"BUILD FAILED",
];

static RULES: &[PhaseRule] = &[
    PhaseRule { phase: BuildPhase::Preparing, priority: 1 }, // Uploading
    PhaseRule { phase: BuildPhase::Preparing, priority: 1 }, // Extracting
    PhaseRule { phase: BuildPhase::Preparing, priority: 1 }, // tar:
    PhaseRule { phase: BuildPhase::Configure, priority: 1 }, // configure:
    PhaseRule { phase: BuildPhase::Configure, priority: 1 }, // ./configure
    PhaseRule { phase: BuildPhase::Configure, priority: 1 }, // checking for
    PhaseRule { phase: BuildPhase::Make, priority: 1 },      // make[
    PhaseRule { phase: BuildPhase::Make, priority: 1 },      // Entering directory
    PhaseRule { phase: BuildPhase::Check, priority: 2 },     // make check
    PhaseRule { phase: BuildPhase::Check, priority: 2 },     // Testsuite summary
    PhaseRule { phase: BuildPhase::Check, priority: 2 },     // PASS:
    PhaseRule { phase: BuildPhase::Check, priority: 2 },     // FAIL:
    PhaseRule { phase: BuildPhase::Install, priority: 2 },   // make install
    PhaseRule { phase: BuildPhase::Install, priority: 2 },   // installing
    PhaseRule { phase: BuildPhase::Completed, priority: 3 }, // BUILD OK
    PhaseRule { phase: BuildPhase::Failed, priority: 3 },    // BUILD FAILED
];

static REGEX_SET: Lazy<RegexSet> =
    Lazy::new(|| RegexSet::new(PATTERNS).expect("phase pattern table is a valid regex set"));

/// Considers one candidate rule against the current best, keeping it
/// only if it's ahead of the current phase and beats (or ties, at a
/// higher phase) whatever's already in `best`.
fn consider(current: BuildPhase, candidate: PhaseRule, best: &mut Option<PhaseRule>) {
    if candidate.phase <= current {
        return;
    }
    let keep = match best {
        None => true,
        Some(current_best) => {
            candidate.priority > current_best.priority
                || (candidate.priority == current_best.priority && candidate.phase > current_best.phase)
        }
    };
    if keep {
        *best = Some(candidate);
    }
}

/// Stateful classifier: tracks the current phase and advances it as
/// matching lines are fed in.
#[derive(Debug, Clone)]
pub struct PhaseDetector {
    current: BuildPhase,
    install_prefix: String,
}

impl PhaseDetector {
    pub fn new() -> Self {
        Self::with_install_prefix(DEFAULT_INSTALL_PREFIX)
    }

    /// Like [`PhaseDetector::new`], but matches the Install phase against
    /// `prefix` instead of [`DEFAULT_INSTALL_PREFIX`]. The prefix isn't a
    /// fixed literal in `PATTERNS`/`REGEX_SET` because it's configured per
    /// run (`AppConfig::install_prefix`), not baked into the build.
    pub fn with_install_prefix(prefix: impl Into<String>) -> Self {
        Self { current: BuildPhase::Queued, install_prefix: prefix.into() }
    }

    pub fn current(&self) -> BuildPhase {
        self.current
    }

    /// Feeds one line of agent output. Returns `Some(phase)` when a
    /// transition fired, `None` if the line didn't advance the phase.
    pub fn feed(&mut self, line: &str) -> Option<BuildPhase> {
        if self.current.is_terminal() {
            return None;
        }
        let trimmed = line.trim();
        let matches = REGEX_SET.matches(trimmed);
        let mut best: Option<PhaseRule> = None;
        for idx in matches.iter() {
            consider(self.current, RULES[idx], &mut best);
        }
        if !self.install_prefix.is_empty() && trimmed.starts_with(self.install_prefix.as_str()) {
            consider(self.current, PhaseRule { phase: BuildPhase::Install, priority: 2 }, &mut best);
        }
        if let Some(rule) = best {
            self.current = rule.phase;
            Some(rule.phase)
        } else {
            None
        }
    }
}

impl Default for PhaseDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_are_ordered() {
        assert!(BuildPhase::Queued < BuildPhase::Connecting);
        assert!(BuildPhase::Configure < BuildPhase::Make);
        assert!(BuildPhase::Install < BuildPhase::Completed);
    }

    #[test]
    fn detector_advances_through_a_typical_build() {
        let mut detector = PhaseDetector::new();
        assert_eq!(detector.feed("Uploading tarball.tar.gz"), Some(BuildPhase::Preparing));
        assert_eq!(detector.feed("configure: checking for gcc"), Some(BuildPhase::Configure));
        assert_eq!(detector.feed("checking for gcc... yes"), None); // already in configure
        assert_eq!(detector.feed("make[1]: Entering directory"), Some(BuildPhase::Make));
        assert_eq!(detector.feed("make check"), Some(BuildPhase::Check));
        assert_eq!(detector.feed("Testsuite summary for foo 1.0"), None); // already in check
        assert_eq!(detector.feed("make install"), Some(BuildPhase::Install));
        assert_eq!(detector.feed("BUILD OK"), Some(BuildPhase::Completed));
    }

    #[test]
    fn detector_never_regresses() {
        let mut detector = PhaseDetector::new();
        detector.feed("make[1]: Entering directory");
        assert_eq!(detector.current(), BuildPhase::Make);
        // A configure-looking line after make must not regress the phase.
        assert_eq!(detector.feed("configure: re-checking for gcc"), None);
        assert_eq!(detector.current(), BuildPhase::Make);
    }

    #[test]
    fn terminal_phase_ignores_further_lines() {
        let mut detector = PhaseDetector::new();
        detector.feed("BUILD FAILED");
        assert_eq!(detector.current(), BuildPhase::Failed);
        assert_eq!(detector.feed("BUILD OK"), None);
        assert_eq!(detector.current(), BuildPhase::Failed);
    }

    #[test]
    fn unrelated_lines_do_not_advance_phase() {
        let mut detector = PhaseDetector::new();
        assert_eq!(detector.feed("hello from the agent"), None);
        assert_eq!(detector.current(), BuildPhase::Queued);
    }

    #[test]
    fn path_beginning_with_install_prefix_advances_to_install() {
        let mut detector = PhaseDetector::with_install_prefix("/opt/build");
        detector.feed("make[1]: Entering directory");
        assert_eq!(detector.current(), BuildPhase::Make);
        // No "make install"/"installing " text at all, just a path under
        // the configured prefix.
        assert_eq!(detector.feed("/opt/build/lib/libfoo.so -> /opt/build/lib/libfoo.so.1"), Some(BuildPhase::Install));
    }

    #[test]
    fn install_prefix_rule_does_not_regress_past_install() {
        let mut detector = PhaseDetector::with_install_prefix("/opt/build");
        detector.feed("make install");
        assert_eq!(detector.current(), BuildPhase::Install);
        assert_eq!(detector.feed("BUILD OK"), Some(BuildPhase::Completed));
        assert_eq!(detector.feed("/opt/build/lib/libfoo.so"), None);
    }

    #[test]
    fn default_prefix_matches_usr_local() {
        let mut detector = PhaseDetector::new();
        detector.feed("make[1]: Entering directory");
        assert_eq!(detector.feed("/usr/local/lib/libfoo.so"), Some(BuildPhase::Install));
    }

    #[test]
    fn higher_priority_match_wins_tie_on_same_line() {
        // A line matching both "make install" (priority 2) and a
        // hypothetical lower-priority pattern should resolve to the
        // higher-priority phase. "installing " also matches install.
        let mut detector = PhaseDetector::new();
        detector.feed("make[1]: Entering directory");
        assert_eq!(detector.feed("installing /usr/local/bin/foo"), Some(BuildPhase::Install));
    }
}
