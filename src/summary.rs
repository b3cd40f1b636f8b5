//! Final stdout report, printed after the terminal has been torn down.

use std::time::Duration;

use crate::host::{Host, HostStatus};
use crate::stats::RunStatistics;

/// Renders the fixed-format build summary described in the CLI contract:
/// a banner, per-host sections for successes and failures, and an
/// overall percentage line.
pub fn render(hosts: &[Host], stats: &RunStatistics) -> String {
    let mut out = String::new();
    out.push_str("============================================================\n");
    out.push_str("BUILD SUMMARY\n");
    out.push_str(&format!("Total time: {}\n", format_duration(stats.elapsed_secs)));
    out.push('\n');

    out.push_str("SUCCESSFUL BUILDS\n");
    let mut any_success = false;
    for host in hosts {
        if host.status() == HostStatus::Completed {
            any_success = true;
            let duration = host
                .build_start()
                .zip(host.last_activity())
                .map(|(start, end)| end.saturating_duration_since(start).as_secs_f64())
                .unwrap_or(0.0);
            out.push_str(&format!("  \u{2713} {} (~{})\n", host.id(), format_duration(duration)));
        }
    }
    if !any_success {
        out.push_str("  (none)\n");
    }
    out.push('\n');

    out.push_str("FAILED BUILDS\n");
    let mut any_failure = false;
    for host in hosts {
        if host.status() == HostStatus::Failed {
            any_failure = true;
            out.push_str(&format!("  \u{2717} {}\n", host.id()));
            if let Some(error) = host.error() {
                out.push_str(&format!("      Error: {error}\n"));
            }
        }
    }
    if !any_failure {
        out.push_str("  (none)\n");
    }
    out.push('\n');

    let terminal = stats.succeeded + stats.failed;
    out.push_str(&format!(
        "Overall: {}/{} builds successful ({:.1}%)\n",
        stats.succeeded,
        terminal,
        stats.success_percentage()
    ));
    out.push_str("============================================================\n");
    out
}

fn format_duration(secs: f64) -> String {
    let duration = Duration::from_secs_f64(secs.max(0.0));
    format!("{}s", duration.as_secs())
}

/// Exit code from the CLI contract: `0` all succeeded, `1` any failed,
/// `2` argument error (never produced here, callers surface it
/// directly), `130` user interrupted.
pub fn exit_code(stats: &RunStatistics, interrupted: bool) -> i32 {
    if interrupted {
        return 130;
    }
    if stats.failed > 0 { 1 } else { 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostId;
    use std::time::Instant;

    #[test]
    fn empty_run_prints_empty_sections_and_exits_zero() {
        let stats = RunStatistics::derive(&[], Instant::now(), Instant::now());
        let summary = render(&[], &stats);
        assert!(summary.contains("(none)"));
        assert_eq!(exit_code(&stats, false), 0);
    }

    #[test]
    fn mixed_outcomes_report_both_sections_and_exit_one() {
        let now = Instant::now();
        let mut a = Host::new(HostId::parse("u@a").unwrap());
        a.finish_success(now);
        let mut b = Host::new(HostId::parse("u@b").unwrap());
        b.finish_failure(Some(2), Some("make: *** [all] Error 2".to_string()), now);
        let hosts = vec![a, b];
        let stats = RunStatistics::derive(&hosts, now, now);
        let summary = render(&hosts, &stats);
        assert!(summary.contains("u@a"));
        assert!(summary.contains("u@b"));
        assert!(summary.contains("Error: make"));
        assert_eq!(exit_code(&stats, false), 1);
    }

    #[test]
    fn interrupted_run_exits_130_regardless_of_outcome() {
        let stats = RunStatistics::derive(&[], Instant::now(), Instant::now());
        assert_eq!(exit_code(&stats, true), 130);
    }
}
