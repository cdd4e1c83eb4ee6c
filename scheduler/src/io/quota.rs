//! Quota monitoring against the external assistant.
//!
//! Decides whether there is enough remaining capacity to spend on a
//! task. Status scraping is best-effort: any failure along the way
//! (spawn, exit code, timeout, parse) degrades to "unknown", which is
//! treated conservatively as "cannot run".

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::core::usage::{UsageSnapshot, format_reset, parse_usage, poll_interval};
use crate::io::assistant::{Assistant, Invocation};
use crate::io::config::QuotaConfig;

const STATUS_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Tracks assistant quota across one scheduler run.
pub struct QuotaMonitor {
    warning_threshold: f64,
    critical_threshold: f64,
    max_wait: Duration,
    default_poll_interval: Duration,
    last: Option<UsageSnapshot>,
}

impl QuotaMonitor {
    pub fn new(cfg: &QuotaConfig) -> Self {
        Self {
            warning_threshold: cfg.warning_threshold,
            critical_threshold: cfg.critical_threshold,
            max_wait: Duration::from_secs(cfg.max_wait_secs),
            default_poll_interval: Duration::from_secs(cfg.poll_interval_secs),
            last: None,
        }
    }

    /// Most recent successful snapshot, if any.
    pub fn last(&self) -> Option<&UsageSnapshot> {
        self.last.as_ref()
    }

    pub fn critical_threshold(&self) -> f64 {
        self.critical_threshold
    }

    /// Query the assistant's status output and parse a usage snapshot.
    /// `None` means status-unknown, never an error.
    pub fn check<A: Assistant>(&mut self, assistant: &A, workdir: &Path) -> Option<UsageSnapshot> {
        let invocation = Invocation {
            args: vec!["--print".to_string(), "/status".to_string()],
            workdir: workdir.to_path_buf(),
            timeout: STATUS_PROBE_TIMEOUT,
            output_limit_bytes: 100_000,
        };

        let output = match assistant.run(&invocation) {
            Ok(output) => output,
            Err(err) => {
                warn!(err = %err, "quota status probe failed");
                return None;
            }
        };
        if !output.success() {
            warn!(
                exit_code = output.exit_code,
                timed_out = output.timed_out,
                "quota status probe did not succeed"
            );
            return None;
        }

        let snapshot = parse_usage(&output.stdout_lossy(), Utc::now());
        match &snapshot {
            Some(snapshot) => {
                debug!(
                    used = snapshot.messages_used,
                    limit = snapshot.messages_limit,
                    "parsed quota status"
                );
                self.last = Some(snapshot.clone());
            }
            None => warn!("could not parse quota status output"),
        }
        snapshot
    }

    /// Whether tasks may run right now, with a human-readable reason.
    pub fn can_run<A: Assistant>(&mut self, assistant: &A, workdir: &Path) -> (bool, String) {
        let Some(snapshot) = self.check(assistant, workdir) else {
            return (false, "could not determine assistant quota status".to_string());
        };

        let fraction = snapshot.fraction_used();
        if fraction >= self.critical_threshold {
            let reset = snapshot
                .time_until_reset
                .map(|d| format!(" (resets in {})", format_reset(d)))
                .unwrap_or_default();
            return (
                false,
                format!(
                    "quota usage at {:.1}%, above critical threshold {:.0}%{}",
                    fraction * 100.0,
                    self.critical_threshold * 100.0,
                    reset
                ),
            );
        }

        if fraction >= self.warning_threshold {
            warn!(
                fraction = format!("{fraction:.2}"),
                "quota usage above warning threshold"
            );
        }
        (true, "quota usage within acceptable limits".to_string())
    }

    /// Poll until quota is available again, bounded by the configured
    /// maximum wait. The `sleep` hook is injected so tests can run the
    /// loop without real delays. Returns false on timeout.
    pub fn wait_for_reset<A: Assistant>(
        &mut self,
        assistant: &A,
        workdir: &Path,
        mut sleep: impl FnMut(Duration),
    ) -> bool {
        info!("waiting for assistant quota to reset");
        let started = Instant::now();

        while started.elapsed() < self.max_wait {
            let (can_run, reason) = self.can_run(assistant, workdir);
            if can_run {
                info!("quota has reset, tasks can resume");
                return true;
            }
            info!(reason = %reason, "still waiting for quota reset");

            let interval = poll_interval(
                self.last.as_ref().and_then(|s| s.time_until_reset),
                self.default_poll_interval,
            );
            sleep(interval);
        }

        warn!("timed out waiting for quota reset");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedAssistant, ScriptedRun};

    fn monitor() -> QuotaMonitor {
        QuotaMonitor::new(&QuotaConfig::default())
    }

    #[test]
    fn check_parses_successful_status_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let assistant =
            ScriptedAssistant::new(vec![ScriptedRun::output("45/225 messages", "", 0)]);
        let mut monitor = monitor();

        let snapshot = monitor.check(&assistant, temp.path()).expect("snapshot");
        assert_eq!(snapshot.messages_used, 45);
        assert_eq!(snapshot.messages_limit, 225);
        assert!(monitor.last().is_some());
    }

    #[test]
    fn check_returns_none_on_probe_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let assistant = ScriptedAssistant::new(vec![ScriptedRun::output("", "boom", 2)]);
        let mut monitor = monitor();

        assert_eq!(monitor.check(&assistant, temp.path()), None);
    }

    #[test]
    fn can_run_below_thresholds() {
        let temp = tempfile::tempdir().expect("tempdir");
        let assistant =
            ScriptedAssistant::new(vec![ScriptedRun::output("45/225 messages", "", 0)]);

        let (can_run, reason) = monitor().can_run(&assistant, temp.path());
        assert!(can_run);
        assert!(reason.contains("acceptable"));
    }

    #[test]
    fn can_run_refuses_above_critical_threshold() {
        let temp = tempfile::tempdir().expect("tempdir");
        // 216/225 = 0.96, above the default critical threshold of 0.95.
        let assistant = ScriptedAssistant::new(vec![ScriptedRun::output(
            "216/225 messages, 2h 10m remaining",
            "",
            0,
        )]);

        let (can_run, reason) = monitor().can_run(&assistant, temp.path());
        assert!(!can_run);
        assert!(reason.contains("critical"));
        assert!(reason.contains("2h 10m"));
    }

    #[test]
    fn can_run_refuses_when_status_unknown() {
        let temp = tempfile::tempdir().expect("tempdir");
        let assistant = ScriptedAssistant::new(vec![ScriptedRun::output("garbage", "", 0)]);

        let (can_run, reason) = monitor().can_run(&assistant, temp.path());
        assert!(!can_run);
        assert!(reason.contains("could not determine"));
    }

    #[test]
    fn wait_for_reset_returns_once_quota_clears() {
        let temp = tempfile::tempdir().expect("tempdir");
        let assistant = ScriptedAssistant::new(vec![
            ScriptedRun::output("224/225 messages, 8 minutes remaining", "", 0),
            ScriptedRun::output("1/225 messages", "", 0),
        ]);
        let mut monitor = monitor();

        let mut sleeps = Vec::new();
        let resumed = monitor.wait_for_reset(&assistant, temp.path(), |d| sleeps.push(d));
        assert!(resumed);
        // Quarter of the 8-minute reset estimate, floored at one minute.
        assert_eq!(sleeps, vec![Duration::from_secs(120)]);
    }

    #[test]
    fn wait_for_reset_times_out() {
        let temp = tempfile::tempdir().expect("tempdir");
        let assistant = ScriptedAssistant::new(Vec::new());
        let mut monitor = QuotaMonitor::new(&QuotaConfig {
            max_wait_secs: 0,
            ..QuotaConfig::default()
        });

        let resumed = monitor.wait_for_reset(&assistant, temp.path(), |_| {});
        assert!(!resumed);
    }
}
