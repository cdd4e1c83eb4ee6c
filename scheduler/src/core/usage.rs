//! Best-effort parsing of the assistant's usage/status output.
//!
//! The status text is scraped, not a stable contract. Every function
//! here returns `Option` so callers treat "could not parse" as
//! status-unknown and act conservatively.

use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;

/// Subscription tier, inferred from the message limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanTier {
    Pro,
    Max5,
    Max20,
}

impl PlanTier {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanTier::Pro => "pro",
            PlanTier::Max5 => "max5",
            PlanTier::Max20 => "max20",
        }
    }
}

/// One parsed snapshot of remaining quota. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageSnapshot {
    pub messages_used: u32,
    pub messages_limit: u32,
    pub time_until_reset: Option<Duration>,
    pub plan: Option<PlanTier>,
    pub raw: String,
    pub checked_at: DateTime<Utc>,
}

impl UsageSnapshot {
    pub fn fraction_used(&self) -> f64 {
        if self.messages_limit == 0 {
            return 0.0;
        }
        f64::from(self.messages_used) / f64::from(self.messages_limit)
    }

    /// Conservative estimate of tasks still runnable, assuming roughly
    /// ten messages per task.
    pub fn estimated_tasks_remaining(&self) -> u32 {
        self.messages_limit.saturating_sub(self.messages_used) / 10
    }
}

static MESSAGE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(\d+)/(\d+)\s+messages?",
        r"(?i)(\d+)\s+messages?\s+used.*?(\d+)\s+total",
        r"(?i)(\d+)\s+messages?\s+.*?limit\s+(\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static BARE_USAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s+messages?").unwrap());

static RESET_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(\d+)h\s*(\d+)m\s+remaining",
        r"(?i)(\d+)\s*hours?\s*(\d+)\s*minutes?\s+remaining",
        r"(?i)(\d+)h\s+remaining",
        r"(?i)(\d+)\s*minutes?\s+remaining",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Parse a usage snapshot out of raw status text.
///
/// First matching pattern wins for both the message count and the reset
/// countdown. When the limit is not explicit in the output it is
/// guessed from the usage magnitude (a fallback heuristic against the
/// three known tiers, not a contract — usage outside those bands will
/// be misclassified).
pub fn parse_usage(raw: &str, checked_at: DateTime<Utc>) -> Option<UsageSnapshot> {
    let mut messages_used = 0u32;
    let mut messages_limit = 0u32;

    for pattern in MESSAGE_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(raw) {
            messages_used = caps[1].parse().ok()?;
            messages_limit = caps[2].parse().ok()?;
            break;
        }
    }

    if messages_limit == 0 {
        let caps = BARE_USAGE.captures(raw)?;
        messages_used = caps[1].parse().ok()?;
        messages_limit = if messages_used <= 50 {
            45
        } else if messages_used <= 250 {
            225
        } else {
            900
        };
    }

    Some(UsageSnapshot {
        messages_used,
        messages_limit,
        time_until_reset: parse_reset(raw),
        plan: infer_plan(messages_limit),
        raw: raw.to_string(),
        checked_at,
    })
}

fn parse_reset(raw: &str) -> Option<Duration> {
    for pattern in RESET_PATTERNS.iter() {
        let Some(caps) = pattern.captures(raw) else {
            continue;
        };
        let matched = caps.get(0)?.as_str().to_ascii_lowercase();
        if caps.len() == 3 {
            let hours: u64 = caps[1].parse().ok()?;
            let minutes: u64 = caps[2].parse().ok()?;
            return Some(Duration::from_secs(hours * 3600 + minutes * 60));
        }
        let value: u64 = caps[1].parse().ok()?;
        if matched.contains('h') {
            return Some(Duration::from_secs(value * 3600));
        }
        return Some(Duration::from_secs(value * 60));
    }
    None
}

fn infer_plan(messages_limit: u32) -> Option<PlanTier> {
    match messages_limit {
        0 => None,
        1..=50 => Some(PlanTier::Pro),
        51..=250 => Some(PlanTier::Max5),
        251..=1000 => Some(PlanTier::Max20),
        _ => None,
    }
}

/// Sleep interval for the reset-wait loop: a quarter of the known
/// remaining reset time when available, capped at `default_interval`,
/// floored at one minute.
pub fn poll_interval(time_until_reset: Option<Duration>, default_interval: Duration) -> Duration {
    let Some(remaining) = time_until_reset else {
        return default_interval;
    };
    let quarter = remaining / 4;
    quarter.min(default_interval).max(Duration::from_secs(60))
}

/// Render a duration as `4h 23m` for reason strings.
pub fn format_reset(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{}h {}m", total / 3600, (total % 3600) / 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> UsageSnapshot {
        parse_usage(raw, Utc::now()).expect("parse usage")
    }

    #[test]
    fn parses_slash_format_without_reset() {
        let snapshot = parse("45/225 messages");
        assert_eq!(snapshot.messages_used, 45);
        assert_eq!(snapshot.messages_limit, 225);
        assert!((snapshot.fraction_used() - 0.2).abs() < 1e-9);
        assert_eq!(snapshot.time_until_reset, None);
        assert_eq!(snapshot.plan, Some(PlanTier::Max5));
    }

    #[test]
    fn parses_used_of_total_format() {
        let snapshot = parse("you have 45 messages used out of 225 total this period");
        assert_eq!(snapshot.messages_used, 45);
        assert_eq!(snapshot.messages_limit, 225);
    }

    #[test]
    fn first_matching_pattern_wins() {
        // Both the slash form and the limit form are present; the slash
        // pattern is earlier in the candidate list and must win.
        let snapshot = parse("10/100 messages (historical: 99 messages, limit 500)");
        assert_eq!(snapshot.messages_used, 10);
        assert_eq!(snapshot.messages_limit, 100);
    }

    #[test]
    fn infers_limit_from_bare_usage() {
        assert_eq!(parse("12 messages").messages_limit, 45);
        assert_eq!(parse("120 messages").messages_limit, 225);
        assert_eq!(parse("400 messages").messages_limit, 900);
    }

    #[test]
    fn parses_reset_countdown_variants() {
        assert_eq!(
            parse("45/225 messages, 4h 23m remaining").time_until_reset,
            Some(Duration::from_secs(4 * 3600 + 23 * 60))
        );
        assert_eq!(
            parse("45/225 messages, 4 hours 23 minutes remaining").time_until_reset,
            Some(Duration::from_secs(4 * 3600 + 23 * 60))
        );
        assert_eq!(
            parse("45/225 messages, 4h remaining").time_until_reset,
            Some(Duration::from_secs(4 * 3600))
        );
        assert_eq!(
            parse("45/225 messages, 23 minutes remaining").time_until_reset,
            Some(Duration::from_secs(23 * 60))
        );
    }

    #[test]
    fn unparseable_text_is_none() {
        assert_eq!(parse_usage("no usage info here", Utc::now()), None);
        assert_eq!(parse_usage("", Utc::now()), None);
    }

    #[test]
    fn estimated_tasks_remaining_is_conservative() {
        let snapshot = parse("45/225 messages");
        assert_eq!(snapshot.estimated_tasks_remaining(), 18);
        let snapshot = parse("225/225 messages");
        assert_eq!(snapshot.estimated_tasks_remaining(), 0);
    }

    #[test]
    fn poll_interval_prefers_quarter_of_reset() {
        let default = Duration::from_secs(300);
        // No reset estimate: fall back to the default.
        assert_eq!(poll_interval(None, default), default);
        // 2h remaining: quarter is 30m, capped at the default.
        assert_eq!(
            poll_interval(Some(Duration::from_secs(7200)), default),
            default
        );
        // 8m remaining: quarter is 2m, floored at 1m.
        assert_eq!(
            poll_interval(Some(Duration::from_secs(480)), default),
            Duration::from_secs(120)
        );
        // 2m remaining: quarter is 30s, floor wins.
        assert_eq!(
            poll_interval(Some(Duration::from_secs(120)), default),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn format_reset_renders_hours_and_minutes() {
        assert_eq!(format_reset(Duration::from_secs(4 * 3600 + 23 * 60)), "4h 23m");
        assert_eq!(format_reset(Duration::from_secs(59)), "0h 0m");
    }
}
