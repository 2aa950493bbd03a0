//! Best-effort rolling counts of request outcomes over a current and a previous
//! window. Holds counts only; no user, tenant or token data.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::ReasonCode;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WindowCounts {
    pub started_at: Option<DateTime<Utc>>,
    pub successes: u64,
    /// Rejections by reason code.
    pub failures: BTreeMap<&'static str, u64>,
    /// Authorized calls that still failed (bad arguments, tool missing or failing).
    pub call_errors: BTreeMap<&'static str, u64>,
}

impl WindowCounts {
    fn starting(at: DateTime<Utc>) -> Self {
        Self {
            started_at: Some(at),
            ..Self::default()
        }
    }

    pub fn total(&self) -> u64 {
        self.successes
            + self.failures.values().sum::<u64>()
            + self.call_errors.values().sum::<u64>()
    }
}

/// What a request amounted to, for counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Rejected(ReasonCode),
    CallFailed(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummarySnapshot {
    pub window_seconds: u64,
    pub current: WindowCounts,
    pub previous: WindowCounts,
}

#[derive(Debug)]
struct Windows {
    current: WindowCounts,
    previous: WindowCounts,
}

#[derive(Debug)]
pub struct RollingSummary {
    window: chrono::Duration,
    windows: Mutex<Windows>,
}

impl RollingSummary {
    pub fn new(window: Duration, now: DateTime<Utc>) -> Self {
        let window = chrono::Duration::from_std(window)
            .ok()
            .filter(|w| *w > chrono::Duration::zero())
            .unwrap_or_else(|| chrono::Duration::hours(1));
        Self {
            window,
            windows: Mutex::new(Windows {
                current: WindowCounts::starting(now),
                previous: WindowCounts::default(),
            }),
        }
    }

    fn rotate(&self, windows: &mut Windows, now: DateTime<Utc>) {
        let Some(start) = windows.current.started_at else {
            windows.current.started_at = Some(now);
            return;
        };
        if now < start + self.window {
            return;
        }
        if now < start + self.window + self.window {
            windows.previous = std::mem::take(&mut windows.current);
            windows.current = WindowCounts::starting(start + self.window);
        } else {
            // Idle for more than a full window: nothing recent to compare with.
            windows.previous = WindowCounts::default();
            windows.current = WindowCounts::starting(now);
        }
    }

    pub fn record(&self, outcome: Outcome, now: DateTime<Utc>) {
        let mut windows = self.windows.lock();
        self.rotate(&mut windows, now);
        let current = &mut windows.current;
        match outcome {
            Outcome::Success => current.successes += 1,
            Outcome::Rejected(reason) => *current.failures.entry(reason.as_str()).or_insert(0) += 1,
            Outcome::CallFailed(code) => *current.call_errors.entry(code).or_insert(0) += 1,
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> SummarySnapshot {
        let mut windows = self.windows.lock();
        self.rotate(&mut windows, now);
        SummarySnapshot {
            window_seconds: u64::try_from(self.window.num_seconds()).unwrap_or_default(),
            current: windows.current.clone(),
            previous: windows.previous.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn counts_by_reason_code() {
        let now = Utc::now();
        let summary = RollingSummary::new(Duration::from_secs(60), now);
        summary.record(Outcome::Success, now);
        summary.record(Outcome::Rejected(ReasonCode::MissingToken), now);
        summary.record(Outcome::Rejected(ReasonCode::MissingToken), now);
        summary.record(Outcome::Rejected(ReasonCode::Expired), now);

        let snap = summary.snapshot(now);
        assert_eq!(snap.current.successes, 1);
        assert_eq!(snap.current.failures.get("MISSING_TOKEN"), Some(&2));
        assert_eq!(snap.current.failures.get("EXPIRED"), Some(&1));
        assert_eq!(snap.current.total(), 4);
        assert_eq!(snap.previous.total(), 0);
    }

    #[test]
    fn failed_calls_are_not_successes() {
        let now = Utc::now();
        let summary = RollingSummary::new(Duration::from_secs(60), now);
        summary.record(Outcome::CallFailed("TOOL_UNAVAILABLE"), now);
        summary.record(Outcome::Success, now);

        let snap = summary.snapshot(now);
        assert_eq!(snap.current.successes, 1);
        assert_eq!(snap.current.call_errors.get("TOOL_UNAVAILABLE"), Some(&1));
        assert!(snap.current.failures.is_empty());
        assert_eq!(snap.current.total(), 2);
    }

    #[test]
    fn window_rolls_over_into_previous() {
        let now = Utc::now();
        let summary = RollingSummary::new(Duration::from_secs(60), now);
        summary.record(Outcome::Rejected(ReasonCode::Expired), now);

        let later = now + ChronoDuration::seconds(90);
        summary.record(Outcome::Success, later);
        let snap = summary.snapshot(later);
        assert_eq!(snap.previous.failures.get("EXPIRED"), Some(&1));
        assert_eq!(snap.current.successes, 1);
        assert_eq!(snap.current.started_at, Some(now + ChronoDuration::seconds(60)));

        let much_later = now + ChronoDuration::minutes(10);
        let snap = summary.snapshot(much_later);
        assert_eq!(snap.current.total(), 0);
        assert_eq!(snap.previous.total(), 0);
    }

    #[test]
    fn snapshot_serializes_without_identities() {
        let now = Utc::now();
        let summary = RollingSummary::new(Duration::from_secs(60), now);
        summary.record(Outcome::Rejected(ReasonCode::BucketNotGranted), now);
        let json = serde_json::to_value(summary.snapshot(now)).unwrap();
        assert_eq!(json["window_seconds"], 60);
        assert_eq!(json["current"]["failures"]["BUCKET_NOT_GRANTED"], 1);
    }
}
