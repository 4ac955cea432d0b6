use serde::{Deserialize, Serialize};

use super::level::xp_for_session;

pub const DEFAULT_ACTIVITY_THRESHOLD_PERCENT: u32 = 60;
pub const DEFAULT_MAX_SESSION_MINUTES: u64 = 600;

/// Whether input activity could be observed during a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringStatus {
    Granted,
    /// The user refused the input-monitoring permission.
    Denied,
    /// The platform could not monitor input.
    Unavailable,
}

/// What the client observed over one focused session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityReport {
    /// Time spent in the running state, pauses excluded.
    pub elapsed_seconds: u64,
    pub sampled_intervals: u32,
    /// Sampled intervals in which keyboard or pointer input was detected.
    pub active_intervals: u32,
    pub monitoring: MonitoringStatus,
}

impl ActivityReport {
    pub fn elapsed_minutes(&self) -> u64 {
        self.elapsed_seconds / 60
    }

    pub fn activity_ratio(&self) -> f64 {
        if self.sampled_intervals == 0 {
            return 0.0;
        }
        self.active_intervals.min(self.sampled_intervals) as f64 / self.sampled_intervals as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardPolicy {
    pub activity_threshold_percent: u32,
    pub max_session_minutes: u64,
}

impl Default for AwardPolicy {
    fn default() -> Self {
        Self {
            activity_threshold_percent: DEFAULT_ACTIVITY_THRESHOLD_PERCENT,
            max_session_minutes: DEFAULT_MAX_SESSION_MINUTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwardDecision {
    Qualified { active_minutes: u64 },
    BelowThreshold,
    Unverified,
}

impl AwardDecision {
    pub fn xp(&self) -> u64 {
        match self {
            AwardDecision::Qualified { active_minutes } => xp_for_session(*active_minutes as i64),
            _ => 0,
        }
    }
}

impl AwardPolicy {
    /// Decides the award for a finished session.
    ///
    /// Only verified activity counts: without monitoring there is no award,
    /// and a qualified session earns floor(elapsed_minutes * active / sampled),
    /// never the raw elapsed time.
    pub fn decide(&self, report: &ActivityReport) -> AwardDecision {
        if report.monitoring != MonitoringStatus::Granted || report.sampled_intervals == 0 {
            return AwardDecision::Unverified;
        }
        let sampled = report.sampled_intervals as u64;
        let active = report.active_intervals.min(report.sampled_intervals) as u64;
        if active * 100 < self.activity_threshold_percent as u64 * sampled {
            return AwardDecision::BelowThreshold;
        }
        let minutes = report.elapsed_minutes().min(self.max_session_minutes);
        AwardDecision::Qualified {
            active_minutes: minutes * active / sampled,
        }
    }
}

/// Minutes that count toward XP for `report`; zero unless the session qualifies.
pub fn verified_active_minutes(report: &ActivityReport, policy: &AwardPolicy) -> u64 {
    match policy.decide(report) {
        AwardDecision::Qualified { active_minutes } => active_minutes,
        AwardDecision::BelowThreshold | AwardDecision::Unverified => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(minutes: u64, sampled: u32, active: u32) -> ActivityReport {
        ActivityReport {
            elapsed_seconds: minutes * 60,
            sampled_intervals: sampled,
            active_intervals: active,
            monitoring: MonitoringStatus::Granted,
        }
    }

    #[test]
    fn scales_elapsed_time_by_activity() {
        let decision = AwardPolicy::default().decide(&report(25, 25, 20));
        assert_eq!(decision, AwardDecision::Qualified { active_minutes: 20 });
        assert_eq!(decision.xp(), 20);
    }

    #[test]
    fn below_threshold_earns_nothing() {
        let decision = AwardPolicy::default().decide(&report(25, 10, 4));
        assert_eq!(decision, AwardDecision::BelowThreshold);
        assert_eq!(decision.xp(), 0);
    }

    #[test]
    fn threshold_is_inclusive() {
        let decision = AwardPolicy::default().decide(&report(10, 10, 6));
        assert_eq!(decision, AwardDecision::Qualified { active_minutes: 6 });
    }

    #[test]
    fn unmonitored_sessions_never_fall_back_to_elapsed_time() {
        for monitoring in [MonitoringStatus::Denied, MonitoringStatus::Unavailable] {
            let r = ActivityReport { monitoring, ..report(45, 45, 45) };
            assert_eq!(AwardPolicy::default().decide(&r), AwardDecision::Unverified);
        }
        assert_eq!(AwardPolicy::default().decide(&report(45, 0, 0)), AwardDecision::Unverified);
    }

    #[test]
    fn award_is_bounded() {
        let policy = AwardPolicy {
            max_session_minutes: 60,
            ..AwardPolicy::default()
        };
        assert_eq!(policy.decide(&report(300, 10, 10)).xp(), 60);
        // active > sampled is clamped rather than inflating the ratio
        assert_eq!(policy.decide(&report(30, 10, 50)).xp(), 30);
    }

    #[test]
    fn partial_minutes_are_dropped() {
        let r = ActivityReport { elapsed_seconds: 119, ..report(0, 4, 4) };
        assert_eq!(AwardPolicy::default().decide(&r).xp(), 1);
    }

    #[test]
    fn verified_minutes_follow_the_decision() {
        let policy = AwardPolicy::default();
        assert_eq!(verified_active_minutes(&report(25, 10, 8), &policy), 20);
        assert_eq!(verified_active_minutes(&report(25, 10, 4), &policy), 0);
    }
}
