use std::env;
use std::str::FromStr;

use taskgo_atoms::xp::{AwardPolicy, DEFAULT_ACTIVITY_THRESHOLD_PERCENT, DEFAULT_MAX_SESSION_MINUTES};
use taskgo_atoms::WeekBoundary;
use progression_block::ProgressionRules;

pub const DEFAULT_TABLE_NAME: &str = "taskgo";

/// Settings read once per cold start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub table_name: String,
    pub activity_threshold_percent: u32,
    pub max_session_minutes: u64,
    pub week_reset_utc_offset_minutes: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            activity_threshold_percent: DEFAULT_ACTIVITY_THRESHOLD_PERCENT,
            max_session_minutes: DEFAULT_MAX_SESSION_MINUTES,
            week_reset_utc_offset_minutes: 0,
        }
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(name: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(value) => match value.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!("Ignoring malformed {}={:?}, using {}", name, value, default);
                default
            }
        },
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let mut threshold = parse_or(
            "ACTIVITY_THRESHOLD_PERCENT",
            lookup("ACTIVITY_THRESHOLD_PERCENT"),
            defaults.activity_threshold_percent,
        );
        if threshold > 100 {
            tracing::warn!("ACTIVITY_THRESHOLD_PERCENT={} is above 100, using {}", threshold, defaults.activity_threshold_percent);
            threshold = defaults.activity_threshold_percent;
        }

        let mut offset = parse_or(
            "WEEK_RESET_UTC_OFFSET_MINUTES",
            lookup("WEEK_RESET_UTC_OFFSET_MINUTES"),
            defaults.week_reset_utc_offset_minutes,
        );
        if offset.abs() > 14 * 60 {
            tracing::warn!("WEEK_RESET_UTC_OFFSET_MINUTES={} is out of range, using 0", offset);
            offset = 0;
        }

        Self {
            table_name: lookup("TABLE_NAME")
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(defaults.table_name),
            activity_threshold_percent: threshold,
            max_session_minutes: parse_or(
                "MAX_SESSION_MINUTES",
                lookup("MAX_SESSION_MINUTES"),
                defaults.max_session_minutes,
            ),
            week_reset_utc_offset_minutes: offset,
        }
    }

    pub fn week(&self) -> WeekBoundary {
        WeekBoundary::new(self.week_reset_utc_offset_minutes)
    }

    pub fn rules(&self) -> ProgressionRules {
        ProgressionRules {
            award: AwardPolicy {
                activity_threshold_percent: self.activity_threshold_percent,
                max_session_minutes: self.max_session_minutes,
            },
            week: self.week(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        assert_eq!(config(&[]), Config::default());
        assert_eq!(Config::default().rules().award, AwardPolicy::default());
    }

    #[test]
    fn reads_overrides() {
        let c = config(&[
            ("TABLE_NAME", "taskgo-dev"),
            ("ACTIVITY_THRESHOLD_PERCENT", "75"),
            ("MAX_SESSION_MINUTES", "240"),
            ("WEEK_RESET_UTC_OFFSET_MINUTES", "-300"),
        ]);
        assert_eq!(c.table_name, "taskgo-dev");
        assert_eq!(c.rules().award.activity_threshold_percent, 75);
        assert_eq!(c.rules().award.max_session_minutes, 240);
        assert_eq!(c.week(), WeekBoundary::new(-300));
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let c = config(&[
            ("ACTIVITY_THRESHOLD_PERCENT", "sixty"),
            ("MAX_SESSION_MINUTES", "-5"),
            ("WEEK_RESET_UTC_OFFSET_MINUTES", "9000"),
        ]);
        assert_eq!(c, Config::default());
        assert_eq!(config(&[("ACTIVITY_THRESHOLD_PERCENT", "150")]).activity_threshold_percent, 60);
    }
}
