//! XP / leveling engine. Pure functions, no store access.
pub mod award;
pub mod level;

pub use award::{
    verified_active_minutes, ActivityReport, AwardDecision, AwardPolicy, MonitoringStatus,
    DEFAULT_ACTIVITY_THRESHOLD_PERCENT, DEFAULT_MAX_SESSION_MINUTES,
};
pub use level::{level_for_xp, progress, xp_for_session, xp_required, xp_to_next, MAX_LEVEL};
