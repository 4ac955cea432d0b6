use chrono::{DateTime, Utc};
use serde::Serialize;

use taskgo_atoms::error::CoreResult;
use taskgo_atoms::social::{self, MirrorFailure};
use taskgo_atoms::store::{with_retry, DocumentStore};
use taskgo_atoms::users;
use taskgo_atoms::WeekBoundary;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResetReport {
    pub users_reset: Vec<String>,
    /// Profiles whose reset date had not passed, or that were reset concurrently.
    pub users_skipped: usize,
    /// (user id, error) for profiles that could not be reset.
    pub failures: Vec<(String, String)>,
    pub mirror_failures: Vec<MirrorFailure>,
}

/// Resets one user's weekly XP if their reset date has passed, then copies
/// the zeroed value into every group mirror. Returns whether a reset happened.
pub async fn reset_user_weekly_xp(
    store: &dyn DocumentStore,
    week: WeekBoundary,
    now: DateTime<Utc>,
    user_id: &str,
    report: &mut ResetReport,
) -> CoreResult<bool> {
    let reset = with_retry("reset_weekly_xp", || {
        users::reset_weekly_xp_if_due(store, now, week, user_id)
    })
    .await?;

    match reset {
        Some(profile) => {
            let failures = social::sync_member_mirrors(store, &profile).await?;
            report.mirror_failures.extend(failures);
            report.users_reset.push(profile.user_id);
            Ok(true)
        }
        None => {
            report.users_skipped += 1;
            Ok(false)
        }
    }
}

/// Weekly sweep over every profile. Safe to run again in the same week:
/// profiles already moved to the next boundary are skipped.
pub async fn reset_weekly_xp(
    store: &dyn DocumentStore,
    week: WeekBoundary,
    now: DateTime<Utc>,
) -> CoreResult<ResetReport> {
    let profiles = users::list_profiles(store).await?;
    let mut report = ResetReport::default();

    for profile in profiles {
        if profile.weekly_xp_reset_date > now {
            report.users_skipped += 1;
            continue;
        }
        if let Err(e) = reset_user_weekly_xp(store, week, now, &profile.user_id, &mut report).await {
            tracing::error!("Weekly reset failed for {}: {}", profile.user_id, e);
            report.failures.push((profile.user_id.clone(), e.to_string()));
        }
    }

    tracing::info!(
        "Weekly reset: {} reset, {} skipped, {} failed, {} mirror writes failed",
        report.users_reset.len(),
        report.users_skipped,
        report.failures.len(),
        report.mirror_failures.len()
    );
    Ok(report)
}
