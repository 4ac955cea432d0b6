use aws_lambda_events::event::cloudwatch_events::CloudWatchEvent;
use lambda_runtime::{Error, LambdaEvent};
use progression_block::{account, weekly_reset};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use taskgo_shared::AppState;

pub const WEEKLY_BOUNDARY_REACHED: &str = "WeeklyBoundaryReached";
pub const USER_ACCOUNT_DELETED: &str = "UserAccountDeleted";

#[derive(Debug, Deserialize)]
struct UserDetail {
    user_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct WeeklyDetail {
    /// Present when a single user's reset is scheduled.
    user_id: Option<String>,
}

fn parse_detail<T: serde::de::DeserializeOwned>(detail: Option<&Value>) -> Result<Option<T>, Error> {
    match detail {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
    }
}

/// EventBridge entry point.
pub(crate) async fn function_handler(
    event: LambdaEvent<CloudWatchEvent>,
    state: Arc<AppState>,
) -> Result<Value, Error> {
    let payload = event.payload;
    dispatch(payload.detail_type.as_deref(), payload.detail.as_ref(), &state).await
}

/// Routes on `detail-type`. A partially failed account deletion returns an
/// error so the event is delivered again; every step is idempotent.
pub(crate) async fn dispatch(
    detail_type: Option<&str>,
    detail: Option<&Value>,
    state: &AppState,
) -> Result<Value, Error> {
    let store = state.store.as_ref();
    let now = state.clock.now();
    tracing::info!("Event received: {:?}", detail_type);

    match detail_type {
        Some(WEEKLY_BOUNDARY_REACHED) => {
            let week = state.config.week();
            let detail: WeeklyDetail = parse_detail(detail)?.unwrap_or_default();
            let report = match detail.user_id {
                Some(user_id) => {
                    let mut report = weekly_reset::ResetReport::default();
                    weekly_reset::reset_user_weekly_xp(store, week, now, &user_id, &mut report).await?;
                    report
                }
                None => weekly_reset::reset_weekly_xp(store, week, now).await?,
            };
            Ok(serde_json::to_value(report)?)
        }
        Some(USER_ACCOUNT_DELETED) => {
            let detail: UserDetail = parse_detail(detail)?.ok_or("UserAccountDeleted event without user_id")?;
            let report = account::delete_account(store, &detail.user_id).await;
            if !report.is_complete() {
                return Err(format!(
                    "account {} partially deleted, failed steps: {:?}",
                    detail.user_id,
                    report.failed_steps()
                )
                .into());
            }
            Ok(serde_json::to_value(report)?)
        }
        other => {
            tracing::warn!("Ignoring event with detail-type {:?}", other);
            Ok(json!({ "ignored": other }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use taskgo_atoms::store::keys;
    use taskgo_atoms::users::{self, SignUpPayload};
    use taskgo_atoms::{Clock, DocumentStore, FixedClock, MemoryStore};
    use taskgo_shared::Config;

    async fn state_with_user() -> (AppState, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 14, 9, 0, 0).unwrap()));
        let state = AppState::new(Arc::new(MemoryStore::new()), clock.clone(), Config::default());
        users::sign_up(
            state.store.as_ref(),
            clock.now(),
            state.config.week(),
            "u1",
            SignUpPayload {
                email: "amy@example.com".to_string(),
                username: "amy".to_string(),
                display_name: None,
            },
        )
        .await
        .unwrap();
        (state, clock)
    }

    #[tokio::test]
    async fn weekly_boundary_runs_the_sweep() {
        let (state, clock) = state_with_user().await;
        clock.advance(Duration::days(6));

        let out = dispatch(Some(WEEKLY_BOUNDARY_REACHED), None, &state).await.unwrap();
        assert_eq!(out["users_reset"], json!(["u1"]));

        let again = dispatch(Some(WEEKLY_BOUNDARY_REACHED), None, &state).await.unwrap();
        assert_eq!(again["users_reset"], json!([]));
    }

    #[tokio::test]
    async fn account_deleted_removes_profile_and_claim() {
        let (state, _clock) = state_with_user().await;
        let detail = json!({ "user_id": "u1" });

        dispatch(Some(USER_ACCOUNT_DELETED), Some(&detail), &state).await.unwrap();
        assert!(state.store.get(&keys::user("u1")).await.unwrap().is_none());
        assert_eq!(users::lookup(state.store.as_ref(), "amy").await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_and_unknown_events() {
        let (state, _clock) = state_with_user().await;
        assert!(dispatch(Some(USER_ACCOUNT_DELETED), None, &state).await.is_err());
        let out = dispatch(Some("SomethingElse"), None, &state).await.unwrap();
        assert_eq!(out["ignored"], "SomethingElse");
    }
}
