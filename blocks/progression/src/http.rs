use chrono::{DateTime, Utc};
use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::Deserialize;

use taskgo_atoms::http::{error_response, parse_body, respond};
use taskgo_atoms::store::DocumentStore;
use taskgo_atoms::tasks;
use taskgo_atoms::xp::ActivityReport;

use crate::completion;
use crate::session;
use crate::ProgressionRules;

#[derive(Debug, Deserialize)]
pub struct CompleteSessionPayload {
    pub task_id: String,
    #[serde(flatten)]
    pub report: ActivityReport,
}

/// POST /sessions/complete
pub async fn complete_session(
    store: &dyn DocumentStore,
    rules: &ProgressionRules,
    now: DateTime<Utc>,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let payload: CompleteSessionPayload = match parse_body(body) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    let result =
        completion::complete_focus_session(store, rules, now, user_id, &payload.task_id, payload.report)
            .await;
    respond(StatusCode::OK, result)
}

#[derive(Debug, Deserialize)]
pub struct RetryAwardPayload {
    pub task_id: String,
}

/// POST /sessions/retry-award - lands the award queued for a completed session
pub async fn retry_award(
    store: &dyn DocumentStore,
    rules: &ProgressionRules,
    now: DateTime<Utc>,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let payload: RetryAwardPayload = match parse_body(body) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    respond(
        StatusCode::OK,
        completion::retry_pending_award(store, rules, now, user_id, &payload.task_id).await,
    )
}

/// GET /task-groups/{id}/queue - the Task Go run order for a group
pub async fn task_go_queue(
    store: &dyn DocumentStore,
    user_id: &str,
    group_id: &str,
) -> Result<Response<Body>, Error> {
    let result = match tasks::get_group(store, user_id, group_id).await {
        Ok(_) => tasks::list_tasks(store, user_id, group_id)
            .await
            .map(|items| session::build_queue(&items)),
        Err(e) => Err(e),
    };
    respond(StatusCode::OK, result)
}
