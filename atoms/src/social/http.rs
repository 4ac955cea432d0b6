use chrono::{DateTime, Utc};
use lambda_http::{http::StatusCode, Body, Error, Response};

use super::model::{CreateSocialGroupPayload, InvitePayload, InviteResponse};
use super::service;
use crate::http::{error_response, parse_body, respond, respond_empty};
use crate::store::DocumentStore;

/// GET /social-groups - groups the caller belongs to
pub async fn list_groups(store: &dyn DocumentStore, user_id: &str) -> Result<Response<Body>, Error> {
    respond(StatusCode::OK, service::list_user_groups(store, user_id).await)
}

/// POST /social-groups
pub async fn create_group(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let payload: CreateSocialGroupPayload = match parse_body(body) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    respond(
        StatusCode::CREATED,
        service::create_group(store, now, user_id, &payload.name).await,
    )
}

/// DELETE /social-groups/{id}
pub async fn dissolve_group(
    store: &dyn DocumentStore,
    user_id: &str,
    group_id: &str,
) -> Result<Response<Body>, Error> {
    respond_empty(service::dissolve_group(store, user_id, group_id).await)
}

/// GET /social-groups/{id}/leaderboard
pub async fn leaderboard(
    store: &dyn DocumentStore,
    user_id: &str,
    group_id: &str,
) -> Result<Response<Body>, Error> {
    respond(StatusCode::OK, service::leaderboard(store, user_id, group_id).await)
}

/// POST /social-groups/{id}/invites
pub async fn invite(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
    user_id: &str,
    group_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let payload: InvitePayload = match parse_body(body) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    respond(
        StatusCode::CREATED,
        service::invite(store, now, user_id, group_id, &payload.username).await,
    )
}

/// POST /social-groups/{id}/leave
pub async fn leave(
    store: &dyn DocumentStore,
    user_id: &str,
    group_id: &str,
) -> Result<Response<Body>, Error> {
    respond_empty(service::leave_group(store, user_id, group_id).await)
}

/// DELETE /social-groups/{id}/members/{userId}
pub async fn kick(
    store: &dyn DocumentStore,
    user_id: &str,
    group_id: &str,
    target_user_id: &str,
) -> Result<Response<Body>, Error> {
    respond_empty(service::kick(store, user_id, group_id, target_user_id).await)
}

/// GET /invites
pub async fn list_invites(store: &dyn DocumentStore, user_id: &str) -> Result<Response<Body>, Error> {
    respond(StatusCode::OK, service::list_invites(store, user_id).await)
}

/// POST /invites/{id}/accept and /invites/{id}/decline
pub async fn respond_to_invite(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
    user_id: &str,
    invite_id: &str,
    response: InviteResponse,
) -> Result<Response<Body>, Error> {
    respond(
        StatusCode::OK,
        service::respond_to_invite(store, now, user_id, invite_id, response).await,
    )
}
