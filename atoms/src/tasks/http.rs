use chrono::{DateTime, Utc};
use lambda_http::{http::StatusCode, Body, Error, Response};

use super::model::{
    CreateBatchPayload, CreateChainPayload, CreateGroupPayload, CreateTaskPayload, MoveTaskPayload,
    RenameGroupPayload, ReorderGroupsPayload,
};
use super::service;
use crate::http::{error_response, parse_body, respond, respond_empty};
use crate::store::DocumentStore;

/// GET /task-groups
pub async fn list_groups(store: &dyn DocumentStore, user_id: &str) -> Result<Response<Body>, Error> {
    respond(StatusCode::OK, service::list_groups(store, user_id).await)
}

/// POST /task-groups
pub async fn create_group(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let payload: CreateGroupPayload = match parse_body(body) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    respond(StatusCode::CREATED, service::create_group(store, now, user_id, payload).await)
}

/// PATCH /task-groups/{id}
pub async fn rename_group(
    store: &dyn DocumentStore,
    user_id: &str,
    group_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let payload: RenameGroupPayload = match parse_body(body) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    respond(StatusCode::OK, service::rename_group(store, user_id, group_id, &payload.name).await)
}

/// DELETE /task-groups/{id}
pub async fn delete_group(
    store: &dyn DocumentStore,
    user_id: &str,
    group_id: &str,
) -> Result<Response<Body>, Error> {
    respond_empty(service::delete_group(store, user_id, group_id).await)
}

/// POST /task-groups/reorder
pub async fn reorder_groups(
    store: &dyn DocumentStore,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let payload: ReorderGroupsPayload = match parse_body(body) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    respond(StatusCode::OK, service::reorder_groups(store, user_id, &payload.group_ids).await)
}

/// GET /task-groups/{id}/tasks
pub async fn list_tasks(
    store: &dyn DocumentStore,
    user_id: &str,
    group_id: &str,
) -> Result<Response<Body>, Error> {
    let result = match service::get_group(store, user_id, group_id).await {
        Ok(_) => service::list_tasks(store, user_id, group_id).await,
        Err(e) => Err(e),
    };
    respond(StatusCode::OK, result)
}

/// POST /task-groups/{id}/tasks
pub async fn create_task(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
    user_id: &str,
    group_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let payload: CreateTaskPayload = match parse_body(body) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    respond(
        StatusCode::CREATED,
        service::create_task(store, now, user_id, group_id, payload).await,
    )
}

/// POST /tasks/{id}/move
pub async fn move_task(
    store: &dyn DocumentStore,
    user_id: &str,
    task_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let payload: MoveTaskPayload = match parse_body(body) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    respond(StatusCode::OK, service::move_task(store, user_id, task_id, payload.position).await)
}

/// POST /tasks/{id}/complete - check-off without a focus session, no XP
pub async fn complete_task(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
    user_id: &str,
    task_id: &str,
) -> Result<Response<Body>, Error> {
    respond(StatusCode::OK, service::complete_task(store, now, user_id, task_id).await)
}

/// DELETE /tasks/{id}
pub async fn delete_task(
    store: &dyn DocumentStore,
    user_id: &str,
    task_id: &str,
) -> Result<Response<Body>, Error> {
    respond_empty(service::delete_task(store, user_id, task_id).await)
}

/// POST /batches
pub async fn create_batch(
    store: &dyn DocumentStore,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let payload: CreateBatchPayload = match parse_body(body) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    respond(StatusCode::CREATED, service::create_batch(store, user_id, payload).await)
}

/// DELETE /batches/{id}
pub async fn ungroup_batch(
    store: &dyn DocumentStore,
    user_id: &str,
    batch_id: &str,
) -> Result<Response<Body>, Error> {
    respond(StatusCode::OK, service::ungroup_batch(store, user_id, batch_id).await)
}

/// POST /chains
pub async fn create_chain(
    store: &dyn DocumentStore,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let payload: CreateChainPayload = match parse_body(body) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    respond(StatusCode::CREATED, service::create_chain(store, user_id, payload).await)
}

/// DELETE /chains/{id}
pub async fn ungroup_chain(
    store: &dyn DocumentStore,
    user_id: &str,
    chain_id: &str,
) -> Result<Response<Body>, Error> {
    respond(StatusCode::OK, service::ungroup_chain(store, user_id, chain_id).await)
}
