use lambda_http::{http::StatusCode, Body, Error, Response};

use super::model::{ProfileView, SignUpPayload, UpdateProfilePayload, UsernameAvailability};
use super::service;
use crate::clock::{Clock, WeekBoundary};
use crate::error::CoreError;
use crate::http::{error_response, parse_body, respond};
use crate::store::DocumentStore;

/// POST /users - create profile + username claim after the auth signup
pub async fn sign_up(
    store: &dyn DocumentStore,
    clock: &dyn Clock,
    week: WeekBoundary,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let payload: SignUpPayload = match parse_body(body) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    let result = service::sign_up(store, clock.now(), week, user_id, payload)
        .await
        .map(ProfileView::from);
    respond(StatusCode::CREATED, result)
}

/// GET /users/me
pub async fn get_me(store: &dyn DocumentStore, user_id: &str) -> Result<Response<Body>, Error> {
    let result = service::get_profile(store, user_id).await.map(ProfileView::from);
    respond(StatusCode::OK, result)
}

/// PATCH /users/me
pub async fn update_me(
    store: &dyn DocumentStore,
    user_id: &str,
    body: &[u8],
) -> Result<Response<Body>, Error> {
    let payload: UpdateProfilePayload = match parse_body(body) {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    let result = match payload.display_name {
        Some(name) => service::update_display_name(store, user_id, &name).await,
        None => service::get_profile(store, user_id).await,
    };
    respond(StatusCode::OK, result.map(ProfileView::from))
}

/// GET /usernames/{name}
pub async fn username_availability(
    store: &dyn DocumentStore,
    name: &str,
) -> Result<Response<Body>, Error> {
    let result = match service::is_available(store, name).await {
        Ok(available) => Ok(UsernameAvailability {
            username: name.trim().to_lowercase(),
            available,
        }),
        // An invalid name can never be claimed.
        Err(CoreError::InvalidUsername(_)) => Ok(UsernameAvailability {
            username: name.trim().to_lowercase(),
            available: false,
        }),
        Err(e) => Err(e),
    };
    respond(StatusCode::OK, result)
}
