//! Response helpers shared by every `http.rs` handler module.

use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CoreError, CoreResult};

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(body)?.into())
        .map_err(Box::new)?)
}

pub fn no_content() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .body(Body::Empty)
        .map_err(Box::new)?)
}

pub fn status_for(err: &CoreError) -> StatusCode {
    match err {
        CoreError::InvalidUsername(_) | CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        CoreError::NotHost
        | CoreError::NotAMember
        | CoreError::HostCannotBeKicked
        | CoreError::DefaultGroupProtected => StatusCode::FORBIDDEN,
        CoreError::UserNotFound(_) | CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::AlreadyTaken(_)
        | CoreError::AlreadyResolved
        | CoreError::AlreadyMember
        | CoreError::Conflict(_) => StatusCode::CONFLICT,
        CoreError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::Malformed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_response(err: &CoreError) -> Result<Response<Body>, Error> {
    let status = status_for(err);
    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
    }
    json_response(
        status,
        &serde_json::json!({ "error": err.code(), "message": err.to_string() }),
    )
}

/// Serializes a service result: `Ok` with `status`, `Err` through `error_response`.
pub fn respond<T: Serialize>(status: StatusCode, result: CoreResult<T>) -> Result<Response<Body>, Error> {
    match result {
        Ok(value) => json_response(status, &value),
        Err(e) => error_response(&e),
    }
}

pub fn respond_empty(result: CoreResult<()>) -> Result<Response<Body>, Error> {
    match result {
        Ok(()) => no_content(),
        Err(e) => error_response(&e),
    }
}

pub fn parse_body<T: DeserializeOwned>(body: &[u8]) -> CoreResult<T> {
    serde_json::from_slice(body).map_err(|e| CoreError::InvalidInput(format!("Invalid request body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_client_statuses() {
        assert_eq!(status_for(&CoreError::AlreadyTaken("amy".into())), StatusCode::CONFLICT);
        assert_eq!(status_for(&CoreError::UserNotFound("bob".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&CoreError::AlreadyResolved), StatusCode::CONFLICT);
        assert_eq!(status_for(&CoreError::HostCannotBeKicked), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for(&CoreError::StoreUnavailable("timeout".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn error_body_carries_code_and_message() {
        let resp = error_response(&CoreError::AlreadyTaken("amy".into())).unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body = match resp.body() {
            Body::Text(text) => text.clone(),
            other => panic!("unexpected body {:?}", other),
        };
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["error"], "AlreadyTaken");
    }

    #[test]
    fn malformed_bodies_are_invalid_input() {
        let parsed: CoreResult<serde_json::Value> = parse_body(b"{not json");
        assert!(matches!(parsed, Err(CoreError::InvalidInput(_))));
    }
}
