use lambda_http::{
    http::{
        header::{HeaderValue, VARY},
        Method, StatusCode,
    },
    Body, Error, Request, Response,
};
use progression_block::http as progression;
use std::sync::Arc;
use taskgo_atoms::social::{self, InviteResponse};
use taskgo_atoms::{tasks, users};
use taskgo_shared::AppState;

fn with_cors_headers(mut resp: Response<Body>, request_origin: Option<&str>) -> Response<Body> {
    let headers = resp.headers_mut();
    headers.insert(
        "Access-Control-Allow-Origin",
        request_origin
            .and_then(|o| HeaderValue::from_str(o).ok())
            .unwrap_or_else(|| HeaderValue::from_static("*")),
    );
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET,POST,PATCH,DELETE,OPTIONS"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static("Content-Type,Authorization,X-User-Id"),
    );
    headers.append(VARY, HeaderValue::from_static("Origin"));

    resp
}

fn finalize_response(
    resp: Result<Response<Body>, Error>,
    request_origin: Option<&str>,
) -> Result<Response<Body>, Error> {
    resp.map(|r| with_cors_headers(r, request_origin))
}

fn json_error(status: StatusCode, message: &str) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(serde_json::json!({ "error": message }).to_string().into())
        .map_err(Box::new)?)
}

fn not_found() -> Result<Response<Body>, Error> {
    json_error(StatusCode::NOT_FOUND, "Not found")
}

/// Main Lambda handler - routes API Gateway requests to the domain handlers.
/// The authorizer in front of the API puts the caller's id in `X-User-Id`.
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    let body = event.body();
    let request_origin = event.headers().get("Origin").and_then(|v| v.to_str().ok());
    tracing::info!("API invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if *method == Method::OPTIONS {
        let resp = Response::builder()
            .status(StatusCode::OK)
            .body(Body::Empty)
            .map_err(Box::new)?;
        return Ok(with_cors_headers(resp, request_origin));
    }

    let store = state.store.as_ref();
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    // Username availability is public (sign-up form)
    if let (&Method::GET, ["usernames", name]) = (method, parts.as_slice()) {
        return finalize_response(users::http::username_availability(store, name).await, request_origin);
    }

    let user_id = match event
        .headers()
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        Some(id) => id.to_string(),
        None => {
            tracing::warn!("Rejected request without caller identity: {} {}", method, path);
            return finalize_response(
                json_error(StatusCode::UNAUTHORIZED, "Missing caller identity"),
                request_origin,
            );
        }
    };

    let now = state.clock.now();
    let week = state.config.week();
    let rules = state.rules();

    let resp = match (method, parts.as_slice()) {
        // --- PROFILE ---
        (&Method::POST, ["users"]) => {
            users::http::sign_up(store, state.clock.as_ref(), week, &user_id, body).await
        }
        (&Method::GET, ["users", "me"]) => users::http::get_me(store, &user_id).await,
        (&Method::PATCH, ["users", "me"]) => users::http::update_me(store, &user_id, body).await,

        // --- TASK GROUPS ---
        (&Method::GET, ["task-groups"]) => tasks::http::list_groups(store, &user_id).await,
        (&Method::POST, ["task-groups"]) => tasks::http::create_group(store, now, &user_id, body).await,
        (&Method::POST, ["task-groups", "reorder"]) => {
            tasks::http::reorder_groups(store, &user_id, body).await
        }
        (&Method::PATCH, ["task-groups", group_id]) => {
            tasks::http::rename_group(store, &user_id, group_id, body).await
        }
        (&Method::DELETE, ["task-groups", group_id]) => {
            tasks::http::delete_group(store, &user_id, group_id).await
        }
        (&Method::GET, ["task-groups", group_id, "tasks"]) => {
            tasks::http::list_tasks(store, &user_id, group_id).await
        }
        (&Method::POST, ["task-groups", group_id, "tasks"]) => {
            tasks::http::create_task(store, now, &user_id, group_id, body).await
        }
        (&Method::GET, ["task-groups", group_id, "queue"]) => {
            progression::task_go_queue(store, &user_id, group_id).await
        }

        // --- TASKS ---
        (&Method::POST, ["tasks", task_id, "move"]) => {
            tasks::http::move_task(store, &user_id, task_id, body).await
        }
        (&Method::POST, ["tasks", task_id, "complete"]) => {
            tasks::http::complete_task(store, now, &user_id, task_id).await
        }
        (&Method::DELETE, ["tasks", task_id]) => tasks::http::delete_task(store, &user_id, task_id).await,

        // --- BATCHES & CHAINS ---
        (&Method::POST, ["batches"]) => tasks::http::create_batch(store, &user_id, body).await,
        (&Method::DELETE, ["batches", batch_id]) => {
            tasks::http::ungroup_batch(store, &user_id, batch_id).await
        }
        (&Method::POST, ["chains"]) => tasks::http::create_chain(store, &user_id, body).await,
        (&Method::DELETE, ["chains", chain_id]) => {
            tasks::http::ungroup_chain(store, &user_id, chain_id).await
        }

        // --- FOCUS SESSIONS ---
        (&Method::POST, ["sessions", "complete"]) => {
            progression::complete_session(store, &rules, now, &user_id, body).await
        }
        (&Method::POST, ["sessions", "retry-award"]) => {
            progression::retry_award(store, &rules, now, &user_id, body).await
        }

        // --- SOCIAL GROUPS ---
        (&Method::GET, ["social-groups"]) => social::http::list_groups(store, &user_id).await,
        (&Method::POST, ["social-groups"]) => social::http::create_group(store, now, &user_id, body).await,
        (&Method::DELETE, ["social-groups", group_id]) => {
            social::http::dissolve_group(store, &user_id, group_id).await
        }
        (&Method::GET, ["social-groups", group_id, "leaderboard"]) => {
            social::http::leaderboard(store, &user_id, group_id).await
        }
        (&Method::POST, ["social-groups", group_id, "invites"]) => {
            social::http::invite(store, now, &user_id, group_id, body).await
        }
        (&Method::POST, ["social-groups", group_id, "leave"]) => {
            social::http::leave(store, &user_id, group_id).await
        }
        (&Method::DELETE, ["social-groups", group_id, "members", member_id]) => {
            social::http::kick(store, &user_id, group_id, member_id).await
        }

        // --- INVITES ---
        (&Method::GET, ["invites"]) => social::http::list_invites(store, &user_id).await,
        (&Method::POST, ["invites", invite_id, "accept"]) => {
            social::http::respond_to_invite(store, now, &user_id, invite_id, InviteResponse::Accept).await
        }
        (&Method::POST, ["invites", invite_id, "decline"]) => {
            social::http::respond_to_invite(store, now, &user_id, invite_id, InviteResponse::Decline).await
        }

        _ => {
            tracing::warn!("No route matched - Method: {} Path: {}", method, path);
            not_found()
        }
    };

    finalize_response(resp, request_origin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use taskgo_atoms::{FixedClock, MemoryStore};
    use taskgo_shared::Config;

    fn state() -> Arc<AppState> {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 14, 9, 0, 0).unwrap());
        Arc::new(AppState::new(
            Arc::new(MemoryStore::new()),
            Arc::new(clock),
            Config::default(),
        ))
    }

    fn request(method: &str, uri: &str, user: Option<&str>, body: &str) -> Request {
        let mut builder = lambda_http::http::Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("X-User-Id", user);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn json(resp: &Response<Body>) -> serde_json::Value {
        match resp.body() {
            Body::Text(text) => serde_json::from_str(text).unwrap(),
            Body::Binary(bytes) => serde_json::from_slice(bytes).unwrap(),
            Body::Empty => serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn sign_up_then_read_profile() {
        let state = state();
        let body = r#"{"email":"amy@example.com","username":"Amy_B"}"#;
        let resp = function_handler(request("POST", "/users", Some("u1"), body), state.clone())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = function_handler(request("GET", "/users/me", Some("u1"), ""), state.clone())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let profile = json(&resp);
        assert_eq!(profile["username"], "Amy_B");
        assert_eq!(profile["level"], 1);

        let resp = function_handler(request("GET", "/usernames/amy_b", None, ""), state)
            .await
            .unwrap();
        assert_eq!(json(&resp)["available"], false);
    }

    #[tokio::test]
    async fn taken_username_is_a_conflict() {
        let state = state();
        let body = r#"{"email":"a@example.com","username":"amy"}"#;
        function_handler(request("POST", "/users", Some("u1"), body), state.clone())
            .await
            .unwrap();
        let body = r#"{"email":"b@example.com","username":"AMY"}"#;
        let resp = function_handler(request("POST", "/users", Some("u2"), body), state)
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(json(&resp)["error"], "AlreadyTaken");
    }

    #[tokio::test]
    async fn requests_without_identity_are_rejected() {
        let resp = function_handler(request("GET", "/task-groups", None, ""), state())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_routes_and_preflight() {
        let state = state();
        let resp = function_handler(request("GET", "/nope", Some("u1"), ""), state.clone())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = function_handler(request("OPTIONS", "/users", None, ""), state)
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key("Access-Control-Allow-Methods"));
    }
}
