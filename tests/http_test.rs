//! HTTP routes and the gate middleware, driven through `oneshot`.

#![cfg(feature = "http")]

use axum::{
    Json, Router,
    body::Body,
    extract::Request,
    http::{Method, StatusCode, header},
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use gangway::http::{
    ImpersonationLayer, OperatorIdentity, OptionalImpersonation, SESSION_HEADER, router,
    security_router,
};
use gangway::testing::{Harness, OPERATOR, OTHER_OPERATOR, TENANT, USER};
use serde_json::{Value, json};
use tower::ServiceExt;

const OPERATOR_HEADER: &str = "x-operator-id";

async fn authenticate(mut req: Request, next: Next) -> Response {
    let operator = req
        .headers()
        .get(OPERATOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if let Some(operator) = operator {
        req.extensions_mut().insert(OperatorIdentity(operator));
    }
    next.run(req).await
}

async fn show_project(OptionalImpersonation(context): OptionalImpersonation) -> Json<Value> {
    Json(match context {
        Some(context) => json!({
            "impersonating": true,
            "tenant_id": context.tenant_id,
            "user_id": context.user_id,
        }),
        None => json!({ "impersonating": false }),
    })
}

async fn update_project() -> StatusCode {
    StatusCode::NO_CONTENT
}

fn app(h: &Harness) -> Router {
    let projects = Router::new()
        .route("/projects/{id}", get(show_project).put(update_project))
        .layer(ImpersonationLayer::new(h.gate.clone(), "projects"));

    Router::new()
        .merge(router(h.manager.clone()))
        .merge(security_router(h.manager.clone()))
        .merge(projects)
        .layer(middleware::from_fn(authenticate))
}

fn request(method: Method, uri: &str, operator: Option<&str>, body: Option<Value>) -> Request {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(operator) = operator {
        builder = builder.header(OPERATOR_HEADER, operator);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn with_session(mut req: Request, session_id: &str) -> Request {
    req.headers_mut()
        .insert(SESSION_HEADER, session_id.parse().unwrap());
    req
}

async fn send(app: &Router, req: Request) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn create_body(mode: &str, duration_minutes: u32) -> Value {
    json!({
        "tenant_id": TENANT,
        "user_id": USER,
        "mode": mode,
        "justification": { "type": "ticket", "text": "TICKET-42: customer cannot export" },
        "duration_minutes": duration_minutes,
    })
}

async fn create_session(app: &Router, mode: &str) -> String {
    let (status, body) = send(
        app,
        request(
            Method::POST,
            "/impersonation/sessions",
            Some(OPERATOR),
            Some(create_body(mode, 30)),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_create_view_only_session() {
    let h = Harness::new().await;
    let app = app(&h);

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/impersonation/sessions",
            Some(OPERATOR),
            Some(create_body("view_only", 30)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "active");
    assert_eq!(body["mode"], "view_only");
    assert_eq!(
        location,
        format!("/impersonation/sessions/{}", body["id"].as_str().unwrap())
    );

    let (status, view) = send(&app, request(Method::GET, &location, Some(OPERATOR), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "active");
}

#[tokio::test]
async fn test_routes_require_operator_identity() {
    let h = Harness::new().await;
    let app = app(&h);

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/impersonation/sessions",
            None,
            Some(create_body("view_only", 30)),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthenticated");
}

#[tokio::test]
async fn test_invalid_duration_is_bad_request() {
    let h = Harness::new().await;
    let app = app(&h);

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/impersonation/sessions",
            Some(OPERATOR),
            Some(create_body("view_only", 45_000)),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_duration");
    assert_eq!(h.store.session_count().await, 0);
}

#[tokio::test]
async fn test_second_session_conflicts() {
    let h = Harness::new().await;
    let app = app(&h);
    create_session(&app, "view_only").await;

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/impersonation/sessions",
            Some(OPERATOR),
            Some(create_body("view_only", 30)),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "concurrent_session_exists");
}

#[tokio::test]
async fn test_step_up_flow() {
    let h = Harness::new().await;
    let app = app(&h);
    let id = create_session(&app, "act_as").await;
    let step_up = format!("/impersonation/sessions/{id}/step-up");
    let verify = format!("/impersonation/sessions/{id}/step-up/verify");

    let (status, body) = send(
        &app,
        request(Method::GET, &format!("/impersonation/sessions/{id}"), Some(OPERATOR), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending_step_up");

    // Someone else's session.
    let (status, body) =
        send(&app, request(Method::POST, &step_up, Some(OTHER_OPERATOR), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "not_owner");

    let (status, body) = send(&app, request(Method::POST, &step_up, Some(OPERATOR), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["max_attempts"], 5);
    assert_eq!(body["data"]["remaining_attempts"], 5);

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &verify,
            Some(OPERATOR),
            Some(json!({ "code": h.wrong_totp_code() })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_code");

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &verify,
            Some(OPERATOR),
            Some(json!({ "code": h.totp_code(), "method": "totp" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Step-up verified");
    assert_eq!(body["data"]["status"], "active");

    // Act-as sessions may mutate.
    let (status, _) = send(
        &app,
        with_session(request(Method::PUT, "/projects/7", Some(OPERATOR), None), &id),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_backup_code_over_http() {
    let h = Harness::new().await;
    let app = app(&h);
    let id = create_session(&app, "act_as").await;

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &format!("/impersonation/sessions/{id}/step-up/verify"),
            Some(OPERATOR),
            Some(json!({
                "code": h.backup_codes.display_codes()[0],
                "method": "backup_code",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "active");
}

#[tokio::test]
async fn test_protected_route_runs_as_target() {
    let h = Harness::new().await;
    let app = app(&h);
    let id = create_session(&app, "view_only").await;

    let (status, body) = send(
        &app,
        with_session(request(Method::GET, "/projects/7", Some(OPERATOR), None), &id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["impersonating"], true);
    assert_eq!(body["tenant_id"], TENANT);
    assert_eq!(body["user_id"], USER);

    let (status, body) = send(
        &app,
        with_session(request(Method::PUT, "/projects/7", Some(OPERATOR), None), &id),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "read_only_session");

    // Without the header the request is the operator's own.
    let (status, body) =
        send(&app, request(Method::GET, "/projects/7", Some(OPERATOR), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["impersonating"], false);
}

#[tokio::test]
async fn test_bad_session_header_never_falls_back() {
    let h = Harness::new().await;
    let app = app(&h);

    let (status, body) = send(
        &app,
        with_session(request(Method::GET, "/projects/7", Some(OPERATOR), None), " "),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "session_invalid");

    let (status, body) = send(
        &app,
        with_session(
            request(Method::GET, "/projects/7", Some(OPERATOR), None),
            "imp_unknown",
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "session_invalid");

    // A presented session with no operator identity.
    let id = create_session(&app, "view_only").await;
    let (status, body) = send(
        &app,
        with_session(request(Method::GET, "/projects/7", None, None), &id),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthenticated");
}

#[tokio::test]
async fn test_revoke_cuts_off_protected_routes() {
    let h = Harness::new().await;
    let app = app(&h);
    let id = create_session(&app, "view_only").await;
    let project = || with_session(request(Method::GET, "/projects/7", Some(OPERATOR), None), &id);

    let (status, _) = send(&app, project()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &format!("/impersonation/sessions/{id}/revoke"),
            Some("sec-analyst-1"),
            Some(json!({ "reason": "" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");

    let (status, _) = send(
        &app,
        request(
            Method::POST,
            &format!("/impersonation/sessions/{id}/revoke"),
            Some("sec-analyst-1"),
            Some(json!({ "reason": "suspicious export volume" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, project()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "session_invalid");

    let session = h.manager.get_session(&id).await.unwrap();
    assert_eq!(
        session.revocation_reason.as_deref(),
        Some("suspicious export volume (by sec-analyst-1)")
    );
}

#[tokio::test]
async fn test_bulk_revoke_routes() {
    let h = Harness::new().await;
    let app = app(&h);
    create_session(&app, "view_only").await;

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &format!("/impersonation/tenants/{TENANT}/revoke"),
            Some("sec-analyst-1"),
            Some(json!({ "reason": "tenant incident" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], 1);

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &format!("/impersonation/operators/{OPERATOR}/revoke"),
            Some("sec-analyst-1"),
            Some(json!({ "reason": "offboarding" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], 0);
}

#[tokio::test]
async fn test_end_session_route() {
    let h = Harness::new().await;
    let app = app(&h);
    let id = create_session(&app, "view_only").await;
    let end = format!("/impersonation/sessions/{id}/end");

    let (status, body) = send(&app, request(Method::POST, &end, Some(OTHER_OPERATOR), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "not_owner");

    let (status, _) = send(&app, request(Method::POST, &end, Some(OPERATOR), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(
        &app,
        request(Method::GET, &format!("/impersonation/sessions/{id}"), Some(OPERATOR), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ended_by_operator");

    let (status, body) = send(&app, request(Method::POST, &end, Some(OPERATOR), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "session_not_active");
}

#[tokio::test]
async fn test_directory_routes_require_operator() {
    let h = Harness::new().await;
    let app = app(&h);

    let (status, body) = send(
        &app,
        request(Method::GET, "/impersonation/tenants", Some(OPERATOR), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = send(
        &app,
        request(
            Method::GET,
            &format!("/impersonation/tenants/{TENANT}/users"),
            Some(OPERATOR),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = send(
        &app,
        request(Method::GET, "/impersonation/tenants", Some("user-alice"), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "not_operator");
}
