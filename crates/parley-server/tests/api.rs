use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use parley_api::auth::{AppState, AppStateInner, AuthConfig};
use parley_db::Database;
use parley_gateway::dispatcher::Dispatcher;
use parley_server::build_router;
use parley_types::events::GatewayEvent;

fn test_state() -> AppState {
    Arc::new(AppStateInner {
        db: Database::open_in_memory().expect("in-memory db"),
        dispatcher: Dispatcher::new(),
        config: AuthConfig {
            jwt_secret: "test-secret".into(),
            // Minimum bcrypt cost keeps the suite fast.
            bcrypt_cost: 4,
            secure_cookies: false,
        },
    })
}

fn test_app() -> Router {
    build_router(test_state())
}

type Jar = HashMap<String, String>;

/// Fold a response's Set-Cookie headers into the client-side jar, dropping
/// cleared cookies.
fn absorb_cookies(jar: &mut Jar, res: &Response<Body>) {
    for value in res.headers().get_all(header::SET_COOKIE) {
        let Ok(s) = value.to_str() else { continue };
        let Some(pair) = s.split(';').next() else { continue };
        let Some((name, value)) = pair.split_once('=') else { continue };
        if value.is_empty() {
            jar.remove(name);
        } else {
            jar.insert(name.to_string(), value.to_string());
        }
    }
}

fn cookie_header(jar: &Jar) -> String {
    jar.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

async fn request(
    app: &Router,
    method: &str,
    path: &str,
    jar: Option<&Jar>,
    csrf: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(jar) = jar {
        builder = builder.header(header::COOKIE, cookie_header(jar));
    }
    if let Some(token) = csrf {
        builder = builder.header("x-csrf-token", token);
    }
    let req = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    app.clone().oneshot(req).await.expect("response")
}

async fn body_json(res: Response<Body>) -> Value {
    let bytes = res.into_body().collect().await.expect("body").to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

fn signup_body(full_name: &str, username: &str, gender: &str) -> Value {
    json!({
        "fullName": full_name,
        "username": username,
        "password": "password1",
        "confirmPassword": "password1",
        "gender": gender,
    })
}

/// Sign up a user and return (jar, user id).
async fn signup(app: &Router, full_name: &str, username: &str, gender: &str) -> (Jar, Uuid) {
    let res = request(
        app,
        "POST",
        "/api/auth/signup",
        None,
        None,
        Some(signup_body(full_name, username, gender)),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let mut jar = Jar::new();
    absorb_cookies(&mut jar, &res);

    let body = body_json(res).await;
    let id: Uuid = body["id"].as_str().expect("id").parse().expect("uuid");
    (jar, id)
}

/// Send with the double-submit pair taken straight from the jar: the
/// XSRF-TOKEN cookie value echoed in the header.
async fn send_message(app: &Router, jar: &Jar, peer: Uuid, text: &str) -> Response<Body> {
    let token = jar.get("XSRF-TOKEN").expect("csrf token cookie").clone();
    request(
        app,
        "POST",
        &format!("/api/messages/send/{peer}"),
        Some(jar),
        Some(&token),
        Some(json!({ "message": text })),
    )
    .await
}

#[tokio::test]
async fn signup_issues_credentials_and_projection() {
    let app = test_app();
    let res = request(
        &app,
        "POST",
        "/api/auth/signup",
        None,
        None,
        Some(signup_body("Jane Doe", "jane_doe", "female")),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let mut jar = Jar::new();
    absorb_cookies(&mut jar, &res);
    assert!(jar.contains_key("jwt"));
    assert!(jar.contains_key("XSRF-TOKEN"));
    assert!(jar.contains_key("_csrf"));

    let body = body_json(res).await;
    assert_eq!(body["fullName"], "Jane Doe");
    assert_eq!(body["username"], "jane_doe");
    let pic = body["profilePic"].as_str().expect("profilePic");
    assert!(pic.contains("girl"));
    assert!(pic.contains("jane_doe"));
}

#[tokio::test]
async fn duplicate_username_conflicts_after_trim() {
    let app = test_app();
    signup(&app, "Jane Doe", "jane_doe", "female").await;

    let res = request(
        &app,
        "POST",
        "/api/auth/signup",
        None,
        None,
        Some(signup_body("Other Jane", "  jane_doe  ", "female")),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await, json!({ "error": "Username already exists" }));
}

#[tokio::test]
async fn signup_validation_failures() {
    let app = test_app();

    let mut short_password = signup_body("Jane Doe", "jane_doe", "female");
    short_password["password"] = json!("short");
    short_password["confirmPassword"] = json!("short");
    let res = request(&app, "POST", "/api/auth/signup", None, None, Some(short_password)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await, json!({ "error": "Invalid input fields" }));

    let mut mismatched = signup_body("Jane Doe", "jane_doe", "female");
    mismatched["confirmPassword"] = json!("password2");
    let res = request(&app, "POST", "/api/auth/signup", None, None, Some(mismatched)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await, json!({ "error": "Passwords do not match" }));
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let app = test_app();
    signup(&app, "Jane Doe", "jane_doe", "female").await;

    let wrong_password = request(
        &app,
        "POST",
        "/api/auth/login",
        None,
        None,
        Some(json!({ "username": "jane_doe", "password": "wrongpass" })),
    )
    .await;
    assert_eq!(wrong_password.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(wrong_password).await,
        json!({ "error": "Invalid username or password" })
    );

    let unknown_user = request(
        &app,
        "POST",
        "/api/auth/login",
        None,
        None,
        Some(json!({ "username": "nobody_here", "password": "wrongpass" })),
    )
    .await;
    assert_eq!(unknown_user.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(unknown_user).await,
        json!({ "error": "Invalid username or password" })
    );
}

#[tokio::test]
async fn login_succeeds_with_correct_password() {
    let app = test_app();
    let (_, id) = signup(&app, "Jane Doe", "jane_doe", "female").await;

    let res = request(
        &app,
        "POST",
        "/api/auth/login",
        None,
        None,
        Some(json!({ "username": "jane_doe", "password": "password1" })),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    let mut jar = Jar::new();
    absorb_cookies(&mut jar, &res);
    assert!(jar.contains_key("jwt"));

    let body = body_json(res).await;
    assert_eq!(body["id"], id.to_string());
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let app = test_app();
    let res = request(&app, "GET", "/api/users", None, None, None).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn send_without_csrf_header_is_forbidden() {
    let app = test_app();
    let (jane_jar, _) = signup(&app, "Jane Doe", "jane_doe", "female").await;
    let (_, john_id) = signup(&app, "John Doe", "john_doe", "male").await;

    // Valid session, no anti-forgery header.
    let res = request(
        &app,
        "POST",
        &format!("/api/messages/send/{john_id}"),
        Some(&jane_jar),
        None,
        Some(json!({ "message": "hi" })),
    )
    .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(res).await, json!({ "error": "Invalid CSRF token" }));
}

#[tokio::test]
async fn send_with_mismatched_csrf_header_is_forbidden() {
    let app = test_app();
    let (jane_jar, _) = signup(&app, "Jane Doe", "jane_doe", "female").await;
    let (_, john_id) = signup(&app, "John Doe", "john_doe", "male").await;

    let res = request(
        &app,
        "POST",
        &format!("/api/messages/send/{john_id}"),
        Some(&jane_jar),
        Some("salt.bogus-tag"),
        Some(json!({ "message": "hi" })),
    )
    .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(res).await, json!({ "error": "Invalid CSRF token" }));
}

#[tokio::test]
async fn csrf_token_endpoint_issues_usable_tokens() {
    let app = test_app();
    let (mut jane_jar, _) = signup(&app, "Jane Doe", "jane_doe", "female").await;
    let (_, john_id) = signup(&app, "John Doe", "john_doe", "male").await;

    let res = request(&app, "GET", "/api/csrf-token", Some(&jane_jar), None, None).await;
    assert_eq!(res.status(), StatusCode::OK);
    absorb_cookies(&mut jane_jar, &res);
    let token = body_json(res).await["csrfToken"]
        .as_str()
        .expect("csrfToken")
        .to_string();

    let res = request(
        &app,
        "POST",
        &format!("/api/messages/send/{john_id}"),
        Some(&jane_jar),
        Some(&token),
        Some(json!({ "message": "hello john" })),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn message_flow_appends_in_order_for_both_views() {
    let app = test_app();
    let (jane_jar, jane_id) = signup(&app, "Jane Doe", "jane_doe", "female").await;
    let (john_jar, john_id) = signup(&app, "John Doe", "john_doe", "male").await;

    let res = send_message(&app, &jane_jar, john_id, "first").await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let first = body_json(res).await;
    assert_eq!(first["senderId"], jane_id.to_string());
    assert_eq!(first["receiverId"], john_id.to_string());
    assert_eq!(first["message"], "first");

    let res = send_message(&app, &john_jar, jane_id, "second").await;
    assert_eq!(res.status(), StatusCode::CREATED);

    // Both participants see the same ordered history.
    for (jar, peer) in [(&jane_jar, john_id), (&john_jar, jane_id)] {
        let res = request(
            &app,
            "GET",
            &format!("/api/messages/{peer}"),
            Some(jar),
            None,
            None,
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let history = body_json(res).await;
        let bodies: Vec<&str> = history
            .as_array()
            .expect("array")
            .iter()
            .map(|m| m["message"].as_str().expect("message"))
            .collect();
        assert_eq!(bodies, ["first", "second"]);
    }
}

#[tokio::test]
async fn history_is_empty_when_no_conversation_exists() {
    let app = test_app();
    let (jane_jar, _) = signup(&app, "Jane Doe", "jane_doe", "female").await;
    let (_, john_id) = signup(&app, "John Doe", "john_doe", "male").await;

    let res = request(
        &app,
        "GET",
        &format!("/api/messages/{john_id}"),
        Some(&jane_jar),
        None,
        None,
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await, json!([]));
}

#[tokio::test]
async fn empty_message_body_is_rejected() {
    let app = test_app();
    let (jane_jar, _) = signup(&app, "Jane Doe", "jane_doe", "female").await;
    let (_, john_id) = signup(&app, "John Doe", "john_doe", "male").await;

    let token = jane_jar.get("XSRF-TOKEN").expect("token").clone();
    let res = request(
        &app,
        "POST",
        &format!("/api/messages/send/{john_id}"),
        Some(&jane_jar),
        Some(&token),
        Some(json!({ "message": "   " })),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await, json!({ "error": "Message cannot be empty" }));
}

#[tokio::test]
async fn send_to_unknown_recipient_is_rejected() {
    let app = test_app();
    let (jane_jar, _) = signup(&app, "Jane Doe", "jane_doe", "female").await;

    let res = send_message(&app, &jane_jar, Uuid::new_v4(), "hello?").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await, json!({ "error": "Recipient not found" }));
}

#[tokio::test]
async fn live_push_reaches_registered_receiver() {
    let state = test_state();
    let app = build_router(state.clone());

    let (jane_jar, jane_id) = signup(&app, "Jane Doe", "jane_doe", "female").await;
    let (_, john_id) = signup(&app, "John Doe", "john_doe", "male").await;

    // Stand in for John's live connection.
    let (_conn, mut john_rx) = state.dispatcher.register(john_id).await;

    let res = send_message(&app, &jane_jar, john_id, "ping").await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let GatewayEvent::NewMessage(pushed) = john_rx.try_recv().expect("one push") else {
        panic!("expected NewMessage");
    };
    assert_eq!(pushed.sender_id, jane_id);
    assert_eq!(pushed.message, "ping");
    assert!(john_rx.try_recv().is_err(), "exactly one push");
}

#[tokio::test]
async fn message_is_retrievable_even_when_receiver_is_offline() {
    let app = test_app();
    let (jane_jar, jane_id) = signup(&app, "Jane Doe", "jane_doe", "female").await;
    let (john_jar, john_id) = signup(&app, "John Doe", "john_doe", "male").await;

    let res = send_message(&app, &jane_jar, john_id, "offline delivery").await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = request(
        &app,
        "GET",
        &format!("/api/messages/{jane_id}"),
        Some(&john_jar),
        None,
        None,
    )
    .await;
    let history = body_json(res).await;
    assert_eq!(history[0]["message"], "offline delivery");
}

#[tokio::test]
async fn users_listing_excludes_the_caller() {
    let app = test_app();
    let (jane_jar, _) = signup(&app, "Jane Doe", "jane_doe", "female").await;
    signup(&app, "John Doe", "john_doe", "male").await;

    let res = request(&app, "GET", "/api/users", Some(&jane_jar), None, None).await;
    assert_eq!(res.status(), StatusCode::OK);
    let users = body_json(res).await;
    let names: Vec<&str> = users
        .as_array()
        .expect("array")
        .iter()
        .map(|u| u["username"].as_str().expect("username"))
        .collect();
    assert_eq!(names, ["john_doe"]);
}

#[tokio::test]
async fn logout_clears_credential_cookies() {
    let app = test_app();
    let (mut jane_jar, _) = signup(&app, "Jane Doe", "jane_doe", "female").await;

    let res = request(&app, "POST", "/api/auth/logout", Some(&jane_jar), None, None).await;
    assert_eq!(res.status(), StatusCode::OK);
    absorb_cookies(&mut jane_jar, &res);
    assert!(!jane_jar.contains_key("jwt"));
    assert!(!jane_jar.contains_key("XSRF-TOKEN"));
    assert!(!jane_jar.contains_key("_csrf"));
}
