use axum::Router;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum_extra::extract::cookie::CookieJar;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use parley_api::auth::{self, AppState, AuthConfig};
use parley_api::error::ApiError;
use parley_api::middleware::{SESSION_COOKIE, decode_session, require_auth};
use parley_api::{csrf, messages, users};
use parley_gateway::connection;

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub auth: AuthConfig,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret =
            std::env::var("PARLEY_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
        let db_path = std::env::var("PARLEY_DB_PATH").unwrap_or_else(|_| "parley.db".into());
        let host = std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("PARLEY_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()?;
        let bcrypt_cost: u32 = std::env::var("PARLEY_BCRYPT_COST")
            .unwrap_or_else(|_| "10".into())
            .parse()?;
        let secure_cookies =
            std::env::var("PARLEY_ENV").is_ok_and(|env| env == "production");

        Ok(Self {
            host,
            port,
            db_path,
            auth: AuthConfig {
                jwt_secret,
                bcrypt_cost,
                secure_cookies,
            },
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/csrf-token", get(csrf::csrf_token))
        .with_state(state.clone());

    // The anti-forgery guard is layered once over the message routes — the
    // mutating authenticated namespace — not repeated per handler. The guard
    // itself lets safe methods through.
    let message_routes = Router::new()
        .route("/api/messages/send/{peer_id}", post(messages::send_message))
        .route("/api/messages/{peer_id}", get(messages::get_messages))
        .layer(axum::middleware::from_fn(csrf::require_csrf));

    let protected = Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/users", get(users::get_users))
        .merge(message_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ))
        .with_state(state.clone());

    let ws = Router::new().route("/ws", get(ws_upgrade)).with_state(state);

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(ws)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// The live transport authenticates from the same session cookie as the REST
/// surface, before the upgrade completes.
async fn ws_upgrade(
    State(state): State<AppState>,
    jar: CookieJar,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let token = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(ApiError::Unauthorized)?;
    let claims = decode_session(&token, &state.config.jwt_secret)?;

    let dispatcher = state.dispatcher.clone();
    Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, claims.sub)))
}
