use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use parley_db::Database;
use parley_gateway::dispatcher::Dispatcher;
use parley_types::api::{Claims, LoginRequest, SignupRequest, UserResponse};

use crate::csrf;
use crate::error::ApiError;
use crate::middleware::SESSION_COOKIE;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub dispatcher: Dispatcher,
    pub config: AuthConfig,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub bcrypt_cost: u32,
    pub secure_cookies: bool,
}

const SESSION_TTL_DAYS: i64 = 15;

/// bcrypt hash of "password" at cost 10. Verified against when a login names
/// an unknown user, so the absent-user path costs the same as a real verify.
const DUMMY_HASH: &str = "$2a$10$N9qo8uLOickgx2ZMRZoMyeIjZAgcfl7p92ldGxad68LJZdL17lhWy";

fn valid_username(username: &str) -> bool {
    let username = username.trim();
    (3..=30).contains(&username.len())
        && username
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
}

fn valid_full_name(full_name: &str) -> bool {
    let len = full_name.trim().chars().count();
    (3..=100).contains(&len)
}

pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !valid_full_name(&req.full_name) || !valid_username(&req.username) || req.password.len() < 8
    {
        return Err(ApiError::Validation("Invalid input fields"));
    }
    if req.password != req.confirm_password {
        return Err(ApiError::Validation("Passwords do not match"));
    }

    let username = req.username.trim().to_string();
    let full_name = req.full_name.trim().to_string();

    let existing = {
        let state = state.clone();
        let username = username.clone();
        tokio::task::spawn_blocking(move || state.db.get_user_by_username(&username))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal
            })?
            .map_err(ApiError::from)?
    };
    if existing.is_some() {
        return Err(ApiError::Conflict);
    }

    // bcrypt is CPU-bound; keep it off the async runtime so one hash cannot
    // stall unrelated connections.
    let hash = {
        let cost = state.config.bcrypt_cost;
        let password = req.password.clone();
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal
            })?
            .map_err(|e| ApiError::from(anyhow::Error::from(e)))?
    };

    let user_id = Uuid::new_v4();
    let profile_pic = req.gender.avatar_url(&username);

    let created = {
        let state = state.clone();
        let username = username.clone();
        let full_name = full_name.clone();
        let profile_pic = profile_pic.clone();
        tokio::task::spawn_blocking(move || {
            state.db.create_user(
                &user_id.to_string(),
                &username,
                &full_name,
                &hash,
                req.gender.as_str(),
                &profile_pic,
            )
        })
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
    };
    if let Err(err) = created {
        // Two signups racing past the lookup: the UNIQUE constraint decides,
        // and the loser gets the same conflict as a plain duplicate.
        if parley_db::is_unique_violation(&err) {
            return Err(ApiError::Conflict);
        }
        return Err(err.into());
    }

    let jar = issue_credentials(jar, &state.config, user_id)?;

    Ok((
        StatusCode::CREATED,
        jar,
        Json(UserResponse {
            id: user_id,
            full_name,
            username,
            profile_pic,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !valid_username(&req.username) || req.password.is_empty() {
        return Err(ApiError::Auth);
    }

    let username = req.username.trim().to_string();
    let user = {
        let state = state.clone();
        tokio::task::spawn_blocking(move || state.db.get_user_by_username(&username))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal
            })?
            .map_err(ApiError::from)?
    };

    let stored_hash = user
        .as_ref()
        .map(|u| u.password.clone())
        .unwrap_or_else(|| DUMMY_HASH.to_string());
    let password_ok = {
        let password = req.password.clone();
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &stored_hash))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal
            })?
            .unwrap_or(false)
    };

    // Absent user and wrong password are indistinguishable to the caller.
    let Some(user) = user else {
        return Err(ApiError::Auth);
    };
    if !password_ok {
        return Err(ApiError::Auth);
    }

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| ApiError::from(anyhow::Error::from(e)))?;

    let jar = issue_credentials(jar, &state.config, user_id)?;

    Ok((
        jar,
        Json(UserResponse {
            id: user_id,
            full_name: user.full_name,
            username: user.username,
            profile_pic: user.profile_pic,
        }),
    ))
}

/// Clears the credential cookies. The signed session token itself stays
/// valid until its expiry: there is no server-side store to revoke it from.
pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    let jar = jar
        .remove(Cookie::build(SESSION_COOKIE).path("/").build())
        .remove(Cookie::build(csrf::CSRF_TOKEN_COOKIE).path("/").build())
        .remove(Cookie::build(csrf::CSRF_SECRET_COOKIE).path("/").build());

    (jar, Json(json!({ "message": "Logged out successfully" })))
}

/// Issue the session cookie plus a fresh anti-forgery secret/token pair.
fn issue_credentials(
    jar: CookieJar,
    config: &AuthConfig,
    user_id: Uuid,
) -> Result<CookieJar, ApiError> {
    let token = create_session_token(&config.jwt_secret, user_id)?;
    let secret = csrf::generate_secret();
    let csrf_token = csrf::mint_token(&secret);

    Ok(jar
        .add(session_cookie(config, token))
        .add(csrf::secret_cookie(config.secure_cookies, secret))
        .add(csrf::token_cookie(config.secure_cookies, csrf_token)))
}

pub fn create_session_token(secret: &str, user_id: Uuid) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user_id,
        exp: (chrono::Utc::now() + chrono::Duration::days(SESSION_TTL_DAYS)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::from(anyhow::Error::from(e)))
}

fn session_cookie(config: &AuthConfig, token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookies)
        .path("/")
        .max_age(time::Duration::days(SESSION_TTL_DAYS))
        .build()
}
