//! Double-submit anti-forgery protocol.
//!
//! A per-session random secret lives in the script-inaccessible `_csrf`
//! cookie. Tokens derived from it are handed to the client in the
//! script-readable `XSRF-TOKEN` cookie (and via GET /api/csrf-token), and
//! must be echoed back in a request header on every mutating call. The guard
//! recomputes the expected MAC from the secret; being able to echo the token
//! proves the request originated from script with cookie access.

use axum::Json;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use parley_types::api::CsrfTokenResponse;

use crate::auth::AppState;
use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

pub const CSRF_SECRET_COOKIE: &str = "_csrf";
pub const CSRF_TOKEN_COOKIE: &str = "XSRF-TOKEN";

/// Anti-forgery credentials expire well before the session does.
const CSRF_TTL_MINUTES: i64 = 60;

/// Random per-session secret. Never exposed to script.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    B64.encode(bytes)
}

/// Token = `{salt}.{b64url(HMAC-SHA256(secret, salt))}`. The salt makes each
/// minted token distinct while keeping it verifiable from the secret alone.
pub fn mint_token(secret: &str) -> String {
    let mut salt_bytes = [0u8; 8];
    rand::rng().fill_bytes(&mut salt_bytes);
    let salt = B64.encode(salt_bytes);
    let tag = sign(secret, &salt);
    format!("{salt}.{tag}")
}

/// Verify a token against the session secret. The MAC comparison is
/// constant-time.
pub fn verify_token(secret: &str, token: &str) -> bool {
    let Some((salt, tag)) = token.split_once('.') else {
        return false;
    };
    let Ok(tag_bytes) = B64.decode(tag) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(salt.as_bytes());
    mac.verify_slice(&tag_bytes).is_ok()
}

fn sign(secret: &str, salt: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(salt.as_bytes());
    B64.encode(mac.finalize().into_bytes())
}

pub fn secret_cookie(secure: bool, secret: String) -> Cookie<'static> {
    Cookie::build((CSRF_SECRET_COOKIE, secret))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .path("/")
        .max_age(time::Duration::minutes(CSRF_TTL_MINUTES))
        .build()
}

/// Script-readable on purpose: the client reads this cookie and echoes its
/// value in the `x-csrf-token` request header.
pub fn token_cookie(secure: bool, token: String) -> Cookie<'static> {
    Cookie::build((CSRF_TOKEN_COOKIE, token))
        .http_only(false)
        .same_site(SameSite::Lax)
        .secure(secure)
        .path("/")
        .max_age(time::Duration::minutes(CSRF_TTL_MINUTES))
        .build()
}

/// GET /api/csrf-token — ensure a session secret exists and return a fresh
/// token derived from it.
pub async fn csrf_token(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let existing = jar
        .get(CSRF_SECRET_COOKIE)
        .map(|c| c.value().to_string());

    let (jar, secret) = match existing {
        Some(secret) => (jar, secret),
        None => {
            let secret = generate_secret();
            let jar = jar.add(secret_cookie(state.config.secure_cookies, secret.clone()));
            (jar, secret)
        }
    };

    let token = mint_token(&secret);
    let jar = jar.add(token_cookie(state.config.secure_cookies, token.clone()));

    (jar, Json(CsrfTokenResponse { csrf_token: token }))
}

/// Anti-forgery guard, layered once over the mutating authenticated routes
/// rather than duplicated per handler. Safe methods pass through; anything
/// else must carry a header token that verifies against the secret cookie.
pub async fn require_csrf(jar: CookieJar, req: Request, next: Next) -> Result<Response, ApiError> {
    if req.method().is_safe() {
        return Ok(next.run(req).await);
    }

    let secret = jar
        .get(CSRF_SECRET_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(ApiError::Forbidden)?;
    let token = header_token(req.headers()).ok_or(ApiError::Forbidden)?;

    if !verify_token(&secret, &token) {
        return Err(ApiError::Forbidden);
    }

    Ok(next.run(req).await)
}

/// The reference client sends `csrf-token`; `x-csrf-token` is accepted too.
fn header_token(headers: &HeaderMap) -> Option<String> {
    ["x-csrf-token", "csrf-token"].iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    })
}
