use axum::extract::State;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use tracing::error;

use parley_types::api::{Claims, UserResponse};

use crate::auth::AppState;
use crate::error::ApiError;

/// GET /api/users — every other user's public projection, for the client's
/// contact sidebar.
pub async fn get_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = {
        let state = state.clone();
        let me = claims.sub.to_string();
        tokio::task::spawn_blocking(move || state.db.list_users_except(&me))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal
            })?
            .map_err(ApiError::from)?
    };

    let users = rows
        .into_iter()
        .map(|row| {
            Ok(UserResponse {
                id: row.id.parse()?,
                full_name: row.full_name,
                username: row.username,
                profile_pic: row.profile_pic,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(ApiError::from)?;

    Ok(Json(users))
}
