use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use tracing::error;
use uuid::Uuid;

use parley_db::models::MessageRow;
use parley_types::api::{Claims, MessageResponse, SendMessageRequest};
use parley_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::error::ApiError;

/// POST /api/messages/send/{peer_id} — find or create the pair's
/// conversation, append the message, and push it live to the receiver if
/// they are connected.
pub async fn send_message(
    State(state): State<AppState>,
    Path(peer_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let body = req.message.trim().to_string();
    if body.is_empty() {
        return Err(ApiError::Validation("Message cannot be empty"));
    }

    let sender_id = claims.sub;
    if peer_id == sender_id {
        return Err(ApiError::Validation("Cannot send a message to yourself"));
    }

    let message_id = Uuid::new_v4();
    let candidate_conversation_id = Uuid::new_v4();
    let now = Utc::now();

    // Two-step local saga without a cross-record transaction: the message
    // row is written first (independently valid), the conversation sequence
    // second. An append failure fails the whole call and can leave the
    // message row unindexed.
    let peer_found = {
        let state = state.clone();
        let body = body.clone();
        let created_at = now.to_rfc3339();
        tokio::task::spawn_blocking(move || -> anyhow::Result<bool> {
            if state.db.get_user_by_id(&peer_id.to_string())?.is_none() {
                return Ok(false);
            }
            let conversation_id = state.db.find_or_create_conversation(
                &candidate_conversation_id.to_string(),
                &sender_id.to_string(),
                &peer_id.to_string(),
            )?;
            state.db.insert_message(
                &message_id.to_string(),
                &sender_id.to_string(),
                &peer_id.to_string(),
                &body,
                &created_at,
            )?;
            state
                .db
                .append_to_conversation(&conversation_id, &message_id.to_string())?;
            Ok(true)
        })
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::from)?
    };
    if !peer_found {
        return Err(ApiError::Validation("Recipient not found"));
    }

    let message = MessageResponse {
        id: message_id,
        sender_id,
        receiver_id: peer_id,
        message: body,
        created_at: now,
    };

    // Best-effort live push, supplementary to durable storage. No receiver
    // connected means no action; history remains the fallback.
    state
        .dispatcher
        .send_to_user(peer_id, GatewayEvent::NewMessage(message.clone()))
        .await;

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/messages/{peer_id} — ordered history with the peer, `[]` when no
/// conversation exists yet.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(peer_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;

    let rows = {
        let state = state.clone();
        tokio::task::spawn_blocking(move || {
            state
                .db
                .conversation_messages(&user_id.to_string(), &peer_id.to_string())
        })
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::from)?
    };

    let messages = rows
        .into_iter()
        .map(row_to_response)
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(ApiError::from)?;

    Ok(Json(messages))
}

fn row_to_response(row: MessageRow) -> anyhow::Result<MessageResponse> {
    Ok(MessageResponse {
        id: row.id.parse()?,
        sender_id: row.sender_id.parse()?,
        receiver_id: row.receiver_id.parse()?,
        message: row.body,
        created_at: row.created_at.parse::<DateTime<Utc>>()?,
    })
}
