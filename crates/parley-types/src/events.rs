use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::MessageResponse;

/// Events pushed to clients over the WebSocket. The wire is push-only;
/// clients never send commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum GatewayEvent {
    /// Server confirms the connection is associated with a user.
    Ready { user_id: Uuid },

    /// A message addressed to this client was just stored.
    NewMessage(MessageResponse),
}
