use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::chat::{DeliveryError, OutboundMessage};
use crate::server::AppState;

/// Inbound Zoom chatbot event envelope.
#[derive(Debug, Deserialize, Default)]
pub struct InboundEvent {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub payload: Option<EventPayload>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_jid: Option<String>,
    #[serde(default)]
    pub robot_jid: Option<String>,
}

/// A `bot_notification` with every field needed to reply.
#[derive(Debug, PartialEq)]
pub struct BotCommand {
    pub cmd: String,
    pub user_name: Option<String>,
    pub user_jid: String,
    pub robot_jid: String,
}

impl InboundEvent {
    /// Returns the command only for a fully populated `bot_notification`.
    /// Empty strings count as absent.
    pub fn into_command(self) -> Option<BotCommand> {
        if self.event.as_deref() != Some("bot_notification") {
            return None;
        }
        let payload = self.payload?;
        let present = |v: Option<String>| v.filter(|s| !s.is_empty());
        Some(BotCommand {
            cmd: present(payload.cmd)?,
            user_name: present(payload.user_name),
            user_jid: present(payload.user_jid)?,
            robot_jid: present(payload.robot_jid)?,
        })
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum WebhookAck {
    /// Mirrors the message that was delivered
    Dispatched(OutboundMessage),
    Received {
        status: &'static str,
        message: &'static str,
    },
}

impl WebhookAck {
    fn received() -> Self {
        WebhookAck::Received {
            status: "ok",
            message: "Event received",
        }
    }
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("verification token mismatch")]
    Unauthorized,
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        match self {
            WebhookError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "Unauthorized" })),
            )
                .into_response(),
            WebhookError::Delivery(e) => {
                error!("Webhook handling failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({
                        "error": "Internal server error",
                        "message": e.to_string(),
                    })),
                )
                    .into_response()
            }
        }
    }
}

/// Byte-for-byte compare of the Authorization header against the configured
/// verification token. An unset token matches nothing.
fn is_authorized(headers: &HeaderMap, expected: Option<&str>) -> bool {
    match (headers.get(AUTHORIZATION), expected) {
        (Some(given), Some(expected)) => given.as_bytes() == expected.as_bytes(),
        _ => false,
    }
}

/// `POST /webhook`
#[tracing::instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookError> {
    debug!("Webhook request: {}", String::from_utf8_lossy(&body));

    if !is_authorized(&headers, state.config.zoom.verification_token.as_deref()) {
        warn!("Verification token mismatch");
        return Err(WebhookError::Unauthorized);
    }

    let event: InboundEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            info!("Unparseable webhook body ({}), acknowledging", e);
            InboundEvent::default()
        }
    };

    let Some(command) = event.into_command() else {
        info!("Non-bot event or incomplete payload received");
        return Ok(Json(WebhookAck::received()));
    };

    let user_name = command
        .user_name
        .as_deref()
        .unwrap_or(&state.config.bot.default_user_name);
    let reply = state.commands.process(&command.cmd, user_name);

    let outbound = OutboundMessage {
        to_jid: command.user_jid,
        message: reply,
        robot_jid: command.robot_jid,
    };
    state.sender.send(&outbound).await?;

    info!("Handled command '{}' for {}", command.cmd, user_name);
    Ok(Json(WebhookAck::Dispatched(outbound)))
}
