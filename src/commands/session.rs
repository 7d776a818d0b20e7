//! JSON message surface: `{"action": ..., "data": ...}` in, a JSON object
//! carrying a `success` flag out.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::coordinator::CoordinatorHandle;
use crate::models::media::{FormatKind, VideoIdentity};
use crate::platforms::traits::DownloadHandle;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "camelCase")]
pub enum InboundMessage {
    IdentityDetected(VideoIdentity),
    QueryState,
    #[serde(rename_all = "camelCase")]
    RequestDownload { kind: FormatKind, format_id: String },
    DownloadInstructions {
        #[serde(default)]
        kind: Option<FormatKind>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadStarted {
    pub handle: DownloadHandle,
}

pub async fn handle_message(coordinator: &CoordinatorHandle, message: InboundMessage) -> Value {
    match message {
        InboundMessage::IdentityDetected(identity) => {
            coordinator.identity_detected(identity).await;
            json!({ "success": true })
        }
        InboundMessage::QueryState => respond(coordinator.query().await),
        InboundMessage::RequestDownload { kind, format_id } => respond(
            coordinator
                .dispatch(&format_id, kind)
                .await
                .map(|handle| DownloadStarted { handle }),
        ),
        InboundMessage::DownloadInstructions { kind } => respond(
            coordinator
                .instructions(kind.unwrap_or(FormatKind::Video))
                .await,
        ),
    }
}

/// Same as [`handle_message`] for a raw JSON text; the reply is JSON text too.
pub async fn handle_raw(coordinator: &CoordinatorHandle, raw: &str) -> String {
    let reply = match serde_json::from_str::<InboundMessage>(raw) {
        Ok(message) => handle_message(coordinator, message).await,
        Err(e) => {
            tracing::debug!("[commands] rejected message: {}", e);
            failure(format!("invalid message: {}", e))
        }
    };
    reply.to_string()
}

fn respond<T: Serialize, E: Display>(result: Result<T, E>) -> Value {
    match result {
        Ok(payload) => match serde_json::to_value(payload) {
            Ok(Value::Object(mut map)) => {
                map.insert("success".into(), Value::Bool(true));
                Value::Object(map)
            }
            Ok(other) => json!({ "success": true, "data": other }),
            Err(e) => failure(format!("Serialize: {}", e)),
        },
        Err(e) => failure(e.to_string()),
    }
}

fn failure(error: String) -> Value {
    json!({ "success": false, "error": error })
}
