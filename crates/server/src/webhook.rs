use std::sync::Arc;

use agroquote_channel::{normalize_webhook, verify_handshake, verify_signature, HandshakeParams};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::http::AppState;

const SIGNATURE_HEADER: &str = "x-hub-signature-256";

pub fn router(state: AppState) -> Router {
    Router::new().route("/wa/webhook", get(handshake).post(receive)).with_state(state)
}

pub async fn handshake(State(state): State<AppState>, Query(params): Query<HandshakeParams>) -> Response {
    match verify_handshake(&params, &state.secrets.verify_token) {
        Ok(challenge) => {
            info!(event_name = "ingress.whatsapp.handshake_accepted", "webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        }
        Err(error) => {
            warn!(event_name = "ingress.whatsapp.handshake_rejected", error = %error, "webhook handshake rejected");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// Always answers 200; rejected payloads are dropped here. Processing runs
/// after the response in its own task.
pub async fn receive(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    if let Some(secret) = &state.secrets.app_secret {
        let signature = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
        if let Err(error) = verify_signature(secret, &body, signature) {
            warn!(
                event_name = "ingress.whatsapp.signature_rejected",
                correlation_id = "unknown",
                error = %error,
                "payload dropped"
            );
            return StatusCode::OK;
        }
    }

    let events = match normalize_webhook(&body, Utc::now()) {
        Ok(events) => events,
        Err(error) => {
            warn!(
                event_name = "ingress.whatsapp.malformed_payload",
                correlation_id = "unknown",
                error = %error,
                "payload dropped"
            );
            return StatusCode::OK;
        }
    };
    if events.is_empty() {
        debug!(event_name = "ingress.whatsapp.no_messages", "status callback acknowledged");
        return StatusCode::OK;
    }

    let runtime = Arc::clone(&state.runtime);
    tokio::spawn(async move {
        for event in events {
            info!(
                event_name = "ingress.whatsapp.message_received",
                conversation_id = %event.conversation_id,
                correlation_id = event.message_id.as_deref().unwrap_or("unknown"),
                "inbound message"
            );
            runtime.handle_inbound(&event, Utc::now()).await;
        }
    });
    StatusCode::OK
}
