//! Operator console API: conversation list, history, replies, media,
//! read receipts, handoff switch and the live event stream.

use std::convert::Infallible;
use std::time::Duration;

use agroquote_agent::{ConversationHistory, HandoffMode, MediaUpload, RuntimeError};
use agroquote_core::domain::session::ConversationSummary;
use agroquote_core::errors::{ApplicationError, InterfaceError};
use axum::{
    extract::{
        rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, Query, Request, State,
    },
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::{debug, warn};

use crate::http::AppState;

const MAX_FILES: usize = 10;
const MEDIA_BODY_LIMIT: usize = 64 * 1024 * 1024;
const KEEP_ALIVE: Duration = Duration::from_secs(15);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/wa/agent/convos", get(conversations))
        .route("/wa/agent/history/{id}", get(history))
        .route("/wa/agent/send", post(send))
        .route(
            "/wa/agent/send-media",
            post(send_media).layer(DefaultBodyLimit::max(MEDIA_BODY_LIMIT)),
        )
        .route("/wa/agent/read", post(read))
        .route("/wa/agent/handoff", post(handoff))
        .route("/wa/agent/stream", get(stream))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_agent_token))
        .with_state(state)
}

/// Failure answered to the console: `400 {error}` for bad input, `500
/// {ok: false}` for everything else.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self(ApplicationError::InvalidRequest(message.into()).into_interface("agent-api"))
    }
}

impl From<RuntimeError> for ApiError {
    fn from(error: RuntimeError) -> Self {
        Self(ApplicationError::from(error).into_interface("agent-api"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self.0 {
            InterfaceError::BadRequest { message, .. } => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            other => {
                warn!(event_name = "agent_api.request_failed", error = %other, "operator request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "ok": false, "error": other.user_message() })),
                )
                    .into_response()
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    token: Option<String>,
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

/// Bearer check on every route. The event stream also takes `?token=`
/// because `EventSource` cannot set headers.
async fn require_agent_token(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    request: Request,
    next: Next,
) -> Response {
    let bearer = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .map(str::to_owned);
    let presented = bearer.or_else(|| {
        if request.uri().path().ends_with("/stream") {
            query.token
        } else {
            None
        }
    });

    let expected = digest(state.secrets.agent_token.expose_secret());
    match presented {
        Some(token) if digest(&token) == expected => next.run(request).await,
        _ => {
            debug!(event_name = "agent_api.unauthorized", path = %request.uri().path(), "rejected operator request");
            (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" }))).into_response()
        }
    }
}

pub async fn conversations(State(state): State<AppState>) -> Json<Vec<ConversationSummary>> {
    Json(state.runtime.conversations(Utc::now()).await)
}

pub async fn history(State(state): State<AppState>, Path(id): Path<String>) -> Json<ConversationHistory> {
    Json(state.runtime.history(id.trim(), Utc::now()).await)
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct HandoffResponse {
    pub ok: bool,
    pub human: bool,
    pub until: Option<DateTime<Utc>>,
}

pub async fn send(
    State(state): State<AppState>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<HandoffResponse>, ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let handoff = state.runtime.agent_send(&body.to, &body.text, Utc::now()).await?;
    Ok(Json(HandoffResponse { ok: true, human: handoff.human, until: handoff.until }))
}

#[derive(Debug, Serialize)]
pub struct MediaResponse {
    pub ok: bool,
    pub sent: usize,
}

pub async fn send_media(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<MediaResponse>, ApiError> {
    let mut to = String::new();
    let mut caption = None;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|error| ApiError::bad_request(error.body_text()))? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "to" => to = field.text().await.map_err(|error| ApiError::bad_request(error.body_text()))?,
            "caption" => {
                caption = Some(field.text().await.map_err(|error| ApiError::bad_request(error.body_text()))?)
            }
            "files" | "files[]" => {
                if files.len() == MAX_FILES {
                    return Err(ApiError::bad_request(format!("at most {MAX_FILES} files per request")));
                }
                let filename = field.file_name().unwrap_or("archivo").to_string();
                let mime_type = field.content_type().unwrap_or("application/octet-stream").to_string();
                let bytes = field.bytes().await.map_err(|error| ApiError::bad_request(error.body_text()))?;
                files.push(MediaUpload { bytes: bytes.to_vec(), filename, mime_type });
            }
            _ => {}
        }
    }

    let sent = state.runtime.agent_send_media(&to, files, caption.as_deref(), Utc::now()).await?;
    Ok(Json(MediaResponse { ok: true, sent }))
}

#[derive(Debug, Deserialize)]
pub struct ReadRequest {
    #[serde(default)]
    pub to: String,
}

pub async fn read(
    State(state): State<AppState>,
    body: Result<Json<ReadRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    state.runtime.mark_read(&body.to, Utc::now()).await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct HandoffRequest {
    #[serde(default)]
    pub to: String,
    pub mode: HandoffMode,
}

pub async fn handoff(
    State(state): State<AppState>,
    body: Result<Json<HandoffRequest>, JsonRejection>,
) -> Result<Json<HandoffResponse>, ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let handoff = state.runtime.set_handoff(&body.to, body.mode, Utc::now()).await?;
    Ok(Json(HandoffResponse { ok: true, human: handoff.human, until: handoff.until }))
}

pub async fn stream(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.runtime.events().subscribe();
    let events = BroadcastStream::new(receiver).filter_map(|item| match item {
        Ok(event) => Some(Ok(Event::default().event(event.name()).data(event.payload().to_string()))),
        Err(lagged) => {
            debug!(event_name = "agent_api.stream_lagged", error = %lagged, "observer fell behind");
            None
        }
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE).text("keep-alive"))
}

#[cfg(test)]
mod tests {
    use agroquote_agent::LiveEvent;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::Utc;
    use tokio_stream::StreamExt;
    use tower::ServiceExt;

    use crate::agent_api::router;
    use crate::http::test_support::{bearer, fixture, json_body, AGENT_TOKEN};

    const CUSTOMER: &str = "59171234567";

    fn json_post(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::AUTHORIZATION, bearer())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn requests_without_bearer_are_unauthorized() {
        let fixture = fixture(None);

        let missing = router(fixture.state.clone())
            .oneshot(Request::get("/wa/agent/convos").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let wrong = router(fixture.state.clone())
            .oneshot(
                Request::get("/wa/agent/convos")
                    .header(header::AUTHORIZATION, "Bearer nope")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn query_token_only_opens_the_stream() {
        let fixture = fixture(None);

        let convos = router(fixture.state.clone())
            .oneshot(
                Request::get(format!("/wa/agent/convos?token={AGENT_TOKEN}"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(convos.status(), StatusCode::UNAUTHORIZED);

        let stream = router(fixture.state.clone())
            .oneshot(
                Request::get(format!("/wa/agent/stream?token={AGENT_TOKEN}"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(stream.status(), StatusCode::OK);
        assert_eq!(
            stream.headers().get(header::CONTENT_TYPE).and_then(|value| value.to_str().ok()),
            Some("text/event-stream")
        );
    }

    #[tokio::test]
    async fn send_mutes_and_lists_the_conversation() {
        let fixture = fixture(None);
        let app = router(fixture.state.clone());

        let response = app
            .clone()
            .oneshot(json_post("/wa/agent/send", &format!(r#"{{"to":"{CUSTOMER}","text":"Hola, soy Carla"}}"#)))
            .await
            .expect("send response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["human"], true);

        let convos = app
            .oneshot(
                Request::get("/wa/agent/convos")
                    .header(header::AUTHORIZATION, bearer())
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("convos response");
        let list = json_body(convos).await;
        assert_eq!(list[0]["id"], CUSTOMER);
        assert_eq!(list[0]["human"], true);
        assert_eq!(fixture.channel.delivered_to(CUSTOMER).await.len(), 1);
    }

    #[tokio::test]
    async fn send_without_recipient_is_a_bad_request() {
        let fixture = fixture(None);

        let response = router(fixture.state.clone())
            .oneshot(json_post("/wa/agent/send", r#"{"text":"Hola"}"#))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap_or_default().contains("recipient"));
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let fixture = fixture(None);

        let response = router(fixture.state.clone())
            .oneshot(json_post("/wa/agent/handoff", r#"{"to":"591","mode":"robot"}"#))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn channel_failure_answers_internal_error() {
        let fixture = fixture(None);
        fixture.channel.fail_for(CUSTOMER).await;

        let response = router(fixture.state.clone())
            .oneshot(json_post("/wa/agent/send", &format!(r#"{{"to":"{CUSTOMER}","text":"Hola"}}"#)))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["ok"], false);
    }

    #[tokio::test]
    async fn handoff_to_bot_announces_and_history_shows_it() {
        let fixture = fixture(None);
        let app = router(fixture.state.clone());

        let response = app
            .clone()
            .oneshot(json_post("/wa/agent/handoff", &format!(r#"{{"to":"{CUSTOMER}","mode":"human"}}"#)))
            .await
            .expect("handoff response");
        assert_eq!(json_body(response).await["human"], true);

        let response = app
            .clone()
            .oneshot(json_post("/wa/agent/handoff", &format!(r#"{{"to":"{CUSTOMER}","mode":"bot"}}"#)))
            .await
            .expect("handoff response");
        assert_eq!(json_body(response).await["human"], false);

        let history = app
            .oneshot(
                Request::get(format!("/wa/agent/history/{CUSTOMER}"))
                    .header(header::AUTHORIZATION, bearer())
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("history response");
        let body = json_body(history).await;
        assert_eq!(body["human"], false);
        let memory = body["memory"].as_array().cloned().unwrap_or_default();
        assert_eq!(memory.len(), 3);
        assert_eq!(memory[2]["role"], "bot");
    }

    #[tokio::test]
    async fn read_clears_unread_and_emits_event() {
        let fixture = fixture(None);
        let mut events = fixture.state.runtime.events().subscribe();

        let response = router(fixture.state.clone())
            .oneshot(json_post("/wa/agent/read", &format!(r#"{{"to":"{CUSTOMER}"}}"#)))
            .await
            .expect("read response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(fixture.state.runtime.history(CUSTOMER, Utc::now()).await.unread, 0);
        assert_eq!(events.try_recv().expect("read event"), LiveEvent::Read { id: CUSTOMER.to_string() });
    }

    #[tokio::test]
    async fn send_media_uploads_each_file() {
        let fixture = fixture(None);
        let boundary = "agroquote-boundary";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"to\"\r\n\r\n{CUSTOMER}\r\n\
             --{boundary}\r\nContent-Disposition: form-data; name=\"caption\"\r\n\r\nFicha técnica\r\n\
             --{boundary}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"foto.jpg\"\r\n\
             Content-Type: image/jpeg\r\n\r\nJPEGDATA\r\n\
             --{boundary}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"ficha.pdf\"\r\n\
             Content-Type: application/pdf\r\n\r\n%PDF-1.4\r\n\
             --{boundary}--\r\n"
        );

        let response = router(fixture.state.clone())
            .oneshot(
                Request::post("/wa/agent/send-media")
                    .header(header::AUTHORIZATION, bearer())
                    .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("media response");

        assert_eq!(response.status(), StatusCode::OK);
        let payload = json_body(response).await;
        assert_eq!(payload["sent"], 2);
        assert_eq!(fixture.channel.uploads().await.len(), 2);
        assert!(fixture.state.runtime.history(CUSTOMER, Utc::now()).await.human);
    }

    #[tokio::test]
    async fn stream_delivers_published_events() {
        let fixture = fixture(None);
        let response = router(fixture.state.clone())
            .oneshot(
                Request::get("/wa/agent/stream")
                    .header(header::AUTHORIZATION, bearer())
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("stream response");
        let mut body = response.into_body().into_data_stream();

        fixture.state.runtime.events().publish(LiveEvent::Read { id: CUSTOMER.to_string() });

        let frame = body.next().await.expect("frame").expect("frame ok");
        let chunk = String::from_utf8(frame.to_vec()).expect("utf8");
        assert!(chunk.contains("event: read"));
        assert!(chunk.contains(CUSTOMER));
    }
}
