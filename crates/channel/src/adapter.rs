use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use agroquote_core::dialogue::outbound::{Choice, ListRow, MediaSource, OutboundMessage};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("channel rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("unexpected channel response: {0}")]
    Response(String),
    #[error("send queue closed before delivery")]
    QueueClosed,
}

/// A messaging network the assistant can talk through.
///
/// Every method is a single network call. Callers decide ordering and
/// pacing; see [`crate::SendQueue`].
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send_text(&self, to: &str, body: &str) -> Result<(), ChannelError>;

    async fn send_buttons(&self, to: &str, body: &str, choices: &[Choice]) -> Result<(), ChannelError>;

    async fn send_list(
        &self,
        to: &str,
        body: &str,
        button: &str,
        rows: &[ListRow],
    ) -> Result<(), ChannelError>;

    async fn send_image(
        &self,
        to: &str,
        source: &MediaSource,
        caption: Option<&str>,
    ) -> Result<(), ChannelError>;

    async fn send_document(
        &self,
        to: &str,
        source: &MediaSource,
        filename: &str,
        caption: Option<&str>,
    ) -> Result<(), ChannelError>;

    /// Uploads a file and returns the channel's media id.
    async fn upload_media(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> Result<String, ChannelError>;

    async fn mark_read(&self, message_id: &str) -> Result<(), ChannelError>;

    async fn send(&self, to: &str, message: &OutboundMessage) -> Result<(), ChannelError> {
        match message {
            OutboundMessage::Text { body } => self.send_text(to, body).await,
            OutboundMessage::Buttons { body, choices } => self.send_buttons(to, body, choices).await,
            OutboundMessage::List { body, button, rows } => {
                self.send_list(to, body, button, rows).await
            }
            OutboundMessage::Image { source, caption } => {
                self.send_image(to, source, caption.as_deref()).await
            }
            OutboundMessage::Document { source, filename, caption } => {
                self.send_document(to, source, filename, caption.as_deref()).await
            }
        }
    }
}

/// Accepts everything and sends nothing. Used when no access token is set.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopChannel;

#[async_trait]
impl ChannelAdapter for NoopChannel {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn send_text(&self, _to: &str, _body: &str) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn send_buttons(&self, _to: &str, _body: &str, _choices: &[Choice]) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn send_list(
        &self,
        _to: &str,
        _body: &str,
        _button: &str,
        _rows: &[ListRow],
    ) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn send_image(
        &self,
        _to: &str,
        _source: &MediaSource,
        _caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn send_document(
        &self,
        _to: &str,
        _source: &MediaSource,
        _filename: &str,
        _caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn upload_media(
        &self,
        _bytes: Vec<u8>,
        filename: &str,
        _mime_type: &str,
    ) -> Result<String, ChannelError> {
        Ok(format!("noop-{filename}"))
    }

    async fn mark_read(&self, _message_id: &str) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivered {
    pub to: String,
    pub message: OutboundMessage,
}

#[derive(Default)]
struct Recorded {
    delivered: Vec<Delivered>,
    read: Vec<String>,
    uploads: Vec<String>,
    failing: HashSet<String>,
}

/// In-memory adapter that keeps everything it was asked to send.
#[derive(Default)]
pub struct RecordingChannel {
    state: Mutex<Recorded>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends to `to` fail with a 400 until [`Self::recover`] is called.
    pub async fn fail_for(&self, to: &str) {
        self.state.lock().await.failing.insert(to.to_string());
    }

    pub async fn recover(&self, to: &str) {
        self.state.lock().await.failing.remove(to);
    }

    pub async fn delivered(&self) -> Vec<Delivered> {
        self.state.lock().await.delivered.clone()
    }

    pub async fn delivered_to(&self, to: &str) -> Vec<OutboundMessage> {
        self.state
            .lock()
            .await
            .delivered
            .iter()
            .filter(|delivery| delivery.to == to)
            .map(|delivery| delivery.message.clone())
            .collect()
    }

    pub async fn read_marks(&self) -> Vec<String> {
        self.state.lock().await.read.clone()
    }

    pub async fn uploads(&self) -> Vec<String> {
        self.state.lock().await.uploads.clone()
    }

    async fn record(&self, to: &str, message: OutboundMessage) -> Result<(), ChannelError> {
        let mut state = self.state.lock().await;
        if state.failing.contains(to) {
            return Err(ChannelError::Rejected {
                status: 400,
                body: format!("recipient {to} unavailable"),
            });
        }
        state.delivered.push(Delivered { to: to.to_string(), message });
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for RecordingChannel {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send_text(&self, to: &str, body: &str) -> Result<(), ChannelError> {
        self.record(to, OutboundMessage::text(body)).await
    }

    async fn send_buttons(&self, to: &str, body: &str, choices: &[Choice]) -> Result<(), ChannelError> {
        self.record(to, OutboundMessage::Buttons { body: body.to_string(), choices: choices.to_vec() })
            .await
    }

    async fn send_list(
        &self,
        to: &str,
        body: &str,
        button: &str,
        rows: &[ListRow],
    ) -> Result<(), ChannelError> {
        self.record(
            to,
            OutboundMessage::List {
                body: body.to_string(),
                button: button.to_string(),
                rows: rows.to_vec(),
            },
        )
        .await
    }

    async fn send_image(
        &self,
        to: &str,
        source: &MediaSource,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        self.record(
            to,
            OutboundMessage::Image { source: source.clone(), caption: caption.map(str::to_string) },
        )
        .await
    }

    async fn send_document(
        &self,
        to: &str,
        source: &MediaSource,
        filename: &str,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        self.record(
            to,
            OutboundMessage::Document {
                source: source.clone(),
                filename: filename.to_string(),
                caption: caption.map(str::to_string),
            },
        )
        .await
    }

    async fn upload_media(
        &self,
        _bytes: Vec<u8>,
        filename: &str,
        _mime_type: &str,
    ) -> Result<String, ChannelError> {
        let mut state = self.state.lock().await;
        state.uploads.push(filename.to_string());
        Ok(format!("media-{}", state.uploads.len()))
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), ChannelError> {
        self.state.lock().await.read.push(message_id.to_string());
        Ok(())
    }
}
