//! WhatsApp Cloud API adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use agroquote_core::config::WhatsAppConfig;
use agroquote_core::dialogue::outbound::{Choice, ListRow, MediaSource};

use crate::adapter::{ChannelAdapter, ChannelError};

const TEXT_MAX: usize = 4096;
const INTERACTIVE_BODY_MAX: usize = 1024;
const BUTTON_TITLE_MAX: usize = 20;
const LIST_TITLE_MAX: usize = 24;
const LIST_DESCRIPTION_MAX: usize = 72;
const CAPTION_MAX: usize = 1024;

/// Shortens `text` to at most `max` characters, marking the cut with `…`.
pub fn clamp(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}

fn cut(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn media_object(source: &MediaSource) -> Value {
    match source {
        MediaSource::Link { url } => json!({ "link": url }),
        MediaSource::MediaId { id } => json!({ "id": id }),
    }
}

pub fn text_payload(to: &str, body: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "text",
        "text": { "body": cut(body, TEXT_MAX), "preview_url": true }
    })
}

pub fn buttons_payload(to: &str, body: &str, choices: &[Choice]) -> Value {
    let buttons: Vec<Value> = choices
        .iter()
        .take(3)
        .map(|choice| {
            json!({
                "type": "reply",
                "reply": { "id": choice.id, "title": clamp(&choice.title, BUTTON_TITLE_MAX) }
            })
        })
        .collect();
    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "interactive",
        "interactive": {
            "type": "button",
            "body": { "text": cut(body, INTERACTIVE_BODY_MAX) },
            "action": { "buttons": buttons }
        }
    })
}

pub fn list_payload(to: &str, body: &str, button: &str, rows: &[ListRow]) -> Value {
    let rows: Vec<Value> = rows
        .iter()
        .take(10)
        .map(|row| {
            let mut value = json!({ "id": row.id, "title": clamp(&row.title, LIST_TITLE_MAX) });
            if let Some(description) = &row.description {
                value["description"] = json!(clamp(description, LIST_DESCRIPTION_MAX));
            }
            value
        })
        .collect();
    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "interactive",
        "interactive": {
            "type": "list",
            "body": { "text": cut(body, INTERACTIVE_BODY_MAX) },
            "action": {
                "button": cut(button, BUTTON_TITLE_MAX),
                "sections": [{ "title": clamp(button, LIST_TITLE_MAX), "rows": rows }]
            }
        }
    })
}

pub fn image_payload(to: &str, source: &MediaSource, caption: Option<&str>) -> Value {
    let mut image = media_object(source);
    if let Some(caption) = caption {
        image["caption"] = json!(cut(caption, CAPTION_MAX));
    }
    json!({ "messaging_product": "whatsapp", "to": to, "type": "image", "image": image })
}

pub fn document_payload(
    to: &str,
    source: &MediaSource,
    filename: &str,
    caption: Option<&str>,
) -> Value {
    let mut document = media_object(source);
    document["filename"] = json!(filename);
    if let Some(caption) = caption {
        document["caption"] = json!(cut(caption, CAPTION_MAX));
    }
    json!({ "messaging_product": "whatsapp", "to": to, "type": "document", "document": document })
}

pub fn read_payload(message_id: &str) -> Value {
    json!({ "messaging_product": "whatsapp", "status": "read", "message_id": message_id })
}

#[derive(Deserialize)]
struct UploadResponse {
    id: Option<String>,
}

pub struct WhatsAppChannel {
    client: Client,
    access_token: SecretString,
    messages_url: String,
    media_url: String,
}

impl WhatsAppChannel {
    pub fn from_config(config: &WhatsAppConfig) -> Result<Self, ChannelError> {
        let client =
            Client::builder().timeout(Duration::from_secs(config.timeout_secs.max(1))).build()?;
        let base = format!(
            "{}/{}/{}",
            config.api_base_url.trim_end_matches('/'),
            config.api_version.trim_matches('/'),
            config.phone_number_id
        );
        Ok(Self {
            client,
            access_token: config.access_token.clone(),
            messages_url: format!("{base}/messages"),
            media_url: format!("{base}/media"),
        })
    }

    pub fn messages_url(&self) -> &str {
        &self.messages_url
    }

    async fn post(&self, payload: Value) -> Result<(), ChannelError> {
        let response = self
            .client
            .post(&self.messages_url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Rejected { status: status.as_u16(), body: cut(&body, 500) });
        }
        debug!(event_name = "egress.whatsapp.accepted", status = status.as_u16(), "message accepted");
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for WhatsAppChannel {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    async fn send_text(&self, to: &str, body: &str) -> Result<(), ChannelError> {
        self.post(text_payload(to, body)).await
    }

    async fn send_buttons(&self, to: &str, body: &str, choices: &[Choice]) -> Result<(), ChannelError> {
        self.post(buttons_payload(to, body, choices)).await
    }

    async fn send_list(
        &self,
        to: &str,
        body: &str,
        button: &str,
        rows: &[ListRow],
    ) -> Result<(), ChannelError> {
        self.post(list_payload(to, body, button, rows)).await
    }

    async fn send_image(
        &self,
        to: &str,
        source: &MediaSource,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        self.post(image_payload(to, source, caption)).await
    }

    async fn send_document(
        &self,
        to: &str,
        source: &MediaSource,
        filename: &str,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        self.post(document_payload(to, source, filename, caption)).await
    }

    async fn upload_media(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> Result<String, ChannelError> {
        let part = Part::bytes(bytes).file_name(filename.to_string()).mime_str(mime_type)?;
        let form = Form::new()
            .text("messaging_product", "whatsapp")
            .text("type", mime_type.to_string())
            .part("file", part);

        let response = self
            .client
            .post(&self.media_url)
            .bearer_auth(self.access_token.expose_secret())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Rejected { status: status.as_u16(), body: cut(&body, 500) });
        }
        let uploaded: UploadResponse = response.json().await?;
        uploaded
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ChannelError::Response("media upload returned no id".to_string()))
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), ChannelError> {
        self.post(read_payload(message_id)).await
    }
}

#[cfg(test)]
mod tests {
    use agroquote_core::config::AppConfig;
    use agroquote_core::dialogue::outbound::{Choice, ListRow, MediaSource};

    use super::{buttons_payload, clamp, document_payload, list_payload, text_payload, WhatsAppChannel};

    #[test]
    fn clamp_marks_cut_titles() {
        assert_eq!(clamp("Fertilizantes", 20), "Fertilizantes");
        assert_eq!(clamp("Coadyuvantes y acondicionadores", 20), "Coadyuvantes y acon…");
        assert_eq!(clamp("Coadyuvantes y acondicionadores", 20).chars().count(), 20);
    }

    #[test]
    fn buttons_are_capped_at_three_with_short_titles() {
        let choices: Vec<Choice> = (0..4)
            .map(|index| Choice { id: format!("B{index}"), title: format!("Opción con título largo {index}") })
            .collect();
        let payload = buttons_payload("59170000001", "¿Seguimos?", &choices);

        let buttons = payload["interactive"]["action"]["buttons"].as_array().expect("buttons array");
        assert_eq!(buttons.len(), 3);
        assert_eq!(buttons[0]["reply"]["id"], "B0");
        assert!(buttons[0]["reply"]["title"].as_str().expect("title").chars().count() <= 20);
    }

    #[test]
    fn list_rows_keep_optional_descriptions() {
        let rows = vec![
            ListRow { id: "PROD_FB-01".to_string(), title: "Fertimax Boro".to_string(), description: None },
            ListRow {
                id: "PROD_SC-02".to_string(),
                title: "Sulfato Calcio".to_string(),
                description: Some("Acondicionador de suelo".to_string()),
            },
        ];
        let payload = list_payload("59170000001", "Elige un producto", "Ver productos", &rows);
        let rows = &payload["interactive"]["action"]["sections"][0]["rows"];

        assert!(rows[0].get("description").is_none());
        assert_eq!(rows[1]["description"], "Acondicionador de suelo");
        assert_eq!(payload["interactive"]["action"]["button"], "Ver productos");
    }

    #[test]
    fn text_and_document_payloads_match_cloud_api_shape() {
        let text = text_payload("59170000001", "Hola");
        assert_eq!(text["type"], "text");
        assert_eq!(text["text"]["body"], "Hola");

        let document = document_payload(
            "59170000001",
            &MediaSource::MediaId { id: "m-1".to_string() },
            "cotizacion.pdf",
            Some("Tu cotización"),
        );
        assert_eq!(document["document"]["id"], "m-1");
        assert_eq!(document["document"]["filename"], "cotizacion.pdf");
    }

    #[test]
    fn endpoint_joins_base_version_and_phone_id() {
        let mut config = AppConfig::default().whatsapp;
        config.api_base_url = "https://graph.facebook.com/".to_string();
        config.api_version = "v20.0".to_string();
        config.phone_number_id = "123456".to_string();

        let channel = WhatsAppChannel::from_config(&config).expect("build client");
        assert_eq!(channel.messages_url(), "https://graph.facebook.com/v20.0/123456/messages");
    }
}
