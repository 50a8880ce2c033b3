//! Normalizes WhatsApp webhook payloads into [`InboundEvent`]s.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use agroquote_core::domain::inbound::{InboundEvent, InboundKind, Selection};
use agroquote_core::domain::session::Referral;

#[derive(Debug, Default, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Default, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Default, Deserialize)]
struct Change {
    #[serde(default)]
    value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    contacts: Vec<Contact>,
    #[serde(default)]
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct Contact {
    #[serde(default)]
    wa_id: String,
    #[serde(default)]
    profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    from: String,
    id: Option<String>,
    timestamp: Option<String>,
    #[serde(rename = "type", default)]
    kind: String,
    text: Option<WireText>,
    interactive: Option<WireInteractive>,
    button: Option<WireButton>,
    referral: Option<WireReferral>,
}

#[derive(Debug, Deserialize)]
struct WireText {
    #[serde(default)]
    body: String,
}

#[derive(Debug, Deserialize)]
struct WireInteractive {
    button_reply: Option<WireReply>,
    list_reply: Option<WireReply>,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    id: String,
    #[serde(default)]
    title: String,
}

/// Template quick-reply buttons.
#[derive(Debug, Deserialize)]
struct WireButton {
    payload: Option<String>,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct WireReferral {
    headline: Option<String>,
    body: Option<String>,
    source_url: Option<String>,
    source_id: Option<String>,
}

fn digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

fn received_at(timestamp: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    timestamp
        .and_then(|raw| raw.parse::<i64>().ok())
        .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single())
        .unwrap_or(now)
}

fn selection(message: &WireMessage) -> Option<Selection> {
    if let Some(interactive) = &message.interactive {
        let reply = interactive.button_reply.as_ref().or(interactive.list_reply.as_ref())?;
        return Some(Selection { id: reply.id.clone(), title: reply.title.clone() });
    }
    message.button.as_ref().map(|button| Selection {
        id: button.payload.clone().unwrap_or_else(|| button.text.clone()),
        title: button.text.clone(),
    })
}

fn kind(message: &WireMessage, has_selection: bool) -> InboundKind {
    match message.kind.as_str() {
        "text" => InboundKind::Text,
        "interactive" | "button" if has_selection => InboundKind::Interactive,
        "image" | "document" | "audio" | "video" | "sticker" | "location" => InboundKind::Media,
        _ => InboundKind::Unsupported,
    }
}

/// Every customer message in the payload. Status callbacks and entries
/// without a sender yield nothing.
pub fn normalize_webhook(body: &[u8], now: DateTime<Utc>) -> Result<Vec<InboundEvent>, serde_json::Error> {
    let payload: WebhookPayload = serde_json::from_slice(body)?;
    let mut events = Vec::new();

    for change in payload.entry.into_iter().flat_map(|entry| entry.changes) {
        let value = change.value;
        for message in &value.messages {
            let raw_from = if message.from.is_empty() {
                value.contacts.first().map(|contact| contact.wa_id.as_str()).unwrap_or_default()
            } else {
                message.from.as_str()
            };
            let conversation_id = digits(raw_from);
            if conversation_id.is_empty() {
                continue;
            }

            let profile_name = value
                .contacts
                .iter()
                .find(|contact| digits(&contact.wa_id) == conversation_id)
                .or_else(|| value.contacts.first())
                .and_then(|contact| contact.profile.as_ref())
                .and_then(|profile| profile.name.clone())
                .filter(|name| !name.trim().is_empty());

            let selection = selection(message);
            let text = message
                .text
                .as_ref()
                .map(|text| text.body.trim().to_string())
                .filter(|body| !body.is_empty());
            let referral = message.referral.as_ref().map(|referral| Referral {
                headline: referral.headline.clone(),
                body: referral.body.clone(),
                source_url: referral.source_url.clone(),
                source_id: referral.source_id.clone(),
            });

            events.push(InboundEvent {
                conversation_id,
                message_id: message.id.clone(),
                kind: kind(message, selection.is_some()),
                text,
                selection,
                referral,
                profile_name,
                received_at: received_at(message.timestamp.as_deref(), now),
            });
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use agroquote_core::domain::inbound::InboundKind;

    use super::normalize_webhook;

    fn wrap(message: &str) -> String {
        format!(
            r#"{{"object":"whatsapp_business_account","entry":[{{"id":"1","changes":[{{"field":"messages","value":{{
                "messaging_product":"whatsapp",
                "contacts":[{{"wa_id":"59170000001","profile":{{"name":"Juan"}}}}],
                "messages":[{message}]
            }}}}]}}]}}"#
        )
    }

    #[test]
    fn text_message_becomes_text_event() {
        let body = wrap(
            r#"{"from":"+591 7000-0001","id":"wamid.A","timestamp":"1767225600","type":"text","text":{"body":"  Hola  "}}"#,
        );
        let events = normalize_webhook(body.as_bytes(), Utc::now()).expect("parse payload");

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.conversation_id, "59170000001");
        assert_eq!(event.message_id.as_deref(), Some("wamid.A"));
        assert_eq!(event.kind, InboundKind::Text);
        assert_eq!(event.text.as_deref(), Some("Hola"));
        assert_eq!(event.profile_name.as_deref(), Some("Juan"));
        assert_eq!(event.received_at, Utc.timestamp_opt(1_767_225_600, 0).single().expect("ts"));
    }

    #[test]
    fn button_and_list_replies_become_selections() {
        let button = wrap(
            r#"{"from":"59170000001","id":"wamid.B","type":"interactive","interactive":{"type":"button_reply","button_reply":{"id":"SEASON_VERANO","title":"Verano"}}}"#,
        );
        let list = wrap(
            r#"{"from":"59170000001","id":"wamid.C","type":"interactive","interactive":{"type":"list_reply","list_reply":{"id":"DPTO_LA_PAZ","title":"La Paz","description":"x"}}}"#,
        );

        let button = normalize_webhook(button.as_bytes(), Utc::now()).expect("parse button");
        let list = normalize_webhook(list.as_bytes(), Utc::now()).expect("parse list");

        assert_eq!(button[0].kind, InboundKind::Interactive);
        assert_eq!(button[0].selection.as_ref().map(|s| s.id.as_str()), Some("SEASON_VERANO"));
        assert_eq!(list[0].selection.as_ref().map(|s| s.title.as_str()), Some("La Paz"));
    }

    #[test]
    fn referral_and_media_are_carried() {
        let body = wrap(
            r#"{"from":"59170000001","id":"wamid.D","type":"image","image":{"id":"img"},"referral":{"headline":"Fertimax Boro","body":"Promo","source_url":"https://fb.test/ad"}}"#,
        );
        let events = normalize_webhook(body.as_bytes(), Utc::now()).expect("parse payload");

        assert_eq!(events[0].kind, InboundKind::Media);
        let referral = events[0].referral.as_ref().expect("referral present");
        assert_eq!(referral.headline.as_deref(), Some("Fertimax Boro"));
    }

    #[test]
    fn status_callbacks_and_garbage() {
        let statuses = r#"{"entry":[{"changes":[{"value":{"statuses":[{"id":"wamid.X","status":"read"}]}}]}]}"#;
        assert!(normalize_webhook(statuses.as_bytes(), Utc::now()).expect("parse statuses").is_empty());
        assert!(normalize_webhook(b"not json", Utc::now()).is_err());
    }
}
