use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::session::Referral;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundKind {
    Text,
    Interactive,
    Media,
    Unsupported,
}

/// A button or list row the customer tapped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub id: String,
    pub title: String,
}

/// Transport-neutral inbound message, produced by the channel normalizer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub conversation_id: String,
    pub message_id: Option<String>,
    pub kind: InboundKind,
    pub text: Option<String>,
    pub selection: Option<Selection>,
    pub referral: Option<Referral>,
    pub profile_name: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    pub fn text(conversation_id: impl Into<String>, text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            message_id: None,
            kind: InboundKind::Text,
            text: Some(text.into()),
            selection: None,
            referral: None,
            profile_name: None,
            received_at: at,
        }
    }

    pub fn selection(
        conversation_id: impl Into<String>,
        id: impl Into<String>,
        title: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            message_id: None,
            kind: InboundKind::Interactive,
            text: None,
            selection: Some(Selection { id: id.into(), title: title.into() }),
            referral: None,
            profile_name: None,
            received_at: at,
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_referral(mut self, referral: Referral) -> Self {
        self.referral = Some(referral);
        self
    }

    /// What goes into the conversation log for this event.
    pub fn transcript(&self) -> String {
        if let Some(selection) = &self.selection {
            return selection.title.clone();
        }
        match (&self.text, self.kind) {
            (Some(text), _) if !text.trim().is_empty() => text.clone(),
            (_, InboundKind::Media) => "[adjunto]".to_string(),
            (_, InboundKind::Unsupported) => "[mensaje no soportado]".to_string(),
            _ => String::new(),
        }
    }
}
