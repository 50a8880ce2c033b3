//! Operator takeover of a conversation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use agroquote_core::dialogue::intents::requests_billing_details;
use agroquote_core::domain::session::{MemoryEntry, Role, Session};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffMode {
    Human,
    Bot,
}

/// Mode after a change, as broadcast to observers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandoffState {
    pub human: bool,
    pub until: Option<DateTime<Utc>>,
}

/// What an operator action did to the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandoffOutcome {
    pub state: HandoffState,
    /// System line added to the conversation log.
    pub note: MemoryEntry,
    /// Text the customer should receive, if any.
    pub announce: Option<String>,
}

pub struct HandoffController {
    mute_for: Duration,
    billing_capture_for: Duration,
}

impl HandoffController {
    pub fn new(mute_for: Duration, billing_capture_for: Duration) -> Self {
        Self { mute_for, billing_capture_for }
    }

    pub fn mute_for(&self) -> Duration {
        self.mute_for
    }

    fn mute_hours(&self) -> i64 {
        self.mute_for.num_hours().max(1)
    }

    pub fn set_mode(&self, session: &mut Session, mode: HandoffMode, now: DateTime<Utc>) -> HandoffOutcome {
        match mode {
            HandoffMode::Human => {
                let until = now + self.mute_for;
                session.mute_until(until);
                let note = session.remember(
                    Role::System,
                    format!("⏸️ Bot pausado por agente ({}h).", self.mute_hours()),
                    now,
                );
                HandoffOutcome { state: HandoffState { human: true, until: Some(until) }, note, announce: None }
            }
            HandoffMode::Bot => {
                session.unmute();
                let note = session.remember(Role::System, "▶️ Bot reactivado por agente.", now);
                HandoffOutcome {
                    state: HandoffState { human: false, until: None },
                    note,
                    announce: Some("He reactivado el *asistente automático*.".to_string()),
                }
            }
        }
    }

    /// An operator message pauses the bot. Asking for invoice and pickup
    /// data also opens the billing capture window.
    pub fn agent_sent(&self, session: &mut Session, text: &str, now: DateTime<Utc>) -> HandoffState {
        let until = now + self.mute_for;
        session.mute_until(until);
        if requests_billing_details(text) {
            session.meta.billing_capture_until = Some(now + self.billing_capture_for);
        }
        HandoffState { human: true, until: Some(until) }
    }

    /// Operator media pauses the bot like a text would.
    pub fn agent_sent_media(&self, session: &mut Session, now: DateTime<Utc>) -> HandoffState {
        let until = now + self.mute_for;
        session.mute_until(until);
        HandoffState { human: true, until: Some(until) }
    }
}
