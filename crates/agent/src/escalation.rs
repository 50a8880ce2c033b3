//! Advisor numbers, their 24 h messaging window and lead alerts.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

use agroquote_core::config::EscalationConfig;
use agroquote_core::dialogue::messages::{advisor_alert, AdvisorProfile, LeadAlert};

fn digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

pub struct AdvisorDesk {
    numbers: Vec<String>,
    profile: AdvisorProfile,
    window: Duration,
    last_heard: Mutex<Option<DateTime<Utc>>>,
}

impl AdvisorDesk {
    pub fn new(numbers: Vec<String>, profile: AdvisorProfile, window: Duration) -> Self {
        let numbers = numbers.iter().map(|number| digits(number)).filter(|number| !number.is_empty()).collect();
        Self { numbers, profile, window, last_heard: Mutex::new(None) }
    }

    pub fn from_config(config: &EscalationConfig, window: Duration) -> Self {
        Self::new(
            config.advisor_numbers.clone(),
            AdvisorProfile {
                name: config.advisor_name.clone(),
                role: config.advisor_role.clone(),
                brand: config.brand_name.clone(),
                utc_offset_minutes: config.utc_offset_minutes,
            },
            window,
        )
    }

    pub fn numbers(&self) -> &[String] {
        &self.numbers
    }

    pub fn is_advisor(&self, conversation_id: &str) -> bool {
        let id = digits(conversation_id);
        !id.is_empty() && self.numbers.contains(&id)
    }

    /// An advisor wrote in, which opens the channel's free-form window.
    pub fn heard_from_advisor(&self, now: DateTime<Utc>) {
        *self.last_heard.lock().unwrap_or_else(PoisonError::into_inner) = Some(now);
    }

    pub fn window_open(&self, now: DateTime<Utc>) -> bool {
        self.last_heard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some_and(|heard| now - heard < self.window)
    }

    pub fn alert_text(&self, lead: &LeadAlert) -> String {
        advisor_alert(lead, &self.profile)
    }
}
