use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dialogue::text::{contains_phrase, normalize, tokens};

/// Out-of-band requests recognized before any slot is parsed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    RequestAgent,
    CloseConversation,
    AnotherProduct,
    Location,
    Hours,
    PriceInquiry,
}

impl Intent {
    /// Informational intents answer without consuming the customer's text.
    pub fn is_informational(self) -> bool {
        matches!(self, Self::Location | Self::Hours | Self::PriceInquiry)
    }
}

const GREETINGS: [&str; 18] = [
    "hola",
    "ola",
    "buenas",
    "buenos dias",
    "buen dia",
    "buenas tardes",
    "buenas noches",
    "saludos",
    "que tal",
    "como estas",
    "hey",
    "ok",
    "okay",
    "gracias",
    "listo",
    "si",
    "no",
    "hola buenas",
];

const CLOSE_PHRASES: [&str; 8] = [
    "no gracias",
    "eso es todo",
    "nada mas",
    "es todo",
    "ok gracias",
    "chau",
    "adios",
    "hasta luego",
];

fn agent_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"\b(asesor|agente|ejecutivo|vendedor|representante|soporte|persona real|humano|llamada|comercial)\b|hablar con",
        )
        .expect("agent pattern compiles")
    })
}

fn another_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(otro|agregar|anadir|sumar|incluir)\b.*\b(producto|articulo|item)|cotizar otro")
            .expect("another-product pattern compiles")
    })
}

fn location_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(ubicacion|direccion|mapa)\b|donde estan|donde quedan")
            .expect("location pattern compiles")
    })
}

fn hours_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(horario|horarios|atienden|abren|cierran)\b")
            .expect("hours pattern compiles")
    })
}

fn price_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(precio|precios|cotizar|costo|costos)\b|cuanto (vale|cuesta|sale)")
            .expect("price pattern compiles")
    })
}

/// Highest-priority intent in the text, if any.
pub fn detect(text: &str) -> Option<Intent> {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return None;
    }

    if agent_pattern().is_match(&normalized) {
        Some(Intent::RequestAgent)
    } else if is_close(&normalized) {
        Some(Intent::CloseConversation)
    } else if another_pattern().is_match(&normalized) {
        Some(Intent::AnotherProduct)
    } else if location_pattern().is_match(&normalized) {
        Some(Intent::Location)
    } else if hours_pattern().is_match(&normalized) {
        Some(Intent::Hours)
    } else if price_pattern().is_match(&normalized) {
        Some(Intent::PriceInquiry)
    } else {
        None
    }
}

/// The whole message is a greeting or filler word.
pub fn is_greeting(text: &str) -> bool {
    let cleaned = tokens(text).join(" ");
    GREETINGS.contains(&cleaned.as_str())
}

/// A lone "gracias" or "listo" is not a goodbye.
fn is_close(normalized: &str) -> bool {
    CLOSE_PHRASES.iter().any(|phrase| contains_phrase(normalized, phrase))
}

pub fn is_reactivation(text: &str, phrase: &str) -> bool {
    contains_phrase(text, phrase)
}

pub fn is_affirmative(text: &str) -> bool {
    matches!(tokens(text).first().map(String::as_str), Some("si" | "claro" | "dale" | "bueno" | "ok"))
}

pub fn is_negative(text: &str) -> bool {
    matches!(tokens(text).first().map(String::as_str), Some("no" | "nada" | "ninguno"))
}

/// An operator message asking for all billing and pickup fields at once.
pub fn requests_billing_details(text: &str) -> bool {
    let normalized = normalize(text);
    ["razon social", "nombre del chofer", "placa", "fecha de recojo"]
        .iter()
        .all(|needle| normalized.contains(needle))
}
