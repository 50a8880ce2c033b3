use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::domain::catalog::Unit;
use crate::domain::records::BillingDetails;
use crate::dialogue::intents::is_greeting;
use crate::dialogue::text::{clamp, normalize, title_case};

const MAX_NAME_CHARS: usize = 60;

fn name_token() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-zÁÉÍÓÚÜÑáéíóúüñ][A-Za-zÁÉÍÓÚÜÑáéíóúüñ'’\-\.]{1,}$")
            .expect("name token pattern compiles")
    })
}

fn quantity_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)(\d{1,6}(?:[.,]\d{1,2})?)\s*(l|lt|lts|litros?|kg|kgs|kilos?|unid|unidad(?:es)?)\b",
        )
        .expect("quantity pattern compiles")
    })
}

fn hectare_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(\d{1,6}(?:[.,]\d{1,3})?)\s*(ha|has|hect[aá]reas?)\b")
            .expect("hectare pattern compiles")
    })
}

fn bare_number() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(\d{1,6}(?:[.,]\d{1,3})?)\s*$")
            .expect("number pattern compiles")
    })
}

fn pack_label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(\d{1,5}(?:[.,]\d{1,2})?)\s*(l|lt|lts|litros?|kg|kgs|kilos?)\b")
            .expect("pack label pattern compiles")
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedQuantity {
    pub amount: Decimal,
    pub unit: Option<Unit>,
}

/// Accepts "Juan Pérez" style names: two or more word-like tokens, no greeting.
pub fn full_name(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_NAME_CHARS || is_greeting(trimmed) {
        return None;
    }

    let words: Vec<&str> = trimmed.split_whitespace().collect();
    if words.len() < 2 || !words.iter().all(|word| name_token().is_match(word)) {
        return None;
    }

    Some(title_case(&clamp(trimmed, MAX_NAME_CHARS)))
}

/// Comma or dot as decimal separator: "12,5" and "12.5" are equal.
pub fn decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(&raw.trim().replace(',', ".")).ok()
}

pub fn quantity(text: &str) -> Option<ParsedQuantity> {
    let captures = quantity_pattern().captures(text)?;
    let amount = decimal(captures.get(1)?.as_str())?;
    let unit = captures.get(2).and_then(|token| Unit::from_token(token.as_str()));
    Some(ParsedQuantity { amount, unit })
}

/// A message that is only a number, such as a reply to the quantity question.
pub fn number_only(text: &str) -> Option<Decimal> {
    let captures = bare_number().captures(text)?;
    decimal(captures.get(1)?.as_str())
}

/// Hectares with a unit ("50 ha", "120 hectáreas") or a bare number.
pub fn hectares(text: &str) -> Option<Decimal> {
    let value = match hectare_pattern().captures(text) {
        Some(captures) => decimal(captures.get(1)?.as_str())?,
        None => number_only(text)?,
    };
    (value > Decimal::ZERO).then_some(value)
}

/// Reads the pack size from a presentation label such as "Bidón 20 L".
pub fn pack_size(label: &str) -> Option<(Decimal, Unit)> {
    let captures = pack_label_pattern().captures(label)?;
    let size = decimal(captures.get(1)?.as_str())?;
    let unit = Unit::from_token(captures.get(2)?.as_str())?;
    (size > Decimal::ZERO).then_some((size, unit))
}

/// True when `amount` is a positive whole multiple of `pack`.
pub fn is_pack_multiple(amount: Decimal, pack: Decimal) -> bool {
    if amount <= Decimal::ZERO {
        return false;
    }
    if pack <= Decimal::ZERO {
        return true;
    }
    (amount % pack).is_zero()
}

const BILLING_KEYWORDS: [&str; 8] =
    ["nit", "razon social", "chofer", "conductor", "placa", "fecha de recojo", "fecha de retiro", "recojo"];

pub fn mentions_billing(text: &str) -> bool {
    let normalized = normalize(text);
    BILLING_KEYWORDS.iter().any(|keyword| {
        if *keyword == "nit" {
            normalized.split(|ch: char| !ch.is_alphanumeric()).any(|token| token == "nit")
        } else {
            normalized.contains(keyword)
        }
    })
}

/// Parses "Campo: valor" style lines sent in reply to a billing request.
///
/// Each line is matched on its label; unlabeled lines are ignored.
pub fn billing_details(text: &str) -> BillingDetails {
    let mut details = BillingDetails::default();
    for line in text.lines() {
        let Some((label, value)) = line.split_once([':', '=']) else {
            continue;
        };
        let value = clamp(value.trim().trim_matches('*'), 120);
        if value.is_empty() {
            continue;
        }
        let label = normalize(label.trim().trim_matches(|ch: char| !ch.is_alphanumeric()));
        if label.contains("razon social") {
            details.business_name = Some(value);
        } else if label.split_whitespace().any(|token| token == "nit") {
            details.nit = Some(value);
        } else if label.contains("placa") {
            details.plate = Some(value.to_uppercase());
        } else if label.contains("fecha") {
            details.pickup_date = Some(value);
        } else if label.contains("chofer") || label.contains("conductor") {
            details.driver_name = Some(title_case(&value));
        }
    }
    details
}
