//! Webhook subscription handshake and payload signatures.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("hub.mode must be `subscribe`")]
    WrongMode,
    #[error("verify token mismatch")]
    TokenMismatch,
    #[error("challenge missing")]
    MissingChallenge,
    #[error("signature header missing")]
    MissingSignature,
    #[error("signature does not match payload")]
    BadSignature,
}

/// Query parameters of the subscription handshake.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct HandshakeParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Returns the challenge to echo back when mode and token check out.
pub fn verify_handshake(params: &HandshakeParams, expected: &SecretString) -> Result<String, WebhookError> {
    if params.mode.as_deref() != Some("subscribe") {
        return Err(WebhookError::WrongMode);
    }
    let expected = expected.expose_secret();
    match params.verify_token.as_deref() {
        Some(token) if !expected.is_empty() && token == expected => {}
        _ => return Err(WebhookError::TokenMismatch),
    }
    params.challenge.clone().filter(|challenge| !challenge.is_empty()).ok_or(WebhookError::MissingChallenge)
}

/// Checks an `X-Hub-Signature-256` header against the raw body.
pub fn verify_signature(
    app_secret: &SecretString,
    body: &[u8],
    header: Option<&str>,
) -> Result<(), WebhookError> {
    let header = header.map(str::trim).filter(|value| !value.is_empty()).ok_or(WebhookError::MissingSignature)?;
    let encoded = header.strip_prefix(SIGNATURE_PREFIX).unwrap_or(header);
    let signature = hex::decode(encoded).map_err(|_| WebhookError::BadSignature)?;

    let mut mac = HmacSha256::new_from_slice(app_secret.expose_secret().as_bytes())
        .map_err(|_| WebhookError::BadSignature)?;
    mac.update(body);
    mac.verify_slice(&signature).map_err(|_| WebhookError::BadSignature)
}
