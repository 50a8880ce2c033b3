use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use agroquote_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value) in entries(&config) {
        let env_key = format!("AGROQUOTE_{}", key.replace('.', "_").to_uppercase());
        let source =
            field_source(key, &env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

fn entries(config: &AppConfig) -> Vec<(&'static str, String)> {
    let app_secret = match &config.whatsapp.app_secret {
        Some(secret) => redact_token(secret.expose_secret()),
        None => "<unset>".to_string(),
    };
    let advisors = if config.escalation.advisor_numbers.is_empty() {
        "<none>".to_string()
    } else {
        config.escalation.advisor_numbers.join(",")
    };

    vec![
        ("storage.sessions_dir", config.storage.sessions_dir.display().to_string()),
        ("storage.catalog_path", config.storage.catalog_path.display().to_string()),
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        ("whatsapp.access_token", redact_token(config.whatsapp.access_token.expose_secret())),
        ("whatsapp.phone_number_id", config.whatsapp.phone_number_id.clone()),
        ("whatsapp.verify_token", redact_token(config.whatsapp.verify_token.expose_secret())),
        ("whatsapp.app_secret", app_secret),
        ("whatsapp.api_base_url", config.whatsapp.api_base_url.clone()),
        ("whatsapp.api_version", config.whatsapp.api_version.clone()),
        ("agent.token", redact_token(config.agent.token.expose_secret())),
        ("dialogue.stale_prompt_secs", config.dialogue.stale_prompt_secs.to_string()),
        ("dialogue.mute_secs", config.dialogue.mute_secs.to_string()),
        ("dialogue.session_ttl_secs", config.dialogue.session_ttl_secs.to_string()),
        ("dialogue.send_pause_ms", config.dialogue.send_pause_ms.to_string()),
        ("dialogue.dedup_window_secs", config.dialogue.dedup_window_secs.to_string()),
        ("dialogue.billing_capture_secs", config.dialogue.billing_capture_secs.to_string()),
        ("dialogue.reactivation_phrase", config.dialogue.reactivation_phrase.clone()),
        ("escalation.advisor_numbers", advisors),
        ("escalation.utc_offset_minutes", config.escalation.utc_offset_minutes.to_string()),
        ("escalation.store_map_url", config.escalation.store_map_url.clone()),
        ("server.bind_address", config.server.bind_address.clone()),
        ("server.port", config.server.port.to_string()),
        ("server.graceful_shutdown_secs", config.server.graceful_shutdown_secs.to_string()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", format!("{:?}", config.logging.format)),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("agroquote.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/agroquote.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let visible: String = trimmed.chars().take(3).collect();
    if trimmed.chars().count() > 8 {
        return format!("{visible}***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_token};

    #[test]
    fn tokens_keep_only_a_short_prefix() {
        assert_eq!(redact_token(""), "<empty>");
        assert_eq!(redact_token("short"), "<redacted>");
        assert_eq!(redact_token("EAAGm0PX4ZCpsBA"), "EAA***");
    }

    #[test]
    fn nested_keys_are_found_in_the_file_document() {
        let doc: toml::Value = "[whatsapp]\nphone_number_id = \"123\"".parse().expect("toml");
        assert!(contains_path(&doc, "whatsapp.phone_number_id"));
        assert!(!contains_path(&doc, "whatsapp.verify_token"));
    }
}
