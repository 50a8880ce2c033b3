use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_STALE_PROMPT_SECS: u64 = 25;
pub const DEFAULT_MUTE_SECS: u64 = 4 * 60 * 60;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 7 * 24 * 60 * 60;
pub const DEFAULT_SEND_PAUSE_MS: u64 = 350;
pub const DEFAULT_DEDUP_WINDOW_SECS: u64 = 5 * 60;
pub const DEFAULT_BILLING_CAPTURE_SECS: u64 = 72 * 60 * 60;
pub const DEFAULT_ADVISOR_WINDOW_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_DETAIL_COOLDOWN_SECS: u64 = 60;
pub const DEFAULT_REACTIVATION_PHRASE: &str = "greenfield";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub whatsapp: WhatsAppConfig,
    pub agent: AgentConfig,
    pub dialogue: DialogueConfig,
    pub sweeps: SweepConfig,
    pub escalation: EscalationConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub sessions_dir: PathBuf,
    pub catalog_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WhatsAppConfig {
    pub access_token: SecretString,
    pub phone_number_id: String,
    pub verify_token: SecretString,
    pub app_secret: Option<SecretString>,
    pub api_base_url: String,
    pub api_version: String,
    pub timeout_secs: u64,
}

impl WhatsAppConfig {
    /// An empty access token runs the server with the no-op channel adapter.
    pub fn transport_enabled(&self) -> bool {
        !self.access_token.expose_secret().trim().is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub token: SecretString,
}

/// Timing knobs of the dialogue and handoff rules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialogueConfig {
    pub stale_prompt_secs: u64,
    pub mute_secs: u64,
    pub session_ttl_secs: u64,
    pub send_pause_ms: u64,
    pub dedup_window_secs: u64,
    pub billing_capture_secs: u64,
    pub advisor_window_secs: u64,
    pub detail_cooldown_secs: u64,
    pub reactivation_phrase: String,
}

impl DialogueConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn send_pause(&self) -> Duration {
        Duration::from_millis(self.send_pause_ms)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SweepConfig {
    pub memory_interval_secs: u64,
    pub disk_interval_secs: u64,
    pub dedup_prune_secs: u64,
    pub history_purge_interval_secs: u64,
    pub history_retention_days: u32,
    pub heartbeat_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EscalationConfig {
    pub advisor_numbers: Vec<String>,
    pub advisor_name: String,
    pub advisor_role: String,
    pub brand_name: String,
    pub utc_offset_minutes: i32,
    pub store_map_url: String,
    pub opening_hours: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub sessions_dir: Option<PathBuf>,
    pub catalog_path: Option<PathBuf>,
    pub whatsapp_access_token: Option<String>,
    pub whatsapp_phone_number_id: Option<String>,
    pub whatsapp_verify_token: Option<String>,
    pub agent_token: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                sessions_dir: PathBuf::from("data/sessions"),
                catalog_path: PathBuf::from("knowledge/catalog.json"),
            },
            database: DatabaseConfig {
                url: "sqlite://agroquote.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            whatsapp: WhatsAppConfig {
                access_token: String::new().into(),
                phone_number_id: String::new(),
                verify_token: String::new().into(),
                app_secret: None,
                api_base_url: "https://graph.facebook.com".to_string(),
                api_version: "v20.0".to_string(),
                timeout_secs: 20,
            },
            agent: AgentConfig { token: String::new().into() },
            dialogue: DialogueConfig::default(),
            sweeps: SweepConfig {
                memory_interval_secs: 10 * 60,
                disk_interval_secs: 60 * 60,
                dedup_prune_secs: 60,
                history_purge_interval_secs: 6 * 60 * 60,
                history_retention_days: 7,
                heartbeat_secs: 25,
            },
            escalation: EscalationConfig {
                advisor_numbers: Vec::new(),
                advisor_name: "Equipo comercial".to_string(),
                advisor_role: "Asesor comercial".to_string(),
                brand_name: "Greenfield".to_string(),
                utc_offset_minutes: -240,
                store_map_url: "https://www.google.com/maps?q=-17.7833,-63.1821".to_string(),
                opening_hours: "Lun–Vie 8:00–17:00".to_string(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            stale_prompt_secs: DEFAULT_STALE_PROMPT_SECS,
            mute_secs: DEFAULT_MUTE_SECS,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            send_pause_ms: DEFAULT_SEND_PAUSE_MS,
            dedup_window_secs: DEFAULT_DEDUP_WINDOW_SECS,
            billing_capture_secs: DEFAULT_BILLING_CAPTURE_SECS,
            advisor_window_secs: DEFAULT_ADVISOR_WINDOW_SECS,
            detail_cooldown_secs: DEFAULT_DETAIL_COOLDOWN_SECS,
            reactivation_phrase: DEFAULT_REACTIVATION_PHRASE.to_string(),
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("agroquote.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.escalation.advisor_numbers = normalize_numbers(&config.escalation.advisor_numbers);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(storage) = patch.storage {
            if let Some(sessions_dir) = storage.sessions_dir {
                self.storage.sessions_dir = sessions_dir;
            }
            if let Some(catalog_path) = storage.catalog_path {
                self.storage.catalog_path = catalog_path;
            }
        }

        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(whatsapp) = patch.whatsapp {
            if let Some(access_token_value) = whatsapp.access_token {
                self.whatsapp.access_token = secret_value(access_token_value);
            }
            if let Some(phone_number_id) = whatsapp.phone_number_id {
                self.whatsapp.phone_number_id = phone_number_id;
            }
            if let Some(verify_token_value) = whatsapp.verify_token {
                self.whatsapp.verify_token = secret_value(verify_token_value);
            }
            if let Some(app_secret_value) = whatsapp.app_secret {
                self.whatsapp.app_secret = Some(secret_value(app_secret_value));
            }
            if let Some(api_base_url) = whatsapp.api_base_url {
                self.whatsapp.api_base_url = api_base_url;
            }
            if let Some(api_version) = whatsapp.api_version {
                self.whatsapp.api_version = api_version;
            }
            if let Some(timeout_secs) = whatsapp.timeout_secs {
                self.whatsapp.timeout_secs = timeout_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(token_value) = agent.token {
                self.agent.token = secret_value(token_value);
            }
        }

        if let Some(dialogue) = patch.dialogue {
            let target = &mut self.dialogue;
            if let Some(value) = dialogue.stale_prompt_secs {
                target.stale_prompt_secs = value;
            }
            if let Some(value) = dialogue.mute_secs {
                target.mute_secs = value;
            }
            if let Some(value) = dialogue.session_ttl_secs {
                target.session_ttl_secs = value;
            }
            if let Some(value) = dialogue.send_pause_ms {
                target.send_pause_ms = value;
            }
            if let Some(value) = dialogue.dedup_window_secs {
                target.dedup_window_secs = value;
            }
            if let Some(value) = dialogue.billing_capture_secs {
                target.billing_capture_secs = value;
            }
            if let Some(value) = dialogue.advisor_window_secs {
                target.advisor_window_secs = value;
            }
            if let Some(value) = dialogue.detail_cooldown_secs {
                target.detail_cooldown_secs = value;
            }
            if let Some(value) = dialogue.reactivation_phrase {
                target.reactivation_phrase = value;
            }
        }

        if let Some(sweeps) = patch.sweeps {
            let target = &mut self.sweeps;
            if let Some(value) = sweeps.memory_interval_secs {
                target.memory_interval_secs = value;
            }
            if let Some(value) = sweeps.disk_interval_secs {
                target.disk_interval_secs = value;
            }
            if let Some(value) = sweeps.dedup_prune_secs {
                target.dedup_prune_secs = value;
            }
            if let Some(value) = sweeps.history_purge_interval_secs {
                target.history_purge_interval_secs = value;
            }
            if let Some(value) = sweeps.history_retention_days {
                target.history_retention_days = value;
            }
            if let Some(value) = sweeps.heartbeat_secs {
                target.heartbeat_secs = value;
            }
        }

        if let Some(escalation) = patch.escalation {
            let target = &mut self.escalation;
            if let Some(value) = escalation.advisor_numbers {
                target.advisor_numbers = value;
            }
            if let Some(value) = escalation.advisor_name {
                target.advisor_name = value;
            }
            if let Some(value) = escalation.advisor_role {
                target.advisor_role = value;
            }
            if let Some(value) = escalation.brand_name {
                target.brand_name = value;
            }
            if let Some(value) = escalation.utc_offset_minutes {
                target.utc_offset_minutes = value;
            }
            if let Some(value) = escalation.store_map_url {
                target.store_map_url = value;
            }
            if let Some(value) = escalation.opening_hours {
                target.opening_hours = value;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("AGROQUOTE_STORAGE_SESSIONS_DIR") {
            self.storage.sessions_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("AGROQUOTE_STORAGE_CATALOG_PATH") {
            self.storage.catalog_path = PathBuf::from(value);
        }

        if let Some(value) = read_env("AGROQUOTE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("AGROQUOTE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("AGROQUOTE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("AGROQUOTE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("AGROQUOTE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("AGROQUOTE_WHATSAPP_ACCESS_TOKEN") {
            self.whatsapp.access_token = secret_value(value);
        }
        if let Some(value) = read_env("AGROQUOTE_WHATSAPP_PHONE_NUMBER_ID") {
            self.whatsapp.phone_number_id = value;
        }
        if let Some(value) = read_env("AGROQUOTE_WHATSAPP_VERIFY_TOKEN") {
            self.whatsapp.verify_token = secret_value(value);
        }
        if let Some(value) = read_env("AGROQUOTE_WHATSAPP_APP_SECRET") {
            self.whatsapp.app_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("AGROQUOTE_WHATSAPP_API_BASE_URL") {
            self.whatsapp.api_base_url = value;
        }
        if let Some(value) = read_env("AGROQUOTE_WHATSAPP_API_VERSION") {
            self.whatsapp.api_version = value;
        }

        if let Some(value) = read_env("AGROQUOTE_AGENT_TOKEN") {
            self.agent.token = secret_value(value);
        }

        if let Some(value) = read_env("AGROQUOTE_DIALOGUE_STALE_PROMPT_SECS") {
            self.dialogue.stale_prompt_secs =
                parse_u64("AGROQUOTE_DIALOGUE_STALE_PROMPT_SECS", &value)?;
        }
        if let Some(value) = read_env("AGROQUOTE_DIALOGUE_MUTE_SECS") {
            self.dialogue.mute_secs = parse_u64("AGROQUOTE_DIALOGUE_MUTE_SECS", &value)?;
        }
        if let Some(value) = read_env("AGROQUOTE_DIALOGUE_SESSION_TTL_SECS") {
            self.dialogue.session_ttl_secs =
                parse_u64("AGROQUOTE_DIALOGUE_SESSION_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("AGROQUOTE_DIALOGUE_SEND_PAUSE_MS") {
            self.dialogue.send_pause_ms = parse_u64("AGROQUOTE_DIALOGUE_SEND_PAUSE_MS", &value)?;
        }
        if let Some(value) = read_env("AGROQUOTE_DIALOGUE_DEDUP_WINDOW_SECS") {
            self.dialogue.dedup_window_secs =
                parse_u64("AGROQUOTE_DIALOGUE_DEDUP_WINDOW_SECS", &value)?;
        }
        if let Some(value) = read_env("AGROQUOTE_DIALOGUE_BILLING_CAPTURE_SECS") {
            self.dialogue.billing_capture_secs =
                parse_u64("AGROQUOTE_DIALOGUE_BILLING_CAPTURE_SECS", &value)?;
        }
        if let Some(value) = read_env("AGROQUOTE_DIALOGUE_REACTIVATION_PHRASE") {
            self.dialogue.reactivation_phrase = value;
        }

        if let Some(value) = read_env("AGROQUOTE_ESCALATION_ADVISOR_NUMBERS") {
            self.escalation.advisor_numbers =
                value.split([',', ' ', ';']).map(str::to_string).collect();
        }
        if let Some(value) = read_env("AGROQUOTE_ESCALATION_UTC_OFFSET_MINUTES") {
            self.escalation.utc_offset_minutes =
                parse_i32("AGROQUOTE_ESCALATION_UTC_OFFSET_MINUTES", &value)?;
        }
        if let Some(value) = read_env("AGROQUOTE_ESCALATION_STORE_MAP_URL") {
            self.escalation.store_map_url = value;
        }

        if let Some(value) = read_env("AGROQUOTE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("AGROQUOTE_SERVER_PORT") {
            self.server.port = parse_u16("AGROQUOTE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("AGROQUOTE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("AGROQUOTE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("AGROQUOTE_LOGGING_LEVEL").or_else(|| read_env("AGROQUOTE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("AGROQUOTE_LOGGING_FORMAT").or_else(|| read_env("AGROQUOTE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(sessions_dir) = overrides.sessions_dir {
            self.storage.sessions_dir = sessions_dir;
        }
        if let Some(catalog_path) = overrides.catalog_path {
            self.storage.catalog_path = catalog_path;
        }
        if let Some(access_token) = overrides.whatsapp_access_token {
            self.whatsapp.access_token = secret_value(access_token);
        }
        if let Some(phone_number_id) = overrides.whatsapp_phone_number_id {
            self.whatsapp.phone_number_id = phone_number_id;
        }
        if let Some(verify_token) = overrides.whatsapp_verify_token {
            self.whatsapp.verify_token = secret_value(verify_token);
        }
        if let Some(agent_token) = overrides.agent_token {
            self.agent.token = secret_value(agent_token);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_whatsapp(&self.whatsapp)?;
        validate_agent(&self.agent)?;
        validate_dialogue(&self.dialogue)?;
        validate_sweeps(&self.sweeps)?;
        validate_escalation(&self.escalation)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("agroquote.toml"), PathBuf::from("config/agroquote.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

/// Keeps only the digits of each advisor number and drops empty entries.
pub fn normalize_numbers(numbers: &[String]) -> Vec<String> {
    numbers
        .iter()
        .map(|number| number.chars().filter(char::is_ascii_digit).collect::<String>())
        .filter(|digits| !digits.is_empty())
        .collect()
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_whatsapp(whatsapp: &WhatsAppConfig) -> Result<(), ConfigError> {
    if whatsapp.verify_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "whatsapp.verify_token is required. Use the same value configured under Meta App > WhatsApp > Configuration > Webhook".to_string(),
        ));
    }

    if whatsapp.transport_enabled() && whatsapp.phone_number_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "whatsapp.phone_number_id is required when whatsapp.access_token is set".to_string(),
        ));
    }

    if !whatsapp.phone_number_id.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ConfigError::Validation(
            "whatsapp.phone_number_id must contain digits only (it is the Graph API id, not the phone number)".to_string(),
        ));
    }

    let base = whatsapp.api_base_url.trim();
    if !base.starts_with("http://") && !base.starts_with("https://") {
        return Err(ConfigError::Validation(
            "whatsapp.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if whatsapp.timeout_secs == 0 || whatsapp.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "whatsapp.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    let token = agent.token.expose_secret();
    if token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "agent.token is required; the operator console authenticates with it".to_string(),
        ));
    }
    if token.trim().len() < 8 {
        return Err(ConfigError::Validation(
            "agent.token must be at least 8 characters long".to_string(),
        ));
    }
    Ok(())
}

fn validate_dialogue(dialogue: &DialogueConfig) -> Result<(), ConfigError> {
    if dialogue.stale_prompt_secs == 0 || dialogue.stale_prompt_secs > 3_600 {
        return Err(ConfigError::Validation(
            "dialogue.stale_prompt_secs must be in range 1..=3600".to_string(),
        ));
    }

    let positive = [
        ("dialogue.mute_secs", dialogue.mute_secs),
        ("dialogue.session_ttl_secs", dialogue.session_ttl_secs),
        ("dialogue.dedup_window_secs", dialogue.dedup_window_secs),
        ("dialogue.billing_capture_secs", dialogue.billing_capture_secs),
        ("dialogue.advisor_window_secs", dialogue.advisor_window_secs),
    ];
    if let Some((key, _)) = positive.iter().find(|(_, value)| *value == 0) {
        return Err(ConfigError::Validation(format!("{key} must be greater than zero")));
    }

    if dialogue.send_pause_ms > 10_000 {
        return Err(ConfigError::Validation(
            "dialogue.send_pause_ms must be at most 10000".to_string(),
        ));
    }

    if dialogue.reactivation_phrase.trim().len() < 3 {
        return Err(ConfigError::Validation(
            "dialogue.reactivation_phrase must have at least 3 characters".to_string(),
        ));
    }

    Ok(())
}

fn validate_sweeps(sweeps: &SweepConfig) -> Result<(), ConfigError> {
    let intervals = [
        ("sweeps.memory_interval_secs", sweeps.memory_interval_secs),
        ("sweeps.disk_interval_secs", sweeps.disk_interval_secs),
        ("sweeps.dedup_prune_secs", sweeps.dedup_prune_secs),
        ("sweeps.history_purge_interval_secs", sweeps.history_purge_interval_secs),
        ("sweeps.heartbeat_secs", sweeps.heartbeat_secs),
    ];
    if let Some((key, _)) = intervals.iter().find(|(_, value)| *value == 0) {
        return Err(ConfigError::Validation(format!("{key} must be greater than zero")));
    }

    if sweeps.history_retention_days == 0 {
        return Err(ConfigError::Validation(
            "sweeps.history_retention_days must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_escalation(escalation: &EscalationConfig) -> Result<(), ConfigError> {
    if !(-720..=840).contains(&escalation.utc_offset_minutes) {
        return Err(ConfigError::Validation(
            "escalation.utc_offset_minutes must be in range -720..=840".to_string(),
        ));
    }

    let map_url = escalation.store_map_url.trim();
    if !map_url.starts_with("http://") && !map_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "escalation.store_map_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_i32(key: &str, value: &str) -> Result<i32, ConfigError> {
    value.trim().parse::<i32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    storage: Option<StoragePatch>,
    database: Option<DatabasePatch>,
    whatsapp: Option<WhatsAppPatch>,
    agent: Option<AgentPatch>,
    dialogue: Option<DialoguePatch>,
    sweeps: Option<SweepPatch>,
    escalation: Option<EscalationPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    sessions_dir: Option<PathBuf>,
    catalog_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WhatsAppPatch {
    access_token: Option<String>,
    phone_number_id: Option<String>,
    verify_token: Option<String>,
    app_secret: Option<String>,
    api_base_url: Option<String>,
    api_version: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DialoguePatch {
    stale_prompt_secs: Option<u64>,
    mute_secs: Option<u64>,
    session_ttl_secs: Option<u64>,
    send_pause_ms: Option<u64>,
    dedup_window_secs: Option<u64>,
    billing_capture_secs: Option<u64>,
    advisor_window_secs: Option<u64>,
    detail_cooldown_secs: Option<u64>,
    reactivation_phrase: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SweepPatch {
    memory_interval_secs: Option<u64>,
    disk_interval_secs: Option<u64>,
    dedup_prune_secs: Option<u64>,
    history_purge_interval_secs: Option<u64>,
    history_retention_days: Option<u32>,
    heartbeat_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EscalationPatch {
    advisor_numbers: Option<Vec<String>>,
    advisor_name: Option<String>,
    advisor_role: Option<String>,
    brand_name: Option<String>,
    utc_offset_minutes: Option<i32>,
    store_map_url: Option<String>,
    opening_hours: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    const REQUIRED: &[&str] = &["AGROQUOTE_WHATSAPP_VERIFY_TOKEN", "AGROQUOTE_AGENT_TOKEN"];

    fn set_required() {
        env::set_var("AGROQUOTE_WHATSAPP_VERIFY_TOKEN", "verify-me");
        env::set_var("AGROQUOTE_AGENT_TOKEN", "agent-token-1234");
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_WA_VERIFY", "verify-from-env");
        env::set_var("TEST_AGENT_TOKEN", "agent-from-env-token");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("agroquote.toml");
            fs::write(
                &path,
                r#"
[whatsapp]
verify_token = "${TEST_WA_VERIFY}"

[agent]
token = "${TEST_AGENT_TOKEN}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.whatsapp.verify_token.expose_secret() == "verify-from-env",
                "verify token should be loaded from environment",
            )?;
            ensure(
                config.agent.token.expose_secret() == "agent-from-env-token",
                "agent token should be loaded from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_WA_VERIFY", "TEST_AGENT_TOKEN"]);
        result
    }

    #[test]
    fn timing_defaults_match_documented_values() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_required();

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.dialogue.stale_prompt_secs == 25, "stale window defaults to 25s")?;
            ensure(config.dialogue.mute_secs == 4 * 3_600, "mute defaults to 4h")?;
            ensure(config.dialogue.session_ttl_secs == 7 * 86_400, "ttl defaults to 7 days")?;
            ensure(config.dialogue.send_pause_ms == 350, "send pause defaults to 350ms")?;
            ensure(config.dialogue.dedup_window_secs == 300, "dedup window defaults to 5 min")?;
            ensure(config.sweeps.memory_interval_secs == 600, "memory sweep every 10 min")?;
            ensure(config.sweeps.disk_interval_secs == 3_600, "disk sweep every hour")?;
            ensure(config.sweeps.heartbeat_secs == 25, "heartbeat every 25s")?;
            Ok(())
        })();

        clear_vars(REQUIRED);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();
        env::set_var("AGROQUOTE_LOG_LEVEL", "warn");
        env::set_var("AGROQUOTE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(REQUIRED);
        clear_vars(&["AGROQUOTE_LOG_LEVEL", "AGROQUOTE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required();
        env::set_var("AGROQUOTE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("AGROQUOTE_DIALOGUE_MUTE_SECS", "600");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("agroquote.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[dialogue]
mute_secs = 120
stale_prompt_secs = 40

[escalation]
advisor_numbers = ["+591 700-00001", "  "]

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.dialogue.mute_secs == 600, "env mute should win over file")?;
            ensure(config.dialogue.stale_prompt_secs == 40, "file stale window should apply")?;
            ensure(
                config.escalation.advisor_numbers == vec!["59170000001".to_string()],
                "advisor numbers should be reduced to digits",
            )?;
            Ok(())
        })();

        clear_vars(REQUIRED);
        clear_vars(&["AGROQUOTE_DATABASE_URL", "AGROQUOTE_DIALOGUE_MUTE_SECS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("AGROQUOTE_WHATSAPP_VERIFY_TOKEN", "verify-me");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("agent.token")
            );
            ensure(has_message, "validation failure should mention agent.token")
        })();

        clear_vars(REQUIRED);
        result
    }

    #[test]
    fn access_token_requires_phone_number_id() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_required();
        env::set_var("AGROQUOTE_WHATSAPP_ACCESS_TOKEN", "EAAG-token");

        let result = (|| -> Result<(), String> {
            let error = AppConfig::load(LoadOptions::default())
                .err()
                .ok_or_else(|| "expected missing phone number id to fail".to_string())?;
            ensure(
                error.to_string().contains("whatsapp.phone_number_id"),
                "validation failure should mention whatsapp.phone_number_id",
            )
        })();

        clear_vars(REQUIRED);
        clear_vars(&["AGROQUOTE_WHATSAPP_ACCESS_TOKEN"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("AGROQUOTE_WHATSAPP_VERIFY_TOKEN", "verify-secret-value");
        env::set_var("AGROQUOTE_AGENT_TOKEN", "agent-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("verify-secret-value"),
                "debug output should not contain verify token",
            )?;
            ensure(
                !debug.contains("agent-secret-value"),
                "debug output should not contain agent token",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            ensure(!config.whatsapp.transport_enabled(), "no access token means noop transport")?;
            Ok(())
        })();

        clear_vars(REQUIRED);
        result
    }
}
