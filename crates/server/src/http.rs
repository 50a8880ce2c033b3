use std::sync::Arc;

use agroquote_agent::ConversationRuntime;
use agroquote_core::config::AppConfig;
use axum::Router;
use secrecy::SecretString;
use tower_http::trace::TraceLayer;

use crate::bootstrap::Application;
use crate::health::{self, HealthState};
use crate::{agent_api, webhook};

/// Shared secrets checked at the HTTP edge.
pub struct Secrets {
    pub verify_token: SecretString,
    pub app_secret: Option<SecretString>,
    pub agent_token: SecretString,
}

impl Secrets {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            verify_token: config.whatsapp.verify_token.clone(),
            app_secret: config.whatsapp.app_secret.clone(),
            agent_token: config.agent.token.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<ConversationRuntime>,
    pub secrets: Arc<Secrets>,
}

impl AppState {
    pub fn new(runtime: Arc<ConversationRuntime>, secrets: Secrets) -> Self {
        Self { runtime, secrets: Arc::new(secrets) }
    }
}

pub fn router(app: &Application) -> Router {
    let state = AppState::new(Arc::clone(&app.runtime), Secrets::from_config(&app.config));
    let health = HealthState::new(app.db_pool.clone(), app.config.storage.sessions_dir.clone());
    assemble(state, health)
}

pub fn assemble(state: AppState, health: HealthState) -> Router {
    Router::new()
        .merge(webhook::router(state.clone()))
        .merge(agent_api::router(state))
        .merge(health::router(health))
        .layer(TraceLayer::new_for_http())
}
