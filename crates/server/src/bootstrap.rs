use std::sync::Arc;

use agroquote_agent::{
    AdvisorDesk, Collaborators, ConversationRuntime, NoopRenderer, RuntimeSettings, SessionStore,
    Sweepers,
};
use agroquote_channel::{ChannelAdapter, ChannelError, NoopChannel, SendQueue, WhatsAppChannel};
use agroquote_core::config::{AppConfig, ConfigError, LoadOptions};
use agroquote_core::dialogue::engine::{DialogueEngine, DialogueSettings};
use agroquote_db::{
    connect_with_settings, load_catalog, migrations, CatalogError, DbPool, SnapshotStore,
    SqlBillingRepository, SqlClientRepository, SqlHistoryRepository, SqlPriceRepository,
    SqlQuoteRecordRepository,
};
use chrono::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<ConversationRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("channel setup failed: {0}")]
    Channel(#[from] ChannelError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.database_ready", "database connected and migrated");

    let catalog = load_catalog(&config.storage.catalog_path)?;
    info!(
        event_name = "system.bootstrap.catalog_loaded",
        products = catalog.products().len(),
        path = %config.storage.catalog_path.display(),
        "catalog loaded"
    );

    let channel: Arc<dyn ChannelAdapter> = if config.whatsapp.transport_enabled() {
        Arc::new(WhatsAppChannel::from_config(&config.whatsapp)?)
    } else {
        warn!(
            event_name = "system.bootstrap.channel_noop",
            "whatsapp.access_token is empty; outbound messages are dropped"
        );
        Arc::new(NoopChannel)
    };
    info!(event_name = "system.bootstrap.channel", channel = channel.name(), "channel adapter ready");

    let ttl = Duration::seconds(i64::try_from(config.dialogue.session_ttl_secs).unwrap_or(i64::MAX / 1_000));
    let snapshots = SnapshotStore::new(&config.storage.sessions_dir, ttl);
    if let Err(error) = snapshots.ensure_dir().await {
        warn!(
            event_name = "system.bootstrap.sessions_dir_unavailable",
            error = %error,
            "snapshots will fail until the directory is writable"
        );
    }

    let records = Collaborators {
        history: Arc::new(SqlHistoryRepository::new(db_pool.clone())),
        quotes: Arc::new(SqlQuoteRecordRepository::new(db_pool.clone())),
        clients: Arc::new(SqlClientRepository::new(db_pool.clone())),
        billing: Arc::new(SqlBillingRepository::new(db_pool.clone())),
        prices: Arc::new(SqlPriceRepository::new(db_pool.clone())),
        renderer: Arc::new(NoopRenderer),
    };
    let settings = RuntimeSettings::from_config(&config);
    let runtime = ConversationRuntime::new(
        DialogueEngine::new(catalog, DialogueSettings::from_config(&config)),
        SessionStore::new(snapshots),
        SendQueue::new(channel, config.dialogue.send_pause()),
        AdvisorDesk::from_config(&config.escalation, settings.advisor_window),
        records,
        settings,
    );

    Ok(Application { config, db_pool, runtime: Arc::new(runtime) })
}

impl Application {
    pub fn start_sweeps(&self) -> Sweepers {
        Sweepers::spawn(Arc::clone(&self.runtime), &self.config.sweeps)
    }
}
