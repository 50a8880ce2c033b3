pub mod catalog;
pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod snapshots;

pub use catalog::{load_catalog, CatalogError};
pub use connection::{connect, connect_with_settings, DbPool};
pub use repositories::{
    BillingCapture, BillingRepository, ClientRepository, HistoryRepository,
    InMemoryBillingRepository, InMemoryClientRepository, InMemoryHistoryRepository,
    InMemoryPriceRepository, InMemoryQuoteRecordRepository, PriceRepository,
    QuoteRecordRepository, RepositoryError, SqlBillingRepository, SqlClientRepository,
    SqlHistoryRepository, SqlPriceRepository, SqlQuoteRecordRepository,
};
pub use snapshots::{PersistenceError, SnapshotStore, SweepReport};
