use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use agroquote_core::domain::records::{
    BillingDetails, ClientRecord, HistoryRow, PriceList, QuoteRecord,
};

pub mod billing;
pub mod client;
pub mod history;
pub mod memory;
pub mod price;
pub mod quote;

pub use billing::SqlBillingRepository;
pub use client::SqlClientRepository;
pub use history::SqlHistoryRepository;
pub use memory::{
    InMemoryBillingRepository, InMemoryClientRepository, InMemoryHistoryRepository,
    InMemoryPriceRepository, InMemoryQuoteRecordRepository,
};
pub use price::SqlPriceRepository;
pub use quote::SqlQuoteRecordRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl RepositoryError {
    pub(crate) fn decode(error: impl std::fmt::Display) -> Self {
        Self::Decode(error.to_string())
    }
}

/// Billing and pickup details a customer sent, as stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingCapture {
    pub conversation_id: String,
    pub details: BillingDetails,
    pub captured_at: DateTime<Utc>,
}

/// Mirror of every message exchanged, for reporting.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn append(&self, row: HistoryRow) -> Result<(), RepositoryError>;
    async fn list_for(&self, conversation_id: &str) -> Result<Vec<HistoryRow>, RepositoryError>;
    /// Deletes rows recorded before `cutoff`; returns how many went.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait QuoteRecordRepository: Send + Sync {
    async fn append(&self, record: QuoteRecord) -> Result<(), RepositoryError>;
    async fn list_for(&self, conversation_id: &str) -> Result<Vec<QuoteRecord>, RepositoryError>;
}

/// Client directory keyed by phone number.
#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<ClientRecord>, RepositoryError>;
    async fn upsert(&self, record: ClientRecord) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait BillingRepository: Send + Sync {
    async fn append(&self, capture: BillingCapture) -> Result<(), RepositoryError>;
    async fn list_for(&self, conversation_id: &str) -> Result<Vec<BillingCapture>, RepositoryError>;
}

#[async_trait]
pub trait PriceRepository: Send + Sync {
    async fn load(&self) -> Result<PriceList, RepositoryError>;
    async fn replace(&self, prices: PriceList) -> Result<(), RepositoryError>;
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(RepositoryError::decode)
}
