use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use agroquote_core::domain::records::{ClientRecord, HistoryRow, PriceList, QuoteRecord};

use super::{
    BillingCapture, BillingRepository, ClientRepository, HistoryRepository, PriceRepository,
    QuoteRecordRepository, RepositoryError,
};

#[derive(Default)]
pub struct InMemoryHistoryRepository {
    rows: RwLock<Vec<HistoryRow>>,
}

#[async_trait::async_trait]
impl HistoryRepository for InMemoryHistoryRepository {
    async fn append(&self, row: HistoryRow) -> Result<(), RepositoryError> {
        self.rows.write().await.push(row);
        Ok(())
    }

    async fn list_for(&self, conversation_id: &str) -> Result<Vec<HistoryRow>, RepositoryError> {
        let rows = self.rows.read().await;
        Ok(rows.iter().filter(|row| row.conversation_id == conversation_id).cloned().collect())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|row| row.recorded_at >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryQuoteRecordRepository {
    records: RwLock<Vec<QuoteRecord>>,
}

#[async_trait::async_trait]
impl QuoteRecordRepository for InMemoryQuoteRecordRepository {
    async fn append(&self, record: QuoteRecord) -> Result<(), RepositoryError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn list_for(&self, conversation_id: &str) -> Result<Vec<QuoteRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|record| record.conversation_id == conversation_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryClientRepository {
    clients: RwLock<HashMap<String, ClientRecord>>,
}

fn keep_known(slot: &mut Option<String>, incoming: Option<String>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

#[async_trait::async_trait]
impl ClientRepository for InMemoryClientRepository {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<ClientRecord>, RepositoryError> {
        let clients = self.clients.read().await;
        Ok(clients.get(phone).cloned())
    }

    async fn upsert(&self, record: ClientRecord) -> Result<(), RepositoryError> {
        let mut clients = self.clients.write().await;
        let entry = clients
            .entry(record.phone.clone())
            .or_insert_with(|| ClientRecord { phone: record.phone.clone(), ..ClientRecord::default() });
        keep_known(&mut entry.name, record.name);
        keep_known(&mut entry.department, record.department);
        keep_known(&mut entry.subzone, record.subzone);
        keep_known(&mut entry.crop, record.crop);
        keep_known(&mut entry.hectares, record.hectares);
        keep_known(&mut entry.season, record.season);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryBillingRepository {
    captures: RwLock<Vec<BillingCapture>>,
}

#[async_trait::async_trait]
impl BillingRepository for InMemoryBillingRepository {
    async fn append(&self, capture: BillingCapture) -> Result<(), RepositoryError> {
        self.captures.write().await.push(capture);
        Ok(())
    }

    async fn list_for(&self, conversation_id: &str) -> Result<Vec<BillingCapture>, RepositoryError> {
        let captures = self.captures.read().await;
        Ok(captures
            .iter()
            .filter(|capture| capture.conversation_id == conversation_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryPriceRepository {
    prices: RwLock<PriceList>,
}

impl InMemoryPriceRepository {
    pub fn with_prices(prices: PriceList) -> Self {
        Self { prices: RwLock::new(prices) }
    }
}

#[async_trait::async_trait]
impl PriceRepository for InMemoryPriceRepository {
    async fn load(&self) -> Result<PriceList, RepositoryError> {
        Ok(self.prices.read().await.clone())
    }

    async fn replace(&self, prices: PriceList) -> Result<(), RepositoryError> {
        *self.prices.write().await = prices;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use agroquote_core::domain::records::{
        BillingDetails, ClientRecord, HistoryRow, PriceEntry, PriceList,
    };
    use agroquote_core::domain::session::Role;

    use crate::repositories::{
        BillingCapture, BillingRepository, ClientRepository, HistoryRepository,
        InMemoryBillingRepository, InMemoryClientRepository, InMemoryHistoryRepository,
        InMemoryPriceRepository, PriceRepository,
    };

    #[tokio::test]
    async fn history_purge_drops_only_old_rows() {
        let repo = InMemoryHistoryRepository::default();
        let now = Utc::now();
        for (content, at) in [("viejo", now - Duration::days(200)), ("nuevo", now)] {
            repo.append(HistoryRow {
                conversation_id: "59170000001".to_string(),
                role: Role::User,
                content: content.to_string(),
                recorded_at: at,
            })
            .await
            .expect("append row");
        }

        let removed = repo.purge_before(now - Duration::days(180)).await.expect("purge");
        let left = repo.list_for("59170000001").await.expect("list");

        assert_eq!(removed, 1);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].content, "nuevo");
    }

    #[tokio::test]
    async fn client_upsert_keeps_fields_the_update_leaves_empty() {
        let repo = InMemoryClientRepository::default();
        repo.upsert(ClientRecord {
            phone: "59170000002".to_string(),
            name: Some("Ana Rojas".to_string()),
            department: Some("Santa Cruz".to_string()),
            ..ClientRecord::default()
        })
        .await
        .expect("first upsert");
        repo.upsert(ClientRecord {
            phone: "59170000002".to_string(),
            crop: Some("Soya".to_string()),
            ..ClientRecord::default()
        })
        .await
        .expect("second upsert");

        let client = repo.find_by_phone("59170000002").await.expect("find").expect("client");
        assert_eq!(client.name.as_deref(), Some("Ana Rojas"));
        assert_eq!(client.department.as_deref(), Some("Santa Cruz"));
        assert_eq!(client.crop.as_deref(), Some("Soya"));
        assert!(repo.find_by_phone("59170000099").await.expect("find missing").is_none());
    }

    #[tokio::test]
    async fn billing_captures_are_listed_per_conversation() {
        let repo = InMemoryBillingRepository::default();
        repo.append(BillingCapture {
            conversation_id: "59170000003".to_string(),
            details: BillingDetails { nit: Some("1234567".to_string()), ..BillingDetails::default() },
            captured_at: Utc::now(),
        })
        .await
        .expect("append capture");

        assert_eq!(repo.list_for("59170000003").await.expect("list").len(), 1);
        assert!(repo.list_for("59170000004").await.expect("list other").is_empty());
    }

    #[tokio::test]
    async fn price_replace_swaps_the_whole_list() {
        let repo = InMemoryPriceRepository::default();
        assert!(repo.load().await.expect("load empty").entries().is_empty());

        repo.replace(PriceList::new(vec![PriceEntry {
            sku: "FB-01".to_string(),
            variant: None,
            unit_price: Decimal::new(1250, 2),
            currency: "USD".to_string(),
        }]))
        .await
        .expect("replace");

        let prices = repo.load().await.expect("load");
        assert_eq!(prices.unit_price("FB-01", "Bidón 20 L"), Some(Decimal::new(1250, 2)));
    }
}
