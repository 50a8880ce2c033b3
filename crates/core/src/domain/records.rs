use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::catalog::Unit;
use crate::domain::session::Role;

/// What the client directory remembers about a phone number.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub phone: String,
    pub name: Option<String>,
    pub department: Option<String>,
    pub subzone: Option<String>,
    pub crop: Option<String>,
    pub hectares: Option<String>,
    pub season: Option<String>,
}

impl ClientRecord {
    /// "Santa Cruz - Norte" style location, or whatever part is known.
    pub fn location(&self) -> String {
        location_label(self.department.as_deref(), self.subzone.as_deref())
    }

    /// Parses a stored "dep - zona" location back into its two parts.
    pub fn split_location(location: &str) -> (Option<String>, Option<String>) {
        let mut parts = location.splitn(2, " - ").map(str::trim).filter(|part| !part.is_empty());
        (parts.next().map(str::to_string), parts.next().map(str::to_string))
    }
}

pub fn location_label(department: Option<&str>, subzone: Option<&str>) -> String {
    match (department, subzone) {
        (Some(department), Some(subzone)) => format!("{department} - {subzone}"),
        (Some(department), None) => department.to_string(),
        (None, Some(subzone)) => subzone.to_string(),
        (None, None) => String::new(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteLine {
    pub sku: String,
    pub product_name: String,
    pub variant: String,
    pub quantity: Decimal,
    pub unit: Unit,
    pub unit_price: Option<Decimal>,
    pub line_total: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub id: String,
    pub conversation_id: String,
    pub customer_name: String,
    pub department: Option<String>,
    pub subzone: Option<String>,
    pub crops: Vec<String>,
    pub hectares: Option<String>,
    pub season: Option<String>,
    pub lines: Vec<QuoteLine>,
    pub total: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl QuoteRecord {
    /// Fills unit prices from the price list. The total is only known when
    /// every line has a price.
    pub fn apply_prices(&mut self, prices: &PriceList) {
        for line in &mut self.lines {
            line.unit_price = prices.unit_price(&line.sku, &line.variant);
            line.line_total = line.unit_price.map(|price| price * line.quantity);
        }
        self.total = self
            .lines
            .iter()
            .map(|line| line.line_total)
            .try_fold(Decimal::ZERO, |total, line_total| line_total.map(|value| total + value));
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub sku: String,
    /// `None` applies to every presentation of the product.
    pub variant: Option<String>,
    pub unit_price: Decimal,
    pub currency: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceList {
    entries: Vec<PriceEntry>,
}

impl PriceList {
    pub fn new(entries: Vec<PriceEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[PriceEntry] {
        &self.entries
    }

    /// A presentation-specific price wins over the product-wide one.
    pub fn unit_price(&self, sku: &str, variant: &str) -> Option<Decimal> {
        let for_sku = || self.entries.iter().filter(move |entry| entry.sku == sku);
        for_sku()
            .find(|entry| entry.variant.as_deref() == Some(variant))
            .or_else(|| for_sku().find(|entry| entry.variant.is_none()))
            .map(|entry| entry.unit_price)
    }
}

/// Invoice and pickup details captured after a quote is accepted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingDetails {
    pub nit: Option<String>,
    pub business_name: Option<String>,
    pub plate: Option<String>,
    pub pickup_date: Option<String>,
    pub driver_name: Option<String>,
}

impl BillingDetails {
    pub fn is_empty(&self) -> bool {
        self.nit.is_none()
            && self.business_name.is_none()
            && self.plate.is_none()
            && self.pickup_date.is_none()
            && self.driver_name.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{ClientRecord, PriceEntry, PriceList, QuoteLine, QuoteRecord};
    use crate::domain::catalog::Unit;

    fn line(sku: &str, variant: &str, quantity: i64) -> QuoteLine {
        QuoteLine {
            sku: sku.to_string(),
            product_name: sku.to_string(),
            variant: variant.to_string(),
            quantity: Decimal::from(quantity),
            unit: Unit::Liter,
            unit_price: None,
            line_total: None,
        }
    }

    fn price(sku: &str, variant: Option<&str>, amount: i64) -> PriceEntry {
        PriceEntry {
            sku: sku.to_string(),
            variant: variant.map(str::to_string),
            unit_price: Decimal::from(amount),
            currency: "USD".to_string(),
        }
    }

    #[test]
    fn prices_join_by_sku_and_presentation() {
        let prices = PriceList::new(vec![
            price("A", None, 4),
            price("A", Some("Bidón 20 L"), 3),
            price("B", None, 10),
        ]);
        let mut quote = QuoteRecord {
            id: "q-1".to_string(),
            conversation_id: "59170000000".to_string(),
            customer_name: "Juan Pérez".to_string(),
            department: None,
            subzone: None,
            crops: Vec::new(),
            hectares: None,
            season: None,
            lines: vec![line("A", "Bidón 20 L", 40), line("B", "Bolsa", 2)],
            total: None,
            created_at: Utc::now(),
        };

        quote.apply_prices(&prices);
        assert_eq!(quote.lines[0].line_total, Some(Decimal::from(120)));
        assert_eq!(quote.total, Some(Decimal::from(140)));

        quote.lines.push(line("C", "Caja", 1));
        quote.apply_prices(&prices);
        assert_eq!(quote.total, None);
    }

    #[test]
    fn location_round_trips_through_label() {
        let client = ClientRecord {
            department: Some("Santa Cruz".to_string()),
            subzone: Some("Norte".to_string()),
            ..ClientRecord::default()
        };
        assert_eq!(client.location(), "Santa Cruz - Norte");
        assert_eq!(
            ClientRecord::split_location("Santa Cruz - Norte"),
            (Some("Santa Cruz".to_string()), Some("Norte".to_string()))
        );
        assert_eq!(ClientRecord::split_location("La Paz"), (Some("La Paz".to_string()), None));
    }
}
