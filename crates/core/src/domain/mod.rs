pub mod catalog;
pub mod inbound;
pub mod records;
pub mod session;

pub use catalog::{Catalog, Category, Product, Unit, Variant};
pub use inbound::{InboundEvent, InboundKind, Selection};
pub use records::{BillingDetails, ClientRecord, HistoryRow, PriceEntry, PriceList, QuoteLine, QuoteRecord};
pub use session::{
    CartItem, ConversationSummary, MemoryEntry, Origin, ProductRef, Prompt, Quantity, Referral,
    Role, Session, Slot,
};
