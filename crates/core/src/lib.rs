pub mod config;
pub mod dialogue;
pub mod domain;
pub mod errors;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use dialogue::{
    DialogueEngine, DialogueSettings, Effect, InteractiveAction, LeadAlert, LeadReason,
    OutboundMessage, Stage, Turn, TurnStep,
};
pub use domain::{
    BillingDetails, Catalog, ClientRecord, ConversationSummary, InboundEvent, PriceList,
    QuoteRecord, Role, Session,
};
pub use errors::{ApplicationError, Degrade, DomainError, InterfaceError};
