//! Messaging transport: the adapter seam, the WhatsApp Cloud API client,
//! webhook handling and the per-recipient send queue.

pub mod adapter;
pub mod inbound;
pub mod queue;
pub mod verify;
pub mod whatsapp;

pub use adapter::{ChannelAdapter, ChannelError, Delivered, NoopChannel, RecordingChannel};
pub use inbound::normalize_webhook;
pub use queue::{Delivery, SendQueue};
pub use verify::{verify_handshake, verify_signature, HandshakeParams, WebhookError};
pub use whatsapp::WhatsAppChannel;
