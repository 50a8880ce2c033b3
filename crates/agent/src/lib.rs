//! Conversation runtime for the quoting assistant.
//!
//! Sits between the channel and the dialogue engine: resolves sessions,
//! drops duplicate and overlapping deliveries, runs a turn, queues the
//! replies and carries out the turn's effects against the record
//! collaborators. Operator actions (send, media, read, handoff) and the
//! live event feed for consoles live here as well.

pub mod escalation;
pub mod events;
pub mod guardrails;
pub mod handoff;
pub mod render;
pub mod runtime;
pub mod store;
pub mod sweeper;

pub use escalation::AdvisorDesk;
pub use events::{EventBus, LiveEvent};
pub use guardrails::{BusyGuard, BusySet, SeenSet};
pub use handoff::{HandoffController, HandoffMode, HandoffOutcome, HandoffState};
pub use render::{NoopRenderer, QuoteRenderer, RenderError, RenderedQuote};
pub use runtime::{
    Collaborators, ConversationHistory, ConversationRuntime, InboundOutcome, MediaUpload,
    RuntimeError, RuntimeSettings,
};
pub use store::{SessionHandle, SessionStore};
pub use sweeper::Sweepers;
