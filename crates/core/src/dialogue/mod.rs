//! Slot-filling dialogue for the quoting assistant.
//!
//! Parsing, intent detection and wording are plain functions; the
//! [`engine::DialogueEngine`] ties them together around a [`Session`].
//!
//! [`Session`]: crate::domain::session::Session

pub mod actions;
pub mod engine;
pub mod intents;
pub mod matching;
pub mod messages;
pub mod options;
pub mod outbound;
pub mod parse;
pub mod slots;
pub mod stage;
pub mod text;

pub use actions::InteractiveAction;
pub use engine::{DialogueEngine, DialogueSettings, Effect, Turn, TurnStep};
pub use matching::{ProductMatch, ProductMatcher};
pub use messages::{AdvisorProfile, LeadAlert, LeadReason};
pub use outbound::{Choice, ListRow, MediaSource, OutboundMessage};
pub use stage::{Stage, StageAction, StageEvent, StageMachine, StageTransition, StageTransitionError};
