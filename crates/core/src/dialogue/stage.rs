use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::session::Slot;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discovery,
    Product,
    Closed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Product => "product",
            Self::Closed => "closed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageEvent {
    DiscoveryCompleted,
    AnotherProductRequested,
    Finalized,
    CloseRequested,
    Reopened,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageAction {
    AskCategory,
    ResetProductSlots,
    ClearCart,
    ClearSavedFlag,
    RecordQuote,
    NotifyAdvisors,
    MuteBot,
    ArchiveConversation,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StageContext {
    pub missing_discovery: Vec<Slot>,
    pub cart_items: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageTransition {
    pub from: Stage,
    pub to: Stage,
    pub event: StageEvent,
    pub actions: Vec<StageAction>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StageTransitionError {
    #[error("missing qualification before leaving {state:?}: {missing:?}")]
    MissingDiscovery { state: Stage, missing: Vec<Slot> },
    #[error("cannot finalize from {state:?} with an empty cart")]
    EmptyCart { state: Stage },
    #[error("invalid transition from {stage:?} using event {event:?}")]
    InvalidTransition { stage: Stage, event: StageEvent },
}

/// Legal stage moves. `closed` is only entered through `Finalized` or
/// `CloseRequested` and only left through `Reopened`.
#[derive(Clone, Copy, Debug, Default)]
pub struct StageMachine;

impl StageMachine {
    pub fn initial_stage(&self) -> Stage {
        Stage::Discovery
    }

    pub fn apply(
        &self,
        current: Stage,
        event: StageEvent,
        context: &StageContext,
    ) -> Result<StageTransition, StageTransitionError> {
        use StageAction::{
            ArchiveConversation, AskCategory, ClearCart, ClearSavedFlag, MuteBot, NotifyAdvisors,
            RecordQuote, ResetProductSlots,
        };
        use StageEvent::{
            AnotherProductRequested, CloseRequested, DiscoveryCompleted, Finalized, Reopened,
        };
        use Stage::{Closed, Discovery, Product};

        let (to, actions) = match (current, event) {
            (Discovery, DiscoveryCompleted) => {
                if !context.missing_discovery.is_empty() {
                    return Err(StageTransitionError::MissingDiscovery {
                        state: current,
                        missing: context.missing_discovery.clone(),
                    });
                }
                (Product, vec![AskCategory])
            }
            (Product, AnotherProductRequested) => (Product, vec![ResetProductSlots, AskCategory]),
            (Discovery, Finalized) | (Product, Finalized) => {
                if context.cart_items == 0 {
                    return Err(StageTransitionError::EmptyCart { state: current });
                }
                (Closed, vec![RecordQuote, NotifyAdvisors, MuteBot, ArchiveConversation])
            }
            (Discovery, CloseRequested) | (Product, CloseRequested) => {
                (Closed, vec![ArchiveConversation])
            }
            (Closed, Reopened) => {
                let to = if context.missing_discovery.is_empty() { Product } else { Discovery };
                (to, vec![ResetProductSlots, ClearCart, ClearSavedFlag])
            }
            _ => return Err(StageTransitionError::InvalidTransition { stage: current, event }),
        };

        Ok(StageTransition { from: current, to, event, actions })
    }
}
