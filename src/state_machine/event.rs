//! Events that can occur in a chat session

use super::state::{Identity, TurnResponse};
use crate::enrich::Entity;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Identity events
    IdentityResolved {
        identity: Identity,
    },

    // Bootstrap events
    BootstrapSucceeded,
    BootstrapFailed {
        message: String,
    },

    // User events
    UserSubmit {
        text: String,
    },

    // Engine events
    TurnSucceeded {
        turn: u64,
        response: TurnResponse,
    },
    TurnFailed {
        turn: u64,
        message: String,
    },

    // Enrichment events
    EntitiesResolved {
        turn: u64,
        entities: Vec<Entity>,
    },
    EnrichmentFailed {
        turn: u64,
        message: String,
    },
}

impl Event {
    /// Event name for structured logs
    pub fn name(&self) -> &'static str {
        match self {
            Event::IdentityResolved { .. } => "identity_resolved",
            Event::BootstrapSucceeded => "bootstrap_succeeded",
            Event::BootstrapFailed { .. } => "bootstrap_failed",
            Event::UserSubmit { .. } => "user_submit",
            Event::TurnSucceeded { .. } => "turn_succeeded",
            Event::TurnFailed { .. } => "turn_failed",
            Event::EntitiesResolved { .. } => "entities_resolved",
            Event::EnrichmentFailed { .. } => "enrichment_failed",
        }
    }
}
