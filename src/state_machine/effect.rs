//! Effects produced by state transitions

use super::state::Identity;
use crate::conversation::{Message, Sender};
use crate::enrich::Entity;
use serde::Serialize;
use std::fmt;

/// Which remote step failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// start-session call failed
    Bootstrap,
    /// continue-turn call failed
    Turn,
    /// one or more entity lookups failed
    Enrichment,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Bootstrap => "bootstrap",
            FailureKind::Turn => "turn",
            FailureKind::Enrichment => "enrichment",
        })
    }
}

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Call start-session on the engine (spawns as background task)
    StartSession { identity: Identity },

    /// Append a message to the conversation log
    AppendMessage(Message),

    /// Session is live on the engine
    NotifySessionStarted,

    /// Call continue-turn on the engine (spawns as background task)
    RequestTurn { turn: u64, text: String },

    /// Presentation topic changed
    TopicChanged { topic: String },

    /// Resolve entity ids (spawns as background task)
    Enrich { turn: u64, entity_ids: Vec<String> },

    /// Replace the displayed entity set
    ShowEntities { entities: Vec<Entity> },

    /// Disable input permanently
    CloseInput,

    /// Record a failure for diagnostics
    ReportError { kind: FailureKind, message: String },
}

impl Effect {
    pub fn user_message(text: impl Into<String>) -> Self {
        Effect::AppendMessage(Message::new(text, Sender::User))
    }

    pub fn bot_message(text: impl Into<String>) -> Self {
        Effect::AppendMessage(Message::new(text, Sender::Bot))
    }

    pub fn report(kind: FailureKind, message: impl Into<String>) -> Self {
        Effect::ReportError {
            kind,
            message: message.into(),
        }
    }
}
