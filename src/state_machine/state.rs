//! Session state types

use crate::config::ChatScript;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine state label that ends the conversation
pub const COMPLETED_STATE: &str = "completed";

const SESSION_ID_LEN: usize = 9;
const SESSION_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

// ============================================================================
// Identifiers
// ============================================================================

/// Client-generated conversation identifier.
///
/// Drawn from a pseudo-random source, so two clients may collide. The engine
/// keys session context on `(identity, session_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh 9 character base-36 identifier
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id = (0..SESSION_ID_LEN)
            .map(|_| char::from(SESSION_ID_ALPHABET[rng.gen_range(0..SESSION_ID_ALPHABET.len())]))
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolved user identity, as handed over by the auth collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    /// Bearer credential for the remote services, if the provider issued one
    pub token: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

// ============================================================================
// Turn Response
// ============================================================================

/// Engine reply to a single user turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnResponse {
    /// Either [`COMPLETED_STATE`] or a free-form topic label
    pub state: String,
    pub text: String,
    pub entity_ids: Vec<String>,
}

impl TurnResponse {
    pub fn new(state: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            text: text.into(),
            entity_ids: vec![],
        }
    }

    pub fn with_entities<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_completed(&self) -> bool {
        self.state == COMPLETED_STATE
    }
}

// ============================================================================
// Session State
// ============================================================================

/// Session lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionState {
    /// No session on the engine yet (identity pending, or bootstrap failed)
    #[default]
    Uninitialized,

    /// Start-session call in flight
    Starting,

    /// Accepting turns
    Active {
        /// Presentation topic from the most recent turn, empty until the first reply
        topic: String,
        /// Sequence number of the most recently issued turn
        latest_turn: u64,
    },

    /// Engine reported `completed`; no further turns
    Terminal {
        /// Topic in effect when the chat ended
        topic: String,
        closing: String,
    },
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Terminal { .. })
    }

    /// Short label for logs and the read model
    pub fn phase(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Starting => "starting",
            SessionState::Active { .. } => "active",
            SessionState::Terminal { .. } => "terminal",
        }
    }

    pub fn topic(&self) -> &str {
        match self {
            SessionState::Active { topic, .. } | SessionState::Terminal { topic, .. } => topic,
            _ => "",
        }
    }
}

/// Context for a session (immutable for its lifetime)
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: SessionId,
    pub script: ChatScript,
}

impl SessionContext {
    pub fn new(session_id: SessionId, script: ChatScript) -> Self {
        Self { session_id, script }
    }
}
