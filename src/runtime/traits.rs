//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::engine::EngineError;
use crate::enrich::Entity;
use crate::state_machine::{Identity, SessionId, TurnResponse};
use async_trait::async_trait;
use std::sync::Arc;

/// Client for the dialogue engine's turn protocol
#[async_trait]
pub trait TurnClient: Send + Sync {
    /// Establish server-side session context for `(identity, session_id)`.
    /// Not idempotent; callers must issue it once per session.
    async fn start_session(
        &self,
        identity: &Identity,
        session_id: &SessionId,
    ) -> Result<(), EngineError>;

    /// Submit one user turn and wait for the engine's reply
    async fn continue_turn(
        &self,
        identity: &Identity,
        session_id: &SessionId,
        text: &str,
    ) -> Result<TurnResponse, EngineError>;
}

/// Lookup service resolving a single entity id
#[async_trait]
pub trait EntityLookup: Send + Sync {
    async fn lookup(&self, entity_id: &str) -> Result<Entity, EngineError>;
}

/// The auth collaborator
pub trait IdentitySource: Send + Sync {
    /// Whether identity resolution has finished (successfully or not)
    fn is_loaded(&self) -> bool;

    /// Current identity, absent until resolved or when signed out
    fn current(&self) -> Option<Identity>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: TurnClient + ?Sized> TurnClient for Arc<T> {
    async fn start_session(
        &self,
        identity: &Identity,
        session_id: &SessionId,
    ) -> Result<(), EngineError> {
        (**self).start_session(identity, session_id).await
    }

    async fn continue_turn(
        &self,
        identity: &Identity,
        session_id: &SessionId,
        text: &str,
    ) -> Result<TurnResponse, EngineError> {
        (**self).continue_turn(identity, session_id, text).await
    }
}

#[async_trait]
impl<T: EntityLookup + ?Sized> EntityLookup for Arc<T> {
    async fn lookup(&self, entity_id: &str) -> Result<Entity, EngineError> {
        (**self).lookup(entity_id).await
    }
}

impl<T: IdentitySource + ?Sized> IdentitySource for Arc<T> {
    fn is_loaded(&self) -> bool {
        (**self).is_loaded()
    }

    fn current(&self) -> Option<Identity> {
        (**self).current()
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Identity fixed at startup (e.g. from configuration)
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    identity: Option<Identity>,
}

impl StaticIdentity {
    pub fn new(identity: Option<Identity>) -> Self {
        Self { identity }
    }
}

impl IdentitySource for StaticIdentity {
    fn is_loaded(&self) -> bool {
        true
    }

    fn current(&self) -> Option<Identity> {
        self.identity.clone()
    }
}
