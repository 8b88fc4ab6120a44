//! Runtime driving a chat session
//!
//! A single task owns the session state, the conversation log and the
//! displayed entities. Remote calls run as background tasks that report back
//! through the event channel; the pure transition function decides what each
//! result means.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::ChatRuntime;
pub use traits::*;

use crate::config::ChatScript;
use crate::conversation::Message;
use crate::enrich::Entity;
use crate::state_machine::{Event, FailureKind, Identity, SessionContext, SessionId, SessionState};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};

/// Incremental updates for the presentation layer
#[derive(Debug, Clone)]
pub enum ChatUpdate {
    SessionStarted {
        session_id: SessionId,
    },
    Message(Message),
    TopicChanged {
        topic: String,
        title: String,
        background: String,
    },
    Entities(Vec<Entity>),
    InputClosed {
        farewell: String,
    },
}

/// Snapshot of everything the presentation layer renders
#[derive(Debug, Clone, Serialize)]
pub struct ChatView {
    pub session_id: SessionId,
    pub state: SessionState,
    pub title: String,
    pub background: String,
    pub messages: Vec<Message>,
    pub entities: Vec<Entity>,
    pub input_enabled: bool,
    /// Turn and enrichment calls still awaiting a result
    pub pending_calls: usize,
    /// Most recent failure, for front-ends that need to stop on it
    pub last_failure: Option<FailureKind>,
}

impl ChatView {
    fn initial(session_id: SessionId, script: &ChatScript) -> Self {
        Self {
            session_id,
            state: SessionState::Uninitialized,
            title: script.title_for("").to_string(),
            background: script.background_for(""),
            messages: vec![],
            entities: vec![],
            input_enabled: true,
            pending_calls: 0,
            last_failure: None,
        }
    }
}

#[derive(Debug, Error)]
#[error("Chat runtime has stopped")]
pub struct ChatClosed;

/// Front-end handle to a running chat session
pub struct ChatHandle {
    event_tx: mpsc::Sender<Event>,
    view_rx: watch::Receiver<ChatView>,
    /// Input buffer, cleared by every submission attempt
    draft: String,
}

impl ChatHandle {
    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Submit the current draft as a user turn.
    ///
    /// The draft is cleared whether or not the submission is accepted.
    pub async fn submit(&mut self) -> Result<(), ChatClosed> {
        let text = std::mem::take(&mut self.draft);
        if !self.input_enabled() {
            tracing::debug!("Input closed, dropping submission");
            return Ok(());
        }
        self.send(Event::UserSubmit { text }).await
    }

    /// Report an identity that resolved after the session was created
    pub async fn identity_resolved(&self, identity: Identity) -> Result<(), ChatClosed> {
        self.send(Event::IdentityResolved { identity }).await
    }

    pub fn input_enabled(&self) -> bool {
        self.view_rx.borrow().input_enabled
    }

    pub fn view(&self) -> watch::Receiver<ChatView> {
        self.view_rx.clone()
    }

    async fn send(&self, event: Event) -> Result<(), ChatClosed> {
        self.event_tx.send(event).await.map_err(|_| ChatClosed)
    }
}

/// Spawn the runtime for a new session.
///
/// Returns the handle and an update receiver subscribed before the runtime
/// starts, so the bootstrap messages are never missed.
pub fn spawn_chat<T, L, I>(
    context: SessionContext,
    turn_client: T,
    lookup: L,
    identity_source: I,
) -> (ChatHandle, broadcast::Receiver<ChatUpdate>)
where
    T: TurnClient + 'static,
    L: EntityLookup + 'static,
    I: IdentitySource + 'static,
{
    let (event_tx, event_rx) = mpsc::channel(32);
    let (broadcast_tx, broadcast_rx) = broadcast::channel(128);
    let (view_tx, view_rx) = watch::channel(ChatView::initial(
        context.session_id.clone(),
        &context.script,
    ));

    let runtime = ChatRuntime::new(
        context,
        Arc::new(turn_client),
        Arc::new(lookup),
        identity_source,
        event_rx,
        event_tx.clone(),
        broadcast_tx,
        view_tx,
    );
    tokio::spawn(runtime.run());

    let handle = ChatHandle {
        event_tx,
        view_rx,
        draft: String::new(),
    };
    (handle, broadcast_rx)
}
