//! Chat runtime executor

use super::traits::{EntityLookup, IdentitySource, TurnClient};
use super::{ChatUpdate, ChatView};

use crate::conversation::ConversationLog;
use crate::enrich::{Entity, EntityEnricher};
use crate::state_machine::{
    transition, Effect, Event, FailureKind, Identity, SessionContext, SessionState,
    TransitionError,
};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

/// Generic chat runtime that can work with any engine, lookup and identity implementations
pub struct ChatRuntime<T, L, I>
where
    T: TurnClient + 'static,
    L: EntityLookup + 'static,
    I: IdentitySource,
{
    context: SessionContext,
    state: SessionState,
    log: ConversationLog,
    /// Entities currently displayed, from the latest enriched turn
    entities: Vec<Entity>,
    input_enabled: bool,
    pending_calls: usize,
    last_failure: Option<FailureKind>,
    /// Identity the session was bootstrapped with
    identity: Option<Identity>,
    turn_client: Arc<T>,
    enricher: Arc<EntityEnricher<L>>,
    identity_source: I,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    broadcast_tx: broadcast::Sender<ChatUpdate>,
    view_tx: watch::Sender<ChatView>,
}

impl<T, L, I> ChatRuntime<T, L, I>
where
    T: TurnClient + 'static,
    L: EntityLookup + 'static,
    I: IdentitySource,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: SessionContext,
        turn_client: Arc<T>,
        lookup: Arc<L>,
        identity_source: I,
        event_rx: mpsc::Receiver<Event>,
        event_tx: mpsc::Sender<Event>,
        broadcast_tx: broadcast::Sender<ChatUpdate>,
        view_tx: watch::Sender<ChatView>,
    ) -> Self {
        Self {
            context,
            state: SessionState::Uninitialized,
            log: ConversationLog::new(),
            entities: Vec::new(),
            input_enabled: true,
            pending_calls: 0,
            last_failure: None,
            identity: None,
            turn_client,
            enricher: Arc::new(EntityEnricher::new(lookup)),
            identity_source,
            event_rx,
            event_tx,
            broadcast_tx,
            view_tx,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(session_id = %self.context.session_id, "Starting chat runtime");

        // Bootstrap waits for the auth collaborator; a later IdentityResolved
        // event picks it up if it is not ready yet.
        if !self.identity_source.is_loaded() {
            tracing::info!("Identity still loading, deferring session bootstrap");
        } else if let Some(identity) = self.identity_source.current() {
            self.process_event(Event::IdentityResolved { identity });
        } else {
            tracing::warn!("No identity available, deferring session bootstrap");
        }

        while let Some(event) = self.event_rx.recv().await {
            self.process_event(event);
        }

        tracing::info!(session_id = %self.context.session_id, "Chat runtime stopped");
    }

    fn process_event(&mut self, event: Event) {
        let event_name = event.name();
        if matches!(
            event,
            Event::TurnSucceeded { .. }
                | Event::TurnFailed { .. }
                | Event::EntitiesResolved { .. }
                | Event::EnrichmentFailed { .. }
        ) {
            self.pending_calls = self.pending_calls.saturating_sub(1);
        }

        match transition(&self.state, &self.context, event) {
            Ok(result) => {
                if result.new_state.phase() != self.state.phase() {
                    tracing::info!(
                        session_id = %self.context.session_id,
                        from = self.state.phase(),
                        to = result.new_state.phase(),
                        "Session state changed"
                    );
                }
                self.state = result.new_state;

                for effect in result.effects {
                    self.execute_effect(effect);
                }
            }
            Err(TransitionError::StaleTurn { turn, latest }) => {
                tracing::debug!(
                    event = event_name,
                    turn,
                    latest,
                    "Discarding result for superseded turn"
                );
            }
            Err(e) => {
                tracing::warn!(event = event_name, error = %e, "Event rejected");
            }
        }

        self.publish_view();
    }

    /// Execute an effect. Remote calls are spawned and report back as events.
    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::StartSession { identity } => {
                self.identity = Some(identity.clone());

                let turn_client = self.turn_client.clone();
                let event_tx = self.event_tx.clone();
                let session_id = self.context.session_id.clone();

                tokio::spawn(async move {
                    tracing::info!(session_id = %session_id, "Starting session (background)");
                    let event = match turn_client.start_session(&identity, &session_id).await {
                        Ok(()) => Event::BootstrapSucceeded,
                        Err(e) => Event::BootstrapFailed {
                            message: e.to_string(),
                        },
                    };
                    let _ = event_tx.send(event).await;
                });
            }

            Effect::AppendMessage(message) => {
                self.log.append(message.clone());
                let _ = self.broadcast_tx.send(ChatUpdate::Message(message));
            }

            Effect::NotifySessionStarted => {
                let _ = self.broadcast_tx.send(ChatUpdate::SessionStarted {
                    session_id: self.context.session_id.clone(),
                });
            }

            Effect::RequestTurn { turn, text } => {
                self.pending_calls += 1;
                let event_tx = self.event_tx.clone();
                let Some(identity) = self.identity.clone() else {
                    // Active implies a bootstrapped identity
                    tracing::error!(turn, "Turn requested without an identity");
                    tokio::spawn(async move {
                        let _ = event_tx
                            .send(Event::TurnFailed {
                                turn,
                                message: "No identity".to_string(),
                            })
                            .await;
                    });
                    return;
                };

                let turn_client = self.turn_client.clone();
                let session_id = self.context.session_id.clone();

                tokio::spawn(async move {
                    tracing::info!(session_id = %session_id, turn, "Sending turn (background)");
                    let event = match turn_client.continue_turn(&identity, &session_id, &text).await {
                        Ok(response) => Event::TurnSucceeded { turn, response },
                        Err(e) => {
                            tracing::debug!(turn, transient = e.kind.is_transient(), "Turn call failed");
                            Event::TurnFailed {
                                turn,
                                message: e.to_string(),
                            }
                        }
                    };
                    let _ = event_tx.send(event).await;
                });
            }

            Effect::TopicChanged { topic } => {
                let script = &self.context.script;
                let _ = self.broadcast_tx.send(ChatUpdate::TopicChanged {
                    title: script.title_for(&topic).to_string(),
                    background: script.background_for(&topic),
                    topic,
                });
            }

            Effect::Enrich { turn, entity_ids } => {
                self.pending_calls += 1;
                let enricher = self.enricher.clone();
                let event_tx = self.event_tx.clone();

                tokio::spawn(async move {
                    tracing::info!(turn, count = entity_ids.len(), "Resolving entities (background)");
                    let event = match enricher.enrich(&entity_ids).await {
                        Ok(entities) => Event::EntitiesResolved { turn, entities },
                        Err(e) => Event::EnrichmentFailed {
                            turn,
                            message: e.to_string(),
                        },
                    };
                    let _ = event_tx.send(event).await;
                });
            }

            Effect::ShowEntities { entities } => {
                self.entities.clone_from(&entities);
                let _ = self.broadcast_tx.send(ChatUpdate::Entities(entities));
            }

            Effect::CloseInput => {
                self.input_enabled = false;
                let _ = self.broadcast_tx.send(ChatUpdate::InputClosed {
                    farewell: self.context.script.farewell.clone(),
                });
            }

            Effect::ReportError { kind, message } => {
                self.last_failure = Some(kind);
                tracing::error!(
                    session_id = %self.context.session_id,
                    failure = %kind,
                    error = %message,
                    "Chat operation failed"
                );
            }
        }
    }

    fn publish_view(&self) {
        let topic = self.state.topic();
        let script = &self.context.script;
        self.view_tx.send_replace(ChatView {
            session_id: self.context.session_id.clone(),
            state: self.state.clone(),
            title: script.title_for(topic).to_string(),
            background: script.background_for(topic),
            messages: self.log.messages().to_vec(),
            entities: self.entities.clone(),
            input_enabled: self.input_enabled,
            pending_calls: self.pending_calls,
            last_failure: self.last_failure,
        });
    }
}
