//! Pure state transition function
//!
//! Given the same state, context and event this always yields the same new
//! state and effects. All I/O happens in the runtime that executes the effects.

use super::{Effect, Event, FailureKind, SessionContext, SessionState};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Input is empty")]
    EmptyInput,
    #[error("Session has not started yet")]
    NotStarted,
    #[error("Session already started")]
    AlreadyStarted,
    #[error("Chat has ended")]
    SessionEnded,
    #[error("Result for turn {turn} is stale (latest turn is {latest})")]
    StaleTurn { turn: u64, latest: u64 },
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
#[allow(clippy::too_many_lines)]
pub fn transition(
    state: &SessionState,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    let script = &context.script;

    match (state, event) {
        // ============================================================
        // Bootstrap
        // ============================================================

        // Uninitialized + IdentityResolved -> Starting
        (SessionState::Uninitialized, Event::IdentityResolved { identity }) => {
            Ok(TransitionResult::new(SessionState::Starting)
                .with_effect(Effect::StartSession { identity }))
        }

        (_, Event::IdentityResolved { .. }) => Err(TransitionError::AlreadyStarted),

        // Starting + BootstrapSucceeded -> Active("")
        (SessionState::Starting, Event::BootstrapSucceeded) => Ok(TransitionResult::new(
            SessionState::Active {
                topic: String::new(),
                latest_turn: 0,
            },
        )
        .with_effect(Effect::user_message(
            script.session_announcement(&context.session_id),
        ))
        .with_effect(Effect::bot_message(script.greeting.clone()))
        .with_effect(Effect::NotifySessionStarted)),

        // Starting + BootstrapFailed -> Uninitialized (no retry)
        (SessionState::Starting, Event::BootstrapFailed { message }) => {
            Ok(TransitionResult::new(SessionState::Uninitialized)
                .with_effect(Effect::report(FailureKind::Bootstrap, message)))
        }

        // ============================================================
        // User Submission
        // ============================================================

        // Blank input is rejected whatever the state
        (_, Event::UserSubmit { text }) if text.trim().is_empty() => {
            Err(TransitionError::EmptyInput)
        }

        // Active + UserSubmit -> Active (next turn number)
        (SessionState::Active { topic, latest_turn }, Event::UserSubmit { text }) => {
            let turn = latest_turn + 1;
            Ok(TransitionResult::new(SessionState::Active {
                topic: topic.clone(),
                latest_turn: turn,
            })
            .with_effect(Effect::user_message(text.clone()))
            .with_effect(Effect::RequestTurn { turn, text }))
        }

        (SessionState::Terminal { .. }, Event::UserSubmit { .. }) => {
            Err(TransitionError::SessionEnded)
        }

        (SessionState::Uninitialized | SessionState::Starting, Event::UserSubmit { .. }) => {
            Err(TransitionError::NotStarted)
        }

        // ============================================================
        // Turn Responses
        // ============================================================

        // Active + TurnSucceeded("completed") -> Terminal, whichever turn it answers
        (SessionState::Active { topic, .. }, Event::TurnSucceeded { response, .. })
            if response.is_completed() =>
        {
            let closing = format!("{}{}", script.closing_prefix, response.text);
            Ok(TransitionResult::new(SessionState::Terminal {
                topic: topic.clone(),
                closing: closing.clone(),
            })
            .with_effect(Effect::bot_message(closing))
            .with_effect(Effect::CloseInput))
        }

        // Superseded reply: keep its text, drop its topic and entities
        (SessionState::Active { latest_turn, .. }, Event::TurnSucceeded { turn, response })
            if turn != *latest_turn =>
        {
            Ok(TransitionResult::new(state.clone())
                .with_effect(Effect::bot_message(response.text)))
        }

        // Active + TurnSucceeded(topic) -> Active(topic)
        (SessionState::Active { topic, latest_turn }, Event::TurnSucceeded { turn, response }) => {
            let mut result = TransitionResult::new(SessionState::Active {
                topic: response.state.clone(),
                latest_turn: *latest_turn,
            })
            .with_effect(Effect::bot_message(response.text));

            if *topic != response.state {
                result = result.with_effect(Effect::TopicChanged {
                    topic: response.state,
                });
            }

            if !response.entity_ids.is_empty() {
                result = result.with_effect(Effect::Enrich {
                    turn,
                    entity_ids: response.entity_ids,
                });
            }

            Ok(result)
        }

        // Active + TurnFailed -> Active (unchanged, user may resubmit)
        (SessionState::Active { .. }, Event::TurnFailed { turn, message }) => {
            Ok(TransitionResult::new(state.clone()).with_effect(Effect::report(
                FailureKind::Turn,
                format!("turn {turn}: {message}"),
            )))
        }

        // ============================================================
        // Enrichment
        // ============================================================

        (SessionState::Active { latest_turn, .. }, Event::EntitiesResolved { turn, .. })
            if turn != *latest_turn =>
        {
            Err(TransitionError::StaleTurn {
                turn,
                latest: *latest_turn,
            })
        }

        (SessionState::Active { .. }, Event::EntitiesResolved { entities, .. }) => {
            Ok(TransitionResult::new(state.clone())
                .with_effect(Effect::ShowEntities { entities }))
        }

        // Enrichment is best-effort; the bot text is already in the log
        (SessionState::Active { .. }, Event::EnrichmentFailed { turn, message }) => {
            Ok(TransitionResult::new(state.clone()).with_effect(Effect::report(
                FailureKind::Enrichment,
                format!("turn {turn}: {message}"),
            )))
        }

        // ============================================================
        // Terminal
        // ============================================================
        (
            SessionState::Terminal { .. },
            Event::TurnSucceeded { .. }
            | Event::TurnFailed { .. }
            | Event::EntitiesResolved { .. }
            | Event::EnrichmentFailed { .. },
        ) => Err(TransitionError::SessionEnded),

        // ============================================================
        // Invalid Transitions
        // ============================================================
        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "No transition from {} with event {}",
            state.phase(),
            event.name()
        ))),
    }
}
