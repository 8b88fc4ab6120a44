//! Chat session state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::{Effect, FailureKind};
pub use event::Event;
pub use state::{Identity, SessionContext, SessionId, SessionState, TurnResponse, COMPLETED_STATE};
pub use transition::{transition, TransitionError};
