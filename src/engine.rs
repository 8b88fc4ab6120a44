//! Remote collaborators: the dialogue engine and the entity lookup service
//!
//! The runtime talks to both through the traits in `runtime::traits`; this
//! module provides the HTTP+JSON implementations and their error type.

mod error;
mod http;

pub use error::{EngineError, EngineErrorKind};
pub use http::{HttpEntityLookup, HttpTurnClient};
