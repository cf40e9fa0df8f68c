//! Per-connection lifecycle state machine
//!
//! Pure transitions in the Elm style: the record plus an event produce the
//! next record and a list of effects for the runtime to execute.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::{Event, InboundMessage};
pub use state::{ConnectionRecord, ConnectionStatus, SessionInfo};
pub use transition::{transition, TransitionError};
