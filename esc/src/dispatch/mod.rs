//! Escalation dispatch
//!
//! The [`Escalator`] owns the registry of active policies, one intake
//! channel and worker task per policy, and the single shared escalation
//! channel the embedding application drains.

mod core;
mod messages;

pub use self::core::Escalator;
pub use messages::{Escalation, EscalatorError, IntakeSender};
