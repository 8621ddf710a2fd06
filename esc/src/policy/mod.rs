//! Escalation policies
//!
//! A policy observes the errors fed to it and decides which ones deserve
//! escalation. Two implementations ship with the crate:
//!
//! - [`ImmediatePolicy`] - escalates every error it sees
//! - [`ThresholdPolicy`] - escalates once enough errors land inside a
//!   sliding time window

use std::sync::Arc;

mod immediate;
mod threshold;

pub use immediate::ImmediatePolicy;
pub use threshold::{ThresholdConfig, ThresholdPolicy};

/// Shared handle to an error observed by the escalator.
///
/// Errors travel through intake channels and may be retained inside policy
/// state while an evaluation task still holds a handle, so they are
/// reference-counted rather than owned.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Decides how to handle errors that occur in an asynchronous context.
///
/// One worker task is bound to each registered policy, and that worker
/// spawns an independent evaluation task per error, so [`Policy::receive`]
/// must tolerate concurrent invocations on the same instance.
pub trait Policy: Send + Sync {
    /// Called when the policy is unregistered. Use it for cleanup of state
    /// and resources. Invoked at most once.
    fn close(&self) {}

    /// Desired capacity for this policy's intake channel buffer.
    /// 0 means no preference; the escalator applies its default.
    fn desired_buffer_size(&self) -> usize {
        0
    }

    /// Human-readable name for the policy. Need not be unique.
    fn name(&self) -> &str;

    /// Unique identifier for the policy. Falls back to [`Policy::name`] as
    /// the registry key when empty; at least one of the two must be
    /// non-empty to register.
    fn uniq_id(&self) -> &str;

    /// Called once per error fed to this policy. Returns true iff the error
    /// should be escalated. The escalator treats this as infallible.
    fn receive(&self, err: &SharedError) -> bool;
}
