//! Immediate escalation policy

use tracing::info;

use super::{Policy, SharedError};

/// Escalates every error it receives.
#[derive(Debug, Clone, Default)]
pub struct ImmediatePolicy {
    name: String,
    uniq_id: String,
    log_received: bool,
}

impl ImmediatePolicy {
    /// Create a policy with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uniq_id: String::new(),
            log_received: false,
        }
    }

    /// Set a unique identifier for this policy instance
    pub fn with_uniq_id(mut self, uniq_id: impl Into<String>) -> Self {
        self.uniq_id = uniq_id.into();
        self
    }

    /// Also log each received error before escalating it
    pub fn with_logging(mut self) -> Self {
        self.log_received = true;
        self
    }
}

impl Policy for ImmediatePolicy {
    fn desired_buffer_size(&self) -> usize {
        1
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn uniq_id(&self) -> &str {
        &self.uniq_id
    }

    fn receive(&self, err: &SharedError) -> bool {
        if self.log_received {
            info!(policy = %self.name, error = %err, "error received");
        }
        true
    }
}
