//! Dispatch message and error types

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::policy::SharedError;

/// Errors from escalator registry operations and intake sends
#[derive(Debug, Error)]
pub enum EscalatorError {
    #[error("policy has no name or uniq_id")]
    MissingIdentity,

    #[error("policy '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("policy '{0}' is not registered")]
    NotRegistered(String),

    #[error("policy '{0}' intake is closed")]
    IntakeClosed(String),
}

/// An error escalated by a policy, wrapped with the policy's identity.
///
/// The original error stays reachable through [`std::error::Error::source`].
#[derive(Debug, Clone)]
pub struct Escalation {
    name: String,
    uniq_id: String,
    source: SharedError,
}

impl Escalation {
    pub(super) fn new(name: &str, uniq_id: &str, source: SharedError) -> Self {
        let name = if name.is_empty() { "<unnamed>" } else { name };
        Self {
            name: name.to_string(),
            uniq_id: uniq_id.to_string(),
            source,
        }
    }

    /// Name of the policy that escalated
    pub fn policy_name(&self) -> &str {
        &self.name
    }

    /// Unique id of the policy that escalated, empty if it had none
    pub fn policy_uniq_id(&self) -> &str {
        &self.uniq_id
    }

    /// Consume the escalation, returning the original error
    pub fn into_source(self) -> SharedError {
        self.source
    }
}

impl fmt::Display for Escalation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.uniq_id.is_empty() {
            write!(f, "async error policy '{}' escalated: {}", self.name, self.source)
        } else {
            write!(
                f,
                "async error policy '{}' ({}) escalated: {}",
                self.name, self.uniq_id, self.source
            )
        }
    }
}

impl std::error::Error for Escalation {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.source)
    }
}

/// Send endpoint for a registered policy's intake channel.
///
/// The only sanctioned way to feed errors to a policy. Cheap to clone.
#[derive(Clone)]
pub struct IntakeSender {
    tx: mpsc::Sender<SharedError>,
    key: String,
}

impl IntakeSender {
    pub(super) fn new(tx: mpsc::Sender<SharedError>, key: String) -> Self {
        Self { tx, key }
    }

    /// Registry key of the policy this sender feeds
    pub fn policy_key(&self) -> &str {
        &self.key
    }

    /// Send an error to the policy. Blocks when the intake buffer is full.
    ///
    /// Fails with [`EscalatorError::IntakeClosed`] once the policy has been
    /// unregistered; well-behaved producers stop sending first.
    pub async fn send(&self, err: SharedError) -> Result<(), EscalatorError> {
        self.tx
            .send(err)
            .await
            .map_err(|_| EscalatorError::IntakeClosed(self.key.clone()))
    }

    /// Send a concrete error value, wrapping it into a [`SharedError`]
    pub async fn report<E>(&self, err: E) -> Result<(), EscalatorError>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.send(Arc::new(err)).await
    }
}
