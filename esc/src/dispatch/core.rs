//! Escalator implementation

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Semaphore, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::EscalatorConfig;
use crate::policy::{Policy, SharedError};

use super::messages::{Escalation, EscalatorError, IntakeSender};

/// Registry entry for an active policy
struct PolicyRecord {
    policy: Arc<dyn Policy>,
    shutdown_tx: oneshot::Sender<()>,
}

/// Manages a set of error policies.
///
/// Each registered policy consumes errors fed through its intake channel
/// and decides whether to escalate them. Every positive decision lands on
/// the shared escalation channel; the embedding application should drain
/// that channel and handle escalated errors, often by logging them and/or
/// stopping the program.
///
/// Dropping the escalator terminates all policy workers; evaluation tasks
/// already in flight run to completion.
pub struct Escalator {
    config: EscalatorConfig,
    escalation_tx: mpsc::Sender<Escalation>,
    escalation_rx: Mutex<Option<mpsc::Receiver<Escalation>>>,
    policies: Mutex<HashMap<String, PolicyRecord>>,
    eval_limit: Option<Arc<Semaphore>>,
}

impl Escalator {
    /// Create an escalator with the default configuration
    pub fn new() -> Self {
        Self::with_config(EscalatorConfig::default())
    }

    /// Create an escalator with the given configuration
    pub fn with_config(config: EscalatorConfig) -> Self {
        debug!(?config, "Escalator::with_config: called");
        let (escalation_tx, escalation_rx) = mpsc::channel(config.escalation_buffer.max(1));
        let eval_limit = match config.max_concurrent_evaluations {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };
        Self {
            config,
            escalation_tx,
            escalation_rx: Mutex::new(Some(escalation_rx)),
            policies: Mutex::new(HashMap::new()),
            eval_limit,
        }
    }

    /// Take the receive side of the shared escalation channel.
    ///
    /// There is exactly one receiver; the first call takes it and later
    /// calls return None. The consumer must drain it continuously or accept
    /// that evaluation tasks block on delivery.
    pub fn escalation_channel(&self) -> Option<mpsc::Receiver<Escalation>> {
        self.escalation_rx.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Register a policy, spawning its dedicated worker.
    ///
    /// Returns the send endpoint of the policy's intake channel; the caller
    /// feeds errors to the policy through it. The policy must have a
    /// `uniq_id` or a `name`, unique among registered policies.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register_policy(&self, policy: Arc<dyn Policy>) -> Result<IntakeSender, EscalatorError> {
        let key = registry_key(policy.as_ref())?;
        debug!(%key, "Escalator::register_policy: called");

        let mut policies = self.policies.lock().unwrap_or_else(|e| e.into_inner());
        if policies.contains_key(&key) {
            return Err(EscalatorError::AlreadyRegistered(key));
        }

        let buffer = match policy.desired_buffer_size() {
            0 => self.config.default_intake_buffer,
            n => n,
        };
        let (intake_tx, intake_rx) = mpsc::channel(buffer.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(policy_worker(
            key.clone(),
            Arc::clone(&policy),
            intake_rx,
            self.escalation_tx.clone(),
            shutdown_rx,
            self.eval_limit.clone(),
        ));

        policies.insert(key.clone(), PolicyRecord { policy, shutdown_tx });
        info!(%key, buffer, "policy registered");

        Ok(IntakeSender::new(intake_tx, key))
    }

    /// Unregister a policy, closing its intake and invoking its `close`.
    ///
    /// Fire-and-forget with respect to work already dispatched: evaluation
    /// tasks spawned before teardown run to completion and may still deliver
    /// escalations after this returns.
    pub fn unregister_policy(&self, policy: &dyn Policy) -> Result<(), EscalatorError> {
        let key = registry_key(policy)?;
        debug!(%key, "Escalator::unregister_policy: called");

        let record = {
            let mut policies = self.policies.lock().unwrap_or_else(|e| e.into_inner());
            policies
                .remove(&key)
                .ok_or_else(|| EscalatorError::NotRegistered(key.clone()))?
        };

        // Worker may already have exited if every intake sender was dropped
        let _ = record.shutdown_tx.send(());
        record.policy.close();
        info!(%key, "policy unregistered");

        Ok(())
    }
}

impl Default for Escalator {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry key: uniq_id, falling back to name
fn registry_key(policy: &dyn Policy) -> Result<String, EscalatorError> {
    if !policy.uniq_id().is_empty() {
        return Ok(policy.uniq_id().to_string());
    }
    if !policy.name().is_empty() {
        return Ok(policy.name().to_string());
    }
    Err(EscalatorError::MissingIdentity)
}

/// Dedicated worker loop for one registered policy.
///
/// Spawns an independent evaluation task per dequeued error and never awaits
/// it, so a slow policy cannot stall intake of subsequent errors.
async fn policy_worker(
    key: String,
    policy: Arc<dyn Policy>,
    mut intake_rx: mpsc::Receiver<SharedError>,
    escalation_tx: mpsc::Sender<Escalation>,
    mut shutdown_rx: oneshot::Receiver<()>,
    eval_limit: Option<Arc<Semaphore>>,
) {
    debug!(%key, "policy_worker: started");
    loop {
        tokio::select! {
            maybe_err = intake_rx.recv() => {
                match maybe_err {
                    Some(err) => {
                        tokio::spawn(evaluate(
                            Arc::clone(&policy),
                            err,
                            escalation_tx.clone(),
                            eval_limit.clone(),
                        ));
                    }
                    None => {
                        debug!(%key, "policy_worker: intake senders dropped");
                        break;
                    }
                }
            }
            _ = &mut shutdown_rx => {
                debug!(%key, "policy_worker: shutdown signal received");
                intake_rx.close();
                break;
            }
        }
    }
    debug!(%key, "policy_worker: exited");
}

/// One evaluation of one error against one policy.
///
/// A blocked escalation send is isolated here; the worker loop has already
/// moved on.
async fn evaluate(
    policy: Arc<dyn Policy>,
    err: SharedError,
    escalation_tx: mpsc::Sender<Escalation>,
    eval_limit: Option<Arc<Semaphore>>,
) {
    let _permit = match eval_limit {
        Some(semaphore) => match semaphore.acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(_) => return,
        },
        None => None,
    };

    if policy.receive(&err) {
        let escalation = Escalation::new(policy.name(), policy.uniq_id(), err);
        if escalation_tx.send(escalation).await.is_err() {
            warn!(
                name = policy.name(),
                uniq_id = policy.uniq_id(),
                "evaluate: escalation receiver dropped, discarding"
            );
        }
    }
}
