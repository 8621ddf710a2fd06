//! Escalator configuration

use serde::{Deserialize, Serialize};

/// Escalator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalatorConfig {
    /// Capacity of the shared escalation channel
    #[serde(default = "default_escalation_buffer")]
    pub escalation_buffer: usize,

    /// Intake capacity for policies that state no preference
    #[serde(default = "default_intake_buffer")]
    pub default_intake_buffer: usize,

    /// Max concurrently running evaluation tasks across all policies.
    /// 0 means unbounded.
    #[serde(default)]
    pub max_concurrent_evaluations: usize,
}

fn default_escalation_buffer() -> usize {
    32
}

fn default_intake_buffer() -> usize {
    32
}

impl Default for EscalatorConfig {
    fn default() -> Self {
        Self {
            escalation_buffer: 32,
            default_intake_buffer: 32,
            max_concurrent_evaluations: 0,
        }
    }
}
