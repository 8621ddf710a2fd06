//! Threshold escalation policy
//!
//! Counts errors inside a sliding time window and escalates once the count
//! reaches the configured threshold. Window pruning is amortized: stale
//! entries are only evicted during a compaction pass, at most once per
//! window, so between passes the stored window grows with intake volume.
//! The compaction cadence is the knob that trades memory for scan cost.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Policy, SharedError};

/// Threshold policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Human-readable name for the policy
    pub name: String,

    /// Unique identifier for the policy instance
    #[serde(default)]
    pub uniq_id: String,

    /// Number of errors that must land inside the window to escalate.
    /// Clamped to a minimum of 1.
    #[serde(default = "default_error_count")]
    pub error_count: usize,

    /// Sliding window duration in milliseconds
    #[serde(default = "default_time_window_ms")]
    pub time_window_ms: u64,

    /// Log every Nth received error. 0 disables sampling.
    #[serde(default)]
    pub log_every: usize,

    /// Intake buffer override. 0 derives `error_count * 2`.
    #[serde(default)]
    pub desired_buffer_size: usize,
}

fn default_error_count() -> usize {
    10
}

fn default_time_window_ms() -> u64 {
    60_000
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            uniq_id: String::new(),
            error_count: 10,
            time_window_ms: 60_000,
            log_every: 0,
            desired_buffer_size: 0,
        }
    }
}

impl ThresholdConfig {
    /// Get the sliding window as a Duration
    pub fn time_window(&self) -> Duration {
        Duration::from_millis(self.time_window_ms)
    }
}

/// An error observation inside the window
struct ErrorEvent {
    at: Instant,
    #[allow(dead_code)]
    err: SharedError,
}

/// Window state, guarded by the policy's own lock
struct WindowState {
    events: Vec<ErrorEvent>,
    last_compaction: Instant,
    skipped_since_last_log: usize,
}

/// Escalates an error when at least `error_count` errors are received
/// within `time_window`.
///
/// The lock serializes window mutation but imposes no order on concurrent
/// evaluation tasks; each decision reflects wall-clock state at the moment
/// the call acquires the lock, not a strict FIFO of error arrivals.
pub struct ThresholdPolicy {
    config: ThresholdConfig,
    state: Mutex<WindowState>,
}

impl ThresholdPolicy {
    /// Create a policy from its configuration
    pub fn new(config: ThresholdConfig) -> Self {
        let mut config = config;
        config.error_count = config.error_count.max(1);
        Self {
            config,
            state: Mutex::new(WindowState {
                events: Vec::new(),
                last_compaction: Instant::now(),
                skipped_since_last_log: 0,
            }),
        }
    }
}

impl Policy for ThresholdPolicy {
    fn desired_buffer_size(&self) -> usize {
        match self.config.desired_buffer_size {
            0 => self.config.error_count * 2,
            n => n,
        }
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn uniq_id(&self) -> &str {
        &self.config.uniq_id
    }

    fn receive(&self, err: &SharedError) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if self.config.log_every > 0 {
            state.skipped_since_last_log += 1;
            if state.skipped_since_last_log >= self.config.log_every {
                info!(policy = %self.config.name, error = %err, "sampled received error");
                state.skipped_since_last_log = 0;
            }
        }

        let now = Instant::now();
        let time_window = self.config.time_window();
        let perform_compaction = now.duration_since(state.last_compaction) > time_window;

        state.events.push(ErrorEvent {
            at: now,
            err: Arc::clone(err),
        });

        let mut in_window = 0;
        if perform_compaction {
            let mut compacted = Vec::with_capacity((state.events.len() / 2).max(2));
            for event in state.events.drain(..) {
                if now.duration_since(event.at) <= time_window {
                    in_window += 1;
                    compacted.push(event);
                }
            }
            state.events = compacted;
            state.last_compaction = now;
        } else {
            for event in &state.events {
                if now.duration_since(event.at) <= time_window {
                    in_window += 1;
                }
            }
        }

        in_window >= self.config.error_count
    }
}

#[cfg(test)]
mod tests {
    use std::thread::sleep;

    use proptest::prelude::*;

    use super::*;

    fn shared(msg: &str) -> SharedError {
        Arc::new(std::io::Error::other(msg.to_string()))
    }

    fn policy(error_count: usize, time_window_ms: u64) -> ThresholdPolicy {
        ThresholdPolicy::new(ThresholdConfig {
            name: "threshold".to_string(),
            error_count,
            time_window_ms,
            ..Default::default()
        })
    }

    #[test]
    fn test_burst_within_window_trips_on_final_receive() {
        let policy = policy(3, 1_000);
        assert!(!policy.receive(&shared("a")));
        assert!(!policy.receive(&shared("b")));
        assert!(policy.receive(&shared("c")));
    }

    #[test]
    fn test_spaced_errors_never_trip() {
        let policy = policy(3, 100);
        for _ in 0..3 {
            assert!(!policy.receive(&shared("slow drip")));
            sleep(Duration::from_millis(150));
        }
    }

    #[test]
    fn test_compaction_evicts_stale_entries() {
        let policy = policy(10, 50);
        for _ in 0..4 {
            policy.receive(&shared("early"));
        }
        assert_eq!(policy.state.lock().unwrap().events.len(), 4);

        sleep(Duration::from_millis(120));

        // First receive after the gap compacts: the four stale entries go
        policy.receive(&shared("late"));
        assert_eq!(policy.state.lock().unwrap().events.len(), 1);

        policy.receive(&shared("late"));
        policy.receive(&shared("late"));
        assert_eq!(policy.state.lock().unwrap().events.len(), 3);
    }

    #[test]
    fn test_compaction_updates_marker() {
        let policy = policy(10, 50);
        let before = policy.state.lock().unwrap().last_compaction;

        sleep(Duration::from_millis(120));
        policy.receive(&shared("late"));

        let after = policy.state.lock().unwrap().last_compaction;
        assert!(after > before);
    }

    #[test]
    fn test_derived_buffer_preference() {
        let policy = policy(7, 1_000);
        assert_eq!(policy.desired_buffer_size(), 14);

        let policy = ThresholdPolicy::new(ThresholdConfig {
            name: "threshold".to_string(),
            error_count: 7,
            desired_buffer_size: 5,
            ..Default::default()
        });
        assert_eq!(policy.desired_buffer_size(), 5);
    }

    #[test]
    fn test_error_count_clamped_to_one() {
        let policy = policy(0, 1_000);
        assert!(policy.receive(&shared("first")));
    }

    #[test]
    fn test_log_every_counter_wraps() {
        let policy = ThresholdPolicy::new(ThresholdConfig {
            name: "threshold".to_string(),
            error_count: 100,
            time_window_ms: 1_000,
            log_every: 2,
            ..Default::default()
        });
        for _ in 0..3 {
            policy.receive(&shared("sampled"));
        }
        assert_eq!(policy.state.lock().unwrap().skipped_since_last_log, 1);
    }

    proptest! {
        #[test]
        fn prop_quick_burst_trips_exactly_at_threshold(count in 1usize..20) {
            let policy = policy(count, 60_000);
            for i in 1..=count {
                let tripped = policy.receive(&shared("burst"));
                prop_assert_eq!(tripped, i >= count);
            }
        }
    }
}
