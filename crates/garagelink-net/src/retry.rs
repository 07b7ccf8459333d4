//! Endpoint failover and retry timing.
//!
//! Two delays are involved: a short fixed one for moving to the next
//! candidate of the same cycle ("this endpoint is down"), and a longer
//! per-purpose one once every candidate has failed ("the service is down").

use std::time::Duration;

use garagelink_shared::constants::{
    CHAT_RETRY_DELAY_MS, FAILOVER_DELAY_MS, NORMAL_CLOSURE, NOTIFICATION_RETRY_DELAY_MS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before trying the next candidate of the current cycle.
    pub failover_delay: Duration,
    /// Delay before starting a new cycle at index 0.
    pub cycle_delay: Duration,
}

impl RetryPolicy {
    pub fn chat() -> Self {
        Self {
            failover_delay: Duration::from_millis(FAILOVER_DELAY_MS),
            cycle_delay: Duration::from_millis(CHAT_RETRY_DELAY_MS),
        }
    }

    /// Notifications are less urgent than an open chat, so they back off longer.
    pub fn notifications() -> Self {
        Self {
            failover_delay: Duration::from_millis(FAILOVER_DELAY_MS),
            cycle_delay: Duration::from_millis(NOTIFICATION_RETRY_DELAY_MS),
        }
    }
}

/// What to do after an attempt or a live session failed abnormally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// Try `endpoint_index` after the short failover delay.
    Failover {
        endpoint_index: usize,
        delay: Duration,
    },
    /// Every candidate failed; start over at index 0 after the cycle delay.
    NewCycle { delay: Duration },
}

/// Position of a channel within its candidate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverCursor {
    index: usize,
    last_index: usize,
}

impl FailoverCursor {
    pub fn new(endpoint_count: usize) -> Self {
        Self {
            index: 0,
            last_index: endpoint_count.saturating_sub(1),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn begin_cycle(&mut self) {
        self.index = 0;
    }

    /// A clean open resets the position to index 0, whichever candidate
    /// succeeded. A later drop then fails over like any other attempt.
    pub fn on_open(&mut self) {
        self.index = 0;
    }

    pub fn on_failure(&mut self, policy: &RetryPolicy) -> RetryStep {
        if self.index < self.last_index {
            self.index += 1;
            RetryStep::Failover {
                endpoint_index: self.index,
                delay: policy.failover_delay,
            }
        } else {
            self.index = 0;
            RetryStep::NewCycle {
                delay: policy.cycle_delay,
            }
        }
    }
}

/// Only a normal closure (1000) is intentional; anything else, including a
/// socket that vanished without a close frame, is abnormal.
pub fn is_normal_closure(code: Option<u16>) -> bool {
    code == Some(NORMAL_CLOSURE)
}
