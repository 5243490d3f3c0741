//! Bounded three-tier priority queue feeding the matching worker pool.
//! HIGH is processed synchronously in-request and is never dropped by this
//! queue (callers block up to their own deadline); MEDIUM and LOW back the
//! asynchronous event-driven retry path and apply the spec's overflow
//! policy: LOW dropped first, MEDIUM degraded to LOW on its own overflow.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{error::TrySendError, Receiver, Sender};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone)]
pub struct MatchJob {
    pub aggregate_type: &'static str, // "requirement" | "availability"
    pub aggregate_id: Uuid,
    pub priority: Priority,
}

pub struct MatchQueue {
    high_tx: Sender<MatchJob>,
    medium_tx: Sender<MatchJob>,
    low_tx: Sender<MatchJob>,
}

pub struct MatchQueueReceivers {
    pub high: Receiver<MatchJob>,
    pub medium: Receiver<MatchJob>,
    pub low: Receiver<MatchJob>,
}

/// What happened to an enqueue attempt, for the DLQ/event-emission caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted(Priority),
    DegradedToLow,
    Dropped,
}

impl MatchQueue {
    pub fn new(high_capacity: usize, medium_capacity: usize, low_capacity: usize) -> (Self, MatchQueueReceivers) {
        let (high_tx, high_rx) = tokio::sync::mpsc::channel(high_capacity);
        let (medium_tx, medium_rx) = tokio::sync::mpsc::channel(medium_capacity);
        let (low_tx, low_rx) = tokio::sync::mpsc::channel(low_capacity);
        (
            Self { high_tx, medium_tx, low_tx },
            MatchQueueReceivers { high: high_rx, medium: medium_rx, low: low_rx },
        )
    }

    /// HIGH is synchronous and blocking: the caller awaits enqueue up to
    /// whatever outer deadline it is operating under.
    pub async fn enqueue_high(&self, job: MatchJob) -> Result<(), MatchJob> {
        self.high_tx.send(job).await.map_err(|e| e.0)
    }

    /// MEDIUM/LOW are best-effort: never block the caller, apply the
    /// degrade-then-drop overflow policy instead.
    pub fn try_enqueue(&self, job: MatchJob) -> EnqueueOutcome {
        match job.priority {
            Priority::High => match self.high_tx.try_send(job) {
                Ok(()) => EnqueueOutcome::Accepted(Priority::High),
                Err(TrySendError::Full(job)) | Err(TrySendError::Closed(job)) => {
                    // HIGH is never dropped by policy; a full HIGH queue at
                    // this call site means the caller chose the sync path
                    // instead, so falling back to blocking send is the
                    // caller's responsibility. Here we degrade to MEDIUM as
                    // the least-bad fallback rather than silently dropping.
                    self.try_enqueue(MatchJob { priority: Priority::Medium, ..job })
                }
            },
            Priority::Medium => match self.medium_tx.try_send(job) {
                Ok(()) => EnqueueOutcome::Accepted(Priority::Medium),
                Err(TrySendError::Full(job)) | Err(TrySendError::Closed(job)) => {
                    match self.low_tx.try_send(MatchJob { priority: Priority::Low, ..job }) {
                        Ok(()) => EnqueueOutcome::DegradedToLow,
                        Err(_) => EnqueueOutcome::Dropped,
                    }
                }
            },
            Priority::Low => match self.low_tx.try_send(job) {
                Ok(()) => EnqueueOutcome::Accepted(Priority::Low),
                Err(_) => EnqueueOutcome::Dropped,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(priority: Priority) -> MatchJob {
        MatchJob { aggregate_type: "requirement", aggregate_id: Uuid::new_v4(), priority }
    }

    #[test]
    fn low_overflow_is_dropped() {
        let (queue, _rx) = MatchQueue::new(1, 1, 1);
        assert_eq!(queue.try_enqueue(job(Priority::Low)), EnqueueOutcome::Accepted(Priority::Low));
        assert_eq!(queue.try_enqueue(job(Priority::Low)), EnqueueOutcome::Dropped);
    }

    #[test]
    fn medium_overflow_degrades_to_low() {
        let (queue, _rx) = MatchQueue::new(1, 1, 2);
        assert_eq!(queue.try_enqueue(job(Priority::Medium)), EnqueueOutcome::Accepted(Priority::Medium));
        assert_eq!(queue.try_enqueue(job(Priority::Medium)), EnqueueOutcome::DegradedToLow);
    }
}
