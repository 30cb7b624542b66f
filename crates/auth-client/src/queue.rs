//! Waiters parked on an in-flight refresh
//!
//! Each caller that needs a fresh token while a refresh is running gets a
//! oneshot receiver. The sender half stays here until the cycle finishes and
//! `drain` hands every waiter the cycle's outcome.

use std::collections::VecDeque;

use common::Secret;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::RefreshError;

/// What a refresh cycle hands its waiters: the new access token, or the
/// reason there isn't one.
pub type RefreshOutcome = std::result::Result<Secret<String>, RefreshError>;

/// One suspended caller.
#[derive(Debug)]
struct PendingWaiter {
    seq: u64,
    sender: oneshot::Sender<RefreshOutcome>,
}

/// FIFO of suspended callers for the current refresh cycle.
#[derive(Debug, Default)]
pub struct RequestQueue {
    waiters: VecDeque<PendingWaiter>,
    next_seq: u64,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a caller. The returned receiver resolves when the queue is drained.
    pub fn enqueue(&mut self) -> oneshot::Receiver<RefreshOutcome> {
        let (sender, receiver) = oneshot::channel();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.waiters.push_back(PendingWaiter { seq, sender });
        receiver
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Hand `outcome` to every parked caller in enqueue order and empty the queue.
    ///
    /// Callers that gave up (receiver dropped) are still drained; the send to
    /// them is simply discarded. Returns the number of waiters drained.
    pub fn drain(&mut self, outcome: &RefreshOutcome) -> usize {
        let waiters = std::mem::take(&mut self.waiters);
        let total = waiters.len();
        let mut abandoned = 0usize;

        for waiter in waiters {
            if waiter.sender.send(outcome.clone()).is_err() {
                debug!(seq = waiter.seq, "waiter abandoned before refresh completed");
                abandoned += 1;
            }
        }

        if abandoned > 0 {
            debug!(total, abandoned, "drained refresh queue");
        }
        total
    }
}
