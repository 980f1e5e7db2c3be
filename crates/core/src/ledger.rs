//! Completion-ordered buffer of call results.

use crate::queue::BlockingQueue;
use crate::result::RequestResult;

/// FIFO of [`RequestResult`]s in the order their calls completed.
///
/// Never reorders, drops or duplicates a pushed result. Retention is
/// independent of the latency window: taking a result out of the ledger does
/// not remove its sample from the window.
#[derive(Debug, Default)]
pub struct ResultLedger {
    results: BlockingQueue<RequestResult>,
}

impl ResultLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: RequestResult) {
        self.results.enqueue(result);
    }

    /// Remove the oldest result, blocking until one is available.
    ///
    /// There is no built-in timeout; waiting on an empty ledger is a
    /// deliberate wait for the next completion.
    pub fn take_oldest(&self) -> RequestResult {
        self.results.dequeue_blocking()
    }

    /// Remove the oldest result if there is one.
    pub fn try_take_oldest(&self) -> Option<RequestResult> {
        self.results.try_dequeue()
    }

    /// Best-effort emptiness snapshot.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }
}
