//! Thread-safe engine handle.
//!
//! Every call holds one exclusive lock for its full duration, including the
//! pacing pause of a dequeue attempt.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::SchedError;
use crate::flow_table::Admission;
use crate::ledger::Counters;
use crate::packet::{EnqueueRequest, Token};
use crate::policy::BoxedPolicy;
use crate::scheduler::{DequeueOutcome, Scheduler};
use crate::stats::ServiceStats;

#[derive(Clone)]
pub struct SharedScheduler {
    inner: Arc<Mutex<Scheduler<BoxedPolicy>>>,
}

impl SharedScheduler {
    pub fn new(scheduler: Scheduler<BoxedPolicy>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(scheduler)),
        }
    }

    /// Run `f` with the engine locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut Scheduler<BoxedPolicy>) -> R) -> R {
        f(&mut self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Scheduler<BoxedPolicy>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, request: EnqueueRequest) -> Result<Admission, SchedError> {
        self.lock().enqueue(request)
    }

    pub fn dequeue_attempt(&self) -> Result<DequeueOutcome, SchedError> {
        self.lock().dequeue_attempt()
    }

    pub fn take_oldest_token(&self) -> Option<Token> {
        self.lock().take_oldest_token()
    }

    pub fn set_ready(&self, ready: bool) {
        self.lock().set_ready(ready);
    }

    pub fn reset_enqueued_count(&self) {
        self.lock().reset_enqueued_count();
    }

    pub fn set_quantum(
        &self,
        index: usize,
        quantum: u32,
        reset_quota: bool,
    ) -> Result<(), SchedError> {
        self.lock().set_quantum(index, quantum, reset_quota)
    }

    pub fn get_quantum(&self, index: usize) -> Result<u32, SchedError> {
        self.lock().get_quantum(index)
    }

    pub fn counts(&self) -> Counters {
        self.lock().counts()
    }

    pub fn stats(&self) -> ServiceStats {
        self.lock().stats().clone()
    }
}

impl From<Scheduler<BoxedPolicy>> for SharedScheduler {
    fn from(scheduler: Scheduler<BoxedPolicy>) -> Self {
        Self::new(scheduler)
    }
}
