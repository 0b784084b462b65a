//! Integer-only port for the switch target.
//!
//! Mirrors the extern surface the buffer manager calls into: every argument
//! and result is an unsigned integer, `0` stands for "no token", and errors
//! are logged instead of returned. Hosts that can handle `Result`s should
//! use [`Scheduler`] directly.

use tracing::{error, warn};

use crate::error::SchedError;
use crate::packet::{EnqueueRequest, Rank, Token, RANK_UNUSED};
use crate::policy::{BoxedPolicy, DequeuePolicy};
use crate::scheduler::Scheduler;

/// Returned by [`HostPort::dequeue`] and [`HostPort::take_oldest_token`]
/// when there is nothing to hand out.
pub const NO_TOKEN: Token = 0;

pub struct HostPort<P: DequeuePolicy = BoxedPolicy> {
    scheduler: Scheduler<P>,
    /// Ranks staged by `pass_rank_value` for the next enqueue.
    staged_ranks: Vec<Rank>,
}

impl<P: DequeuePolicy> HostPort<P> {
    pub fn new(scheduler: Scheduler<P>) -> Self {
        let levels = scheduler.layout().levels();
        Self {
            scheduler,
            staged_ranks: vec![RANK_UNUSED; levels],
        }
    }

    /// Stage the rank of `level` for subsequent enqueues.
    pub fn pass_rank_value(&mut self, rank: u32, level: u32) {
        match self.staged_ranks.get_mut(level as usize) {
            Some(slot) => *slot = rank,
            None => error!(
                level,
                levels = self.staged_ranks.len(),
                "rank passed for a level outside the hierarchy"
            ),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn enqueue(
        &mut self,
        flow_id: u32,
        levels_used: u32,
        deadline: u32,
        arrival_time: u32,
        shaping: u32,
        token: u32,
        reset_clock: u32,
    ) {
        let mut request = EnqueueRequest::new(flow_id, token)
            .ranks(self.staged_ranks.clone())
            .deadline(u64::from(deadline))
            .arrival(u64::from(arrival_time))
            .shaping(shaping != 0);
        request.levels_used = levels_used as usize;
        if reset_clock != 0 {
            request = request.reset_clock();
        }

        match self.scheduler.enqueue(request) {
            Ok(_) => {}
            Err(err @ SchedError::UnsetLeafRank { .. }) => {
                error!(%err, flow_id, token, "enqueue rejected, no level-0 rank passed");
            }
            Err(err) => error!(%err, flow_id, token, "enqueue rejected"),
        }
    }

    /// Token of the released packet, or [`NO_TOKEN`].
    pub fn dequeue(&mut self) -> u32 {
        match self.scheduler.dequeue_attempt() {
            Ok(outcome) => outcome.token().unwrap_or(NO_TOKEN),
            Err(err) => {
                error!(%err, "dequeue attempt failed");
                NO_TOKEN
            }
        }
    }

    pub fn take_oldest_token(&mut self) -> u32 {
        self.scheduler.take_oldest_token().unwrap_or(NO_TOKEN)
    }

    /// Non-zero asserts the ready flag.
    pub fn start_dequeue(&mut self, ready: u32) {
        self.scheduler.set_ready(ready != 0);
    }

    pub fn reset_enqueued_count(&mut self) {
        self.scheduler.reset_enqueued_count();
    }

    pub fn set_quantum(&mut self, queue: u32, quantum: u32, reset_quota: u32) {
        if let Err(err) = self
            .scheduler
            .set_quantum(queue as usize, quantum, reset_quota != 0)
        {
            error!(%err, queue, quantum, "quantum update rejected");
        }
    }

    /// Quantum of `queue`, or 0 when it cannot be read.
    pub fn get_quantum(&self, queue: u32) -> u32 {
        self.scheduler.get_quantum(queue as usize).unwrap_or_else(|err| {
            warn!(%err, queue, "quantum read rejected");
            0
        })
    }

    pub fn enqueued_count(&self) -> u64 {
        self.scheduler.counts().enqueued
    }

    pub fn dequeued_count(&self) -> u64 {
        self.scheduler.counts().dequeued
    }

    pub fn read_count(&self) -> u64 {
        self.scheduler.counts().read
    }

    pub fn scheduler(&self) -> &Scheduler<P> {
        &self.scheduler
    }

    pub fn into_inner(self) -> Scheduler<P> {
        self.scheduler
    }
}
