//! Pluggable dequeue selection.
//!
//! A policy only decides *which* flow should send next. The engine then asks
//! the flow table to release that flow's head, which it does only once the
//! head's deadline has arrived, and reports the outcome back via
//! [`DequeuePolicy::settle`].
//!
//! - [`wrr::WrrPolicy`] — quota/quantum weighted round robin, two passes
//! - [`credit::CreditPolicy`] — periodic per-bucket credits behind a warm-up gate

pub mod credit;
pub mod wrr;

use crate::error::SchedError;
use crate::flow_table::FlowTable;
use crate::packet::{FlowId, Packet};

pub trait DequeuePolicy {
    /// Short label used in logs and errors.
    fn name(&self) -> &'static str;

    /// Number of flows the policy scans, `0..flow_count()`.
    fn flow_count(&self) -> usize;

    /// Whether `select` can ever pick `flow`.
    fn schedules(&self, flow: FlowId) -> bool {
        (flow as usize) < self.flow_count()
    }

    /// Pick the flow whose head should be released at `now`.
    fn select(&mut self, now: u64, flows: &FlowTable) -> Option<FlowId>;

    /// Outcome of releasing the selected flow's head.
    ///
    /// `released` is `None` when the head was withheld by its deadline.
    fn settle(
        &mut self,
        flow: FlowId,
        released: Option<&Packet>,
        now: u64,
    ) -> Result<(), SchedError>;

    /// Called once at the end of every dequeue attempt.
    fn tick(&mut self, _now: u64) {}

    /// The scheduler epoch was (re)latched.
    fn on_clock_latched(&mut self) {}

    /// Replace the quantum of queue `index`, optionally refilling its quota.
    fn set_quantum(
        &mut self,
        _index: usize,
        _quantum: u32,
        _reset_quota: bool,
    ) -> Result<(), SchedError> {
        Err(SchedError::QuantumLocked {
            policy: self.name(),
        })
    }

    fn quantum(&self, _index: usize) -> Result<u32, SchedError> {
        Err(SchedError::QuantumLocked {
            policy: self.name(),
        })
    }

    /// Configured quantums, if the policy has any.
    fn quantums(&self) -> Option<&[u32]> {
        None
    }

    /// How many times all quotas were forced back to their quantums.
    fn starvation_resets(&self) -> u64 {
        0
    }
}

/// Policy object chosen at runtime from configuration.
pub type BoxedPolicy = Box<dyn DequeuePolicy + Send>;

impl<P: DequeuePolicy + ?Sized> DequeuePolicy for Box<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn flow_count(&self) -> usize {
        (**self).flow_count()
    }

    fn schedules(&self, flow: FlowId) -> bool {
        (**self).schedules(flow)
    }

    fn select(&mut self, now: u64, flows: &FlowTable) -> Option<FlowId> {
        (**self).select(now, flows)
    }

    fn settle(
        &mut self,
        flow: FlowId,
        released: Option<&Packet>,
        now: u64,
    ) -> Result<(), SchedError> {
        (**self).settle(flow, released, now)
    }

    fn tick(&mut self, now: u64) {
        (**self).tick(now)
    }

    fn on_clock_latched(&mut self) {
        (**self).on_clock_latched()
    }

    fn set_quantum(
        &mut self,
        index: usize,
        quantum: u32,
        reset_quota: bool,
    ) -> Result<(), SchedError> {
        (**self).set_quantum(index, quantum, reset_quota)
    }

    fn quantum(&self, index: usize) -> Result<u32, SchedError> {
        (**self).quantum(index)
    }

    fn quantums(&self) -> Option<&[u32]> {
        (**self).quantums()
    }

    fn starvation_resets(&self) -> u64 {
        (**self).starvation_resets()
    }
}
