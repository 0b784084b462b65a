//! The scheduling engine.
//!
//! [`Scheduler`] owns every piece of state: the flow table, the level
//! routers, the clock, the token ledger, the counters and the dequeue
//! policy. Each operation runs to completion on `&mut self`; callers that
//! need to share an engine across threads use
//! [`SharedScheduler`](crate::shared::SharedScheduler).

use quanta::Clock;
use tracing::{debug, info, trace};

use crate::clock::{Pacer, SchedulerClock};
use crate::config::{EngineConfig, SchedulerConfig};
use crate::error::SchedError;
use crate::flow_table::{Admission, FlowTable};
use crate::ledger::{Counters, TokenLedger};
use crate::packet::{EnqueueRequest, FlowId, Packet, Token};
use crate::policy::{BoxedPolicy, DequeuePolicy};
use crate::router::{HierarchyLayout, LevelRouter};
use crate::stats::ServiceStats;

/// Result of one dequeue attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DequeueOutcome {
    /// The ready flag was clear; nothing was evaluated.
    NotReady,
    /// No flow was selectable.
    Idle,
    /// `flow` was selected but its head's deadline has not been reached.
    Withheld { flow: FlowId },
    Released(Packet),
}

impl DequeueOutcome {
    pub fn token(&self) -> Option<Token> {
        match self {
            DequeueOutcome::Released(packet) => Some(packet.token),
            _ => None,
        }
    }

    pub fn is_released(&self) -> bool {
        matches!(self, DequeueOutcome::Released(_))
    }
}

pub struct Scheduler<P: DequeuePolicy = BoxedPolicy> {
    policy: P,
    flows: FlowTable,
    layout: HierarchyLayout,
    routers: Vec<LevelRouter>,
    clock: SchedulerClock,
    pacer: Pacer,
    ledger: TokenLedger,
    enqueued: u64,
    dequeued: u64,
    stats: ServiceStats,
    ready: bool,
}

impl<P: DequeuePolicy> Scheduler<P> {
    pub fn new(policy: P, engine: EngineConfig) -> Self {
        Self::with_clock(policy, engine, Clock::new())
    }

    /// Engine driven by `clock`, typically a `Clock::mock()` in tests.
    pub fn with_clock(policy: P, engine: EngineConfig, clock: Clock) -> Self {
        let routers = LevelRouter::chain(&engine.hierarchy);
        info!(
            policy = policy.name(),
            flows = policy.flow_count(),
            levels = engine.hierarchy.levels(),
            pacing_us = engine.pacer.interval().as_micros() as u64,
            "scheduler created"
        );
        Self {
            policy,
            flows: FlowTable::new(engine.queue_limit),
            layout: engine.hierarchy,
            routers,
            clock: SchedulerClock::with_clock(clock),
            pacer: engine.pacer,
            ledger: TokenLedger::new(),
            enqueued: 0,
            dequeued: 0,
            stats: ServiceStats::new(),
            ready: true,
        }
    }

    // ─── Enqueue ─────────────────────────────────────────────────────────

    /// Buffer a packet on its flow.
    ///
    /// The token is recorded in the ledger only if the packet is admitted.
    pub fn enqueue(&mut self, request: EnqueueRequest) -> Result<Admission, SchedError> {
        let reset_clock = request.reset_clock;
        let packet = request.into_packet(self.layout.levels())?;
        let flows = self.policy.flow_count();
        let flow = self.routers[0].route(&packet, &self.layout, flows)?;
        if !self.policy.schedules(flow) {
            return Err(SchedError::FlowOutOfRange { flow, flows });
        }
        let token = packet.token;

        let admission = self.flows.enqueue(flow, packet)?;

        if reset_clock {
            self.clock.reset();
        }
        if self.clock.latch_if_unset() {
            self.policy.on_clock_latched();
        }

        match &admission {
            Admission::Accepted => {}
            Admission::DroppedIncoming(_) => self.stats.flow_mut(flow).dropped += 1,
            Admission::EvictedOldest(_) => self.stats.flow_mut(flow).evicted += 1,
        }
        if admission.is_admitted() {
            self.ledger.record(token);
            self.enqueued += 1;
            trace!(flow, token, depth = self.flows.depth(flow), "packet enqueued");
        }
        Ok(admission)
    }

    // ─── Dequeue ─────────────────────────────────────────────────────────

    /// Run one dequeue attempt.
    ///
    /// A released packet clears the ready flag; the caller must call
    /// [`set_ready`](Self::set_ready) before the next attempt can release.
    pub fn dequeue_attempt(&mut self) -> Result<DequeueOutcome, SchedError> {
        if !self.ready {
            self.stats.not_ready_attempts += 1;
            return Ok(DequeueOutcome::NotReady);
        }

        let now = self.clock.sample();
        self.pacer.pace();

        let outcome = self.select_and_release(now);
        self.policy.tick(now);
        self.stats.starvation_resets = self.policy.starvation_resets();
        outcome
    }

    fn select_and_release(&mut self, now: u64) -> Result<DequeueOutcome, SchedError> {
        let Some(flow) = self.policy.select(now, &self.flows) else {
            self.stats.idle_attempts += 1;
            return Ok(DequeueOutcome::Idle);
        };

        let Some(packet) = self.flows.try_pop_head(flow, now) else {
            self.policy.settle(flow, None, now)?;
            self.stats.flow_mut(flow).withheld += 1;
            debug!(flow, now, "head withheld until deadline");
            return Ok(DequeueOutcome::Withheld { flow });
        };

        if let Err(err) = self.policy.settle(flow, Some(&packet), now) {
            self.flows.restore_head(packet);
            return Err(err);
        }

        self.ready = false;
        self.dequeued += 1;
        let stats = self.stats.flow_mut(flow);
        stats.released += 1;
        stats.rank_units += u64::from(packet.rank());
        debug!(flow, token = packet.token, now, "packet released");
        Ok(DequeueOutcome::Released(packet))
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    // ─── Ledger & counters ───────────────────────────────────────────────

    /// Oldest token recorded by an enqueue, independent of dequeue order.
    pub fn take_oldest_token(&mut self) -> Option<Token> {
        self.ledger.take_oldest()
    }

    pub fn reset_enqueued_count(&mut self) {
        self.enqueued = 0;
    }

    pub fn counts(&self) -> Counters {
        Counters {
            enqueued: self.enqueued,
            dequeued: self.dequeued,
            read: self.ledger.read(),
        }
    }

    // ─── Administration ──────────────────────────────────────────────────

    pub fn set_quantum(
        &mut self,
        index: usize,
        quantum: u32,
        reset_quota: bool,
    ) -> Result<(), SchedError> {
        self.policy.set_quantum(index, quantum, reset_quota)
    }

    pub fn get_quantum(&self, index: usize) -> Result<u32, SchedError> {
        self.policy.quantum(index)
    }

    // ─── Introspection ───────────────────────────────────────────────────

    pub fn stats(&self) -> &ServiceStats {
        &self.stats
    }

    /// Milliseconds since the epoch as of the last dequeue attempt.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn backlog(&self, flow: FlowId) -> usize {
        self.flows.depth(flow)
    }

    pub fn total_backlog(&self) -> usize {
        self.flows.len()
    }

    pub fn flows(&self) -> &FlowTable {
        &self.flows
    }

    pub fn layout(&self) -> &HierarchyLayout {
        &self.layout
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }
}

impl Scheduler<BoxedPolicy> {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config.build_policy(), config.engine.clone())
    }

    pub fn from_config_with_clock(config: &SchedulerConfig, clock: Clock) -> Self {
        Self::with_clock(config.build_policy(), config.engine.clone(), clock)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::flow_table::{OverflowPolicy, QueueLimit};
    use crate::policy::wrr::WrrPolicy;

    fn engine() -> EngineConfig {
        EngineConfig {
            pacer: Pacer::disabled(),
            ..EngineConfig::default()
        }
    }

    fn wrr(quantums: Vec<u32>) -> Scheduler<WrrPolicy> {
        let (clock, _mock) = Clock::mock();
        Scheduler::with_clock(WrrPolicy::new(quantums), engine(), clock)
    }

    /// Always picks flow 0 and refuses every release.
    struct Refusing;

    impl DequeuePolicy for Refusing {
        fn name(&self) -> &'static str {
            "refusing"
        }

        fn flow_count(&self) -> usize {
            1
        }

        fn select(&mut self, _now: u64, flows: &FlowTable) -> Option<FlowId> {
            flows.is_backlogged(0).then_some(0)
        }

        fn settle(
            &mut self,
            flow: FlowId,
            _released: Option<&Packet>,
            _now: u64,
        ) -> Result<(), SchedError> {
            Err(SchedError::QuotaUnderflow {
                flow,
                quota: 0,
                rank: 1,
            })
        }
    }

    #[test]
    fn release_clears_ready_flag() {
        let mut sched = wrr(vec![10]);
        sched.enqueue(EnqueueRequest::new(0, 1)).unwrap();
        sched.enqueue(EnqueueRequest::new(0, 2)).unwrap();

        assert_eq!(sched.dequeue_attempt().unwrap().token(), Some(1));
        assert!(!sched.is_ready());
        assert_eq!(sched.dequeue_attempt().unwrap(), DequeueOutcome::NotReady);
        assert_eq!(sched.stats().not_ready_attempts, 1);

        sched.set_ready(true);
        assert_eq!(sched.dequeue_attempt().unwrap().token(), Some(2));
        assert_eq!(sched.counts().dequeued, 2);
    }

    #[test]
    fn idle_when_nothing_buffered() {
        let mut sched = wrr(vec![10]);
        assert_eq!(sched.dequeue_attempt().unwrap(), DequeueOutcome::Idle);
        assert!(sched.is_ready());
        assert_eq!(sched.stats().idle_attempts, 1);
    }

    #[test]
    fn enqueue_outside_scanned_flows_is_refused() {
        let mut sched = wrr(vec![10, 10]);
        assert_eq!(
            sched.enqueue(EnqueueRequest::new(2, 5)),
            Err(SchedError::FlowOutOfRange { flow: 2, flows: 2 })
        );
        assert_eq!(sched.counts().enqueued, 0);
        assert_eq!(sched.take_oldest_token(), None);
    }

    #[test]
    fn dropped_packet_is_not_recorded() {
        let (clock, _mock) = Clock::mock();
        let engine = EngineConfig {
            queue_limit: QueueLimit::bounded(1, OverflowPolicy::DropTail),
            ..engine()
        };
        let mut sched = Scheduler::with_clock(WrrPolicy::new(vec![10]), engine, clock);
        sched.enqueue(EnqueueRequest::new(0, 1)).unwrap();
        let admission = sched.enqueue(EnqueueRequest::new(0, 2)).unwrap();
        assert!(!admission.is_admitted());
        assert_eq!(sched.counts().enqueued, 1);
        assert_eq!(sched.stats().flow(0).dropped, 1);
        assert_eq!(sched.take_oldest_token(), Some(1));
        assert_eq!(sched.take_oldest_token(), None);
    }

    #[test]
    fn failed_settle_restores_head() {
        let (clock, _mock) = Clock::mock();
        let mut sched = Scheduler::with_clock(Refusing, engine(), clock);
        sched.enqueue(EnqueueRequest::new(0, 7)).unwrap();
        assert!(sched.dequeue_attempt().is_err());
        assert_eq!(sched.backlog(0), 1);
        assert_eq!(sched.flows().peek_head(0).map(|p| p.token), Some(7));
        assert!(sched.is_ready());
        assert_eq!(sched.counts().dequeued, 0);
    }

    #[test]
    fn reset_clock_relatches_epoch() {
        let (clock, mock) = Clock::mock();
        let mut sched = Scheduler::with_clock(WrrPolicy::new(vec![10]), engine(), clock);
        sched.enqueue(EnqueueRequest::new(0, 1).deadline(400)).unwrap();
        mock.increment(Duration::from_millis(300));
        assert_eq!(
            sched.dequeue_attempt().unwrap(),
            DequeueOutcome::Withheld { flow: 0 }
        );
        assert_eq!(sched.now_ms(), 300);

        // Zeroing the clock pushes the deadline 300 ms further out.
        sched
            .enqueue(EnqueueRequest::new(0, 2).reset_clock())
            .unwrap();
        mock.increment(Duration::from_millis(300));
        assert!(matches!(
            sched.dequeue_attempt().unwrap(),
            DequeueOutcome::Withheld { .. }
        ));
        mock.increment(Duration::from_millis(100));
        assert_eq!(sched.dequeue_attempt().unwrap().token(), Some(1));
    }

    #[test]
    fn quantum_administration_goes_through_policy() {
        let mut sched = wrr(vec![10, 10, 10]);
        sched.set_quantum(2, 30, true).unwrap();
        assert_eq!(sched.get_quantum(2), Ok(30));
        assert_eq!(sched.policy().quota(2), Some(30));
        assert!(sched.get_quantum(3).is_err());
    }

    #[test]
    fn enqueued_count_resets_independently() {
        let mut sched = wrr(vec![10]);
        sched.enqueue(EnqueueRequest::new(0, 1)).unwrap();
        sched.enqueue(EnqueueRequest::new(0, 2)).unwrap();
        sched.take_oldest_token();
        sched.reset_enqueued_count();
        assert_eq!(
            sched.counts(),
            Counters {
                enqueued: 0,
                dequeued: 0,
                read: 1
            }
        );
    }
}
