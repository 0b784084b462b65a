//! Drives a scheduler through a scenario on a mock clock.
//!
//! Each step applies due quantum events, asserts ready and attempts up to
//! `dequeues_per_step` dequeues, then enqueues the arrivals that are due
//! before advancing virtual time by `step_ms`. Arrivals are enqueued after
//! the attempts so every step samples the clock before the next enqueue.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use quanta::{Clock, Mock};
use tracing::{info, warn};

use hier_sched::clock::Pacer;
use hier_sched::policy::DequeuePolicy;
use hier_sched::stats::expected_allocation;
use hier_sched::{BoxedPolicy, DequeueOutcome, EnqueueRequest, Scheduler, SchedulerConfig};

use crate::report::{FlowReport, SimReport};
use crate::scenario::{Arrival, QuantumEvent, Scenario, ScenarioConfig};

#[derive(Debug, Default)]
struct FlowTally {
    enqueued: u64,
    rejected: u64,
    delivered: u64,
    rank_units: u64,
    latency_sum_ms: u64,
    latency_max_ms: u64,
}

pub struct Simulation {
    scheduler: Scheduler<BoxedPolicy>,
    mock: Arc<Mock>,
    scenario: ScenarioConfig,
    arrivals: Vec<Arrival>,
    events: Vec<QuantumEvent>,
}

impl Simulation {
    /// Build a simulation; pacing is disabled since time is virtual.
    ///
    /// Fails if `scenario` does not pass [`ScenarioConfig::validate`].
    pub fn new(config: &SchedulerConfig, scenario: ScenarioConfig) -> Result<Self> {
        let mut config = config.clone();
        config.engine.pacer = Pacer::disabled();

        let mut generator = Scenario::new(scenario)?;
        let (clock, mock) = Clock::mock();
        let scheduler = Scheduler::from_config_with_clock(&config, clock);

        let arrivals = generator.arrivals();
        let events = generator.events();
        let scenario = generator.config().clone();

        Ok(Self {
            scheduler,
            mock,
            scenario,
            arrivals,
            events,
        })
    }

    pub fn arrivals(&self) -> &[Arrival] {
        &self.arrivals
    }

    pub fn run(mut self) -> SimReport {
        let step = self.scenario.step_ms;
        let duration = self.scenario.duration_ms;
        info!(
            policy = self.scheduler.policy().name(),
            arrivals = self.arrivals.len(),
            duration_ms = duration,
            "simulation started"
        );

        let mut tallies: BTreeMap<u32, FlowTally> = self
            .scenario
            .flows
            .iter()
            .map(|f| (f.flow_id, FlowTally::default()))
            .collect();
        let mut arrived_at: HashMap<u32, u64> = HashMap::new();
        let mut next_arrival = 0;
        let mut next_event = 0;
        // Virtual time at which the scheduler epoch was latched.
        let mut epoch: Option<u64> = None;

        let mut t = 0;
        while t <= duration {
            while let Some(event) = self
                .events
                .get(next_event)
                .cloned()
                .filter(|e| e.at_ms <= t)
            {
                next_event += 1;
                match self
                    .scheduler
                    .set_quantum(event.queue, event.quantum, event.reset_quota)
                {
                    Ok(()) => info!(
                        at_ms = t,
                        queue = event.queue,
                        quantum = event.quantum,
                        "quantum event applied"
                    ),
                    Err(err) => warn!(%err, at_ms = t, "quantum event rejected"),
                }
            }

            for _ in 0..self.scenario.dequeues_per_step {
                self.scheduler.set_ready(true);
                match self.scheduler.dequeue_attempt() {
                    Ok(DequeueOutcome::Released(packet)) => {
                        let tally = tallies.entry(packet.flow_id).or_default();
                        tally.delivered += 1;
                        tally.rank_units += u64::from(packet.rank());
                        if let Some(at) = arrived_at.remove(&packet.token) {
                            let latency = t.saturating_sub(at);
                            tally.latency_sum_ms += latency;
                            tally.latency_max_ms = tally.latency_max_ms.max(latency);
                        }
                    }
                    Ok(_) => {}
                    Err(err) => warn!(%err, at_ms = t, "dequeue attempt failed"),
                }
            }

            while let Some(arrival) = self
                .arrivals
                .get(next_arrival)
                .copied()
                .filter(|a| a.at_ms <= t)
            {
                next_arrival += 1;
                let base = *epoch.get_or_insert(t);
                let deadline = arrival.at_ms.saturating_sub(base) + arrival.deadline_offset_ms;
                let request = EnqueueRequest::new(arrival.flow_id, arrival.token)
                    .rank(arrival.rank)
                    .deadline(deadline)
                    .arrival(arrival.at_ms);

                let tally = tallies.entry(arrival.flow_id).or_default();
                match self.scheduler.enqueue(request) {
                    Ok(admission) if admission.is_admitted() => {
                        tally.enqueued += 1;
                        arrived_at.insert(arrival.token, arrival.at_ms);
                    }
                    Ok(_) => tally.rejected += 1,
                    Err(err) => {
                        warn!(%err, flow = arrival.flow_id, "arrival rejected");
                        tally.rejected += 1;
                    }
                }
            }

            t += step;
            self.mock.increment(Duration::from_millis(step));
        }

        let report = self.report(tallies);
        info!(
            dequeued = report.counts.dequeued,
            backlog = self.scheduler.total_backlog(),
            "simulation finished"
        );
        report
    }

    fn report(&self, tallies: BTreeMap<u32, FlowTally>) -> SimReport {
        let final_quantums = self.scheduler.policy().quantums().map(<[u32]>::to_vec);
        let expected: Option<Vec<f64>> = final_quantums.as_ref().map(|quantums| {
            let active: Vec<u32> = tallies
                .keys()
                .map(|&flow| quantums.get(flow as usize).copied().unwrap_or(0))
                .collect();
            expected_allocation(&active)
        });

        let total_units: u64 = tallies.values().map(|t| t.rank_units).sum();
        let flows = tallies
            .iter()
            .enumerate()
            .map(|(idx, (&flow_id, tally))| FlowReport {
                flow_id,
                enqueued: tally.enqueued,
                rejected: tally.rejected,
                delivered: tally.delivered,
                backlog: self.scheduler.backlog(flow_id),
                rank_units: tally.rank_units,
                share_pct: if total_units == 0 {
                    0.0
                } else {
                    tally.rank_units as f64 * 100.0 / total_units as f64
                },
                expected_pct: expected.as_ref().map(|e| e[idx]),
                mean_latency_ms: if tally.delivered == 0 {
                    0.0
                } else {
                    tally.latency_sum_ms as f64 / tally.delivered as f64
                },
                max_latency_ms: tally.latency_max_ms,
            })
            .collect();

        SimReport {
            policy: self.scheduler.policy().name().to_string(),
            duration_ms: self.scenario.duration_ms,
            flows,
            counts: self.scheduler.counts(),
            stats: self.scheduler.stats().clone(),
            final_quantums,
        }
    }
}
