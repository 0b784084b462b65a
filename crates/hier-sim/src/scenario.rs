use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::RngExt as _;
use rand::SeedableRng;
use serde::Deserialize;

/// Traffic scenario driven through the scheduler on a virtual clock.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub seed: u64,
    pub duration_ms: u64,
    /// Virtual time advanced between dequeue rounds.
    pub step_ms: u64,
    /// Dequeue attempts per step, the simulated switch service rate.
    pub dequeues_per_step: u32,
    pub flows: Vec<FlowScenario>,
    pub events: Vec<QuantumEvent>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            duration_ms: 10_000,
            step_ms: 1,
            dequeues_per_step: 1,
            flows: Vec::new(),
            events: Vec::new(),
        }
    }
}

/// Constant-rate source feeding one flow.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlowScenario {
    pub flow_id: u32,
    /// Level-0 rank of every packet, typically its size in bytes.
    pub rank: u32,
    pub interval_ms: u64,
    /// Uniform random delay in `0..=jitter_ms` added to each arrival.
    pub jitter_ms: u64,
    /// Deadline set this far after arrival; 0 sends immediately.
    pub deadline_offset_ms: u64,
    pub start_ms: u64,
    pub stop_ms: Option<u64>,
}

impl Default for FlowScenario {
    fn default() -> Self {
        Self {
            flow_id: 0,
            rank: 1_500,
            interval_ms: 1,
            jitter_ms: 0,
            deadline_offset_ms: 0,
            start_ms: 0,
            stop_ms: None,
        }
    }
}

/// Runtime quantum change applied at `at_ms`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QuantumEvent {
    pub at_ms: u64,
    pub queue: usize,
    pub quantum: u32,
    pub reset_quota: bool,
}

impl ScenarioConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let cfg: ScenarioConfig = toml::from_str(input).context("invalid scenario TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.step_ms == 0 {
            bail!("step_ms must be non-zero");
        }
        if self.dequeues_per_step == 0 {
            bail!("dequeues_per_step must be non-zero");
        }
        if self.duration_ms == 0 {
            bail!("duration_ms must be non-zero");
        }
        if self.flows.is_empty() {
            bail!("scenario defines no flows");
        }
        for flow in &self.flows {
            if flow.interval_ms == 0 {
                bail!("flow {}: interval_ms must be non-zero", flow.flow_id);
            }
            if flow.rank == 0 {
                bail!("flow {}: rank must be non-zero", flow.flow_id);
            }
        }
        Ok(())
    }
}

/// One packet arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arrival {
    pub at_ms: u64,
    pub flow_id: u32,
    pub rank: u32,
    pub deadline_offset_ms: u64,
    /// Unique per scenario, assigned in arrival order starting at 1.
    pub token: u32,
}

/// Deterministic arrival generator.
///
/// Given a seed, produces the same time-ordered arrival list on every run.
#[derive(Debug)]
pub struct Scenario {
    cfg: ScenarioConfig,
    rng: StdRng,
}

impl Scenario {
    /// Fails if `cfg` does not pass [`ScenarioConfig::validate`].
    pub fn new(cfg: ScenarioConfig) -> Result<Self> {
        cfg.validate()?;
        let rng = StdRng::seed_from_u64(cfg.seed);
        Ok(Self { cfg, rng })
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.cfg
    }

    pub fn arrivals(&mut self) -> Vec<Arrival> {
        let mut arrivals = Vec::new();
        for flow in &self.cfg.flows {
            let stop = flow
                .stop_ms
                .unwrap_or(self.cfg.duration_ms)
                .min(self.cfg.duration_ms);
            let mut t = flow.start_ms;
            while t < stop {
                let offset = jitter(&mut self.rng, flow.jitter_ms);
                arrivals.push(Arrival {
                    at_ms: t + offset,
                    flow_id: flow.flow_id,
                    rank: flow.rank,
                    deadline_offset_ms: flow.deadline_offset_ms,
                    token: 0,
                });
                t += flow.interval_ms;
            }
        }

        arrivals.sort_by_key(|a| (a.at_ms, a.flow_id));
        for (idx, arrival) in arrivals.iter_mut().enumerate() {
            arrival.token = idx as u32 + 1;
        }
        arrivals
    }

    /// Events ordered by time, ties kept in declaration order.
    pub fn events(&self) -> Vec<QuantumEvent> {
        let mut events = self.cfg.events.clone();
        events.sort_by_key(|e| e.at_ms);
        events
    }
}

fn jitter(rng: &mut StdRng, max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let offset = (rng.random::<f64>() * (max_ms + 1) as f64) as u64;
    offset.min(max_ms)
}
