use std::fmt;

use serde::Serialize;

use hier_sched::ledger::Counters;
use hier_sched::stats::ServiceStats;

/// Outcome of one simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub policy: String,
    pub duration_ms: u64,
    pub flows: Vec<FlowReport>,
    pub counts: Counters,
    pub stats: ServiceStats,
    /// Quantums in force at the end of the run, if the policy has any.
    pub final_quantums: Option<Vec<u32>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FlowReport {
    pub flow_id: u32,
    pub enqueued: u64,
    /// Refused by the engine (queue limit or invalid request).
    pub rejected: u64,
    pub delivered: u64,
    /// Still buffered when the run ended.
    pub backlog: usize,
    pub rank_units: u64,
    /// Share of all delivered rank units, in percent.
    pub share_pct: f64,
    /// Share the final quantums entitle this flow to among the simulated flows.
    pub expected_pct: Option<f64>,
    pub mean_latency_ms: f64,
    pub max_latency_ms: u64,
}

impl SimReport {
    pub fn flow(&self, flow_id: u32) -> Option<&FlowReport> {
        self.flows.iter().find(|f| f.flow_id == flow_id)
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for SimReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "policy {} over {} ms: {} enqueued, {} dequeued, {} idle attempts, {} quota resets",
            self.policy,
            self.duration_ms,
            self.counts.enqueued,
            self.counts.dequeued,
            self.stats.idle_attempts,
            self.stats.starvation_resets,
        )?;
        writeln!(
            f,
            "{:>5} {:>9} {:>9} {:>9} {:>8} {:>12} {:>8} {:>9} {:>9} {:>8}",
            "flow",
            "enqueued",
            "rejected",
            "delivered",
            "backlog",
            "rank_units",
            "share%",
            "expected%",
            "mean_ms",
            "max_ms"
        )?;
        for flow in &self.flows {
            let expected = flow
                .expected_pct
                .map_or_else(|| "-".to_string(), |pct| format!("{pct:.2}"));
            writeln!(
                f,
                "{:>5} {:>9} {:>9} {:>9} {:>8} {:>12} {:>8.2} {:>9} {:>9.2} {:>8}",
                flow.flow_id,
                flow.enqueued,
                flow.rejected,
                flow.delivered,
                flow.backlog,
                flow.rank_units,
                flow.share_pct,
                expected,
                flow.mean_latency_ms,
                flow.max_latency_ms,
            )?;
        }
        Ok(())
    }
}
