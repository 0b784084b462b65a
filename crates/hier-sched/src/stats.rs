//! # Service Statistics
//!
//! Per-flow and engine-wide counters of what the dequeue policy actually
//! served. Serializable for reports and JSON output.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::packet::FlowId;

// ─── Flow Stats ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlowStats {
    /// Packets released.
    pub released: u64,
    /// Sum of level-0 ranks of released packets.
    pub rank_units: u64,
    /// Attempts where this flow was selected but its head was not yet due.
    pub withheld: u64,
    /// Arrivals refused by the queue limit.
    pub dropped: u64,
    /// Buffered packets evicted by the queue limit.
    pub evicted: u64,
}

// ─── Service Stats ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceStats {
    pub flows: BTreeMap<FlowId, FlowStats>,
    /// Attempts where no flow could be selected.
    pub idle_attempts: u64,
    /// Attempts made while the ready flag was clear.
    pub not_ready_attempts: u64,
    /// Times the WRR quotas were all forced back to their quantums.
    pub starvation_resets: u64,
}

impl ServiceStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flow(&self, flow: FlowId) -> FlowStats {
        self.flows.get(&flow).copied().unwrap_or_default()
    }

    pub(crate) fn flow_mut(&mut self, flow: FlowId) -> &mut FlowStats {
        self.flows.entry(flow).or_default()
    }

    pub fn total_released(&self) -> u64 {
        self.flows.values().map(|f| f.released).sum()
    }

    pub fn total_rank_units(&self) -> u64 {
        self.flows.values().map(|f| f.rank_units).sum()
    }

    /// Rank units served to `flow` as a percentage of all rank units served.
    pub fn share_pct(&self, flow: FlowId) -> f64 {
        let total = self.total_rank_units();
        if total == 0 {
            0.0
        } else {
            self.flow(flow).rank_units as f64 * 100.0 / total as f64
        }
    }
}

/// Allocation each queue should receive under WRR, in percent of the total:
/// `quantum_i / Σ quantum × 100`.
pub fn expected_allocation(quantums: &[u32]) -> Vec<f64> {
    let total: u64 = quantums.iter().map(|&q| u64::from(q)).sum();
    if total == 0 {
        return vec![0.0; quantums.len()];
    }
    quantums
        .iter()
        .map(|&q| f64::from(q) * 100.0 / total as f64)
        .collect()
}
