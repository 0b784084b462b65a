//! Hierarchy layout and level routing.
//!
//! Layout presets mirror the compile-time configurations of the switch
//! target (1, 2, 3 and 5 levels). Only level 0 has a working
//! enqueue/dequeue path: it maps a packet to its flow slot. Routers for
//! higher levels exist so the chain can be extended, but refuse to route.

use serde::Deserialize;
use tracing::trace;

use crate::error::SchedError;
use crate::packet::{FlowId, Packet};

/// Named hierarchy configurations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HierarchyPreset {
    #[default]
    Single,
    TwoLevel,
    ThreeLevel,
    FiveLevel,
}

/// Queues per level and packets (children) per queue, leaf level first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyLayout {
    queues_per_level: Vec<usize>,
    per_queue: Vec<usize>,
}

impl HierarchyLayout {
    pub fn preset(preset: HierarchyPreset) -> Self {
        let (queues_per_level, per_queue) = match preset {
            HierarchyPreset::Single => (vec![1], vec![72]),
            HierarchyPreset::TwoLevel => (vec![2, 1], vec![4, 2]),
            HierarchyPreset::ThreeLevel => (vec![8, 2, 1], vec![10, 4, 2]),
            HierarchyPreset::FiveLevel => (vec![16, 8, 4, 2, 1], vec![80, 2, 2, 2, 2]),
        };
        Self {
            queues_per_level,
            per_queue,
        }
    }

    pub fn single() -> Self {
        Self::preset(HierarchyPreset::Single)
    }

    pub fn levels(&self) -> usize {
        self.queues_per_level.len()
    }

    pub fn queues_at(&self, level: usize) -> Option<usize> {
        self.queues_per_level.get(level).copied()
    }

    /// Flows addressable at the leaf level.
    pub fn leaf_flows(&self) -> usize {
        self.queues_per_level[0] * self.per_queue[0]
    }

    /// Leaf-level queue (bank) a flow belongs to.
    fn bank_of(&self, flow: FlowId) -> usize {
        if self.levels() > 1 {
            flow as usize / self.per_queue[0]
        } else {
            0
        }
    }
}

impl Default for HierarchyLayout {
    fn default() -> Self {
        Self::single()
    }
}

// ─── LevelRouter ─────────────────────────────────────────────────────────────

/// Maps packets entering one hierarchy level to a slot of that level.
///
/// Carries two per-queue scratch vectors that are read and written back
/// around every routed packet. Nothing consumes them yet.
#[derive(Debug, Clone)]
pub struct LevelRouter {
    level: usize,
    error_detected: Vec<u32>,
    internal_force_flow_id: Vec<u32>,
}

impl LevelRouter {
    pub fn new(level: usize, queues: usize) -> Self {
        Self {
            level,
            error_detected: vec![0; queues],
            internal_force_flow_id: vec![0; queues],
        }
    }

    /// One router per level of `layout`.
    pub fn chain(layout: &HierarchyLayout) -> Vec<LevelRouter> {
        layout
            .queues_per_level
            .iter()
            .enumerate()
            .map(|(level, &queues)| LevelRouter::new(level, queues))
            .collect()
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// Slot index for `packet` at this level.
    ///
    /// `flows` is the number of flows the dequeue policy scans; a packet
    /// outside that range could never leave, so it is refused here.
    pub fn route(
        &mut self,
        packet: &Packet,
        layout: &HierarchyLayout,
        flows: usize,
    ) -> Result<FlowId, SchedError> {
        if self.level != 0 {
            return Err(SchedError::LevelNotWired { level: self.level });
        }
        if packet.flow_id as usize >= flows {
            return Err(SchedError::FlowOutOfRange {
                flow: packet.flow_id,
                flows,
            });
        }

        let bank = layout.bank_of(packet.flow_id);
        let slots = self.error_detected.len();
        if bank >= slots {
            return Err(SchedError::SlotOutOfBounds {
                level: self.level,
                slot: bank,
                slots,
            });
        }

        let error_detected = self.error_detected[bank];
        let internal_force_flow_id = self.internal_force_flow_id[bank];
        trace!(
            flow = packet.flow_id,
            bank,
            error_detected,
            internal_force_flow_id,
            "routing packet at level 0"
        );
        self.error_detected[bank] = error_detected;
        self.internal_force_flow_id[bank] = internal_force_flow_id;

        Ok(packet.flow_id)
    }
}
