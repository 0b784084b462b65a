//! Quota/quantum weighted round robin.
//!
//! Each flow `i` holds a `quota[i]` consumed by the level-0 rank of every
//! packet it sends, and a configured `quantum[i]` the quota is refilled to.
//!
//! One selection runs in up to two passes over flows `0..N` in ascending order:
//! 1. First pass: the first flow whose head rank fits in its quota wins.
//! 2. Second pass (only if the first found nothing): every quota below its
//!    quantum is refilled, and the first flow that now fits wins. The scan
//!    keeps going after a winner so every flow is refilled.
//!
//! If the winner's head is then withheld by its deadline, all quotas are
//! reset to their quantums so no flow is left stranded with a stale quota.

use tracing::{debug, info, warn};

use super::DequeuePolicy;
use crate::error::SchedError;
use crate::flow_table::FlowTable;
use crate::packet::{FlowId, Packet};

#[derive(Debug, Clone)]
pub struct WrrPolicy {
    quotas: Vec<u32>,
    quantums: Vec<u32>,
    /// Whether `set_quantum` is honoured.
    runtime_quantum: bool,
    starvation_resets: u64,
}

impl WrrPolicy {
    /// WRR with runtime-adjustable quantums. Quotas start full.
    pub fn new(quantums: Vec<u32>) -> Self {
        Self {
            quotas: quantums.clone(),
            quantums,
            runtime_quantum: true,
            starvation_resets: 0,
        }
    }

    /// WRR whose quantums cannot be changed after construction.
    pub fn fixed(quantums: Vec<u32>) -> Self {
        Self {
            runtime_quantum: false,
            ..Self::new(quantums)
        }
    }

    /// Override starting quotas; extra entries are ignored.
    pub fn with_initial_quotas(mut self, quotas: &[u32]) -> Self {
        for (slot, quota) in self.quotas.iter_mut().zip(quotas) {
            *slot = *quota;
        }
        self
    }

    pub fn quota(&self, index: usize) -> Option<u32> {
        self.quotas.get(index).copied()
    }

    pub fn quotas(&self) -> &[u32] {
        &self.quotas
    }

    pub fn is_runtime_adjustable(&self) -> bool {
        self.runtime_quantum
    }

    fn fits(&self, index: usize, flows: &FlowTable) -> bool {
        flows
            .peek_head(index as FlowId)
            .is_some_and(|head| self.quotas[index] >= head.rank())
    }

    fn reset_all_quotas(&mut self) {
        self.quotas.copy_from_slice(&self.quantums);
    }
}

impl DequeuePolicy for WrrPolicy {
    fn name(&self) -> &'static str {
        if self.runtime_quantum {
            "wrr"
        } else {
            "wrr-fixed"
        }
    }

    fn flow_count(&self) -> usize {
        self.quantums.len()
    }

    fn select(&mut self, _now: u64, flows: &FlowTable) -> Option<FlowId> {
        let count = self.quantums.len();

        for index in 0..count {
            if self.fits(index, flows) {
                info!(flow = index, "first pass selected flow");
                return Some(index as FlowId);
            }
        }

        let mut selected = None;
        for index in 0..count {
            let quota = self.quotas[index];
            let quantum = self.quantums[index];
            if quota < quantum {
                debug!(
                    flow = index,
                    quota,
                    quantum,
                    backlog = flows.depth(index as FlowId),
                    "second pass quota reset"
                );
                self.quotas[index] = quantum;
            }

            if selected.is_some() {
                continue;
            }
            if self.fits(index, flows) {
                info!(flow = index, "second pass selected flow");
                selected = Some(index as FlowId);
            } else if let Some(head) = flows.peek_head(index as FlowId) {
                warn!(
                    flow = index,
                    rank = head.rank(),
                    quantum,
                    "head rank exceeds quantum, flow cannot be served"
                );
            }
        }
        selected
    }

    fn settle(
        &mut self,
        flow: FlowId,
        released: Option<&Packet>,
        _now: u64,
    ) -> Result<(), SchedError> {
        let index = flow as usize;
        let Some(quota) = self.quotas.get(index).copied() else {
            return Err(SchedError::QueueIndexOutOfRange {
                index,
                queues: self.quotas.len(),
            });
        };

        match released {
            Some(packet) => {
                let rank = packet.rank();
                let remaining = quota
                    .checked_sub(rank)
                    .ok_or(SchedError::QuotaUnderflow { flow, quota, rank })?;
                debug!(flow, quota, rank, remaining, "quota updated");
                self.quotas[index] = remaining;
            }
            None => {
                warn!(flow, "selected head withheld, resetting all quotas");
                self.reset_all_quotas();
                self.starvation_resets += 1;
            }
        }
        Ok(())
    }

    fn set_quantum(
        &mut self,
        index: usize,
        quantum: u32,
        reset_quota: bool,
    ) -> Result<(), SchedError> {
        if !self.runtime_quantum {
            return Err(SchedError::QuantumLocked {
                policy: self.name(),
            });
        }
        if index >= self.quantums.len() {
            return Err(SchedError::QueueIndexOutOfRange {
                index,
                queues: self.quantums.len(),
            });
        }
        if quantum == 0 {
            return Err(SchedError::ZeroQuantum { index });
        }

        self.quantums[index] = quantum;
        if reset_quota {
            self.quotas[index] = quantum;
        }
        info!(queue = index, quantum, reset_quota, "quantum updated");
        Ok(())
    }

    fn quantum(&self, index: usize) -> Result<u32, SchedError> {
        self.quantums
            .get(index)
            .copied()
            .ok_or(SchedError::QueueIndexOutOfRange {
                index,
                queues: self.quantums.len(),
            })
    }

    fn quantums(&self) -> Option<&[u32]> {
        Some(&self.quantums)
    }

    fn starvation_resets(&self) -> u64 {
        self.starvation_resets
    }
}
