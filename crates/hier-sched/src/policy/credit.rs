//! Credit-gated (predicate) dequeue.
//!
//! Flows are grouped into credit buckets. After a warm-up delay, the first
//! bucket that still has credit and owns a backlogged flow sends. Every
//! release costs the bucket a fixed amount of credit, and all buckets are
//! periodically topped back up to their nominal value.

use tracing::{debug, info};

use super::DequeuePolicy;
use crate::error::SchedError;
use crate::flow_table::FlowTable;
use crate::packet::{FlowId, Packet};

/// Attempts before this many ms since the epoch never dequeue.
pub const DEFAULT_ACTIVATION_MS: u64 = 200_000;
pub const DEFAULT_REFILL_PERIOD_MS: u64 = 1_000;
/// Credit consumed per released packet.
pub const DEFAULT_COST: u32 = 1_500;

const DEFAULT_NOMINALS: [u32; 5] = [125_000, 250_000, 125_000, 250_000, 125_000];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditBucket {
    pub nominal: u32,
    pub flows: Vec<FlowId>,
    credit: u32,
}

impl CreditBucket {
    /// A full bucket owning `flows`, scanned in the given order.
    pub fn new(nominal: u32, flows: Vec<FlowId>) -> Self {
        Self {
            nominal,
            flows,
            credit: nominal,
        }
    }

    pub fn credit(&self) -> u32 {
        self.credit
    }

    fn refill(&mut self) {
        self.credit = self.nominal;
    }
}

/// Five buckets alternating 125 000 / 250 000 credits, bucket `i` owning flow `i`.
pub fn default_buckets() -> Vec<CreditBucket> {
    DEFAULT_NOMINALS
        .iter()
        .enumerate()
        .map(|(i, &nominal)| CreditBucket::new(nominal, vec![i as FlowId]))
        .collect()
}

#[derive(Debug, Clone)]
pub struct CreditPolicy {
    buckets: Vec<CreditBucket>,
    activation_ms: u64,
    refill_period_ms: u64,
    cost: u32,
    /// Start of the current refill period; latched by the first release.
    last_refill: Option<u64>,
    flow_count: usize,
}

impl CreditPolicy {
    pub fn new(buckets: Vec<CreditBucket>) -> Self {
        let mut buckets = buckets;
        buckets.iter_mut().for_each(CreditBucket::refill);
        let flow_count = buckets
            .iter()
            .flat_map(|b| b.flows.iter())
            .map(|&flow| flow as usize + 1)
            .max()
            .unwrap_or(0);
        Self {
            buckets,
            activation_ms: DEFAULT_ACTIVATION_MS,
            refill_period_ms: DEFAULT_REFILL_PERIOD_MS,
            cost: DEFAULT_COST,
            last_refill: None,
            flow_count,
        }
    }

    pub fn activation_ms(mut self, activation_ms: u64) -> Self {
        self.activation_ms = activation_ms;
        self
    }

    pub fn refill_period_ms(mut self, refill_period_ms: u64) -> Self {
        self.refill_period_ms = refill_period_ms;
        self
    }

    pub fn cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    pub fn buckets(&self) -> &[CreditBucket] {
        &self.buckets
    }

    pub fn credit(&self, bucket: usize) -> Option<u32> {
        self.buckets.get(bucket).map(CreditBucket::credit)
    }

    pub fn last_refill(&self) -> Option<u64> {
        self.last_refill
    }

    fn bucket_of(&self, flow: FlowId) -> Option<usize> {
        self.buckets.iter().position(|b| b.flows.contains(&flow))
    }

    fn refill_all(&mut self) {
        self.buckets.iter_mut().for_each(CreditBucket::refill);
    }
}

impl Default for CreditPolicy {
    fn default() -> Self {
        Self::new(default_buckets())
    }
}

impl DequeuePolicy for CreditPolicy {
    fn name(&self) -> &'static str {
        "credit"
    }

    fn flow_count(&self) -> usize {
        self.flow_count
    }

    /// Only flows owned by a bucket are ever scanned.
    fn schedules(&self, flow: FlowId) -> bool {
        self.bucket_of(flow).is_some()
    }

    fn select(&mut self, now: u64, flows: &FlowTable) -> Option<FlowId> {
        if now < self.activation_ms {
            return None;
        }
        self.buckets
            .iter()
            .filter(|bucket| bucket.credit > 0)
            .find_map(|bucket| {
                bucket
                    .flows
                    .iter()
                    .copied()
                    .find(|&flow| flows.is_backlogged(flow))
            })
    }

    fn settle(
        &mut self,
        flow: FlowId,
        released: Option<&Packet>,
        now: u64,
    ) -> Result<(), SchedError> {
        let Some(index) = self.bucket_of(flow) else {
            return Err(SchedError::FlowOutOfRange {
                flow,
                flows: self.flow_count,
            });
        };

        if released.is_none() {
            debug!(flow, bucket = index, "head withheld, credit untouched");
            return Ok(());
        }

        let bucket = &mut self.buckets[index];
        bucket.credit = bucket.credit.saturating_sub(self.cost);
        debug!(flow, bucket = index, credit = bucket.credit, "credit charged");

        if self.last_refill.is_none() {
            self.last_refill = Some(now);
        }
        Ok(())
    }

    fn tick(&mut self, now: u64) {
        if now < self.activation_ms {
            return;
        }
        let Some(last) = self.last_refill else {
            return;
        };
        if now.saturating_sub(last) >= self.refill_period_ms {
            self.refill_all();
            self.last_refill = Some(now);
            debug!(now, "credit buckets refilled");
        }
    }

    fn on_clock_latched(&mut self) {
        self.refill_all();
        self.last_refill = None;
        info!("clock latched, credit buckets restored to nominal");
    }
}
