//! Per-flow FIFO storage.
//!
//! Each flow owns a `VecDeque` created lazily on its first enqueue and kept
//! (possibly empty) for the lifetime of the table. Only the head of a flow is
//! ever examined, so packets of one flow leave in arrival order.

use std::collections::{HashMap, VecDeque};

use serde::Deserialize;
use tracing::warn;

use crate::error::SchedError;
use crate::packet::{FlowId, Packet};

// ─── Queue limit ─────────────────────────────────────────────────────────────

/// What happens when a flow queue is already at its depth limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Drop the arriving packet.
    #[default]
    DropTail,
    /// Evict the oldest packet of the flow to make room.
    DropOldest,
    /// Refuse the enqueue with [`SchedError::QueueFull`].
    Reject,
}

/// Per-flow depth limit. `max_depth == None` keeps queues unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueLimit {
    pub max_depth: Option<usize>,
    pub overflow: OverflowPolicy,
}

impl QueueLimit {
    pub const UNBOUNDED: QueueLimit = QueueLimit {
        max_depth: None,
        overflow: OverflowPolicy::DropTail,
    };

    pub fn bounded(max_depth: usize, overflow: OverflowPolicy) -> Self {
        Self {
            max_depth: Some(max_depth),
            overflow,
        }
    }
}

/// Result of an admitted or dropped enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// Queue was full; the arriving packet is handed back.
    DroppedIncoming(Packet),
    /// Queue was full; the arriving packet was queued and the oldest one is handed back.
    EvictedOldest(Packet),
}

impl Admission {
    /// Whether the arriving packet is now buffered.
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Admission::DroppedIncoming(_))
    }
}

// ─── FlowTable ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FlowTable {
    queues: HashMap<FlowId, VecDeque<Packet>>,
    limit: QueueLimit,
    len: usize,
}

impl FlowTable {
    pub fn new(limit: QueueLimit) -> Self {
        Self {
            queues: HashMap::new(),
            limit,
            len: 0,
        }
    }

    /// Append `packet` to the tail of `flow`.
    pub fn enqueue(&mut self, flow: FlowId, packet: Packet) -> Result<Admission, SchedError> {
        let queue = self.queues.entry(flow).or_default();

        let Some(max_depth) = self.limit.max_depth else {
            queue.push_back(packet);
            self.len += 1;
            return Ok(Admission::Accepted);
        };

        if queue.len() < max_depth {
            queue.push_back(packet);
            self.len += 1;
            return Ok(Admission::Accepted);
        }

        match self.limit.overflow {
            OverflowPolicy::DropTail => {
                warn!(flow, depth = queue.len(), "queue full, dropping arriving packet");
                Ok(Admission::DroppedIncoming(packet))
            }
            OverflowPolicy::DropOldest => {
                queue.push_back(packet);
                match queue.pop_front() {
                    Some(evicted) => {
                        warn!(flow, token = evicted.token, "queue full, evicting oldest packet");
                        Ok(Admission::EvictedOldest(evicted))
                    }
                    // max_depth of zero is rejected by config; treat as plain accept.
                    None => {
                        self.len += 1;
                        Ok(Admission::Accepted)
                    }
                }
            }
            OverflowPolicy::Reject => Err(SchedError::QueueFull {
                flow,
                depth: queue.len(),
            }),
        }
    }

    /// Oldest packet of `flow`, without removing it.
    pub fn peek_head(&self, flow: FlowId) -> Option<&Packet> {
        self.queues.get(&flow).and_then(|q| q.front())
    }

    /// Remove and return the head of `flow` only if its deadline has been reached.
    pub fn try_pop_head(&mut self, flow: FlowId, now: u64) -> Option<Packet> {
        let queue = self.queues.get_mut(&flow)?;
        if !queue.front()?.is_eligible(now) {
            return None;
        }
        let packet = queue.pop_front()?;
        self.len -= 1;
        Some(packet)
    }

    /// Put a packet back at the head of its flow.
    pub(crate) fn restore_head(&mut self, packet: Packet) {
        self.queues
            .entry(packet.flow_id)
            .or_default()
            .push_front(packet);
        self.len += 1;
    }

    pub fn depth(&self, flow: FlowId) -> usize {
        self.queues.get(&flow).map_or(0, VecDeque::len)
    }

    pub fn is_backlogged(&self, flow: FlowId) -> bool {
        self.depth(flow) > 0
    }

    /// Total packets buffered across all flows.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of flows that have ever been enqueued to.
    pub fn known_flows(&self) -> usize {
        self.queues.len()
    }

    pub fn limit(&self) -> QueueLimit {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::EnqueueRequest;

    fn pkt(flow: FlowId, token: u32, deadline: u64) -> Packet {
        EnqueueRequest::new(flow, token)
            .deadline(deadline)
            .into_packet(1)
            .unwrap()
    }

    #[test]
    fn fifo_within_a_flow() {
        let mut table = FlowTable::default();
        for token in 1..=3 {
            table.enqueue(4, pkt(4, token, 0)).unwrap();
        }
        assert_eq!(table.depth(4), 3);
        let order: Vec<_> = std::iter::from_fn(|| table.try_pop_head(4, 0))
            .map(|p| p.token)
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert!(table.is_empty());
        // Queue entry persists after draining.
        assert_eq!(table.known_flows(), 1);
    }

    #[test]
    fn head_withheld_until_deadline() {
        let mut table = FlowTable::default();
        table.enqueue(0, pkt(0, 1, 1000)).unwrap();
        assert!(table.try_pop_head(0, 500).is_none());
        assert_eq!(table.peek_head(0).map(|p| p.token), Some(1));
        assert_eq!(table.try_pop_head(0, 1000).map(|p| p.token), Some(1));
    }

    #[test]
    fn later_packet_never_overtakes_gated_head() {
        let mut table = FlowTable::default();
        table.enqueue(0, pkt(0, 1, 100)).unwrap();
        table.enqueue(0, pkt(0, 2, 0)).unwrap();
        assert!(table.try_pop_head(0, 50).is_none());
        assert_eq!(table.depth(0), 2);
    }

    #[test]
    fn unknown_flow_is_empty() {
        let mut table = FlowTable::default();
        assert!(table.peek_head(9).is_none());
        assert!(table.try_pop_head(9, u64::MAX).is_none());
        assert_eq!(table.depth(9), 0);
    }

    #[test]
    fn drop_tail_hands_back_arrival() {
        let mut table = FlowTable::new(QueueLimit::bounded(1, OverflowPolicy::DropTail));
        assert_eq!(table.enqueue(0, pkt(0, 1, 0)).unwrap(), Admission::Accepted);
        match table.enqueue(0, pkt(0, 2, 0)).unwrap() {
            Admission::DroppedIncoming(p) => assert_eq!(p.token, 2),
            other => panic!("unexpected admission {other:?}"),
        }
        assert_eq!(table.len(), 1);
        assert_eq!(table.peek_head(0).map(|p| p.token), Some(1));
    }

    #[test]
    fn drop_oldest_evicts_head() {
        let mut table = FlowTable::new(QueueLimit::bounded(2, OverflowPolicy::DropOldest));
        table.enqueue(0, pkt(0, 1, 0)).unwrap();
        table.enqueue(0, pkt(0, 2, 0)).unwrap();
        match table.enqueue(0, pkt(0, 3, 0)).unwrap() {
            Admission::EvictedOldest(p) => assert_eq!(p.token, 1),
            other => panic!("unexpected admission {other:?}"),
        }
        assert_eq!(table.len(), 2);
        assert_eq!(table.peek_head(0).map(|p| p.token), Some(2));
    }

    #[test]
    fn reject_returns_queue_full() {
        let mut table = FlowTable::new(QueueLimit::bounded(1, OverflowPolicy::Reject));
        table.enqueue(5, pkt(5, 1, 0)).unwrap();
        assert_eq!(
            table.enqueue(5, pkt(5, 2, 0)),
            Err(SchedError::QueueFull { flow: 5, depth: 1 })
        );
        // Other flows are unaffected by flow 5's limit.
        assert_eq!(table.enqueue(6, pkt(6, 3, 0)).unwrap(), Admission::Accepted);
    }

    #[test]
    fn restore_head_puts_packet_first() {
        let mut table = FlowTable::default();
        table.enqueue(0, pkt(0, 1, 0)).unwrap();
        table.enqueue(0, pkt(0, 2, 0)).unwrap();
        let head = table.try_pop_head(0, 0).unwrap();
        table.restore_head(head);
        assert_eq!(table.len(), 2);
        assert_eq!(table.peek_head(0).map(|p| p.token), Some(1));
    }
}
