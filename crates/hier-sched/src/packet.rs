//! Packet record carried through the scheduler.

use serde::Serialize;

use crate::error::SchedError;

/// Flow identifier. Level-0 queues are indexed directly by it.
pub type FlowId = u32;

/// Opaque payload handle owned by the caller.
pub type Token = u32;

/// Per-level cost/weight. `0` means the level is unused; the lowest usable rank is `1`.
pub type Rank = u32;

/// Rank value that marks a hierarchy level as unused.
pub const RANK_UNUSED: Rank = 0;

/// Scheduling metadata for one buffered packet.
///
/// Immutable once enqueued; the flow table only moves it around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Packet {
    pub flow_id: FlowId,
    /// One rank per hierarchy level, `ranks[0]` being the leaf level.
    pub ranks: Vec<Rank>,
    /// Earliest time (ms since the scheduler epoch) the packet may leave.
    pub deadline: u64,
    pub arrival_time: u64,
    pub shaping: bool,
    pub token: Token,
}

impl Packet {
    /// Level-0 rank, the cost consumed against a flow's quota.
    pub fn rank(&self) -> Rank {
        self.ranks.first().copied().unwrap_or(RANK_UNUSED)
    }

    /// Whether the deadline has been reached at `now`.
    pub fn is_eligible(&self, now: u64) -> bool {
        self.deadline <= now
    }
}

// ─── EnqueueRequest ──────────────────────────────────────────────────────────

/// Everything the host hands over on an enqueue call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueRequest {
    pub flow_id: FlowId,
    pub levels_used: usize,
    pub ranks: Vec<Rank>,
    pub deadline: u64,
    pub arrival_time: u64,
    pub shaping: bool,
    pub token: Token,
    /// Zero the scheduler clock before enqueueing.
    pub reset_clock: bool,
}

impl EnqueueRequest {
    /// Single-level request with rank 1 and no deadline.
    pub fn new(flow_id: FlowId, token: Token) -> Self {
        Self {
            flow_id,
            levels_used: 1,
            ranks: vec![1],
            deadline: 0,
            arrival_time: 0,
            shaping: false,
            token,
            reset_clock: false,
        }
    }

    /// Set the level-0 rank and use a single level.
    pub fn rank(mut self, rank: Rank) -> Self {
        self.ranks = vec![rank];
        self.levels_used = 1;
        self
    }

    /// Set ranks for the first `ranks.len()` levels.
    pub fn ranks(mut self, ranks: Vec<Rank>) -> Self {
        self.levels_used = ranks.len();
        self.ranks = ranks;
        self
    }

    pub fn deadline(mut self, deadline: u64) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn arrival(mut self, arrival_time: u64) -> Self {
        self.arrival_time = arrival_time;
        self
    }

    pub fn shaping(mut self, shaping: bool) -> Self {
        self.shaping = shaping;
        self
    }

    pub fn reset_clock(mut self) -> Self {
        self.reset_clock = true;
        self
    }

    /// Expand the request into a packet whose rank vector covers all `levels`.
    ///
    /// Levels at and above `levels_used` inherit the rank of level `levels_used - 1`.
    pub fn into_packet(self, levels: usize) -> Result<Packet, SchedError> {
        let used = self.levels_used;
        if used == 0 || used > levels || used > self.ranks.len() {
            return Err(SchedError::InvalidLevelsUsed { used, levels });
        }

        if self.ranks[0] == RANK_UNUSED {
            return Err(SchedError::UnsetLeafRank {
                flow: self.flow_id,
                token: self.token,
            });
        }

        let mut ranks = self.ranks;
        ranks.truncate(used);
        let inherited = ranks[used - 1];
        ranks.resize(levels, inherited);

        Ok(Packet {
            flow_id: self.flow_id,
            ranks,
            deadline: self.deadline,
            arrival_time: self.arrival_time,
            shaping: self.shaping,
            token: self.token,
        })
    }
}
