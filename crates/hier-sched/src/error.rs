use thiserror::Error;

use crate::packet::FlowId;

// ── Errors ──────────────────────────────────────────────────────────

/// Errors returned by the scheduling engine.
///
/// None of these are fatal: the engine state is left untouched (or restored)
/// whenever one is returned, so callers may log and carry on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedError {
    #[error("queue index {index} out of range ({queues} queues configured)")]
    QueueIndexOutOfRange { index: usize, queues: usize },
    #[error("rejecting zero quantum for queue {index}")]
    ZeroQuantum { index: usize },
    #[error("policy `{policy}` does not accept runtime quantum changes")]
    QuantumLocked { policy: &'static str },
    #[error("flow {flow} out of range ({flows} flows scheduled)")]
    FlowOutOfRange { flow: FlowId, flows: usize },
    #[error("flow {flow} token {token}: level-0 rank is 0 (unused), lowest valid rank is 1")]
    UnsetLeafRank { flow: FlowId, token: u32 },
    #[error("levels_used {used} outside 1..={levels}")]
    InvalidLevelsUsed { used: usize, levels: usize },
    #[error("hierarchy level {level} has no enqueue/dequeue path")]
    LevelNotWired { level: usize },
    #[error("slot {slot} out of bounds for level {level} ({slots} slots)")]
    SlotOutOfBounds { level: usize, slot: usize, slots: usize },
    #[error("flow {flow} queue full ({depth} packets)")]
    QueueFull { flow: FlowId, depth: usize },
    #[error("quota underflow on flow {flow}: quota {quota} < rank {rank}")]
    QuotaUnderflow { flow: FlowId, quota: u32, rank: u32 },
}

/// Errors produced while loading a scheduler configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unsupported config version {0}")]
    UnsupportedVersion(u32),
    #[error("{0}")]
    Invalid(String),
}
