//! # hier-sched
//!
//! Per-flow packet scheduling engine for a simulated programmable-switch
//! traffic manager.
//!
//! Packets are buffered per flow and released one at a time by a pluggable
//! dequeue policy, gated by each packet's deadline. The engine also keeps a
//! ledger of payload tokens in enqueue order and a few host-visible counters.
//!
//! ## Crate structure
//!
//! - [`packet`] — Packet record and enqueue request builder
//! - [`flow_table`] — Per-flow FIFOs with optional depth limits
//! - [`router`] — Hierarchy presets and level routing
//! - [`policy`] — Dequeue policies: WRR and credit-gated
//! - [`clock`] — Scheduler epoch and dequeue pacing
//! - [`ledger`] — Pending-token ledger and counters
//! - [`stats`] — Per-flow service statistics
//! - [`config`] — TOML configuration
//! - [`scheduler`] — The engine
//! - [`host`] — Integer-only port for the switch target
//! - [`shared`] — Locked handle for multi-threaded callers

pub mod clock;
pub mod config;
pub mod error;
pub mod flow_table;
pub mod host;
pub mod ledger;
pub mod packet;
pub mod policy;
pub mod router;
pub mod scheduler;
pub mod shared;
pub mod stats;

pub use config::SchedulerConfig;
pub use error::{ConfigError, SchedError};
pub use flow_table::{Admission, OverflowPolicy, QueueLimit};
pub use packet::{EnqueueRequest, FlowId, Packet, Rank, Token};
pub use policy::{BoxedPolicy, DequeuePolicy};
pub use scheduler::{DequeueOutcome, Scheduler};
pub use shared::SharedScheduler;
