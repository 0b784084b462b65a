//! Traffic-manager simulation for `hier-sched`.
//!
//! Generates deterministic per-flow arrivals, drives a scheduler on a
//! virtual clock and reports how the dequeue policy shared the service
//! among flows.

pub mod report;
pub mod runner;
pub mod scenario;

pub use report::{FlowReport, SimReport};
pub use runner::Simulation;
pub use scenario::{Scenario, ScenarioConfig};
