//! Phase scheduler: walks the phase graph, drives each node through its
//! state machine and applies jumps.
//!
//! Split into focused submodules:
//! - `core`: shared node table and the `Scheduler` accessors
//! - `run`: the main scheduling loop and run summary
//! - `execution`: the per-node state machine driver
//! - `jump`: jump validation and application
//! - `sync`: cross-domain rendezvous

pub(crate) mod core;
mod execution;
pub(crate) mod jump;
pub mod metrics;
mod run;
mod sync;

pub use self::core::Scheduler;
pub use self::metrics::RunSummary;
