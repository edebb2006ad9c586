//! Hierarchical phase scheduling over a component tree.
//!
//! A [`PhaseGraph`] of phase nodes, grouped into domains, is driven by a
//! [`Scheduler`]. Each node visits the [`ComponentTree`] top-down, bottom-up
//! or with one task per component, and components steer the run through the
//! [`PhaseHandle`] they are given: objections, jumps and early ends.

pub mod component;
pub mod context;
pub mod domain;
pub mod error;
pub mod graph;
pub mod handle;
pub mod objection;
pub mod phase;
pub mod scheduler;
mod traverse;

pub use component::{Component, ComponentId, ComponentTree, PhaseAction};
pub use context::Context;
pub use domain::{Domain, COMMON_DOMAIN, DEFAULT_DOMAIN};
pub use error::{ActionError, PhaseError, Result};
pub use graph::{PhaseGraph, COMMON_PHASES, RUNTIME_PHASES};
pub use handle::PhaseHandle;
pub use objection::Objection;
pub use phase::{PhaseId, PhaseKind, PhaseNode, PhaseState};
pub use scheduler::{RunSummary, Scheduler};
