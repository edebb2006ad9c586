use crate::phase::PhaseId;

/// Domain shared by every environment; its phases visit all components.
pub const COMMON_DOMAIN: &str = "common";

/// Domain components belong to unless told otherwise.
pub const DEFAULT_DOMAIN: &str = "default";

/// A named, independently schedulable group of phase nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    pub name: String,
    pub nodes: Vec<PhaseId>,
}

impl Domain {
    pub fn new(name: impl Into<String>, nodes: Vec<PhaseId>) -> Self {
        Self {
            name: name.into(),
            nodes,
        }
    }
}
