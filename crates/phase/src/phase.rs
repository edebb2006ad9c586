use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Index of a phase node in its [`PhaseGraph`](crate::graph::PhaseGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PhaseId(pub usize);

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a phase node visits the component tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    /// Parent action, then children in insertion order.
    TopDown,
    /// Children in insertion order, then the parent.
    BottomUp,
    /// One concurrent task per component.
    Task,
    /// Start marker of a domain schedule. Visits nothing.
    Schedule,
    /// End marker of a domain schedule. Visits nothing.
    Terminal,
}

impl PhaseKind {
    /// Whether nodes of this kind visit components at all.
    pub fn visits_components(self) -> bool {
        matches!(self, PhaseKind::TopDown | PhaseKind::BottomUp | PhaseKind::Task)
    }
}

/// Per-run state of a phase node.
///
/// The forward order is `Dormant → Scheduled → Syncing → Started →
/// Executing → ReadyToEnd → Ended → Cleanup → Done`. `Jumping` is a
/// transient state entered when a jump is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseState {
    Dormant,
    Scheduled,
    Syncing,
    Started,
    Executing,
    ReadyToEnd,
    Ended,
    Cleanup,
    Done,
    Jumping,
}

impl PhaseState {
    /// Position along the forward order. `Jumping` ranks with `Dormant`
    /// since a jumping node is about to be reset.
    pub fn rank(self) -> u8 {
        match self {
            PhaseState::Dormant | PhaseState::Jumping => 0,
            PhaseState::Scheduled => 1,
            PhaseState::Syncing => 2,
            PhaseState::Started => 3,
            PhaseState::Executing => 4,
            PhaseState::ReadyToEnd => 5,
            PhaseState::Ended => 6,
            PhaseState::Cleanup => 7,
            PhaseState::Done => 8,
        }
    }

    pub fn has_reached(self, other: PhaseState) -> bool {
        self != PhaseState::Jumping && self.rank() >= other.rank()
    }

    /// Between `Started` and `ReadyToEnd`: components are being visited.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            PhaseState::Started | PhaseState::Executing | PhaseState::ReadyToEnd
        )
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PhaseState::Dormant => "DORMANT",
            PhaseState::Scheduled => "SCHEDULED",
            PhaseState::Syncing => "SYNCING",
            PhaseState::Started => "STARTED",
            PhaseState::Executing => "EXECUTING",
            PhaseState::ReadyToEnd => "READY_TO_END",
            PhaseState::Ended => "ENDED",
            PhaseState::Cleanup => "CLEANUP",
            PhaseState::Done => "DONE",
            PhaseState::Jumping => "JUMPING",
        };
        f.write_str(s)
    }
}

/// Static description of one phase in the graph.
#[derive(Debug, Clone)]
pub struct PhaseNode {
    pub id: PhaseId,
    pub name: String,
    pub kind: PhaseKind,
    /// Owning domain, assigned by `add_domain`.
    pub domain: Option<String>,
    pub predecessors: BTreeSet<PhaseId>,
    pub successors: BTreeSet<PhaseId>,
    /// Same-named phases in other domains rendezvous before starting.
    pub cross_domain_sync: bool,
}

impl PhaseNode {
    pub(crate) fn new(id: PhaseId, name: String, kind: PhaseKind) -> Self {
        Self {
            id,
            name,
            kind,
            domain: None,
            predecessors: BTreeSet::new(),
            successors: BTreeSet::new(),
            cross_domain_sync: false,
        }
    }

    pub fn domain_name(&self) -> &str {
        self.domain.as_deref().unwrap_or("")
    }

    /// `domain::name`, unique across the graph once domains are assigned.
    pub fn full_name(&self) -> String {
        format!("{}::{}", self.domain_name(), self.name)
    }
}
