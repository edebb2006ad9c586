use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::debug;

use crate::component::ComponentTree;
use crate::context::Context;
use crate::error::{PhaseError, Result};
use crate::graph::PhaseGraph;
use crate::objection::Objection;
use crate::phase::{PhaseId, PhaseNode, PhaseState};

/// Per-node signals that live across runs.
pub(crate) struct NodeSlot {
    pub objection: Objection,
    /// Bumped by `end()` and by jump requests to interrupt a task phase.
    pub interrupt: watch::Sender<u64>,
    pub jump: Mutex<Option<PhaseId>>,
}

impl NodeSlot {
    pub fn pending_jump(&self) -> Option<PhaseId> {
        *self.jump.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn take_jump(&self) -> Option<PhaseId> {
        self.jump.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub fn interrupt(&self) {
        self.interrupt.send_modify(|n| *n += 1);
    }

    /// Clear signals left over from a previous execution of the node.
    pub fn rearm(&self) {
        self.objection.reset();
        *self.jump.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

pub(crate) struct RunState {
    pub states: Vec<PhaseState>,
    pub active: Vec<bool>,
    pub executions: Vec<u32>,
    pub jumps: u32,
}

/// State shared between the scheduler loop, node drivers and phase handles.
pub(crate) struct Shared {
    pub graph: PhaseGraph,
    pub tree: Arc<ComponentTree>,
    pub ctx: Context,
    pub slots: Vec<NodeSlot>,
    run: Mutex<RunState>,
    changed: watch::Sender<u64>,
}

impl Shared {
    fn new(graph: PhaseGraph, tree: Arc<ComponentTree>, ctx: Context) -> Self {
        let slots = graph
            .nodes()
            .iter()
            .map(|n| NodeSlot {
                objection: Objection::new(n.full_name(), ctx.env().clone()),
                interrupt: watch::channel(0).0,
                jump: Mutex::new(None),
            })
            .collect();
        let len = graph.len();
        Self {
            graph,
            tree,
            ctx,
            slots,
            run: Mutex::new(RunState {
                states: vec![PhaseState::Dormant; len],
                active: vec![false; len],
                executions: vec![0; len],
                jumps: 0,
            }),
            changed: watch::channel(0).0,
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, RunState> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn node(&self, id: PhaseId) -> &PhaseNode {
        &self.graph.nodes()[id.0]
    }

    pub fn slot(&self, id: PhaseId) -> &NodeSlot {
        &self.slots[id.0]
    }

    pub fn state(&self, id: PhaseId) -> PhaseState {
        self.lock().states[id.0]
    }

    pub fn is_active(&self, id: PhaseId) -> bool {
        self.lock().active[id.0]
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }

    pub fn notify(&self) {
        self.changed.send_modify(|n| *n += 1);
    }

    pub fn set_state(&self, id: PhaseId, state: PhaseState) {
        let prev = std::mem::replace(&mut self.lock().states[id.0], state);
        if self.ctx.config().trace_phases {
            let node = self.node(id);
            debug!(
                phase = %node.name,
                domain = %node.domain_name(),
                from = %prev,
                to = %state,
                "phase transition"
            );
        }
        self.notify();
    }

    /// Set many states at once with a single change notification.
    pub fn set_states(&self, ids: &[PhaseId], state: PhaseState) {
        {
            let mut run = self.lock();
            for id in ids {
                run.states[id.0] = state;
            }
        }
        if self.ctx.config().trace_phases {
            for &id in ids {
                debug!(phase = %self.node(id).full_name(), to = %state, "phase reset");
            }
        }
        self.notify();
    }

    /// Whether every active predecessor of `id` has reached `state`.
    /// Predecessors in inactive domains count as satisfied.
    pub fn preds_reached(&self, id: PhaseId, state: PhaseState) -> bool {
        let run = self.lock();
        self.node(id)
            .predecessors
            .iter()
            .all(|p| !run.active[p.0] || run.states[p.0].has_reached(state))
    }

    /// Dormant active nodes whose active predecessors are all done.
    pub fn ready_nodes(&self, running: &HashSet<PhaseId>) -> Vec<PhaseId> {
        let run = self.lock();
        self.graph
            .nodes()
            .iter()
            .filter(|n| {
                run.active[n.id.0]
                    && run.states[n.id.0] == PhaseState::Dormant
                    && !running.contains(&n.id)
                    && n.predecessors
                        .iter()
                        .all(|p| !run.active[p.0] || run.states[p.0] == PhaseState::Done)
            })
            .map(|n| n.id)
            .collect()
    }

    pub fn count_execution(&self, id: PhaseId) {
        self.lock().executions[id.0] += 1;
    }

    /// Reset every node for a new run over `domains`.
    pub fn reset_run(&self, domains: &HashSet<String>) {
        {
            let mut run = self.lock();
            for node in self.graph.nodes() {
                run.states[node.id.0] = PhaseState::Dormant;
                run.active[node.id.0] = domains.contains(node.domain_name());
                run.executions[node.id.0] = 0;
            }
            run.jumps = 0;
        }
        for slot in &self.slots {
            slot.rearm();
        }
        self.notify();
    }
}

/// Drives a [`PhaseGraph`] over a [`ComponentTree`].
pub struct Scheduler {
    pub(crate) shared: Arc<Shared>,
}

impl Scheduler {
    /// Validate the graph and prepare a scheduler for it.
    pub fn new(graph: PhaseGraph, tree: Arc<ComponentTree>, ctx: Context) -> Result<Self> {
        graph.validate()?;
        Ok(Self {
            shared: Arc::new(Shared::new(graph, tree, ctx)),
        })
    }

    pub fn graph(&self) -> &PhaseGraph {
        &self.shared.graph
    }

    pub fn tree(&self) -> &Arc<ComponentTree> {
        &self.shared.tree
    }

    pub fn context(&self) -> &Context {
        &self.shared.ctx
    }

    pub fn phase_state(&self, id: PhaseId) -> Option<PhaseState> {
        (id.0 < self.shared.graph.len()).then(|| self.shared.state(id))
    }

    /// State of the phase `name` in `domain`.
    pub fn state_of(&self, domain: &str, name: &str) -> Result<PhaseState> {
        let id = self
            .shared
            .graph
            .find(domain, name)
            .ok_or_else(|| PhaseError::UnknownPhaseName(format!("{domain}::{name}")))?;
        Ok(self.shared.state(id))
    }

    /// Snapshot of every node's state, keyed by `domain::name`.
    pub fn states(&self) -> Vec<(String, PhaseState)> {
        let run = self.shared.lock();
        self.shared
            .graph
            .nodes()
            .iter()
            .map(|n| (n.full_name(), run.states[n.id.0]))
            .collect()
    }

    /// Receiver bumped on every state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.subscribe()
    }
}
