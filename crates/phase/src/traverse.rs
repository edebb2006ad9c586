//! Component tree traversal for a single phase execution.

use std::collections::HashSet;
use std::sync::Arc;

use tempo_core::verbosity;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::warn;

use crate::component::{ComponentId, ComponentTree};
use crate::error::ActionError;
use crate::handle::PhaseHandle;
use crate::phase::{PhaseId, PhaseKind};
use crate::scheduler::core::Shared;

/// How the action step of a phase finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// Every action returned, or a task phase's objections all dropped.
    Completed,
    /// `end()` or a jump request cut a task phase short.
    Interrupted,
    /// A FATAL report was raised.
    Aborted,
}

/// Keeps `phasing_active` raised while an action runs, including when the
/// action's task is aborted.
struct ActiveGuard {
    tree: Arc<ComponentTree>,
    id: ComponentId,
}

impl ActiveGuard {
    fn enter(tree: &Arc<ComponentTree>, id: ComponentId) -> Self {
        tree.enter_action(id);
        Self {
            tree: Arc::clone(tree),
            id,
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.tree.exit_action(self.id);
    }
}

/// Run the override for this phase if the component has one, otherwise the
/// component's own action.
async fn invoke(handle: PhaseHandle) -> Result<(), ActionError> {
    let tree = Arc::clone(handle.tree());
    let id = handle.component();
    let Some(component) = tree.component(id) else {
        return Ok(());
    };
    tree.set_current_phase(id, Some(handle.id()));
    let _active = ActiveGuard::enter(&tree, id);
    match tree.override_for(id, handle.name()) {
        Some(action) => action.execute(component.as_ref(), &handle).await,
        None => component.execute(&handle).await,
    }
}

pub(crate) struct Traversal {
    shared: Arc<Shared>,
    phase: PhaseId,
    /// Components touched by this execution, in visit order.
    visited: Vec<ComponentId>,
    seen: HashSet<ComponentId>,
    failed: HashSet<ComponentId>,
}

impl Traversal {
    pub fn new(shared: Arc<Shared>, phase: PhaseId) -> Self {
        Self {
            shared,
            phase,
            visited: Vec::new(),
            seen: HashSet::new(),
            failed: HashSet::new(),
        }
    }

    fn handle(&self, id: ComponentId) -> PhaseHandle {
        PhaseHandle::new(Arc::clone(&self.shared), self.phase, id)
    }

    fn tree(&self) -> &Arc<ComponentTree> {
        &self.shared.tree
    }

    fn visits(&self, id: ComponentId) -> bool {
        self.tree()
            .in_domain(id, self.shared.node(self.phase).domain_name())
    }

    fn mark_visited(&mut self, id: ComponentId) {
        if self.seen.insert(id) {
            self.visited.push(id);
        }
    }

    fn is_build(&self) -> bool {
        self.shared.node(self.phase).name == "build"
    }

    fn fatal_raised(&self) -> bool {
        self.shared.ctx.reports().fatal_raised()
    }

    /// Report a failed action against the component and phase.
    fn fail(&mut self, id: ComponentId, err: ActionError) {
        let path = self.tree().full_name(id).unwrap_or_default();
        let phase = self.shared.node(self.phase).full_name();
        self.shared.ctx.reports().report(
            err.severity(),
            "PH_ACTION",
            &format!("component '{path}' failed in phase '{phase}': {err}"),
            verbosity::NONE,
        );
        self.failed.insert(id);
    }

    /// STARTED: mark every component in range and notify it.
    pub fn start(&mut self) {
        for id in self.tree().preorder() {
            if !self.visits(id) {
                continue;
            }
            self.tree().set_current_phase(id, Some(self.phase));
            self.mark_visited(id);
            if let Some(component) = self.tree().component(id) {
                component.phase_started(&self.handle(id));
            }
        }
    }

    /// EXECUTING: run the phase's action over the tree.
    pub async fn execute(&mut self, interrupt: &mut watch::Receiver<u64>) -> Flow {
        match self.shared.node(self.phase).kind {
            PhaseKind::TopDown => self.top_down().await,
            PhaseKind::BottomUp => self.bottom_up().await,
            PhaseKind::Task => self.parallel(interrupt).await,
            PhaseKind::Schedule | PhaseKind::Terminal => Flow::Completed,
        }
    }

    /// Run one synchronous action, racing it against a FATAL abort.
    async fn visit(&mut self, id: ComponentId) -> Flow {
        let skip_build = self.is_build() && self.tree().is_build_done(id);
        if !self.visits(id) || skip_build {
            return Flow::Completed;
        }
        self.mark_visited(id);

        let shared = Arc::clone(&self.shared);
        let result = tokio::select! {
            biased;
            _ = shared.ctx.reports().wait_fatal() => return Flow::Aborted,
            res = invoke(self.handle(id)) => res,
        };
        if self.is_build() {
            self.tree().set_build_done(id);
        }
        if let Err(err) = result {
            self.fail(id, err);
        }
        Flow::Completed
    }

    /// Parent, then children. Children are read after the parent's action
    /// so those it creates are visited in the same pass.
    async fn top_down(&mut self) -> Flow {
        let mut stack = vec![self.tree().root()];
        while let Some(id) = stack.pop() {
            if self.fatal_raised() || self.visit(id).await == Flow::Aborted {
                return Flow::Aborted;
            }
            stack.extend(self.tree().children(id).into_iter().rev());
        }
        Flow::Completed
    }

    async fn bottom_up(&mut self) -> Flow {
        for id in self.tree().postorder() {
            if self.fatal_raised() || self.visit(id).await == Flow::Aborted {
                return Flow::Aborted;
            }
        }
        Flow::Completed
    }

    /// Spawn one task per component, then wait for all of them, for the
    /// objections to drain, for an interrupt or for an abort.
    async fn parallel(&mut self, interrupt: &mut watch::Receiver<u64>) -> Flow {
        let mut tasks = JoinSet::new();
        for id in self.tree().preorder() {
            if !self.visits(id) {
                continue;
            }
            self.mark_visited(id);
            let handle = self.handle(id);
            tasks.spawn(async move { (id, invoke(handle).await) });
        }

        let shared = Arc::clone(&self.shared);
        let drain = shared.ctx.config().objection_drain();
        let dropped = shared.slot(self.phase).objection.wait_all_dropped(drain);
        let fatal = shared.ctx.reports().wait_fatal();
        tokio::pin!(dropped, fatal);

        let flow = loop {
            tokio::select! {
                biased;
                _ = &mut fatal => break Flow::Aborted,
                res = interrupt.changed() => {
                    if res.is_ok() {
                        break Flow::Interrupted;
                    }
                }
                _ = &mut dropped => break Flow::Completed,
                joined = tasks.join_next() => match joined {
                    None => break Flow::Completed,
                    Some(Ok((id, Err(err)))) => self.fail(id, err),
                    Some(Ok((_, Ok(())))) => {}
                    Some(Err(err)) if err.is_panic() => {
                        warn!(phase = %shared.node(self.phase).full_name(), "phase task panicked");
                        shared.ctx.reports().error(
                            "PH_TASK_PANIC",
                            &format!("a task of phase '{}' panicked", shared.node(self.phase).full_name()),
                        );
                    }
                    Some(Err(_)) => {}
                },
            }
        };

        tasks.abort_all();
        while let Some(joined) = tasks.join_next().await {
            if let Ok((id, Err(err))) = joined {
                self.fail(id, err);
            }
        }
        flow
    }

    /// READY_TO_END: poll every component that has not failed.
    pub fn ready_to_end(&self) {
        for &id in &self.visited {
            if self.failed.contains(&id) {
                continue;
            }
            if let Some(component) = self.tree().component(id) {
                component.phase_ready_to_end(&self.handle(id));
            }
        }
    }

    /// ENDED: final notification. Runs for everything started, including
    /// after an abort.
    pub fn end(&self) {
        for &id in &self.visited {
            if let Some(component) = self.tree().component(id) {
                component.phase_ended(&self.handle(id));
            }
            if self.tree().current_phase(id) == Some(self.phase) {
                self.tree().set_current_phase(id, None);
            }
        }
    }
}
