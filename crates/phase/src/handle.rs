use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tempo_core::{verbosity, Advance, Severity};

use crate::component::{Component, ComponentId, ComponentTree};
use crate::context::Context;
use crate::error::{PhaseError, Result};
use crate::phase::{PhaseId, PhaseKind, PhaseState};
use crate::scheduler::core::Shared;
use crate::scheduler::jump;

/// What a component sees of the phase it is being driven through.
#[derive(Clone)]
pub struct PhaseHandle {
    shared: Arc<Shared>,
    phase: PhaseId,
    component: ComponentId,
}

impl PhaseHandle {
    pub(crate) fn new(shared: Arc<Shared>, phase: PhaseId, component: ComponentId) -> Self {
        Self {
            shared,
            phase,
            component,
        }
    }

    pub fn id(&self) -> PhaseId {
        self.phase
    }

    pub fn name(&self) -> &str {
        &self.shared.node(self.phase).name
    }

    pub fn kind(&self) -> PhaseKind {
        self.shared.node(self.phase).kind
    }

    pub fn domain(&self) -> &str {
        self.shared.node(self.phase).domain_name()
    }

    pub fn full_name(&self) -> String {
        self.shared.node(self.phase).full_name()
    }

    pub fn state(&self) -> PhaseState {
        self.shared.state(self.phase)
    }

    /// State of another phase in the same domain.
    pub fn state_of(&self, name: &str) -> Option<PhaseState> {
        self.shared
            .graph
            .find(self.domain(), name)
            .map(|id| self.shared.state(id))
    }

    /// The component this handle was issued to.
    pub fn component(&self) -> ComponentId {
        self.component
    }

    pub fn component_name(&self) -> String {
        self.shared
            .tree
            .full_name(self.component)
            .unwrap_or_default()
    }

    pub fn tree(&self) -> &Arc<ComponentTree> {
        &self.shared.tree
    }

    pub fn context(&self) -> &Context {
        &self.shared.ctx
    }

    /// Create a child of this handle's component.
    pub fn add_child(
        &self,
        name: impl Into<String>,
        component: Arc<dyn Component>,
    ) -> Result<ComponentId> {
        self.shared.tree.add_child(self.component, name, component)
    }

    // ── objections ──────────────────────────────────────────

    pub fn raise_objection(&self, count: u32) {
        self.shared.slot(self.phase).objection.raise(count);
        self.trace_objection("raised", count);
    }

    pub fn drop_objection(&self, count: u32) {
        self.shared.slot(self.phase).objection.lower(count);
        self.trace_objection("dropped", count);
    }

    pub fn objection_count(&self) -> u32 {
        self.shared.slot(self.phase).objection.count()
    }

    fn trace_objection(&self, what: &str, count: u32) {
        let reports = self.shared.ctx.reports();
        if reports.is_enabled(Severity::Info, verbosity::HIGH) {
            reports.info(
                "OBJTN_TRC",
                &format!(
                    "{} {what} {count} objection(s) on '{}' (total {})",
                    self.component_name(),
                    self.full_name(),
                    self.objection_count()
                ),
                verbosity::HIGH,
            );
        }
    }

    // ── control ─────────────────────────────────────────────

    /// Request a jump to the phase `target` of this phase's domain. The
    /// jump takes effect when the current phase leaves its action step.
    pub fn jump(&self, target: &str) -> Result<()> {
        let Some(to) = self.shared.graph.find(self.domain(), target) else {
            let err = PhaseError::UnknownPhaseName(target.to_string());
            self.shared.ctx.reports().error(
                "PH_BADJUMP",
                &format!("'{}' cannot jump: {err}", self.full_name()),
            );
            return Err(err);
        };
        jump::request(&self.shared, self.phase, to)
    }

    /// End a task phase now; tasks still running are aborted.
    pub fn end(&self) {
        self.shared.slot(self.phase).interrupt();
    }

    // ── time ────────────────────────────────────────────────

    pub async fn sleep(&self, duration: Duration) {
        self.shared.ctx.time().advance(Advance::By(duration)).await;
    }

    /// Let every other runnable task go first without moving time.
    pub async fn delta(&self) {
        self.shared.ctx.time().advance(Advance::Delta).await;
    }
}

impl fmt::Debug for PhaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseHandle")
            .field("phase", &self.full_name())
            .field("component", &self.component_name())
            .finish()
    }
}
