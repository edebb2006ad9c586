//! Component tree: an arena of components owned through their parents,
//! with parent links stored as plain indices.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::domain::{COMMON_DOMAIN, DEFAULT_DOMAIN};
use crate::error::{ActionError, PhaseError, Result};
use crate::handle::PhaseHandle;
use crate::phase::PhaseId;

/// User code living in the component tree.
///
/// `execute` is the single action entry point; implementations dispatch on
/// `phase.name()`. The notification hooks run synchronously while the
/// owning phase walks through its states.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    async fn execute(&self, _phase: &PhaseHandle) -> std::result::Result<(), ActionError> {
        Ok(())
    }

    fn phase_started(&self, _phase: &PhaseHandle) {}

    fn phase_ready_to_end(&self, _phase: &PhaseHandle) {}

    fn phase_ended(&self, _phase: &PhaseHandle) {}
}

/// Substitute behaviour a component can install for a named phase.
#[async_trait]
pub trait PhaseAction: Send + Sync {
    async fn execute(
        &self,
        component: &dyn Component,
        phase: &PhaseHandle,
    ) -> std::result::Result<(), ActionError>;
}

/// Index of a component in its [`ComponentTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub usize);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

struct Entry {
    name: String,
    full_name: String,
    parent: Option<ComponentId>,
    children: Vec<ComponentId>,
    domain: String,
    component: Arc<dyn Component>,
    current_phase: Option<PhaseId>,
    overrides: HashMap<String, Arc<dyn PhaseAction>>,
    phasing_active: u32,
    build_done: bool,
}

/// Parent-owns-children forest with a single root. Children keep insertion
/// order, which is also traversal order.
pub struct ComponentTree {
    entries: RwLock<Vec<Entry>>,
}

impl ComponentTree {
    pub fn new(root_name: impl Into<String>, root: Arc<dyn Component>) -> Self {
        let name = root_name.into();
        Self {
            entries: RwLock::new(vec![Entry {
                full_name: name.clone(),
                name,
                parent: None,
                children: Vec::new(),
                domain: DEFAULT_DOMAIN.to_string(),
                component: root,
                current_phase: None,
                overrides: HashMap::new(),
                phasing_active: 0,
                build_done: false,
            }]),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn root(&self) -> ComponentId {
        ComponentId(0)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Attach a new child under `parent`. The child inherits its parent's
    /// domain.
    pub fn add_child(
        &self,
        parent: ComponentId,
        name: impl Into<String>,
        component: Arc<dyn Component>,
    ) -> Result<ComponentId> {
        let name = name.into();
        let mut entries = self.write();
        let parent_entry = entries
            .get(parent.0)
            .ok_or(PhaseError::UnknownComponent(parent.0))?;
        if parent_entry
            .children
            .iter()
            .any(|c| entries[c.0].name == name)
        {
            return Err(PhaseError::DuplicateComponent {
                parent: parent_entry.full_name.clone(),
                name,
            });
        }

        let id = ComponentId(entries.len());
        let full_name = format!("{}.{}", parent_entry.full_name, name);
        let domain = parent_entry.domain.clone();
        entries.push(Entry {
            name,
            full_name,
            parent: Some(parent),
            children: Vec::new(),
            domain,
            component,
            current_phase: None,
            overrides: HashMap::new(),
            phasing_active: 0,
            build_done: false,
        });
        entries[parent.0].children.push(id);
        Ok(id)
    }

    // ── identity ────────────────────────────────────────────

    pub fn name(&self, id: ComponentId) -> Option<String> {
        self.read().get(id.0).map(|e| e.name.clone())
    }

    /// Dotted path from the root, e.g. `top.env.agent`.
    pub fn full_name(&self, id: ComponentId) -> Option<String> {
        self.read().get(id.0).map(|e| e.full_name.clone())
    }

    pub fn parent(&self, id: ComponentId) -> Option<ComponentId> {
        self.read().get(id.0).and_then(|e| e.parent)
    }

    pub fn children(&self, id: ComponentId) -> Vec<ComponentId> {
        self.read()
            .get(id.0)
            .map(|e| e.children.clone())
            .unwrap_or_default()
    }

    pub fn lookup(&self, path: &str) -> Option<ComponentId> {
        self.read()
            .iter()
            .position(|e| e.full_name == path)
            .map(ComponentId)
    }

    /// Distance from the root; the root has depth 0.
    pub fn depth(&self, id: ComponentId) -> usize {
        let entries = self.read();
        let mut depth = 0;
        let mut cur = entries.get(id.0).and_then(|e| e.parent);
        while let Some(p) = cur {
            depth += 1;
            cur = entries[p.0].parent;
        }
        depth
    }

    pub fn component(&self, id: ComponentId) -> Option<Arc<dyn Component>> {
        self.read().get(id.0).map(|e| Arc::clone(&e.component))
    }

    // ── domains ─────────────────────────────────────────────

    pub fn domain(&self, id: ComponentId) -> Option<String> {
        self.read().get(id.0).map(|e| e.domain.clone())
    }

    /// Move a component (and optionally its whole subtree) into `domain`.
    pub fn set_domain(&self, id: ComponentId, domain: &str, hierarchical: bool) -> Result<()> {
        let mut entries = self.write();
        if id.0 >= entries.len() {
            return Err(PhaseError::UnknownComponent(id.0));
        }
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            let entry = &mut entries[cur.0];
            entry.domain = domain.to_string();
            if hierarchical {
                stack.extend(entry.children.iter().copied());
            }
        }
        Ok(())
    }

    /// Phases of the common domain visit everyone; others only their own.
    pub fn in_domain(&self, id: ComponentId, phase_domain: &str) -> bool {
        phase_domain == COMMON_DOMAIN
            || self
                .read()
                .get(id.0)
                .is_some_and(|e| e.domain == phase_domain)
    }

    // ── overrides ───────────────────────────────────────────

    /// Replace the default action of `phase` for this component.
    pub fn set_override(
        &self,
        id: ComponentId,
        phase: impl Into<String>,
        action: Arc<dyn PhaseAction>,
    ) -> Result<()> {
        let mut entries = self.write();
        let entry = entries
            .get_mut(id.0)
            .ok_or(PhaseError::UnknownComponent(id.0))?;
        entry.overrides.insert(phase.into(), action);
        Ok(())
    }

    pub fn clear_override(&self, id: ComponentId, phase: &str) -> bool {
        self.write()
            .get_mut(id.0)
            .is_some_and(|e| e.overrides.remove(phase).is_some())
    }

    pub fn override_for(&self, id: ComponentId, phase: &str) -> Option<Arc<dyn PhaseAction>> {
        self.read()
            .get(id.0)
            .and_then(|e| e.overrides.get(phase).cloned())
    }

    // ── phasing state ───────────────────────────────────────

    pub fn current_phase(&self, id: ComponentId) -> Option<PhaseId> {
        self.read().get(id.0).and_then(|e| e.current_phase)
    }

    pub(crate) fn set_current_phase(&self, id: ComponentId, phase: Option<PhaseId>) {
        if let Some(e) = self.write().get_mut(id.0) {
            e.current_phase = phase;
        }
    }

    /// Number of phase actions currently running on this component.
    pub fn phasing_active(&self, id: ComponentId) -> u32 {
        self.read().get(id.0).map_or(0, |e| e.phasing_active)
    }

    pub(crate) fn enter_action(&self, id: ComponentId) {
        if let Some(e) = self.write().get_mut(id.0) {
            e.phasing_active += 1;
        }
    }

    pub(crate) fn exit_action(&self, id: ComponentId) {
        if let Some(e) = self.write().get_mut(id.0) {
            e.phasing_active = e.phasing_active.saturating_sub(1);
        }
    }

    pub fn is_build_done(&self, id: ComponentId) -> bool {
        self.read().get(id.0).is_some_and(|e| e.build_done)
    }

    pub(crate) fn set_build_done(&self, id: ComponentId) {
        if let Some(e) = self.write().get_mut(id.0) {
            e.build_done = true;
        }
    }

    pub(crate) fn clear_build_done(&self) {
        for e in self.write().iter_mut() {
            e.build_done = false;
        }
    }

    // ── orderings ───────────────────────────────────────────

    /// Parent first, children in insertion order.
    pub fn preorder(&self) -> Vec<ComponentId> {
        let entries = self.read();
        let mut out = Vec::with_capacity(entries.len());
        let mut stack = vec![ComponentId(0)];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(entries[id.0].children.iter().rev().copied());
        }
        out
    }

    /// Children in insertion order, then the parent.
    pub fn postorder(&self) -> Vec<ComponentId> {
        let entries = self.read();
        let mut out = Vec::with_capacity(entries.len());
        let mut stack = vec![(ComponentId(0), false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                out.push(id);
                continue;
            }
            stack.push((id, true));
            stack.extend(entries[id.0].children.iter().rev().map(|&c| (c, false)));
        }
        out
    }
}

impl fmt::Debug for ComponentTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.read().iter().map(|e| e.full_name.clone()).collect();
        f.debug_struct("ComponentTree").field("components", &names).finish()
    }
}
