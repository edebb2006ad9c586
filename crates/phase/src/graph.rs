//! Phase graph: phase nodes joined by predecessor/successor edges and
//! grouped into domains. Assembled once before a run; the scheduler treats
//! it as static topology.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;

use crate::domain::{Domain, COMMON_DOMAIN};
use crate::error::{PhaseError, Result};
use crate::phase::{PhaseId, PhaseKind, PhaseNode};

/// Phases of the common domain, in schedule order.
pub const COMMON_PHASES: &[(&str, PhaseKind)] = &[
    ("build", PhaseKind::TopDown),
    ("connect", PhaseKind::BottomUp),
    ("end_of_elaboration", PhaseKind::BottomUp),
    ("start_of_simulation", PhaseKind::BottomUp),
    ("run", PhaseKind::Task),
    ("extract", PhaseKind::BottomUp),
    ("check", PhaseKind::BottomUp),
    ("report", PhaseKind::BottomUp),
    ("final", PhaseKind::TopDown),
];

/// Runtime sub-phases that run alongside the common `run` phase.
pub const RUNTIME_PHASES: &[&str] = &["reset", "configure", "main", "shutdown"];

#[derive(Debug, Clone, Default)]
pub struct PhaseGraph {
    nodes: Vec<PhaseNode>,
    domains: IndexMap<String, Domain>,
}

impl PhaseGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ── assembly ────────────────────────────────────────────

    pub fn add_node(&mut self, name: impl Into<String>, kind: PhaseKind) -> PhaseId {
        let id = PhaseId(self.nodes.len());
        self.nodes.push(PhaseNode::new(id, name.into(), kind));
        id
    }

    /// Add an edge: `to` may only be scheduled once `from` is done.
    pub fn add_successor(&mut self, from: PhaseId, to: PhaseId) -> Result<()> {
        self.check(from)?;
        self.check(to)?;
        if from == to {
            return Err(PhaseError::Cycle(self.nodes[from.0].name.clone()));
        }
        self.link(from, to);
        Ok(())
    }

    /// Chain `ids` with successor edges in the given order.
    pub fn add_chain(&mut self, ids: &[PhaseId]) -> Result<()> {
        for pair in ids.windows(2) {
            self.add_successor(pair[0], pair[1])?;
        }
        Ok(())
    }

    /// Group `nodes` into a new domain. Phase names must be unique within
    /// the domain and a node belongs to at most one domain.
    pub fn add_domain(&mut self, name: impl Into<String>, nodes: &[PhaseId]) -> Result<()> {
        let name = name.into();
        if self.domains.contains_key(&name) {
            return Err(PhaseError::DuplicateDomain(name));
        }
        let mut seen = HashSet::new();
        for &id in nodes {
            self.check(id)?;
            let node = &self.nodes[id.0];
            if let Some(existing) = &node.domain {
                return Err(PhaseError::AlreadyInDomain {
                    domain: existing.clone(),
                    name: node.name.clone(),
                });
            }
            if !seen.insert(node.name.as_str()) {
                return Err(PhaseError::DuplicatePhase {
                    domain: name,
                    name: node.name.clone(),
                });
            }
        }
        for &id in nodes {
            self.nodes[id.0].domain = Some(name.clone());
        }
        self.domains
            .insert(name.clone(), Domain::new(name, nodes.to_vec()));
        Ok(())
    }

    /// Make `node` a rendezvous point with same-named phases of other domains.
    pub fn mark_cross_domain_sync(&mut self, node: PhaseId) -> Result<()> {
        self.check(node)?;
        self.nodes[node.0].cross_domain_sync = true;
        Ok(())
    }

    // ── lookup ──────────────────────────────────────────────

    fn check(&self, id: PhaseId) -> Result<()> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(PhaseError::UnknownPhase(id))
        }
    }

    pub fn node(&self, id: PhaseId) -> Result<&PhaseNode> {
        self.nodes.get(id.0).ok_or(PhaseError::UnknownPhase(id))
    }

    pub fn nodes(&self) -> &[PhaseNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn domain(&self, name: &str) -> Option<&Domain> {
        self.domains.get(name)
    }

    pub fn domains(&self) -> impl Iterator<Item = &Domain> {
        self.domains.values()
    }

    /// Find a phase by name within a domain.
    pub fn find(&self, domain: &str, name: &str) -> Option<PhaseId> {
        self.domains
            .get(domain)?
            .nodes
            .iter()
            .copied()
            .find(|id| self.nodes[id.0].name == name)
    }

    /// Whether `to` can be reached from `from` along successor edges.
    /// Every node reaches itself.
    pub fn reaches(&self, from: PhaseId, to: PhaseId) -> bool {
        if from == to {
            return true;
        }
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(id) = queue.pop_front() {
            let Some(node) = self.nodes.get(id.0) else {
                continue;
            };
            for &next in &node.successors {
                if next == to {
                    return true;
                }
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        false
    }

    /// Nodes lying on some path from `from` to `to`, both inclusive.
    pub fn between(&self, from: PhaseId, to: PhaseId) -> Vec<PhaseId> {
        self.nodes
            .iter()
            .map(|n| n.id)
            .filter(|&id| self.reaches(from, id) && self.reaches(id, to))
            .collect()
    }

    /// Same-named cross-sync phases in other domains.
    pub fn sync_partners(&self, id: PhaseId) -> Vec<PhaseId> {
        let Some(node) = self.nodes.get(id.0) else {
            return Vec::new();
        };
        if !node.cross_domain_sync {
            return Vec::new();
        }
        self.nodes
            .iter()
            .filter(|n| {
                n.id != id && n.cross_domain_sync && n.name == node.name && n.domain != node.domain
            })
            .map(|n| n.id)
            .collect()
    }

    // ── validation ──────────────────────────────────────────

    /// Topological order of all nodes (predecessors first).
    pub fn topological_order(&self) -> Result<Vec<PhaseId>> {
        let mut in_degree: HashMap<PhaseId, usize> = self
            .nodes
            .iter()
            .map(|n| (n.id, n.predecessors.len()))
            .collect();

        let mut queue: VecDeque<PhaseId> = self
            .nodes
            .iter()
            .filter(|n| n.predecessors.is_empty())
            .map(|n| n.id)
            .collect();

        let mut sorted = Vec::with_capacity(self.nodes.len());
        while let Some(id) = queue.pop_front() {
            sorted.push(id);
            for &next in &self.nodes[id.0].successors {
                if let Some(deg) = in_degree.get_mut(&next) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(next);
                    }
                }
            }
        }

        if sorted.len() != self.nodes.len() {
            let mut in_cycle: Vec<String> = in_degree
                .iter()
                .filter(|(_, &deg)| deg > 0)
                .map(|(id, _)| self.nodes[id.0].full_name())
                .collect();
            in_cycle.sort();
            return Err(PhaseError::Cycle(in_cycle.join(", ")));
        }
        Ok(sorted)
    }

    /// Check the graph is acyclic and every node belongs to a domain.
    pub fn validate(&self) -> Result<()> {
        if let Some(node) = self.nodes.iter().find(|n| n.domain.is_none()) {
            return Err(PhaseError::Unassigned(node.name.clone()));
        }
        self.topological_order()?;
        Ok(())
    }

    // ── standard schedules ──────────────────────────────────

    /// The common domain: a schedule node, the common phases in order, and
    /// a terminal node.
    pub fn standard() -> Self {
        let mut phases = vec![(COMMON_DOMAIN.to_string(), PhaseKind::Schedule)];
        phases.extend(COMMON_PHASES.iter().map(|&(name, kind)| (name.to_string(), kind)));
        phases.push((format!("{COMMON_DOMAIN}_end"), PhaseKind::Terminal));

        let mut graph = Self::new();
        graph.push_chain(COMMON_DOMAIN, &phases);
        graph
    }

    /// Add a domain running the runtime sub-phases in parallel with the
    /// common `run` phase. Each runtime phase rendezvouses with the
    /// same-named phase of every other runtime domain.
    ///
    /// The graph is left untouched when this fails.
    pub fn add_runtime_domain(&mut self, name: &str) -> Result<Vec<PhaseId>> {
        if self.domains.contains_key(name) {
            return Err(PhaseError::DuplicateDomain(name.to_string()));
        }
        let start_of_sim = self
            .find(COMMON_DOMAIN, "start_of_simulation")
            .ok_or_else(|| PhaseError::UnknownDomain(COMMON_DOMAIN.into()))?;
        let extract = self
            .find(COMMON_DOMAIN, "extract")
            .ok_or_else(|| PhaseError::UnknownDomain(COMMON_DOMAIN.into()))?;

        let mut phases = vec![("schedule".to_string(), PhaseKind::Schedule)];
        phases.extend(RUNTIME_PHASES.iter().map(|&p| (p.to_string(), PhaseKind::Task)));
        phases.push(("schedule_end".to_string(), PhaseKind::Terminal));

        let ids = self.push_chain(name, &phases);
        for &id in &ids[1..ids.len() - 1] {
            self.nodes[id.0].cross_domain_sync = true;
        }
        self.link(start_of_sim, ids[0]);
        self.link(ids[ids.len() - 1], extract);
        Ok(ids)
    }

    /// Append `phases` as a new chained domain. The caller guarantees the
    /// domain name is free and the phase names are distinct.
    fn push_chain(&mut self, domain: &str, phases: &[(String, PhaseKind)]) -> Vec<PhaseId> {
        let ids: Vec<PhaseId> = phases
            .iter()
            .map(|(name, kind)| self.add_node(name.clone(), *kind))
            .collect();
        for pair in ids.windows(2) {
            self.link(pair[0], pair[1]);
        }
        for &id in &ids {
            self.nodes[id.0].domain = Some(domain.to_string());
        }
        self.domains
            .insert(domain.to_string(), Domain::new(domain, ids.clone()));
        ids
    }

    fn link(&mut self, from: PhaseId, to: PhaseId) {
        self.nodes[from.0].successors.insert(to);
        self.nodes[to.0].predecessors.insert(from);
    }
}
