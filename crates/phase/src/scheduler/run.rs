use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;
use tempo_core::Advance;
use tokio::task::{self, JoinSet};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::execution::{run_node, Outcome};
use super::jump;
use super::metrics::RunSummary;
use super::Scheduler;
use crate::domain::COMMON_DOMAIN;
use crate::error::{PhaseError, Result};
use crate::phase::{PhaseId, PhaseState};

type NodeTasks = JoinSet<(PhaseId, Outcome)>;

impl Scheduler {
    /// Run every domain in the graph.
    pub async fn run_all(&self) -> Result<RunSummary> {
        let names: Vec<String> = self.shared.graph.domains().map(|d| d.name.clone()).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        self.run(&names).await
    }

    /// Run the given domains (the common domain always takes part) until
    /// every active node is done, a FATAL report aborts the run, or the
    /// configured timeout expires.
    ///
    /// Returns `Err` only for bad arguments; aborted runs still produce a
    /// summary with `aborted` set. Report counts and the FATAL latch of the
    /// context are cleared when the run starts.
    pub async fn run(&self, domains: &[&str]) -> Result<RunSummary> {
        let shared = &self.shared;
        let mut active: HashSet<String> = HashSet::new();
        if shared.graph.domain(COMMON_DOMAIN).is_some() {
            active.insert(COMMON_DOMAIN.to_string());
        }
        for &name in domains {
            if shared.graph.domain(name).is_none() {
                return Err(PhaseError::UnknownDomain(name.to_string()));
            }
            active.insert(name.to_string());
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let config = shared.ctx.config();
        let reports = shared.ctx.reports();
        reports.clear();
        shared.reset_run(&active);
        info!(
            run_id = %run_id,
            domains = ?active,
            timeout_secs = config.timeout_secs,
            "phase run starting"
        );

        let mut nodes: NodeTasks = JoinSet::new();
        let mut running: HashSet<PhaseId> = HashSet::new();
        let mut task_ids: HashMap<task::Id, PhaseId> = HashMap::new();

        let time = Arc::clone(shared.ctx.time());
        let mut deadline = time.advance(Advance::By(config.timeout()));
        let mut timed_out = false;

        loop {
            if !reports.fatal_raised() {
                self.schedule_ready(&mut nodes, &mut running, &mut task_ids);
            }
            if nodes.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                joined = nodes.join_next_with_id() => match joined {
                    Some(Ok((tid, (id, outcome)))) => {
                        task_ids.remove(&tid);
                        running.remove(&id);
                        if let Outcome::Jumped(target) = outcome {
                            jump::apply(shared, id, target);
                        }
                    }
                    Some(Err(err)) => {
                        let id = task_ids.remove(&err.id());
                        if let Some(id) = id {
                            running.remove(&id);
                        }
                        let name = id.map(|id| shared.node(id).full_name()).unwrap_or_default();
                        error!(phase = %name, "phase driver failed: {err}");
                        reports.fatal("PH_PANIC", &format!("phase '{name}' failed: {err}"));
                    }
                    None => break,
                },
                _ = &mut deadline, if !timed_out => {
                    timed_out = true;
                    reports.fatal(
                        "PH_TIMEOUT",
                        &format!("run timed out after {} logical seconds", config.timeout_secs),
                    );
                }
            }
        }

        let summary = self.summarize(run_id, started_at, timed_out);
        if !summary.aborted {
            let unfinished: Vec<String> = self
                .states()
                .into_iter()
                .zip(shared.graph.nodes())
                .filter(|((_, state), node)| {
                    shared.is_active(node.id) && *state != PhaseState::Done
                })
                .map(|((name, _), _)| name)
                .collect();
            if !unfinished.is_empty() {
                warn!(phases = ?unfinished, "run ended with unfinished phases");
                reports.warning(
                    "PH_INCOMPLETE",
                    &format!("phases left unfinished: {}", unfinished.join(", ")),
                );
            }
        }
        info!(
            run_id = %run_id,
            end_time = %summary.end_time,
            jumps = summary.jumps,
            aborted = summary.aborted,
            "phase run finished"
        );
        Ok(summary)
    }

    /// Move ready nodes to SCHEDULED and spawn their drivers.
    fn schedule_ready(
        &self,
        nodes: &mut NodeTasks,
        running: &mut HashSet<PhaseId>,
        task_ids: &mut HashMap<task::Id, PhaseId>,
    ) {
        for id in self.shared.ready_nodes(running) {
            self.shared.set_state(id, PhaseState::Scheduled);
            running.insert(id);
            let shared = Arc::clone(&self.shared);
            let abort = nodes.spawn(async move { (id, run_node(shared, id).await) });
            task_ids.insert(abort.id(), id);
        }
    }

    fn summarize(&self, run_id: Uuid, started_at: chrono::DateTime<Utc>, timed_out: bool) -> RunSummary {
        let shared = &self.shared;
        let run = shared.lock();
        let executions: IndexMap<String, u32> = shared
            .graph
            .nodes()
            .iter()
            .filter(|n| run.active[n.id.0])
            .map(|n| (n.full_name(), run.executions[n.id.0]))
            .collect();
        let reports = shared.ctx.reports();
        RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            end_time: shared.ctx.env().now(),
            executions,
            jumps: run.jumps,
            reports: reports.summary(),
            aborted: reports.fatal_raised(),
            timed_out,
            fatal: reports.first_fatal(),
        }
    }
}
