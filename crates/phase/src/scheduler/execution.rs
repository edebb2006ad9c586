//! Drives one phase node through its state machine.

use std::sync::Arc;

use tempo_core::Advance;
use tracing::{debug, error};

use super::core::Shared;
use super::sync;
use crate::error::PhaseError;
use crate::phase::{PhaseId, PhaseState};
use crate::traverse::{Flow, Traversal};

/// How a node execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Done,
    Jumped(PhaseId),
    Aborted,
}

pub(crate) async fn run_node(shared: Arc<Shared>, id: PhaseId) -> Outcome {
    let slot = shared.slot(id);
    slot.rearm();
    let mut interrupt = slot.interrupt.subscribe();
    let node = shared.node(id);

    shared.set_state(id, PhaseState::Syncing);
    if node.cross_domain_sync {
        tokio::select! {
            biased;
            _ = shared.ctx.reports().wait_fatal() => return abort(&shared, id, None),
            _ = sync::wait_for_partners(&shared, id) => {}
        }
    }
    if shared.ctx.reports().fatal_raised() {
        return abort(&shared, id, None);
    }
    shared.count_execution(id);
    debug!(phase = %node.full_name(), kind = ?node.kind, "phase starting");

    if !node.kind.visits_components() {
        for state in [
            PhaseState::Started,
            PhaseState::Executing,
            PhaseState::ReadyToEnd,
            PhaseState::Ended,
            PhaseState::Cleanup,
            PhaseState::Done,
        ] {
            shared.set_state(id, state);
        }
        return Outcome::Done;
    }

    let mut traversal = Traversal::new(Arc::clone(&shared), id);
    shared.set_state(id, PhaseState::Started);
    traversal.start();

    shared.set_state(id, PhaseState::Executing);
    match traversal.execute(&mut interrupt).await {
        Flow::Aborted => return abort(&shared, id, Some(&traversal)),
        // aborted tasks can no longer drop their objections
        Flow::Interrupted => slot.objection.reset(),
        Flow::Completed => {}
    }
    if let Some(target) = slot.take_jump() {
        return jump_out(&shared, id, target, &traversal);
    }

    shared.set_state(id, PhaseState::ReadyToEnd);
    let max_rounds = shared.ctx.config().max_ready_to_end_iterations;
    let mut rounds = 0;
    let mut listening = true;
    loop {
        tokio::select! {
            biased;
            _ = shared.ctx.reports().wait_fatal() => return abort(&shared, id, Some(&traversal)),
            res = interrupt.changed(), if listening => {
                if res.is_ok() {
                    slot.objection.reset();
                    debug!(phase = %node.full_name(), "ready-to-end interrupted");
                    break;
                }
                listening = false;
                continue;
            }
            _ = slot.objection.wait_clear() => {}
        }
        if slot.pending_jump().is_some() {
            break;
        }
        traversal.ready_to_end();
        shared.ctx.time().advance(Advance::Delta).await;
        if slot.objection.count() == 0 || slot.pending_jump().is_some() {
            break;
        }
        if rounds >= max_rounds {
            let err = PhaseError::ObjectionOverflow {
                phase: node.full_name(),
                iterations: max_rounds,
            };
            error!(phase = %node.full_name(), "{err}");
            shared.ctx.reports().fatal("PH_READY_TO_END", &err.to_string());
            return abort(&shared, id, Some(&traversal));
        }
        rounds += 1;
        debug!(phase = %node.full_name(), rounds, "ready-to-end extended by objection");
    }
    if let Some(target) = slot.take_jump() {
        return jump_out(&shared, id, target, &traversal);
    }

    shared.set_state(id, PhaseState::Ended);
    traversal.end();
    shared.set_state(id, PhaseState::Cleanup);
    shared.set_state(id, PhaseState::Done);
    debug!(phase = %node.full_name(), "phase done");
    Outcome::Done
}

/// Leave the node through JUMPING. Components still get their ENDED
/// notification; the scheduler applies the jump itself.
fn jump_out(shared: &Shared, id: PhaseId, target: PhaseId, traversal: &Traversal) -> Outcome {
    shared.set_state(id, PhaseState::Jumping);
    traversal.end();
    Outcome::Jumped(target)
}

/// Wind the node down after a FATAL report.
fn abort(shared: &Shared, id: PhaseId, traversal: Option<&Traversal>) -> Outcome {
    debug!(phase = %shared.node(id).full_name(), "phase aborted");
    if let Some(traversal) = traversal {
        shared.set_state(id, PhaseState::Ended);
        traversal.end();
    }
    shared.set_state(id, PhaseState::Cleanup);
    Outcome::Aborted
}
