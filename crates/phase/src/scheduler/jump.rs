//! Jump requests and their application to the node table.

use std::sync::PoisonError;

use tempo_core::verbosity;
use tracing::info;

use super::core::Shared;
use crate::error::{PhaseError, Result};
use crate::phase::{PhaseId, PhaseState};

/// Validate and record a jump from `from` to `to`. Unreachable targets are
/// reported and nothing is recorded.
pub(crate) fn request(shared: &Shared, from: PhaseId, to: PhaseId) -> Result<()> {
    let graph = &shared.graph;
    if !graph.reaches(to, from) && !graph.reaches(from, to) {
        let (from_name, to_name) = (shared.node(from).full_name(), shared.node(to).full_name());
        shared.ctx.reports().error(
            "PH_BADJUMP",
            &format!("phase '{from_name}' cannot jump to '{to_name}': not on a common path"),
        );
        return Err(PhaseError::UnreachableJump {
            from: from_name,
            to: to_name,
        });
    }

    let slot = shared.slot(from);
    *slot.jump.lock().unwrap_or_else(PoisonError::into_inner) = Some(to);
    slot.interrupt();
    shared.ctx.reports().info(
        "PH_JUMP",
        &format!(
            "phase '{}' is jumping to '{}'",
            shared.node(from).full_name(),
            shared.node(to).full_name()
        ),
        verbosity::LOW,
    );
    Ok(())
}

/// Move scheduling progress from `from` to `to`.
///
/// Backward: every node of the domain on a path from `to` to `from` goes
/// back to DORMANT. Forward: every node of the domain on a path from
/// `from` up to (not including) `to` is marked DONE without running.
pub(crate) fn apply(shared: &Shared, from: PhaseId, to: PhaseId) {
    let graph = &shared.graph;
    let domain = shared.node(from).domain.clone();
    let backward = graph.reaches(to, from);

    let (range, state) = if backward {
        (graph.between(to, from), PhaseState::Dormant)
    } else {
        let mut range = graph.between(from, to);
        range.retain(|&id| id != to);
        (range, PhaseState::Done)
    };

    let mut in_domain = Vec::with_capacity(range.len());
    for id in range {
        if shared.node(id).domain != domain {
            continue;
        }
        if backward {
            for partner in graph.sync_partners(id) {
                if shared.is_active(partner) && shared.state(partner) != PhaseState::Done {
                    shared.ctx.reports().error(
                        "PH_JMPXDOM",
                        &format!(
                            "jump to '{}' resets '{}' while '{}' has not finished; other domains are left as they are",
                            shared.node(to).full_name(),
                            shared.node(id).full_name(),
                            shared.node(partner).full_name()
                        ),
                    );
                }
            }
        }
        in_domain.push(id);
    }

    if backward && in_domain.iter().any(|&id| shared.node(id).name == "build") {
        shared.tree.clear_build_done();
    }

    shared.set_states(&in_domain, state);
    shared.lock().jumps += 1;
    info!(
        from = %shared.node(from).full_name(),
        to = %shared.node(to).full_name(),
        backward,
        reset = in_domain.len(),
        "jump applied"
    );
}
