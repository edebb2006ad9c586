//! Cross-domain rendezvous.

use tempo_core::verbosity;

use super::core::Shared;
use crate::phase::{PhaseId, PhaseState};

/// Block until every active same-named partner of `id` in another domain
/// has all of its predecessors at least ENDED.
pub(crate) async fn wait_for_partners(shared: &Shared, id: PhaseId) {
    let partners: Vec<PhaseId> = shared
        .graph
        .sync_partners(id)
        .into_iter()
        .filter(|&p| shared.is_active(p))
        .collect();
    if partners.is_empty() {
        return;
    }

    let mut changes = shared.subscribe();
    let mut announced = false;
    loop {
        if partners
            .iter()
            .all(|&p| shared.preds_reached(p, PhaseState::Ended))
        {
            return;
        }
        if !announced {
            announced = true;
            shared.ctx.reports().info(
                "PH_SYNC",
                &format!(
                    "phase '{}' waiting on {} other domain(s)",
                    shared.node(id).full_name(),
                    partners.len()
                ),
                verbosity::HIGH,
            );
        }
        if changes.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
