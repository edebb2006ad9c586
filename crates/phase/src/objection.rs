//! Per-phase objection counter.

use std::time::Duration;

use tempo_core::{Advance, Env};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Tally {
    count: u32,
    raised_total: u64,
}

/// Counts open objections against a phase ending.
///
/// `raised_total` only grows until [`reset`](Objection::reset) and lets a
/// task phase distinguish "nobody ever objected" from "every objection was
/// dropped".
pub struct Objection {
    name: String,
    env: Env,
    tally: watch::Sender<Tally>,
}

impl Objection {
    pub fn new(name: impl Into<String>, env: Env) -> Self {
        let (tally, _) = watch::channel(Tally::default());
        Self {
            name: name.into(),
            env,
            tally,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raise(&self, n: u32) {
        self.tally.send_modify(|t| {
            t.count = t.count.saturating_add(n);
            t.raised_total += u64::from(n);
        });
    }

    /// Drop `n` objections. Dropping more than are open is reported and the
    /// count floors at zero.
    pub fn lower(&self, n: u32) {
        let mut underflow = false;
        self.tally.send_modify(|t| {
            underflow = n > t.count;
            t.count = t.count.saturating_sub(n);
        });
        if underflow {
            self.env.reports().error(
                "OBJTN_ZERO",
                &format!("objection count for '{}' dropped below zero", self.name),
            );
        }
    }

    pub fn count(&self) -> u32 {
        self.tally.borrow().count
    }

    pub fn was_raised(&self) -> bool {
        self.tally.borrow().raised_total > 0
    }

    pub fn reset(&self) {
        self.tally.send_replace(Tally::default());
    }

    /// Resolve once no objection is open.
    pub async fn wait_clear(&self) {
        let mut rx = self.tally.subscribe();
        if rx.wait_for(|t| t.count == 0).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Resolve once at least one objection was raised and all of them have
    /// been dropped for `drain` logical time.
    pub async fn wait_all_dropped(&self, drain: Duration) {
        let mut rx = self.tally.subscribe();
        loop {
            if rx
                .wait_for(|t| t.raised_total > 0 && t.count == 0)
                .await
                .is_err()
            {
                std::future::pending::<()>().await;
            }
            if drain.is_zero() {
                return;
            }
            self.env.time().advance(Advance::By(drain)).await;
            if self.count() == 0 {
                return;
            }
        }
    }
}

impl std::fmt::Debug for Objection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = *self.tally.borrow();
        f.debug_struct("Objection")
            .field("name", &self.name)
            .field("count", &t.count)
            .field("raised_total", &t.raised_total)
            .finish()
    }
}
