//! Counting resource gate.
//!
//! `get(n)` deducts all `n` units in one step or none at all; a waiter
//! never holds a partial deduction while it is suspended.

use std::fmt;

use tempo_core::Env;
use tokio::sync::watch;
use tracing::debug;

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GateState {
    available: usize,
    /// Set while a single holder owns the whole capacity.
    exclusive: bool,
}

pub struct ResourceGate {
    name: String,
    capacity: usize,
    env: Env,
    state: watch::Sender<GateState>,
}

impl ResourceGate {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self::with_env(name, capacity, Env::global().clone())
    }

    pub fn with_env(name: impl Into<String>, capacity: usize, env: Env) -> Self {
        let (state, _) = watch::channel(GateState {
            available: capacity,
            exclusive: false,
        });
        Self {
            name: name.into(),
            capacity,
            env,
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.state.borrow().available
    }

    pub fn is_exclusively_locked(&self) -> bool {
        self.state.borrow().exclusive
    }

    fn check_capacity(&self, n: usize) -> Result<(), SyncError> {
        if n > self.capacity {
            let err = SyncError::CapacityExceeded {
                gate: self.name.clone(),
                requested: n,
                capacity: self.capacity,
            };
            self.env.reports().error("GATE/CAPACITY", &err.to_string());
            return Err(err);
        }
        Ok(())
    }

    fn try_deduct(&self, n: usize) -> bool {
        let capacity = self.capacity;
        self.state.send_if_modified(|st| {
            if st.available >= n {
                st.available -= n;
                st.exclusive = n == capacity && n > 0;
                true
            } else {
                false
            }
        })
    }

    /// Block until `n` units are free, then take them.
    pub async fn get(&self, n: usize) -> Result<(), SyncError> {
        self.check_capacity(n)?;
        let mut rx = self.state.subscribe();
        loop {
            if self.try_deduct(n) {
                debug!(gate = %self.name, units = n, "gate acquired");
                return Ok(());
            }
            if rx.wait_for(|st| st.available >= n).await.is_err() {
                return Err(SyncError::Closed(self.name.clone()));
            }
        }
    }

    /// Take `n` units if they are free right now.
    pub fn try_get(&self, n: usize) -> bool {
        if self.check_capacity(n).is_err() {
            return false;
        }
        self.try_deduct(n)
    }

    /// Return `n` units to the gate.
    pub fn put(&self, n: usize) -> Result<(), SyncError> {
        let capacity = self.capacity;
        let mut overfilled = false;
        self.state.send_if_modified(|st| {
            match st.available.checked_add(n) {
                Some(total) if total <= capacity => st.available = total,
                _ => {
                    overfilled = true;
                    return false;
                }
            }
            st.exclusive = false;
            n > 0
        });
        if overfilled {
            let err = SyncError::Overfilled {
                gate: self.name.clone(),
                returned: n,
                capacity,
            };
            self.env.reports().error("GATE/OVERFILL", &err.to_string());
            return Err(err);
        }
        Ok(())
    }
}

impl fmt::Debug for ResourceGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = *self.state.borrow();
        f.debug_struct("ResourceGate")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("available", &st.available)
            .field("exclusive", &st.exclusive)
            .finish()
    }
}
