//! Triggerable event with an on/off latch, payload, and callbacks.
//!
//! Two wait styles coexist and are deliberately different:
//! - [`Event::wait_trigger`] is a pulse: only a trigger that happens after
//!   the waiter registered releases it. A trigger that already happened is
//!   missed.
//! - [`Event::wait_ptrigger`] treats a trigger as persistent for the rest of
//!   the logical instant it happened in, so a waiter arriving later in the
//!   same instant returns immediately.
//!
//! [`Event::wait_on`] / [`Event::wait_off`] wait on the latch level instead.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tempo_core::{Env, SimTime};
use tokio::sync::watch;
use tracing::debug;

/// Hooks run around [`Event::trigger`].
pub trait EventCallback<T>: Send + Sync {
    /// Called before the trigger takes effect. Returning `true` vetoes it:
    /// no waiter is released and the latch, payload and time are untouched.
    fn pre_trigger(&self, _event: &Event<T>, _data: Option<&T>) -> bool {
        false
    }

    /// Called after waiters were released and the latch was set.
    fn post_trigger(&self, _event: &Event<T>, _data: Option<&T>) {}
}

struct EventState<T> {
    on: bool,
    trigger_time: SimTime,
    trigger_data: Option<T>,
    num_waiters: usize,
    callbacks: Vec<Arc<dyn EventCallback<T>>>,
}

pub struct Event<T = Value> {
    name: String,
    env: Env,
    state: Mutex<EventState<T>>,
    /// Bumped once per trigger (and per waking reset).
    pulse: watch::Sender<u64>,
    level: watch::Sender<bool>,
}

impl<T> Event<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_env(name, Env::global().clone())
    }

    pub fn with_env(name: impl Into<String>, env: Env) -> Self {
        let (pulse, _) = watch::channel(0);
        let (level, _) = watch::channel(false);
        Self {
            name: name.into(),
            env,
            state: Mutex::new(EventState {
                on: false,
                trigger_time: SimTime::ZERO,
                trigger_data: None,
                num_waiters: 0,
                callbacks: Vec::new(),
            }),
            pulse,
            level,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, EventState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── triggering ──────────────────────────────────────────

    /// Trigger the event, releasing every current waiter.
    ///
    /// Returns `false` when a callback vetoed the trigger.
    pub fn trigger(&self, data: Option<T>) -> bool {
        let callbacks = self.lock().callbacks.clone();

        let mut vetoed = false;
        for cb in &callbacks {
            vetoed |= cb.pre_trigger(self, data.as_ref());
        }
        if vetoed {
            debug!(event = %self.name, "trigger vetoed by callback");
            return false;
        }

        let now = self.env.now();
        {
            let mut st = self.lock();
            st.on = true;
            st.trigger_time = now;
            st.trigger_data = data.clone();
        }
        self.pulse.send_modify(|n| *n = n.wrapping_add(1));
        self.level.send_replace(true);

        for cb in &callbacks {
            cb.post_trigger(self, data.as_ref());
        }
        self.lock().num_waiters = 0;
        debug!(event = %self.name, time = %now, "event triggered");
        true
    }

    /// Turn the event off. With `wakeup`, pending trigger waiters are released
    /// first. No callbacks run.
    pub fn reset(&self, wakeup: bool) {
        if wakeup {
            self.pulse.send_modify(|n| *n = n.wrapping_add(1));
        }
        {
            let mut st = self.lock();
            st.on = false;
            st.num_waiters = 0;
            st.trigger_time = SimTime::ZERO;
        }
        self.level.send_replace(false);
    }

    // ── waiting ─────────────────────────────────────────────

    /// Wait for the next trigger after this call.
    pub async fn wait_trigger(&self) {
        let mut rx = self.pulse.subscribe();
        self.lock().num_waiters += 1;
        // The sender lives as long as `self`.
        let _ = rx.changed().await;
    }

    /// Wait for a trigger, returning at once if one already happened at the
    /// current logical instant.
    pub async fn wait_ptrigger(&self) {
        let mut rx = self.pulse.subscribe();
        {
            let mut st = self.lock();
            if st.on && st.trigger_time == self.env.now() {
                return;
            }
            st.num_waiters += 1;
        }
        let _ = rx.changed().await;
    }

    pub async fn wait_trigger_data(&self) -> Option<T> {
        self.wait_trigger().await;
        self.get_trigger_data()
    }

    pub async fn wait_ptrigger_data(&self) -> Option<T> {
        self.wait_ptrigger().await;
        self.get_trigger_data()
    }

    /// Wait until the event is on. With `delta`, an already-on event still
    /// costs one scheduling step so earlier waiters resume first.
    pub async fn wait_on(&self, delta: bool) {
        let mut rx = self.level.subscribe();
        if self.is_on() {
            if delta {
                self.env.time().advance(tempo_core::Advance::Delta).await;
            }
            return;
        }
        self.lock().num_waiters += 1;
        let _ = rx.wait_for(|on| *on).await;
    }

    /// Wait until the event is off (reset). Returns at once if it is off.
    pub async fn wait_off(&self, delta: bool) {
        let mut rx = self.level.subscribe();
        if self.is_off() {
            if delta {
                self.env.time().advance(tempo_core::Advance::Delta).await;
            }
            return;
        }
        self.lock().num_waiters += 1;
        let _ = rx.wait_for(|on| !*on).await;
    }

    // ── state ───────────────────────────────────────────────

    pub fn is_on(&self) -> bool {
        self.lock().on
    }

    pub fn is_off(&self) -> bool {
        !self.is_on()
    }

    /// Time of the last trigger; zero if never triggered or reset since.
    pub fn get_trigger_time(&self) -> SimTime {
        self.lock().trigger_time
    }

    pub fn get_trigger_data(&self) -> Option<T> {
        self.lock().trigger_data.clone()
    }

    pub fn num_waiters(&self) -> usize {
        self.lock().num_waiters
    }

    /// Decrement the waiter count for a waiter that gave up.
    pub fn cancel(&self) {
        let mut st = self.lock();
        st.num_waiters = st.num_waiters.saturating_sub(1);
    }

    // ── callbacks ───────────────────────────────────────────

    /// Register a callback at the back (`append`) or front of the list.
    pub fn add_callback(&self, cb: Arc<dyn EventCallback<T>>, append: bool) {
        let mut st = self.lock();
        if st.callbacks.iter().any(|c| Arc::ptr_eq(c, &cb)) {
            drop(st);
            self.env.reports().warning(
                "CBRGED",
                &format!("add_callback: callback already registered on '{}'. Ignoring.", self.name),
            );
            return;
        }
        if append {
            st.callbacks.push(cb);
        } else {
            st.callbacks.insert(0, cb);
        }
    }

    pub fn delete_callback(&self, cb: &Arc<dyn EventCallback<T>>) {
        let mut st = self.lock();
        match st.callbacks.iter().position(|c| Arc::ptr_eq(c, cb)) {
            Some(idx) => {
                st.callbacks.remove(idx);
            }
            None => {
                drop(st);
                self.env.reports().warning(
                    "CBNTFD",
                    &format!("delete_callback: callback not found on '{}'. Ignoring.", self.name),
                );
            }
        }
    }

    pub fn num_callbacks(&self) -> usize {
        self.lock().callbacks.len()
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("on", &st.on)
            .field("trigger_time", &st.trigger_time)
            .field("num_waiters", &st.num_waiters)
            .field("callbacks", &st.callbacks.len())
            .finish()
    }
}
