use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::Value;
use tempo_core::{EngineConfig, Env, ReportServer, TimeSource};
use tempo_sync::{Event, Pool, ResourceGate};

struct Inner {
    env: Env,
    config: EngineConfig,
    events: Pool<Event<Value>>,
    gates: Pool<ResourceGate>,
}

/// Everything a run shares: configuration, time source, report server and
/// the global event and gate pools. Cheap to clone.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

static GLOBAL_CONTEXT: OnceLock<Context> = OnceLock::new();

impl Context {
    pub fn new(config: EngineConfig, env: Env) -> Self {
        env.reports().set_verbosity(config.verbosity);

        let event_env = env.clone();
        let events = Pool::new("global_events", move |name: &str| {
            Event::with_env(name, event_env.clone())
        });

        let gate_env = env.clone();
        let capacity = config.default_gate_capacity;
        let gates = Pool::new("global_gates", move |name: &str| {
            ResourceGate::with_env(name, capacity, gate_env.clone())
        });

        Self {
            inner: Arc::new(Inner {
                env,
                config,
                events,
                gates,
            }),
        }
    }

    /// Process-wide default built from `EngineConfig::default()` and the
    /// global [`Env`] on first use.
    pub fn global() -> &'static Context {
        GLOBAL_CONTEXT.get_or_init(|| Context::new(EngineConfig::default(), Env::global().clone()))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn env(&self) -> &Env {
        &self.inner.env
    }

    pub fn reports(&self) -> &Arc<ReportServer> {
        self.inner.env.reports()
    }

    pub fn time(&self) -> &Arc<dyn TimeSource> {
        self.inner.env.time()
    }

    /// Events shared by name across the whole run.
    pub fn events(&self) -> &Pool<Event<Value>> {
        &self.inner.events
    }

    /// Resource gates shared by name across the whole run.
    pub fn gates(&self) -> &Pool<ResourceGate> {
        &self.inner.gates
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.inner.config)
            .field("events", &self.inner.events)
            .field("gates", &self.inner.gates)
            .finish()
    }
}
