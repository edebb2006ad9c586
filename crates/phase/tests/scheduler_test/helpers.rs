use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use tempo_core::{verbosity, EngineConfig, Env, RecordingSink, ReportServer, TokioTime};
use tempo_phase::{
    ActionError, Component, ComponentTree, Context, PhaseGraph, PhaseHandle, PhaseKind, Scheduler,
    COMMON_DOMAIN,
};

/// Shared, ordered record of what the components saw.
#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Entries starting with `prefix`, with the prefix stripped.
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| e.strip_prefix(prefix).map(str::to_string))
            .collect()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

/// Context with a recording sink and its own report server.
pub fn fixture(config: EngineConfig) -> (Context, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let reports = Arc::new(ReportServer::new(sink.clone(), verbosity::MEDIUM));
    let env = Env::new(Arc::new(TokioTime::new()), reports);
    (Context::new(config, env), sink)
}

/// Common domain holding build (top-down) → run (task) → report (bottom-up).
pub fn three_phase_graph() -> PhaseGraph {
    let mut graph = PhaseGraph::new();
    let build = graph.add_node("build", PhaseKind::TopDown);
    let run = graph.add_node("run", PhaseKind::Task);
    let report = graph.add_node("report", PhaseKind::BottomUp);
    graph.add_chain(&[build, run, report]).unwrap();
    graph.add_domain(COMMON_DOMAIN, &[build, run, report]).unwrap();
    graph
}

pub fn scheduler(graph: PhaseGraph, tree: Arc<ComponentTree>, ctx: Context) -> Scheduler {
    Scheduler::new(graph, tree, ctx).unwrap()
}

/// Logs `<phase>:<name>` for every action and, with hooks on, the
/// started / ready-to-end / ended notifications too.
pub struct Probe {
    name: String,
    log: Log,
    hooks: bool,
}

impl Probe {
    pub fn new(name: &str, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log: log.clone(),
            hooks: false,
        })
    }

    pub fn with_hooks(name: &str, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log: log.clone(),
            hooks: true,
        })
    }
}

#[async_trait]
impl Component for Probe {
    async fn execute(&self, phase: &PhaseHandle) -> Result<(), ActionError> {
        self.log.push(format!("{}:{}", phase.name(), self.name));
        Ok(())
    }

    fn phase_started(&self, phase: &PhaseHandle) {
        if self.hooks {
            self.log.push(format!("started:{}:{}", phase.name(), self.name));
        }
    }

    fn phase_ready_to_end(&self, phase: &PhaseHandle) {
        if self.hooks {
            self.log.push(format!("rte:{}:{}", phase.name(), self.name));
        }
    }

    fn phase_ended(&self, phase: &PhaseHandle) {
        if self.hooks {
            self.log.push(format!("ended:{}:{}", phase.name(), self.name));
        }
    }
}

/// root → A, B; A → A1, every node a probe.
pub fn probe_tree(log: &Log, hooks: bool) -> Arc<ComponentTree> {
    let make = |name: &str| -> Arc<dyn Component> {
        if hooks {
            Probe::with_hooks(name, log)
        } else {
            Probe::new(name, log)
        }
    };
    let tree = Arc::new(ComponentTree::new("root", make("root")));
    let a = tree.add_child(tree.root(), "A", make("A")).unwrap();
    tree.add_child(tree.root(), "B", make("B")).unwrap();
    tree.add_child(a, "A1", make("A1")).unwrap();
    tree
}
