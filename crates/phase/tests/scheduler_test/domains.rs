use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use tempo_core::{EngineConfig, SimTime};
use tempo_phase::{
    ActionError, Component, ComponentTree, PhaseError, PhaseGraph, PhaseHandle, PhaseState,
    COMMON_DOMAIN, COMMON_PHASES,
};

use crate::helpers::{fixture, scheduler, Log, Probe};

/// Records `<domain>::<phase>` with the logical start time of each action,
/// sleeping in `main` for `main_time`.
struct Timed {
    main_time: Duration,
    seen: Mutex<Vec<(String, SimTime)>>,
}

impl Timed {
    fn new(main_time: Duration) -> Arc<Self> {
        Arc::new(Self {
            main_time,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn started(&self, phase: &str) -> Option<SimTime> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| name == phase)
            .map(|(_, t)| *t)
    }
}

#[async_trait]
impl Component for Timed {
    async fn execute(&self, phase: &PhaseHandle) -> Result<(), ActionError> {
        let now = phase.context().env().now();
        self.seen.lock().unwrap().push((phase.full_name(), now));
        if phase.name() == "main" {
            phase.sleep(self.main_time).await;
        }
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn runtime_domains_meet_at_each_runtime_phase() {
    let (ctx, _) = fixture(EngineConfig::default());
    let mut graph = PhaseGraph::standard();
    graph.add_runtime_domain("tb1").unwrap();
    graph.add_runtime_domain("tb2").unwrap();

    let slow = Timed::new(Duration::from_millis(10));
    let fast = Timed::new(Duration::ZERO);
    let log = Log::new();
    let tree = Arc::new(ComponentTree::new("top", Probe::new("top", &log)));
    let s = tree.add_child(tree.root(), "slow", slow.clone()).unwrap();
    let f = tree.add_child(tree.root(), "fast", fast.clone()).unwrap();
    tree.set_domain(s, "tb1", true).unwrap();
    tree.set_domain(f, "tb2", true).unwrap();

    let sched = scheduler(graph, tree, ctx);
    let summary = sched.run(&["tb1", "tb2"]).await.unwrap();
    assert!(!summary.aborted);

    // both mains start together; the fast domain waits for the slow one
    // before shutting down
    let ten_ms = SimTime::from_duration(Duration::from_millis(10));
    assert_eq!(slow.started("tb1::main"), Some(SimTime::ZERO));
    assert_eq!(fast.started("tb2::main"), Some(SimTime::ZERO));
    assert_eq!(fast.started("tb2::shutdown"), Some(ten_ms));
    assert_eq!(slow.started("tb1::shutdown"), Some(ten_ms));

    // runtime phases only visit their own domain's components
    assert!(fast.started("tb1::main").is_none());
    assert!(slow.started("tb2::main").is_none());

    // common phases visit everyone; extract waits for both runtime domains
    assert!(slow.started("common::run").is_some());
    assert_eq!(fast.started("common::extract"), Some(ten_ms));
    assert_eq!(log.with_prefix("extract:"), ["top"]);

    for (name, state) in sched.states() {
        assert_eq!(state, PhaseState::Done, "{name}");
    }
    for (phase, _) in COMMON_PHASES {
        assert_eq!(summary.executions_of(&format!("common::{phase}")), 1);
    }
    assert_eq!(summary.executions_of("tb2::main"), 1);
}

#[tokio::test(start_paused = true)]
async fn inactive_domains_are_left_alone() {
    let (ctx, _) = fixture(EngineConfig::default());
    let mut graph = PhaseGraph::standard();
    graph.add_runtime_domain("tb").unwrap();

    let log = Log::new();
    let tree = Arc::new(ComponentTree::new("top", Probe::new("top", &log)));
    let sched = scheduler(graph, tree, ctx);

    let summary = sched.run(&[]).await.unwrap();
    assert!(!summary.aborted);
    assert_eq!(log.with_prefix("final:"), ["top"]);
    assert!(!summary.executions.contains_key("tb::main"));
    assert_eq!(sched.state_of("tb", "main").unwrap(), PhaseState::Dormant);
    assert_eq!(sched.state_of(COMMON_DOMAIN, "common_end").unwrap(), PhaseState::Done);
}

#[tokio::test(start_paused = true)]
async fn unknown_domain_is_rejected() {
    let (ctx, _) = fixture(EngineConfig::default());
    let log = Log::new();
    let tree = Arc::new(ComponentTree::new("top", Probe::new("top", &log)));
    let sched = scheduler(PhaseGraph::standard(), tree, ctx);

    let err = sched.run(&["missing"]).await.unwrap_err();
    assert!(matches!(err, PhaseError::UnknownDomain(ref d) if d == "missing"));
    assert!(log.entries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn run_all_includes_every_domain() {
    let (ctx, _) = fixture(EngineConfig::default());
    let mut graph = PhaseGraph::standard();
    graph.add_runtime_domain("tb").unwrap();
    let log = Log::new();
    let tree = Arc::new(ComponentTree::new("top", Probe::new("top", &log)));
    tree.set_domain(tree.root(), "tb", false).unwrap();

    let summary = scheduler(graph, tree, ctx).run_all().await.unwrap();
    assert_eq!(summary.executions_of("tb::main"), 1);
    assert_eq!(log.with_prefix("main:"), ["top"]);
    assert_eq!(log.with_prefix("build:"), ["top"]);
}

/// Jumps from `main` back to `reset` the first time it runs `main`.
struct Rewinder {
    jumped: AtomicBool,
}

#[async_trait]
impl Component for Rewinder {
    async fn execute(&self, phase: &PhaseHandle) -> Result<(), ActionError> {
        if phase.name() == "main" && !self.jumped.swap(true, Ordering::SeqCst) {
            phase.jump("reset")?;
        }
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn backward_jump_leaves_other_domains_alone() {
    let (ctx, sink) = fixture(EngineConfig::default());
    let mut graph = PhaseGraph::standard();
    graph.add_runtime_domain("tb1").unwrap();
    graph.add_runtime_domain("tb2").unwrap();

    let log = Log::new();
    let tree = Arc::new(ComponentTree::new("top", Probe::new("top", &log)));
    let rewinder = tree
        .add_child(
            tree.root(),
            "rewinder",
            Arc::new(Rewinder {
                jumped: AtomicBool::new(false),
            }),
        )
        .unwrap();
    let other = Timed::new(Duration::from_millis(10));
    let o = tree.add_child(tree.root(), "other", other.clone()).unwrap();
    tree.set_domain(rewinder, "tb1", true).unwrap();
    tree.set_domain(o, "tb2", true).unwrap();

    let sched = scheduler(graph, tree, ctx);
    let summary = sched.run(&["tb1", "tb2"]).await.unwrap();

    assert!(sink.contains_id("PH_JMPXDOM"));
    assert!(!summary.aborted);
    assert_eq!(summary.jumps, 1);

    for phase in ["reset", "configure", "main"] {
        assert_eq!(summary.executions_of(&format!("tb1::{phase}")), 2, "{phase}");
        assert_eq!(summary.executions_of(&format!("tb2::{phase}")), 1, "{phase}");
    }
    assert_eq!(other.started("tb2::reset"), Some(SimTime::ZERO));
    assert_eq!(
        other.started("tb2::shutdown"),
        Some(SimTime::from_duration(Duration::from_millis(10)))
    );
    for (name, state) in sched.states() {
        assert_eq!(state, PhaseState::Done, "{name}");
    }
}
