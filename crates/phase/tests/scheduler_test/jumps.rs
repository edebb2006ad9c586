use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use tempo_core::EngineConfig;
use tempo_phase::{
    ActionError, Component, ComponentTree, PhaseError, PhaseGraph, PhaseHandle, PhaseKind,
    PhaseState, COMMON_DOMAIN,
};

use crate::helpers::{fixture, probe_tree, scheduler, three_phase_graph, Log};

/// Jumps from one phase to another the first time it runs that phase.
struct Jumper {
    log: Log,
    from: &'static str,
    to: &'static str,
    runs: AtomicU32,
    /// State of `run` seen from inside each `build`.
    run_state_in_build: Mutex<Vec<PhaseState>>,
    jump_result: Mutex<Option<Result<(), String>>>,
}

impl Jumper {
    fn new(log: &Log, from: &'static str, to: &'static str) -> Arc<Self> {
        Arc::new(Self {
            log: log.clone(),
            from,
            to,
            runs: AtomicU32::new(0),
            run_state_in_build: Mutex::new(Vec::new()),
            jump_result: Mutex::new(None),
        })
    }
}

#[async_trait]
impl Component for Jumper {
    async fn execute(&self, phase: &PhaseHandle) -> Result<(), ActionError> {
        self.log.push(format!("{}:root", phase.name()));
        if phase.name() == "build" {
            if let Some(state) = phase.state_of("run") {
                self.run_state_in_build.lock().unwrap().push(state);
            }
        }
        if phase.name() == self.from && self.runs.fetch_add(1, Ordering::SeqCst) == 0 {
            let res = phase.jump(self.to).map_err(|e| e.to_string());
            *self.jump_result.lock().unwrap() = Some(res);
        }
        Ok(())
    }
}

fn root_entries(log: &Log) -> Vec<String> {
    log.entries()
        .into_iter()
        .filter(|e| e.ends_with(":root"))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn backward_jump_reruns_the_skipped_range() {
    let (ctx, sink) = fixture(EngineConfig::default());
    let log = Log::new();
    let jumper = Jumper::new(&log, "run", "build");
    let tree = Arc::new(ComponentTree::new("root", jumper.clone()));

    let sched = scheduler(three_phase_graph(), tree, ctx);
    let summary = sched.run(&[]).await.unwrap();

    assert!(!summary.aborted);
    assert_eq!(
        root_entries(&log),
        ["build:root", "run:root", "build:root", "run:root", "report:root"]
    );
    assert_eq!(
        *jumper.run_state_in_build.lock().unwrap(),
        [PhaseState::Dormant, PhaseState::Dormant]
    );
    assert_eq!(*jumper.jump_result.lock().unwrap(), Some(Ok(())));

    assert_eq!(summary.jumps, 1);
    assert_eq!(summary.executions_of("common::build"), 2);
    assert_eq!(summary.executions_of("common::run"), 2);
    assert_eq!(summary.executions_of("common::report"), 1);
    assert!(sink.contains_id("PH_JUMP"));
    for phase in ["build", "run", "report"] {
        assert_eq!(sched.state_of(COMMON_DOMAIN, phase).unwrap(), PhaseState::Done);
    }
}

#[tokio::test(start_paused = true)]
async fn jumping_back_to_build_rebuilds_components() {
    let (ctx, _) = fixture(EngineConfig::default());
    let log = Log::new();
    let tree = probe_tree(&log, false);
    let a = tree.lookup("root.A").unwrap();

    /// Takes over A's `run` to jump once.
    struct JumpOnce(AtomicU32);

    #[async_trait]
    impl tempo_phase::PhaseAction for JumpOnce {
        async fn execute(&self, _c: &dyn Component, phase: &PhaseHandle) -> Result<(), ActionError> {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                phase.jump("build")?;
            }
            Ok(())
        }
    }
    tree.set_override(a, "run", Arc::new(JumpOnce(AtomicU32::new(0))))
        .unwrap();

    let summary = scheduler(three_phase_graph(), tree, ctx).run(&[]).await.unwrap();
    assert!(!summary.aborted);
    assert_eq!(log.with_prefix("build:"), ["root", "A", "A1", "B", "root", "A", "A1", "B"]);
}

#[tokio::test(start_paused = true)]
async fn forward_jump_skips_the_phases_in_between() {
    let (ctx, _) = fixture(EngineConfig::default());
    let log = Log::new();
    let jumper = Jumper::new(&log, "build", "report");
    let tree = Arc::new(ComponentTree::new("root", jumper.clone()));

    let sched = scheduler(three_phase_graph(), tree, ctx);
    let summary = sched.run(&[]).await.unwrap();

    assert_eq!(root_entries(&log), ["build:root", "report:root"]);
    assert_eq!(summary.executions_of("common::run"), 0);
    assert_eq!(summary.jumps, 1);
    assert_eq!(sched.state_of(COMMON_DOMAIN, "run").unwrap(), PhaseState::Done);
    assert_eq!(sched.state_of(COMMON_DOMAIN, "report").unwrap(), PhaseState::Done);
}

#[tokio::test(start_paused = true)]
async fn jump_between_parallel_branches_is_rejected() {
    let (ctx, sink) = fixture(EngineConfig::default());
    let log = Log::new();

    // start → left, start → right: left and right share no path
    let mut graph = PhaseGraph::new();
    let start = graph.add_node("start", PhaseKind::TopDown);
    let left = graph.add_node("left", PhaseKind::TopDown);
    let right = graph.add_node("right", PhaseKind::TopDown);
    graph.add_successor(start, left).unwrap();
    graph.add_successor(start, right).unwrap();
    graph.add_domain(COMMON_DOMAIN, &[start, left, right]).unwrap();

    let jumper = Jumper::new(&log, "left", "right");
    let tree = Arc::new(ComponentTree::new("root", jumper.clone()));

    let summary = scheduler(graph, tree, ctx).run(&[]).await.unwrap();

    assert!(!summary.aborted);
    assert_eq!(summary.jumps, 0);
    assert!(sink.contains_id("PH_BADJUMP"));
    let result = jumper.jump_result.lock().unwrap().clone().unwrap();
    assert!(result.unwrap_err().contains("no path"));
    assert_eq!(summary.executions_of("common::left"), 1);
    assert_eq!(summary.executions_of("common::right"), 1);
}

#[tokio::test(start_paused = true)]
async fn jump_to_unknown_phase_is_an_error() {
    let (ctx, sink) = fixture(EngineConfig::default());

    struct Lost(Mutex<Option<bool>>);

    #[async_trait]
    impl Component for Lost {
        async fn execute(&self, phase: &PhaseHandle) -> Result<(), ActionError> {
            if phase.name() == "build" {
                let unknown = matches!(phase.jump("nowhere"), Err(PhaseError::UnknownPhaseName(_)));
                *self.0.lock().unwrap() = Some(unknown);
            }
            Ok(())
        }
    }

    let lost = Arc::new(Lost(Mutex::new(None)));
    let tree = Arc::new(ComponentTree::new("root", lost.clone()));
    let summary = scheduler(three_phase_graph(), tree, ctx).run(&[]).await.unwrap();

    assert_eq!(*lost.0.lock().unwrap(), Some(true));
    assert!(sink.contains_id("PH_BADJUMP"));
    assert!(!summary.aborted);
    assert_eq!(summary.jumps, 0);
    assert_eq!(summary.executions_of("common::run"), 1);
}
