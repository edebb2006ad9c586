use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use tempo_core::{EngineConfig, SimTime};
use tempo_phase::{ActionError, Component, ComponentTree, PhaseHandle, PhaseState, COMMON_DOMAIN};

use crate::helpers::{fixture, scheduler, three_phase_graph, Log, Probe};

/// Objects to the end of `run` for `hold`, then drops.
struct Holder {
    hold: Duration,
}

#[async_trait]
impl Component for Holder {
    async fn execute(&self, phase: &PhaseHandle) -> Result<(), ActionError> {
        if phase.name() == "run" {
            phase.raise_objection(1);
            phase.sleep(self.hold).await;
            phase.drop_objection(1);
        }
        Ok(())
    }
}

/// Loops in `run` until its task is aborted.
struct Forever {
    ticks: Arc<AtomicU32>,
}

#[async_trait]
impl Component for Forever {
    async fn execute(&self, phase: &PhaseHandle) -> Result<(), ActionError> {
        if phase.name() == "run" {
            loop {
                phase.sleep(Duration::from_millis(1)).await;
                self.ticks.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn task_phase_ends_when_objections_drop() {
    let (ctx, _) = fixture(EngineConfig::default());
    let ticks = Arc::new(AtomicU32::new(0));
    let tree = Arc::new(ComponentTree::new(
        "root",
        Arc::new(Holder {
            hold: Duration::from_millis(100),
        }),
    ));
    let looper = tree
        .add_child(tree.root(), "looper", Arc::new(Forever { ticks: ticks.clone() }))
        .unwrap();

    let summary = scheduler(three_phase_graph(), tree.clone(), ctx)
        .run(&[])
        .await
        .unwrap();

    assert!(!summary.aborted);
    assert_eq!(summary.end_time, SimTime::from_duration(Duration::from_millis(100)));
    assert!(ticks.load(Ordering::SeqCst) >= 99);
    assert_eq!(tree.phasing_active(looper), 0);
}

#[tokio::test(start_paused = true)]
async fn objection_drain_delays_the_end() {
    let config = EngineConfig {
        objection_drain_secs: 2,
        ..EngineConfig::default()
    };
    let (ctx, _) = fixture(config);
    let tree = Arc::new(ComponentTree::new(
        "root",
        Arc::new(Holder {
            hold: Duration::from_secs(1),
        }),
    ));
    tree.add_child(
        tree.root(),
        "looper",
        Arc::new(Forever {
            ticks: Arc::new(AtomicU32::new(0)),
        }),
    )
    .unwrap();

    let summary = scheduler(three_phase_graph(), tree, ctx).run(&[]).await.unwrap();
    assert_eq!(summary.end_time, SimTime::from_duration(Duration::from_secs(3)));
}

/// Ends the `run` phase from inside after a while.
struct Ender;

#[async_trait]
impl Component for Ender {
    async fn execute(&self, phase: &PhaseHandle) -> Result<(), ActionError> {
        if phase.name() == "run" {
            phase.sleep(Duration::from_millis(5)).await;
            phase.end();
        }
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn end_cuts_a_task_phase_short() {
    let (ctx, _) = fixture(EngineConfig::default());
    let tree = Arc::new(ComponentTree::new("root", Arc::new(Ender)));
    tree.add_child(
        tree.root(),
        "looper",
        Arc::new(Forever {
            ticks: Arc::new(AtomicU32::new(0)),
        }),
    )
    .unwrap();

    let sched = scheduler(three_phase_graph(), tree, ctx);
    let summary = sched.run(&[]).await.unwrap();
    assert!(!summary.aborted);
    assert_eq!(summary.end_time, SimTime::from_duration(Duration::from_millis(5)));
    assert_eq!(sched.state_of(COMMON_DOMAIN, "report").unwrap(), PhaseState::Done);
}

#[tokio::test(start_paused = true)]
async fn end_releases_objections_held_by_aborted_tasks() {
    let (ctx, _) = fixture(EngineConfig::default());
    let tree = Arc::new(ComponentTree::new("root", Arc::new(Ender)));
    tree.add_child(
        tree.root(),
        "holder",
        Arc::new(Holder {
            hold: Duration::from_secs(1000),
        }),
    )
    .unwrap();

    let sched = scheduler(three_phase_graph(), tree, ctx);
    let summary = sched.run(&[]).await.unwrap();

    assert!(!summary.aborted);
    assert!(!summary.timed_out);
    assert_eq!(summary.end_time, SimTime::from_duration(Duration::from_millis(5)));
    assert_eq!(summary.executions_of("common::report"), 1);
    assert_eq!(sched.state_of(COMMON_DOMAIN, "run").unwrap(), PhaseState::Done);
}

/// Ends `run` from `phase_ready_to_end` while an objection is still open.
struct LateEnder;

impl Component for LateEnder {
    fn phase_ready_to_end(&self, phase: &PhaseHandle) {
        if phase.name() == "run" {
            phase.raise_objection(1);
            phase.end();
        }
    }
}

#[tokio::test(start_paused = true)]
async fn end_during_ready_to_end_leaves_the_phase() {
    let (ctx, _) = fixture(EngineConfig::default());
    let tree = Arc::new(ComponentTree::new("root", Arc::new(LateEnder)));

    let sched = scheduler(three_phase_graph(), tree, ctx);
    let summary = sched.run(&[]).await.unwrap();

    assert!(!summary.aborted);
    assert_eq!(summary.end_time, SimTime::ZERO);
    assert_eq!(summary.executions_of("common::report"), 1);
}

/// Raises an objection from `phase_ready_to_end` a fixed number of times,
/// dropping each one shortly after.
struct Extender {
    remaining: AtomicU32,
    calls: Arc<AtomicU32>,
}

impl Component for Extender {
    fn phase_ready_to_end(&self, phase: &PhaseHandle) {
        if phase.name() != "run" {
            return;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let extend = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if extend {
            phase.raise_objection(1);
            let phase = phase.clone();
            tokio::spawn(async move {
                phase.sleep(Duration::from_millis(1)).await;
                phase.drop_objection(1);
            });
        }
    }
}

#[tokio::test(start_paused = true)]
async fn ready_to_end_reenters_while_objections_are_raised() {
    let (ctx, _) = fixture(EngineConfig::default());
    let calls = Arc::new(AtomicU32::new(0));
    let tree = Arc::new(ComponentTree::new(
        "root",
        Arc::new(Extender {
            remaining: AtomicU32::new(2),
            calls: calls.clone(),
        }),
    ));

    let summary = scheduler(three_phase_graph(), tree, ctx).run(&[]).await.unwrap();
    assert!(!summary.aborted);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(summary.end_time, SimTime::from_duration(Duration::from_millis(2)));
}

#[tokio::test(start_paused = true)]
async fn unbounded_ready_to_end_is_fatal() {
    let config = EngineConfig {
        max_ready_to_end_iterations: 3,
        ..EngineConfig::default()
    };
    let (ctx, sink) = fixture(config);
    let calls = Arc::new(AtomicU32::new(0));
    let log = Log::new();
    let tree = Arc::new(ComponentTree::new(
        "root",
        Arc::new(Extender {
            remaining: AtomicU32::new(u32::MAX),
            calls: calls.clone(),
        }),
    ));
    tree.add_child(tree.root(), "probe", Probe::with_hooks("probe", &log))
        .unwrap();

    let summary = scheduler(three_phase_graph(), tree, ctx).run(&[]).await.unwrap();

    assert!(summary.aborted);
    assert_eq!(summary.fatal.as_ref().unwrap().id, "PH_READY_TO_END");
    assert!(sink.contains_id("PH_READY_TO_END"));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert!(log.position("ended:run:probe").is_some());
    assert!(log.position("report:probe").is_none());
}

/// Blocks its build action forever.
struct Hang;

#[async_trait]
impl Component for Hang {
    async fn execute(&self, phase: &PhaseHandle) -> Result<(), ActionError> {
        if phase.name() == "build" {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn global_timeout_aborts_the_run() {
    let config = EngineConfig {
        timeout_secs: 30,
        ..EngineConfig::default()
    };
    let (ctx, sink) = fixture(config);
    let tree = Arc::new(ComponentTree::new("root", Arc::new(Hang)));

    let sched = scheduler(three_phase_graph(), tree, ctx);
    let summary = sched.run(&[]).await.unwrap();

    assert!(summary.aborted);
    assert!(summary.timed_out);
    assert!(sink.contains_id("PH_TIMEOUT"));
    assert_eq!(summary.end_time, SimTime::from_duration(Duration::from_secs(30)));
    assert_eq!(summary.executions_of("common::run"), 0);
    assert_eq!(sched.state_of(COMMON_DOMAIN, "build").unwrap(), PhaseState::Cleanup);
    assert!(matches!(
        summary.into_result(),
        Err(tempo_phase::PhaseError::Timeout(_))
    ));
}

/// Fails its first build with a FATAL error.
struct FatalOnce {
    builds: AtomicU32,
}

#[async_trait]
impl Component for FatalOnce {
    async fn execute(&self, phase: &PhaseHandle) -> Result<(), ActionError> {
        if phase.name() == "build" && self.builds.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(ActionError::fatal("first build always fails"));
        }
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn rerun_after_fatal_starts_clean() {
    let (ctx, _) = fixture(EngineConfig::default());
    let tree = Arc::new(ComponentTree::new(
        "root",
        Arc::new(FatalOnce {
            builds: AtomicU32::new(0),
        }),
    ));
    let sched = scheduler(three_phase_graph(), tree, ctx);

    let first = sched.run(&[]).await.unwrap();
    assert!(first.aborted);
    assert_eq!(first.executions_of("common::run"), 0);

    let second = sched.run(&[]).await.unwrap();
    assert!(!second.aborted);
    assert!(second.fatal.is_none());
    assert_eq!(second.executions_of("common::report"), 1);
    assert_eq!(sched.state_of(COMMON_DOMAIN, "report").unwrap(), PhaseState::Done);
}
