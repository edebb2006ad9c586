//! phase-run: runs the standard phase schedule over a small demonstration
//! testbench and prints the run summary as JSON.
//!
//! The testbench is `top` with an `env` holding a driver and a monitor.
//! The driver objects to the end of `run` while it sends a handful of
//! items through a shared event; the monitor counts them and checks the
//! total in `check`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use serde_json::json;
use tracing::{info, warn};

use tempo_core::{load_dotenv, EngineConfig, Env, ReportServer, TokioTime, TracingSink};
use tempo_phase::{
    ActionError, Component, ComponentTree, Context, PhaseGraph, PhaseHandle, Scheduler,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Run the standard phase schedule over a demonstration testbench.
#[derive(Parser, Debug)]
#[command(name = "phase-run", version, about)]
struct Cli {
    /// Path to an engine TOML config file.
    #[arg(long, env = "TEMPO_CONFIG")]
    config: Option<PathBuf>,

    /// Report verbosity threshold (0 = NONE .. 500 = DEBUG).
    #[arg(long)]
    verbosity: Option<u32>,

    /// Global run timeout in logical seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Log every phase state transition.
    #[arg(long)]
    trace: bool,

    /// Extra runtime domains to run next to the common schedule.
    #[arg(long = "domain")]
    domains: Vec<String>,

    /// Items the driver sends during `run`.
    #[arg(long, default_value_t = 5)]
    items: u32,
}

// ── Testbench ───────────────────────────────────────────────────────

const ITEM_EVENT: &str = "item";

struct Top {
    items: u32,
}

#[async_trait]
impl Component for Top {
    async fn execute(&self, phase: &PhaseHandle) -> Result<(), ActionError> {
        if phase.name() == "build" {
            let env = phase.add_child("env", Arc::new(TbEnv { items: self.items }))?;
            info!(component = %phase.component_name(), child = ?env, "built env");
        }
        Ok(())
    }
}

struct TbEnv {
    items: u32,
}

#[async_trait]
impl Component for TbEnv {
    async fn execute(&self, phase: &PhaseHandle) -> Result<(), ActionError> {
        if phase.name() == "build" {
            phase.add_child("driver", Arc::new(Driver { items: self.items }))?;
            phase.add_child(
                "monitor",
                Arc::new(Monitor {
                    expected: self.items,
                    seen: AtomicU32::new(0),
                }),
            )?;
        }
        Ok(())
    }
}

struct Driver {
    items: u32,
}

#[async_trait]
impl Component for Driver {
    async fn execute(&self, phase: &PhaseHandle) -> Result<(), ActionError> {
        if phase.name() != "run" {
            return Ok(());
        }
        let event = phase.context().events().get(ITEM_EVENT);
        phase.raise_objection(1);
        for n in 0..self.items {
            phase.sleep(Duration::from_millis(1)).await;
            event.trigger(Some(json!({ "seq": n })));
        }
        // let the monitor see the last item before the phase can end
        phase.delta().await;
        phase.drop_objection(1);
        Ok(())
    }
}

struct Monitor {
    expected: u32,
    seen: AtomicU32,
}

#[async_trait]
impl Component for Monitor {
    async fn execute(&self, phase: &PhaseHandle) -> Result<(), ActionError> {
        match phase.name() {
            "run" => {
                let event = phase.context().events().get(ITEM_EVENT);
                loop {
                    if event.wait_trigger_data().await.is_some() {
                        self.seen.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            "check" => {
                let seen = self.seen.load(Ordering::Relaxed);
                if seen != self.expected {
                    return Err(ActionError::failed(format!(
                        "saw {seen} items, expected {}",
                        self.expected
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

// ── Main ────────────────────────────────────────────────────────────

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    load_dotenv();
    let mut config = match &cli.config {
        Some(path) => {
            let config = EngineConfig::from_file(path)?;
            info!(path = %path.display(), "loaded engine config");
            config
        }
        None => EngineConfig::from_env()?,
    };
    if let Some(v) = cli.verbosity {
        config.verbosity = v;
    }
    if let Some(v) = cli.timeout_secs {
        config.timeout_secs = v;
    }
    if cli.trace {
        config.trace_phases = true;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    config.log_summary();

    let reports = Arc::new(ReportServer::new(Arc::new(TracingSink), config.verbosity));
    let env = Env::new(Arc::new(TokioTime::new()), reports);
    let ctx = Context::new(config, env);

    let mut graph = PhaseGraph::standard();
    for domain in &cli.domains {
        graph.add_runtime_domain(domain)?;
    }

    let tree = Arc::new(ComponentTree::new("top", Arc::new(Top { items: cli.items })));
    let scheduler = Scheduler::new(graph, tree, ctx)?;
    let domains: Vec<&str> = cli.domains.iter().map(String::as_str).collect();
    let summary = scheduler.run(&domains).await?;

    if summary.aborted {
        warn!(fatal = ?summary.fatal, "run aborted");
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);

    summary.into_result()?;
    Ok(())
}
