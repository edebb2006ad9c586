//! Reporting sink and the report server that fronts it.
//!
//! Every diagnostic the engine raises goes through
//! `report(severity, id, message, verbosity)`. The [`ReportServer`] filters
//! by verbosity, keeps per-severity and per-id counts, and latches an abort
//! signal on the first FATAL report so the scheduler can wind the run down.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Verbosity levels attached to reports. INFO reports above the configured
/// threshold are dropped; other severities are never filtered.
pub mod verbosity {
    pub const NONE: u32 = 0;
    pub const LOW: u32 = 100;
    pub const MEDIUM: u32 = 200;
    pub const HIGH: u32 = 300;
    pub const FULL: u32 = 400;
    pub const DEBUG: u32 = 500;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        };
        f.write_str(s)
    }
}

/// Destination for engine reports.
pub trait ReportSink: Send + Sync {
    fn report(&self, severity: Severity, id: &str, message: &str, verbosity: u32);
}

/// Forwards reports to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn report(&self, severity: Severity, id: &str, message: &str, verbosity: u32) {
        match severity {
            Severity::Info => info!(id = %id, verbosity, "{}", message),
            Severity::Warning => warn!(id = %id, verbosity, "{}", message),
            Severity::Error => error!(id = %id, verbosity, "{}", message),
            Severity::Fatal => error!(id = %id, verbosity, fatal = true, "{}", message),
        }
    }
}

/// A single recorded report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub severity: Severity,
    pub id: String,
    pub message: String,
    pub verbosity: u32,
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<Report>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Reports carrying the given id.
    pub fn with_id(&self, id: &str) -> Vec<Report> {
        self.reports()
            .into_iter()
            .filter(|r| r.id == id)
            .collect()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        !self.with_id(id).is_empty()
    }
}

impl ReportSink for RecordingSink {
    fn report(&self, severity: Severity, id: &str, message: &str, verbosity: u32) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Report {
                severity,
                id: id.to_string(),
                message: message.to_string(),
                verbosity,
            });
    }
}

/// Fan a report out to several sinks, in order.
pub struct TeeSink {
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl TeeSink {
    pub fn new(sinks: Vec<Arc<dyn ReportSink>>) -> Self {
        Self { sinks }
    }
}

impl ReportSink for TeeSink {
    fn report(&self, severity: Severity, id: &str, message: &str, verbosity: u32) {
        for sink in &self.sinks {
            sink.report(severity, id, message, verbosity);
        }
    }
}

/// Counts of reports that passed the verbosity filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportCounts {
    pub info: usize,
    pub warning: usize,
    pub error: usize,
    pub fatal: usize,
    /// Count per report id.
    pub by_id: BTreeMap<String, usize>,
}

impl ReportCounts {
    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Info => self.info,
            Severity::Warning => self.warning,
            Severity::Error => self.error,
            Severity::Fatal => self.fatal,
        }
    }

    fn record(&mut self, severity: Severity, id: &str) {
        match severity {
            Severity::Info => self.info += 1,
            Severity::Warning => self.warning += 1,
            Severity::Error => self.error += 1,
            Severity::Fatal => self.fatal += 1,
        }
        *self.by_id.entry(id.to_string()).or_default() += 1;
    }
}

/// Verbosity filter, counters and FATAL latch in front of a [`ReportSink`].
pub struct ReportServer {
    sink: Arc<dyn ReportSink>,
    threshold: AtomicU32,
    counts: Mutex<ReportCounts>,
    first_fatal: Mutex<Option<Report>>,
    fatal: watch::Sender<bool>,
}

impl ReportServer {
    pub fn new(sink: Arc<dyn ReportSink>, threshold: u32) -> Self {
        let (fatal, _) = watch::channel(false);
        Self {
            sink,
            threshold: AtomicU32::new(threshold),
            counts: Mutex::new(ReportCounts::default()),
            first_fatal: Mutex::new(None),
            fatal,
        }
    }

    pub fn set_verbosity(&self, threshold: u32) {
        self.threshold.store(threshold, Ordering::Relaxed);
    }

    pub fn verbosity(&self) -> u32 {
        self.threshold.load(Ordering::Relaxed)
    }

    /// Whether a report at `severity`/`verbosity` would pass the filter.
    pub fn is_enabled(&self, severity: Severity, verbosity: u32) -> bool {
        severity != Severity::Info || verbosity <= self.verbosity()
    }

    /// Emit a report. Returns false when the verbosity filter dropped it.
    pub fn report(&self, severity: Severity, id: &str, message: &str, verbosity: u32) -> bool {
        if !self.is_enabled(severity, verbosity) {
            return false;
        }
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(severity, id);
        self.sink.report(severity, id, message, verbosity);

        if severity == Severity::Fatal {
            let mut first = self.first_fatal.lock().unwrap_or_else(PoisonError::into_inner);
            if first.is_none() {
                *first = Some(Report {
                    severity,
                    id: id.to_string(),
                    message: message.to_string(),
                    verbosity,
                });
            }
            self.fatal.send_replace(true);
        }
        true
    }

    pub fn info(&self, id: &str, message: &str, verbosity: u32) -> bool {
        self.report(Severity::Info, id, message, verbosity)
    }

    pub fn warning(&self, id: &str, message: &str) -> bool {
        self.report(Severity::Warning, id, message, verbosity::LOW)
    }

    pub fn error(&self, id: &str, message: &str) -> bool {
        self.report(Severity::Error, id, message, verbosity::LOW)
    }

    pub fn fatal(&self, id: &str, message: &str) -> bool {
        self.report(Severity::Fatal, id, message, verbosity::NONE)
    }

    pub fn fatal_raised(&self) -> bool {
        *self.fatal.borrow()
    }

    /// The first FATAL report, if any.
    pub fn first_fatal(&self) -> Option<Report> {
        self.first_fatal.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Resolve once a FATAL report has been raised.
    pub async fn wait_fatal(&self) {
        let mut rx = self.fatal.subscribe();
        if rx.wait_for(|raised| *raised).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner).get(severity)
    }

    pub fn count_id(&self, id: &str) -> usize {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    pub fn summary(&self) -> ReportCounts {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Reset counters and the FATAL latch.
    pub fn clear(&self) {
        *self.counts.lock().unwrap_or_else(PoisonError::into_inner) = ReportCounts::default();
        *self.first_fatal.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.fatal.send_replace(false);
    }
}

impl ReportSink for ReportServer {
    fn report(&self, severity: Severity, id: &str, message: &str, verbosity: u32) {
        ReportServer::report(self, severity, id, message, verbosity);
    }
}

impl fmt::Debug for ReportServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportServer")
            .field("threshold", &self.verbosity())
            .field("fatal", &self.fatal_raised())
            .finish()
    }
}
