use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::report::{verbosity, ReportServer, TracingSink};
use crate::time::{SimTime, TimeSource, TokioTime};

/// The external collaborators every primitive needs: a time source and a
/// report server. Cheap to clone.
#[derive(Clone)]
pub struct Env {
    time: Arc<dyn TimeSource>,
    reports: Arc<ReportServer>,
}

static GLOBAL_ENV: OnceLock<Env> = OnceLock::new();

impl Env {
    pub fn new(time: Arc<dyn TimeSource>, reports: Arc<ReportServer>) -> Self {
        Self { time, reports }
    }

    /// Process-wide default, created on first use with a tokio time source
    /// and a `tracing`-backed report server.
    pub fn global() -> &'static Env {
        GLOBAL_ENV.get_or_init(Env::default)
    }

    pub fn time(&self) -> &Arc<dyn TimeSource> {
        &self.time
    }

    pub fn reports(&self) -> &Arc<ReportServer> {
        &self.reports
    }

    pub fn now(&self) -> SimTime {
        self.time.now()
    }
}

impl Default for Env {
    fn default() -> Self {
        Self {
            time: Arc::new(TokioTime::new()),
            reports: Arc::new(ReportServer::new(Arc::new(TracingSink), verbosity::MEDIUM)),
        }
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("now", &self.now())
            .field("reports", &self.reports)
            .finish()
    }
}
