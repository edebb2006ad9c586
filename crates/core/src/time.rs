//! Logical time.
//!
//! The engine never looks at wall-clock time. It asks a [`TimeSource`] for
//! "now" and to advance by one delta or by a duration. [`TokioTime`] backs
//! this with the tokio clock, which under a paused runtime only moves when
//! every task is idle.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A point on the logical time axis, in nanoseconds since the time source's epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SimTime(u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub fn from_duration(d: Duration) -> Self {
        Self(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_nanos(self.0)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// How far to advance logical time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// One scheduling step at the current instant.
    Delta,
    /// A span of logical time.
    By(Duration),
}

#[async_trait]
pub trait TimeSource: Send + Sync {
    fn now(&self) -> SimTime;

    async fn advance(&self, by: Advance);
}

/// Time source backed by the tokio clock.
#[derive(Debug, Clone, Copy)]
pub struct TokioTime {
    epoch: tokio::time::Instant,
}

impl TokioTime {
    pub fn new() -> Self {
        Self {
            epoch: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioTime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TimeSource for TokioTime {
    fn now(&self) -> SimTime {
        SimTime::from_duration(tokio::time::Instant::now().saturating_duration_since(self.epoch))
    }

    async fn advance(&self, by: Advance) {
        match by {
            Advance::Delta => tokio::task::yield_now().await,
            Advance::By(d) if d.is_zero() => tokio::task::yield_now().await,
            Advance::By(d) => tokio::time::sleep(d).await,
        }
    }
}
