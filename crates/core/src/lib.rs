pub mod config;
pub mod env;
pub mod error;
pub mod report;
pub mod time;

pub use config::{load_dotenv, EngineConfig};
pub use env::Env;
pub use error::*;
pub use report::{
    verbosity, RecordingSink, Report, ReportCounts, ReportServer, ReportSink, Severity, TeeSink,
    TracingSink,
};
pub use time::{Advance, SimTime, TimeSource, TokioTime};
