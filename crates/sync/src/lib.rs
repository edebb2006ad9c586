//! Cooperative synchronization primitives: events, resource gates, keyed
//! pools and lockable data holders.

pub mod dap;
pub mod error;
pub mod event;
pub mod gate;
pub mod pool;

pub use dap::LockDap;
pub use error::SyncError;
pub use event::{Event, EventCallback};
pub use gate::ResourceGate;
pub use pool::Pool;
