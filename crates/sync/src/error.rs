use thiserror::Error;

/// Usage errors raised by the synchronization primitives. Each one is
/// reported at the call site and leaves the primitive unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("requested {requested} units from gate '{gate}' with capacity {capacity}")]
    CapacityExceeded {
        gate: String,
        requested: usize,
        capacity: usize,
    },

    #[error("returning {returned} units to gate '{gate}' would exceed capacity {capacity}")]
    Overfilled {
        gate: String,
        returned: usize,
        capacity: usize,
    },

    #[error("attempt to set new value on '{name}', but the data access policy forbids setting while locked")]
    Locked { name: String },

    #[error("primitive '{0}' is closed")]
    Closed(String),
}
