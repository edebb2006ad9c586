use std::fmt;

use tempo_core::Env;

use crate::error::SyncError;

const LOCKED_ID: &str = "TEMPO/SIMPLE_LOCK_DAP/SAG";

/// Value holder whose `set` can be locked out.
///
/// `get` and `is_locked` are always legal. `set` while locked is reported
/// as an error and leaves the value unchanged.
pub struct LockDap<T> {
    name: String,
    value: T,
    locked: bool,
    env: Env,
}

impl<T> LockDap<T> {
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self::with_env(name, value, Env::global().clone())
    }

    pub fn with_env(name: impl Into<String>, value: T, env: Env) -> Self {
        Self {
            name: name.into(),
            value,
            locked: false,
            env,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set(&mut self, value: T) -> Result<(), SyncError> {
        if self.locked {
            let err = SyncError::Locked {
                name: self.name.clone(),
            };
            self.env.reports().error(LOCKED_ID, &err.to_string());
            return Err(err);
        }
        self.value = value;
        Ok(())
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: Default> Default for LockDap<T> {
    fn default() -> Self {
        Self::new("unnamed-lock_dap", T::default())
    }
}

impl<T: fmt::Display> fmt::Display for LockDap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.locked {
            write!(f, "{} (locked)", self.value)
        } else {
            write!(f, "{}", self.value)
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for LockDap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockDap")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("locked", &self.locked)
            .finish()
    }
}
