//! Process-wide reference counting for the audio subsystem.
//!
//! The first session to acquire initializes the subsystem and the last one to
//! release tears it down. Callers never touch the counter directly.

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::error::Result;

/// Reference count guarding an explicit initialize/terminate pair.
///
/// The count is held under a lock for the whole 0->1 and 1->0 edges, so no
/// caller returns from `acquire` before initialization finished and a
/// terminate never interleaves with a re-initialize.
#[derive(Debug, Default)]
pub struct SubsystemRefCount {
    active: Mutex<usize>,
}

impl SubsystemRefCount {
    pub const fn new() -> Self {
        Self {
            active: Mutex::new(0),
        }
    }

    /// Registers a user, running `initialize` if this is the first one.
    ///
    /// # Errors
    /// - If `initialize` fails; the count is left unchanged
    pub fn acquire<F>(&self, initialize: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut active = self.lock();
        if *active == 0 {
            initialize()?;
            tracing::debug!("Audio subsystem initialized");
        }
        *active += 1;
        Ok(())
    }

    /// Unregisters a user, running `terminate` when the count drops to zero.
    ///
    /// Unbalanced releases are ignored.
    pub fn release<F>(&self, terminate: F)
    where
        F: FnOnce(),
    {
        let mut active = self.lock();
        match *active {
            0 => tracing::warn!("Audio subsystem released more times than acquired"),
            1 => {
                terminate();
                *active = 0;
                tracing::debug!("Audio subsystem terminated");
            }
            _ => *active -= 1,
        }
    }

    /// Number of current users.
    pub fn active(&self) -> usize {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
